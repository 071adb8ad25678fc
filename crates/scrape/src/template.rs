//! Naming-template rendering for destination folder and file names.
//!
//! Tokens: `{title}`, `{year}`, `{resolution}`, `{bitrate}`, `{id}`,
//! `{cast}`, `{num}`, `{season}`, `{episode}`, `{se}`, `{episode_title}`.
//! Rendering is total: an unresolved token becomes the empty string, never
//! the literal token text.

use regex::Regex;
use std::sync::LazyLock;

static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

// Characters not allowed in file names on common filesystems.
static RE_FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|]"#).unwrap());

/// Values available to a template. Absent fields render empty.
#[derive(Debug, Clone, Default)]
pub struct TokenContext {
    pub title: Option<String>,
    pub year: Option<i64>,
    pub resolution: Option<String>,
    pub bitrate: Option<String>,
    pub catalog_id: Option<i64>,
    pub cast: Option<String>,
    pub num: Option<String>,
    pub season: Option<i64>,
    pub episode: Option<i64>,
    pub episode_title: Option<String>,
}

impl TokenContext {
    fn resolve(&self, token: &str) -> String {
        match token {
            "title" => self.title.clone().unwrap_or_default(),
            "year" => self.year.map(|y| y.to_string()).unwrap_or_default(),
            "resolution" => self.resolution.clone().unwrap_or_default(),
            "bitrate" => self.bitrate.clone().unwrap_or_default(),
            "id" => self.catalog_id.map(|i| i.to_string()).unwrap_or_default(),
            "cast" => self.cast.clone().unwrap_or_default(),
            "num" => self.num.clone().unwrap_or_default(),
            "season" => self.season.map(|s| s.to_string()).unwrap_or_default(),
            "episode" => self.episode.map(|e| e.to_string()).unwrap_or_default(),
            "se" => match (self.season, self.episode) {
                (Some(s), Some(e)) => format!("S{s:02}E{e:02}"),
                _ => String::new(),
            },
            "episode_title" => self.episode_title.clone().unwrap_or_default(),
            // Unknown tokens render empty as well.
            _ => String::new(),
        }
    }
}

/// Render a template against a token context and tidy the result.
pub fn render(template: &str, ctx: &TokenContext) -> String {
    let substituted = RE_TOKEN.replace_all(template, |caps: &regex::Captures<'_>| {
        ctx.resolve(&caps[1])
    });
    tidy(&substituted)
}

/// Strip filesystem-hostile characters from a rendered name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned = RE_FORBIDDEN.replace_all(name, "");
    tidy(&cleaned)
}

/// Collapse artifacts left by empty substitutions: doubled spaces, empty
/// parens/brackets, dangling separators.
fn tidy(s: &str) -> String {
    let mut out = s.replace("()", "").replace("[]", "");
    loop {
        let collapsed = out.replace("  ", " ");
        if collapsed == out {
            break;
        }
        out = collapsed;
    }
    out.trim().trim_end_matches('-').trim().to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn full_ctx() -> TokenContext {
        TokenContext {
            title: Some("Breaking Bad".into()),
            year: Some(2008),
            resolution: Some("1080p".into()),
            bitrate: Some("8Mbps".into()),
            catalog_id: Some(1396),
            cast: Some("Bryan Cranston".into()),
            num: Some("BB-01".into()),
            season: Some(1),
            episode: Some(2),
            episode_title: Some("Cat's in the Bag...".into()),
        }
    }

    #[test]
    fn every_token_substitutes() {
        let template =
            "{title}|{year}|{resolution}|{bitrate}|{id}|{cast}|{num}|{season}|{episode}|{se}|{episode_title}";
        let rendered = render(template, &full_ctx());
        assert_eq!(
            rendered,
            "Breaking Bad|2008|1080p|8Mbps|1396|Bryan Cranston|BB-01|1|2|S01E02|Cat's in the Bag..."
        );
    }

    #[test]
    fn unresolved_tokens_render_empty() {
        let ctx = TokenContext {
            title: Some("The Matrix".into()),
            ..Default::default()
        };
        let rendered = render("{title} ({year}) {se} {episode_title}", &ctx);
        assert_eq!(rendered, "The Matrix");
        assert!(!rendered.contains('{'));
    }

    #[test]
    fn unknown_token_never_left_literal() {
        let rendered = render("{title} {bogus_token}", &full_ctx());
        assert_eq!(rendered, "Breaking Bad");
    }

    #[test]
    fn zero_padded_pair() {
        let ctx = TokenContext {
            season: Some(1),
            episode: Some(2),
            ..Default::default()
        };
        assert_eq!(render("{se}", &ctx), "S01E02");

        let ctx = TokenContext {
            season: Some(12),
            episode: Some(345),
            ..Default::default()
        };
        assert_eq!(render("{se}", &ctx), "S12E345");
    }

    #[test]
    fn movie_folder_template() {
        let ctx = TokenContext {
            title: Some("The Matrix".into()),
            year: Some(1999),
            ..Default::default()
        };
        assert_eq!(render("{title} ({year})", &ctx), "The Matrix (1999)");
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_name("AC/DC: Live"), "ACDC Live");
        assert_eq!(sanitize_name("What? <Why>"), "What Why");
    }
}
