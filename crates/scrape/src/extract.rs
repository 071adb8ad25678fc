//! Filename identification: file filters, season/episode extraction, and
//! title/year heuristics.

use regex::Regex;
use std::sync::LazyLock;

static VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "flv", "webm", "ts", "mpg", "mpeg", "3gp", "ogv",
];

/// Sidecar types that pass the file filter regardless of size: subtitles,
/// artwork images, and metadata text.
static SIDECAR_EXTENSIONS: &[&str] = &[
    "srt", "sub", "ass", "ssa", "idx", "vtt", "jpg", "jpeg", "png", "nfo",
];

// SxxExx pattern: S01E02, s1e3, etc.
static RE_SXXEXX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[Ss](\d{1,2})[Ee](\d{1,3})").unwrap());

// 1x02 pattern
static RE_XEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,2})[xX](\d{2,3})").unwrap());

// "Season X Episode Y" pattern
static RE_SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Season\s+(\d+)\s+Episode\s+(\d+)").unwrap());

// Bare episode marker: "EP07", "E07" (no season signal)
static RE_EP_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[\s._\-])EP?(\d{1,3})(?:[\s._\-]|$)").unwrap());

// Season folder: "Season 02", "Season.2", "S02"
static RE_SEASON_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:Season[\s._\-]*(\d{1,3})|S(\d{1,2}))$").unwrap());

// "Title (Year)" or "Title.Year"
static RE_YEAR_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\((\d{4})\)").unwrap());

static RE_YEAR_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)[\.\s](\d{4})(?:[\.\s]|$)").unwrap());

// Catalog ID override in folder/file name: [tmdb=12345]
static RE_CATALOG_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[tmdb=(\d+)\]").unwrap());

static RE_RESOLUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(2160p|1080p|720p|480p|4K)\b").unwrap());

static RE_HDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(HDR10\+?|HDR|DV|Dolby[\s.]?Vision)\b").unwrap());

// Release-group noise stripped from derived titles.
static JUNK_TOKENS: &[&str] = &[
    "bluray", "blu-ray", "webrip", "web-dl", "webdl", "hdtv", "dvdrip", "bdrip", "remux",
    "x264", "x265", "h264", "h265", "hevc", "avc", "aac", "ac3", "dts", "truehd", "atmos",
    "10bit", "8bit", "proper", "repack", "extended", "uncut", "imax", "2160p", "1080p",
    "720p", "480p", "4k", "hdr", "hdr10",
];

/// Identification derived from a filename (and optionally its folder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub year: Option<i64>,
    pub catalog_id: Option<i64>,
    /// −1 when no season signal was found.
    pub season: i64,
    /// −1 when no episode signal was found.
    pub episode: i64,
    pub resolution: Option<String>,
    pub is_hdr: bool,
}

pub fn is_video_file(filename: &str) -> bool {
    match filename.rsplit('.').next() {
        Some(ext) => VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

pub fn is_sidecar_file(filename: &str) -> bool {
    match filename.rsplit('.').next() {
        Some(ext) => SIDECAR_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

pub fn is_subtitle_file(filename: &str) -> bool {
    match filename.rsplit('.').next() {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "srt" | "sub" | "ass" | "ssa" | "idx" | "vtt"
        ),
        None => false,
    }
}

/// File filter applied during scan: videos must meet the minimum size,
/// allow-listed sidecars pass regardless of size, everything else is skipped.
pub fn check_file_allowed(filename: &str, size_bytes: u64, min_video_size_mb: i64) -> bool {
    if is_sidecar_file(filename) {
        return true;
    }
    if !is_video_file(filename) {
        return false;
    }
    let min_bytes = min_video_size_mb.max(0) as u64 * 1024 * 1024;
    size_bytes >= min_bytes
}

/// Season number from a season-folder name ("Season 02" → 2), if it is one.
pub fn parse_season_folder(folder_name: &str) -> Option<i64> {
    let caps = RE_SEASON_FOLDER.captures(folder_name.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// Catalog ID override embedded in a name, e.g. `Show [tmdb=1396]`.
pub fn parse_catalog_id(name: &str) -> Option<i64> {
    RE_CATALOG_ID
        .captures(name)
        .and_then(|c| c[1].parse().ok())
}

/// Clean up a raw title fragment: strip keywords and release junk, replace
/// separators with spaces, trim.
pub fn clean_title(raw: &str, strip_keywords: &[String]) -> String {
    let mut s = raw.replace(['.', '_'], " ");
    s = RE_CATALOG_ID.replace_all(&s, " ").to_string();
    for kw in strip_keywords {
        if kw.is_empty() {
            continue;
        }
        let lower_kw = kw.to_lowercase();
        let mut out = String::with_capacity(s.len());
        let mut rest = s.as_str();
        loop {
            match rest.to_lowercase().find(&lower_kw) {
                Some(pos) => {
                    out.push_str(&rest[..pos]);
                    rest = &rest[pos + kw.len()..];
                }
                None => {
                    out.push_str(rest);
                    break;
                }
            }
        }
        s = out;
    }

    let words: Vec<&str> = s
        .split_whitespace()
        .take_while(|w| {
            let lower = w.to_lowercase();
            !JUNK_TOKENS.contains(&lower.as_str())
        })
        .collect();

    words.join(" ").trim().trim_matches('-').trim().to_string()
}

/// Parse a media filename into its identification parts.
///
/// No season/episode signal at all is not fatal: the result carries −1 for
/// both, and the pipeline defaults the season to 1 before any path is
/// generated.
pub fn parse_media_name(filename: &str, strip_keywords: &[String]) -> ParsedName {
    let stem = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename);

    // Strip extension
    let stem = match stem.rfind('.') {
        Some(pos) if is_video_file(stem) || is_sidecar_file(stem) => &stem[..pos],
        _ => stem,
    };

    let catalog_id = parse_catalog_id(stem);
    let resolution = RE_RESOLUTION
        .captures(stem)
        .map(|c| c[1].to_lowercase());
    let is_hdr = RE_HDR.is_match(stem);

    let (season, episode, title_end) = extract_episode_marker(stem);

    let raw_title = &stem[..title_end];
    let mut title = clean_title(raw_title, strip_keywords);
    let mut year = None;

    // Year inside the title fragment: "Title (2010)" or "Title.2010"
    if let Some(caps) = RE_YEAR_PAREN.captures(raw_title) {
        title = clean_title(&caps[1], strip_keywords);
        year = caps[2].parse().ok();
    } else if let Some(caps) = RE_YEAR_DOT.captures(raw_title) {
        if let Ok(y) = caps[2].parse::<i64>() {
            if y >= 1900 && y <= 2100 {
                title = clean_title(&caps[1], strip_keywords);
                year = Some(y);
            }
        }
    }

    ParsedName {
        title,
        year,
        catalog_id,
        season,
        episode,
        resolution,
        is_hdr,
    }
}

/// Find a season/episode marker; returns (season, episode, title_end_offset).
fn extract_episode_marker(stem: &str) -> (i64, i64, usize) {
    if let Some(caps) = RE_SXXEXX.captures(stem) {
        let season = caps[1].parse().unwrap_or(-1);
        let episode = caps[2].parse().unwrap_or(-1);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(stem.len());
        return (season, episode, start);
    }

    if let Some(caps) = RE_XEP.captures(stem) {
        let season = caps[1].parse().unwrap_or(-1);
        let episode = caps[2].parse().unwrap_or(-1);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(stem.len());
        return (season, episode, start);
    }

    if let Some(caps) = RE_SEASON_EPISODE.captures(stem) {
        let season = caps[1].parse().unwrap_or(-1);
        let episode = caps[2].parse().unwrap_or(-1);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(stem.len());
        return (season, episode, start);
    }

    if let Some(caps) = RE_EP_ONLY.captures(stem) {
        let episode = caps[1].parse().unwrap_or(-1);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(stem.len());
        return (-1, episode, start);
    }

    (-1, -1, stem.len())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn no_strip() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn parse_sxxexx() {
        let r = parse_media_name("Breaking.Bad.S02E05.1080p.BluRay.mkv", &no_strip());
        assert_eq!(r.title, "Breaking Bad");
        assert_eq!(r.season, 2);
        assert_eq!(r.episode, 5);
        assert_eq!(r.resolution.as_deref(), Some("1080p"));
        assert!(!r.is_hdr);
    }

    #[test]
    fn parse_xep_format() {
        let r = parse_media_name("Seinfeld.3x12.avi", &no_strip());
        assert_eq!(r.title, "Seinfeld");
        assert_eq!(r.season, 3);
        assert_eq!(r.episode, 12);
    }

    #[test]
    fn parse_season_episode_words() {
        let r = parse_media_name("Friends Season 2 Episode 14.mkv", &no_strip());
        assert_eq!(r.title, "Friends");
        assert_eq!(r.season, 2);
        assert_eq!(r.episode, 14);
    }

    #[test]
    fn parse_bare_episode_leaves_season_unknown() {
        let r = parse_media_name("Some.Show.EP07.mkv", &no_strip());
        assert_eq!(r.title, "Some Show");
        assert_eq!(r.season, -1);
        assert_eq!(r.episode, 7);
    }

    #[test]
    fn no_marker_is_not_fatal() {
        let r = parse_media_name("Some Random Movie.mp4", &no_strip());
        assert_eq!(r.title, "Some Random Movie");
        assert_eq!(r.season, -1);
        assert_eq!(r.episode, -1);
    }

    #[test]
    fn parse_movie_year_paren() {
        let r = parse_media_name("The Matrix (1999).mkv", &no_strip());
        assert_eq!(r.title, "The Matrix");
        assert_eq!(r.year, Some(1999));
    }

    #[test]
    fn parse_movie_year_dot() {
        let r = parse_media_name("Inception.2010.2160p.HDR.x265.mkv", &no_strip());
        assert_eq!(r.title, "Inception");
        assert_eq!(r.year, Some(2010));
        assert_eq!(r.resolution.as_deref(), Some("2160p"));
        assert!(r.is_hdr);
    }

    #[test]
    fn parse_catalog_override() {
        let r = parse_media_name("Breaking Bad [tmdb=1396] S01E01.mkv", &no_strip());
        assert_eq!(r.catalog_id, Some(1396));
        assert_eq!(r.title, "Breaking Bad");
    }

    #[test]
    fn strip_keywords_removed_from_title() {
        let strip = vec!["FANSUB-GROUP".to_string()];
        let r = parse_media_name("FANSUB-GROUP Show Name S01E02.mkv", &strip);
        assert_eq!(r.title, "Show Name");
    }

    #[test]
    fn season_folder_detection() {
        assert_eq!(parse_season_folder("Season 02"), Some(2));
        assert_eq!(parse_season_folder("Season.2"), Some(2));
        assert_eq!(parse_season_folder("S05"), Some(5));
        assert_eq!(parse_season_folder("Season 10"), Some(10));
        assert_eq!(parse_season_folder("Specials Extras"), None);
        assert_eq!(parse_season_folder("Breaking Bad"), None);
    }

    #[test]
    fn video_extension_check() {
        assert!(is_video_file("movie.mkv"));
        assert!(is_video_file("Movie.MP4"));
        assert!(!is_video_file("poster.jpg"));
        assert!(!is_video_file("noext"));
    }

    #[test]
    fn file_filter_size_and_sidecars() {
        let mb = 1024 * 1024;
        // Video below the minimum size is skipped
        assert!(!check_file_allowed("sample.mkv", 50 * mb, 100));
        assert!(check_file_allowed("movie.mkv", 700 * mb, 100));
        // Sidecars pass regardless of size
        assert!(check_file_allowed("movie.srt", 12, 100));
        assert!(check_file_allowed("poster.jpg", 0, 100));
        assert!(check_file_allowed("movie.nfo", 1, 100));
        // Everything else is skipped
        assert!(!check_file_allowed("readme.txt", 5 * mb, 0));
    }
}
