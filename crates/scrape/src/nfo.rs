//! Kodi/Jellyfin-compatible nfo sidecar rendering.

use medorg_db::repo::media::{MediaEpisodeRow, MediaRow};

pub fn movie_nfo(media: &MediaRow) -> String {
    work_nfo("movie", media)
}

pub fn tvshow_nfo(media: &MediaRow) -> String {
    work_nfo("tvshow", media)
}

fn work_nfo(root: &str, media: &MediaRow) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<{root}>\n"));
    push_tag(&mut out, "title", &media.title);
    if let Some(original) = &media.original_title {
        push_tag(&mut out, "originaltitle", original);
    }
    if let Some(year) = media.year {
        push_tag(&mut out, "year", &year.to_string());
    }
    if let Some(overview) = &media.overview {
        push_tag(&mut out, "plot", overview);
    }
    if let Some(rating) = &media.content_rating {
        push_tag(&mut out, "mpaa", rating);
    }
    push_tag(&mut out, "tmdbid", &media.catalog_id.to_string());
    for genre in parse_list(&media.genres) {
        push_tag(&mut out, "genre", &genre);
    }
    for director in parse_list(&media.directors) {
        push_tag(&mut out, "director", &director);
    }
    for actor in parse_list(&media.actors) {
        out.push_str("  <actor>\n");
        out.push_str(&format!("    <name>{}</name>\n", xml_escape(&actor)));
        out.push_str("  </actor>\n");
    }
    out.push_str(&format!("</{root}>\n"));
    out
}

pub fn episode_nfo(episode: &MediaEpisodeRow) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<episodedetails>\n");
    if let Some(title) = &episode.title {
        push_tag(&mut out, "title", title);
    }
    push_tag(&mut out, "season", &episode.season_number.to_string());
    push_tag(&mut out, "episode", &episode.episode_number.to_string());
    if let Some(overview) = &episode.overview {
        push_tag(&mut out, "plot", overview);
    }
    if let Some(aired) = &episode.air_date {
        push_tag(&mut out, "aired", aired);
    }
    out.push_str("</episodedetails>\n");
    out
}

fn push_tag(out: &mut String, tag: &str, value: &str) {
    out.push_str(&format!("  <{tag}>{}</{tag}>\n", xml_escape(value)));
}

fn parse_list(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_media() -> MediaRow {
        MediaRow {
            id: "m1".into(),
            scrape_path_id: "p1".into(),
            kind: "movie".into(),
            catalog_id: 27205,
            title: "Inception".into(),
            original_title: Some("Inception".into()),
            year: Some(2010),
            overview: Some("Dreams & layers".into()),
            content_rating: Some("PG-13".into()),
            genres: r#"["Action","Science Fiction"]"#.into(),
            actors: r#"["Leonardo DiCaprio"]"#.into(),
            directors: r#"["Christopher Nolan"]"#.into(),
            poster_url: None,
            backdrop_url: None,
            logo_url: None,
            season_count: 0,
            episode_count: 0,
            created_ts: 0,
            updated_ts: 0,
        }
    }

    #[test]
    fn movie_nfo_has_core_fields() {
        let xml = movie_nfo(&sample_media());
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<movie>"));
        assert!(xml.contains("<title>Inception</title>"));
        assert!(xml.contains("<year>2010</year>"));
        assert!(xml.contains("<mpaa>PG-13</mpaa>"));
        assert!(xml.contains("<tmdbid>27205</tmdbid>"));
        assert!(xml.contains("<genre>Science Fiction</genre>"));
        assert!(xml.contains("<name>Leonardo DiCaprio</name>"));
        // Ampersand in the plot must be escaped
        assert!(xml.contains("Dreams &amp; layers"));
    }

    #[test]
    fn episode_nfo_numbers() {
        let ep = MediaEpisodeRow {
            id: "e1".into(),
            media_id: "m1".into(),
            media_season_id: "s1".into(),
            season_number: 1,
            episode_number: 2,
            title: Some("Cat's in the Bag...".into()),
            overview: None,
            air_date: Some("2008-01-27".into()),
            still_url: None,
            created_ts: 0,
        };
        let xml = episode_nfo(&ep);
        assert!(xml.contains("<episodedetails>"));
        assert!(xml.contains("<season>1</season>"));
        assert!(xml.contains("<episode>2</episode>"));
        assert!(xml.contains("<aired>2008-01-27</aired>"));
    }
}
