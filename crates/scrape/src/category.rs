//! Classification-bucket resolution: sync the configured taxonomy against
//! `scrape_category` rows and provision destination folders lazily.

use std::collections::HashMap;
use std::sync::Arc;

use medorg_backend::{EntryRef, StorageBackend};
use medorg_db::repo::categories::{self, CategoryRow};
use medorg_db::repo::media::MediaRow;
use medorg_db::repo::scrape_paths::ScrapePathRow;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::ScrapeError;

/// User-defined classification taxonomy, stored as JSON in settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub movie: Vec<Bucket>,
    #[serde(default)]
    pub tv: Vec<Bucket>,
}

impl Taxonomy {
    pub fn buckets_for(&self, media_kind: &str) -> &[Bucket] {
        match media_kind {
            "tvshow" => &self.tv,
            _ => &self.movie,
        }
    }
}

/// One classification bucket with its matching rules. First match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub min_year: Option<i64>,
    #[serde(default)]
    pub max_year: Option<i64>,
}

impl Bucket {
    /// A bucket with no rules matches everything (catch-all bucket).
    pub fn matches(&self, media: &MediaRow) -> bool {
        if let Some(min) = self.min_year {
            if media.year.is_none_or(|y| y < min) {
                return false;
            }
        }
        if let Some(max) = self.max_year {
            if media.year.is_none_or(|y| y > max) {
                return false;
            }
        }
        if !self.genres.is_empty() {
            let media_genres: Vec<String> = serde_json::from_str(&media.genres).unwrap_or_default();
            let hit = self.genres.iter().any(|wanted| {
                media_genres
                    .iter()
                    .any(|g| g.eq_ignore_ascii_case(wanted))
            });
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Pick the bucket an enriched work falls into.
pub fn resolve_bucket<'a>(buckets: &'a [Bucket], media: &MediaRow) -> Option<&'a Bucket> {
    buckets.iter().find(|b| b.matches(media))
}

/// Diff the live bucket list against stored mappings and (re)provision
/// destination folders. Returns the bucket → mapping table for the run.
///
/// Retired buckets lose their mapping row only; their on-backend folder is
/// never deleted on the strength of a taxonomy edit.
pub async fn sync_categories(
    pool: &SqlitePool,
    backend: &Arc<dyn StorageBackend>,
    path: &ScrapePathRow,
    buckets: &[Bucket],
) -> Result<HashMap<String, CategoryRow>, ScrapeError> {
    let dest_root = EntryRef::new(path.dest_path.clone(), path.dest_ident.clone());
    let mut map = HashMap::new();

    for bucket in buckets {
        let mut row = categories::insert_if_absent(pool, &path.id, &bucket.name).await?;

        if row.folder_ident.is_empty() {
            // A folder may already exist from a partly failed earlier run;
            // adopt it instead of creating a duplicate.
            let folder = match backend.find_child(&dest_root, &bucket.name).await? {
                Some(existing) if existing.is_dir => existing.to_ref(),
                _ => backend.create_dir(&dest_root, &bucket.name).await?,
            };
            categories::set_folder(pool, &row.id, &folder.ident, &folder.path).await?;
            info!(bucket = %bucket.name, folder = %folder.path, "category folder provisioned");
            row.folder_ident = folder.ident;
            row.folder_path = folder.path;
        }

        map.insert(bucket.name.clone(), row);
    }

    // Retire mappings whose bucket is gone from the taxonomy.
    for stored in categories::list_for_path(pool, &path.id).await? {
        if !buckets.iter().any(|b| b.name == stored.name) {
            warn!(bucket = %stored.name, "bucket removed from taxonomy, dropping mapping");
            categories::delete_category(pool, &stored.id).await?;
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_with(genres: &str, year: Option<i64>) -> MediaRow {
        MediaRow {
            id: "m1".into(),
            scrape_path_id: "p1".into(),
            kind: "movie".into(),
            catalog_id: 1,
            title: "T".into(),
            original_title: None,
            year,
            overview: None,
            content_rating: None,
            genres: genres.into(),
            actors: "[]".into(),
            directors: "[]".into(),
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
    fn genre_rule_matches_case_insensitively() {
        let bucket = Bucket {
            name: "Animation".into(),
            genres: vec!["animation".into()],
            ..Default::default()
        };
        assert!(bucket.matches(&media_with(r#"["Animation","Family"]"#, Some(2020))));
        assert!(!bucket.matches(&media_with(r#"["Drama"]"#, Some(2020))));
    }

    #[test]
    fn year_bounds() {
        let bucket = Bucket {
            name: "Classics".into(),
            max_year: Some(1980),
            ..Default::default()
        };
        assert!(bucket.matches(&media_with("[]", Some(1960))));
        assert!(!bucket.matches(&media_with("[]", Some(1999))));
        assert!(!bucket.matches(&media_with("[]", None)));
    }

    #[test]
    fn first_match_wins_and_catch_all() {
        let buckets = vec![
            Bucket {
                name: "Animation".into(),
                genres: vec!["Animation".into()],
                ..Default::default()
            },
            Bucket {
                name: "Everything Else".into(),
                ..Default::default()
            },
        ];
        let animated = media_with(r#"["Animation"]"#, Some(2020));
        let drama = media_with(r#"["Drama"]"#, Some(2020));
        assert_eq!(resolve_bucket(&buckets, &animated).unwrap().name, "Animation");
        assert_eq!(
            resolve_bucket(&buckets, &drama).unwrap().name,
            "Everything Else"
        );
    }
}
