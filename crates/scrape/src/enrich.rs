//! Catalog enrichment: link a scanned file to canonical metadata, creating
//! the `media` / `media_season` / `media_episode` rows on first encounter.

use std::sync::Arc;

use medorg_catalog::provider::CatalogProvider;
use medorg_catalog::WorkDetail;
use medorg_core::MediaKind;
use medorg_db::repo::media::{self, MediaRow, NewMedia};
use medorg_db::repo::scrape_files::{self, ScrapeFileRow};
use medorg_db::repo::scrape_paths::ScrapePathRow;
use medorg_core::ScrapeStatus;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::ScrapeError;

/// Optional assisted name refinement, consulted only when the plain search
/// fails to produce a single match and the path has AI assist enabled.
#[async_trait::async_trait]
pub trait NameAssist: Send + Sync {
    async fn refine(&self, raw_name: &str, prompt: &str) -> Option<String>;
}

/// Run identification → canonical linkage for one scanned file.
///
/// On success the row is `scraped` and linked; errors are returned for the
/// caller to record, leaving the row in `scraping`.
pub async fn enrich_file(
    pool: &SqlitePool,
    catalog: &Arc<dyn CatalogProvider>,
    assist: Option<&Arc<dyn NameAssist>>,
    path: &ScrapePathRow,
    file: &ScrapeFileRow,
    language: &str,
) -> Result<ScrapeFileRow, ScrapeError> {
    scrape_files::update_status(pool, &file.id, ScrapeStatus::Scraping.as_str(), None).await?;

    let kind = MediaKind::parse(&file.media_kind)
        .ok_or_else(|| ScrapeError::Config(format!("unknown media kind {}", file.media_kind)))?;

    // "Other" content has no catalog; it proceeds straight to renaming on
    // its parsed identification.
    if kind == MediaKind::Other {
        scrape_files::update_status(pool, &file.id, ScrapeStatus::Scraped.as_str(), None).await?;
        return refreshed(pool, &file.id).await;
    }

    if file.title.is_empty() {
        return Err(ScrapeError::Enrichment(
            "no usable title derived from filename".into(),
        ));
    }

    let media = find_or_create_media(pool, catalog, assist, path, kind, file, language).await?;

    match kind {
        MediaKind::Movie => {
            scrape_files::link_media(pool, &file.id, &media.id, None, None).await?;
        }
        MediaKind::TvShow => {
            // Season defaults to 1 when neither filename nor folder supplied one.
            let season_number = if file.season_number >= 0 {
                file.season_number
            } else {
                1
            };
            if file.episode_number < 0 {
                return Err(ScrapeError::Enrichment(
                    "episode number could not be determined".into(),
                ));
            }
            if season_number != file.season_number {
                scrape_files::set_identified(
                    pool,
                    &file.id,
                    &file.title,
                    file.year,
                    file.catalog_id,
                    season_number,
                    file.episode_number,
                )
                .await?;
            }

            let (season, episode) =
                ensure_season_episode(pool, catalog, &media, season_number, file.episode_number, language)
                    .await?;
            scrape_files::link_media(
                pool,
                &file.id,
                &media.id,
                Some(season.as_str()),
                Some(episode.as_str()),
            )
            .await?;
        }
        MediaKind::Other => unreachable!(),
    }

    scrape_files::update_status(pool, &file.id, ScrapeStatus::Scraped.as_str(), None).await?;
    info!(file = %file.source_path, media = %media.title, "file enriched");
    refreshed(pool, &file.id).await
}

async fn refreshed(pool: &SqlitePool, file_id: &str) -> Result<ScrapeFileRow, ScrapeError> {
    scrape_files::get_scrape_file(pool, file_id)
        .await?
        .ok_or_else(|| ScrapeError::Enrichment(format!("file row {file_id} disappeared")))
}

/// Canonical-media lookup order: known catalog id → normalized title+year →
/// single unambiguous search match. More than one candidate is never
/// auto-resolved.
async fn find_or_create_media(
    pool: &SqlitePool,
    catalog: &Arc<dyn CatalogProvider>,
    assist: Option<&Arc<dyn NameAssist>>,
    path: &ScrapePathRow,
    kind: MediaKind,
    file: &ScrapeFileRow,
    language: &str,
) -> Result<MediaRow, ScrapeError> {
    if let Some(catalog_id) = file.catalog_id {
        if let Some(existing) = media::find_by_catalog(pool, catalog_id, kind.as_str()).await? {
            return Ok(existing);
        }
        let detail = fetch_detail(catalog, kind, catalog_id, language).await?;
        return materialize(pool, path, kind, &detail).await;
    }

    if let Some(existing) =
        media::find_by_title_year(pool, kind.as_str(), &file.title, file.year).await?
    {
        debug!(title = %file.title, "reusing canonical media by title/year");
        return Ok(existing);
    }

    let year = file.year.map(|y| y as i32);
    let catalog_id =
        search_single(catalog, assist, path, kind, &file.title, year, language).await?;

    if let Some(existing) = media::find_by_catalog(pool, catalog_id, kind.as_str()).await? {
        return Ok(existing);
    }

    let detail = fetch_detail(catalog, kind, catalog_id, language).await?;
    materialize(pool, path, kind, &detail).await
}

/// Search requiring exactly one candidate. With AI assist configured, a
/// failed search gets one retry on the refined name.
async fn search_single(
    catalog: &Arc<dyn CatalogProvider>,
    assist: Option<&Arc<dyn NameAssist>>,
    path: &ScrapePathRow,
    kind: MediaKind,
    title: &str,
    year: Option<i32>,
    language: &str,
) -> Result<i64, ScrapeError> {
    match run_search(catalog, kind, title, year, language).await? {
        SearchVerdict::Single(id) => return Ok(id),
        verdict => {
            if path.ai_assist {
                if let Some(assist) = assist {
                    let prompt = path.ai_prompt.as_deref().unwrap_or_default();
                    if let Some(refined) = assist.refine(title, prompt).await {
                        if refined != title {
                            debug!(raw = %title, refined = %refined, "retrying search with assisted name");
                            if let SearchVerdict::Single(id) =
                                run_search(catalog, kind, &refined, year, language).await?
                            {
                                return Ok(id);
                            }
                        }
                    }
                }
            }
            match verdict {
                SearchVerdict::None => Err(ScrapeError::Enrichment(format!(
                    "no catalog match for '{title}'"
                ))),
                SearchVerdict::Many(count) => Err(ScrapeError::AmbiguousMatch {
                    title: title.to_string(),
                    count,
                }),
                SearchVerdict::Single(_) => unreachable!(),
            }
        }
    }
}

enum SearchVerdict {
    None,
    Single(i64),
    Many(usize),
}

async fn run_search(
    catalog: &Arc<dyn CatalogProvider>,
    kind: MediaKind,
    title: &str,
    year: Option<i32>,
    language: &str,
) -> Result<SearchVerdict, ScrapeError> {
    let candidates = match kind {
        MediaKind::Movie => catalog.search_movie(title, year, language).await?,
        MediaKind::TvShow => catalog.search_tv(title, year, language).await?,
        MediaKind::Other => Vec::new(),
    };
    Ok(match candidates.len() {
        0 => SearchVerdict::None,
        1 => SearchVerdict::Single(candidates[0].catalog_id),
        n => SearchVerdict::Many(n),
    })
}

async fn fetch_detail(
    catalog: &Arc<dyn CatalogProvider>,
    kind: MediaKind,
    catalog_id: i64,
    language: &str,
) -> Result<WorkDetail, ScrapeError> {
    let detail = match kind {
        MediaKind::Movie => catalog.movie_detail(catalog_id, language).await?,
        MediaKind::TvShow => catalog.tv_detail(catalog_id, language).await?,
        MediaKind::Other => {
            return Err(ScrapeError::Enrichment(
                "'other' content has no catalog detail".into(),
            ))
        }
    };
    Ok(detail)
}

async fn materialize(
    pool: &SqlitePool,
    path: &ScrapePathRow,
    kind: MediaKind,
    detail: &WorkDetail,
) -> Result<MediaRow, ScrapeError> {
    let new = NewMedia {
        scrape_path_id: path.id.clone(),
        kind: kind.as_str().to_string(),
        catalog_id: detail.catalog_id,
        title: detail.title.clone(),
        original_title: detail.original_title.clone(),
        year: detail.year.map(|y| y as i64),
        overview: detail.overview.clone(),
        content_rating: detail.content_rating.clone(),
        genres: to_json(&detail.genres),
        actors: to_json(&detail.actors),
        directors: to_json(&detail.directors),
        poster_url: detail.poster_url.clone(),
        backdrop_url: detail.backdrop_url.clone(),
        logo_url: detail.logo_url.clone(),
    };

    let (row, created) = media::insert_or_get_media(pool, &new).await?;
    if created {
        info!(title = %row.title, catalog_id = row.catalog_id, "canonical media created");
    }
    Ok(row)
}

/// Fetch/create the season and episode rows lazily, bumping parent counters
/// only when a row was actually inserted.
async fn ensure_season_episode(
    pool: &SqlitePool,
    catalog: &Arc<dyn CatalogProvider>,
    media: &MediaRow,
    season_number: i64,
    episode_number: i64,
    language: &str,
) -> Result<(String, String), ScrapeError> {
    let season = match media::get_season(pool, &media.id, season_number).await? {
        Some(existing) => existing,
        None => {
            let detail = catalog
                .season_detail(media.catalog_id, season_number as i32, language)
                .await?;
            let (row, _) = media::ensure_season(
                pool,
                &media.id,
                season_number,
                detail.name.as_deref(),
                detail.overview.as_deref(),
                detail.air_date.as_deref(),
                detail.poster_url.as_deref(),
            )
            .await?;
            row
        }
    };

    let episode = match media::get_episode(pool, &media.id, season_number, episode_number).await? {
        Some(existing) => existing,
        None => {
            let detail = catalog
                .episode_detail(
                    media.catalog_id,
                    season_number as i32,
                    episode_number as i32,
                    language,
                )
                .await?;
            let (row, _) = media::ensure_episode(
                pool,
                &media.id,
                &season.id,
                season_number,
                episode_number,
                detail.title.as_deref(),
                detail.overview.as_deref(),
                detail.air_date.as_deref(),
                detail.still_url.as_deref(),
            )
            .await?;
            row
        }
    };

    Ok((season.id, episode.id))
}

fn to_json(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
