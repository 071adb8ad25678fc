//! Rollback / re-scrape control: apply a user-corrected identification to a
//! file (and, for TV, its batch siblings), and the periodic sweep that moves
//! already-placed files back to their source location.

use std::sync::Arc;

use medorg_backend::{EntryRef, StorageBackend};
use medorg_catalog::provider::CatalogProvider;
use medorg_core::{MediaKind, ScrapeStatus, TransferMode};
use medorg_db::repo::media;
use medorg_db::repo::scrape_files::{self, ScrapeFileRow};
use medorg_db::repo::scrape_paths::ScrapePathRow;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::rename::source_parent_ref;
use crate::ScrapeError;

/// User-supplied corrections for one file.
#[derive(Debug, Clone, Default)]
pub struct RescrapeRequest {
    pub title: Option<String>,
    pub year: Option<i64>,
    pub catalog_id: Option<i64>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
}

/// Re-identify one file with corrected inputs.
///
/// Never-placed records are rewritten and reset to `scanned` immediately;
/// for TV that reset propagates to every sibling sharing the show folder and
/// batch, and the old canonical rows are discarded. Already-placed records
/// are parked in `rollbacking` for the periodic sweep.
pub async fn rescrape_file(
    pool: &SqlitePool,
    catalog: &Arc<dyn CatalogProvider>,
    path: &ScrapePathRow,
    file_id: &str,
    req: &RescrapeRequest,
    language: &str,
) -> Result<(), ScrapeError> {
    let file = scrape_files::get_scrape_file(pool, file_id)
        .await?
        .ok_or_else(|| ScrapeError::Rollback(format!("no such file record {file_id}")))?;

    let kind = MediaKind::parse(&file.media_kind)
        .ok_or_else(|| ScrapeError::Config(format!("unknown media kind {}", file.media_kind)))?;

    let title = req.title.clone().unwrap_or_else(|| file.title.clone());
    let year = req.year.or(file.year);
    let season_number = req.season_number.unwrap_or(file.season_number);
    let episode_number = req.episode_number.unwrap_or(file.episode_number);

    // Validate the corrected identification up front, with the same
    // single-match-or-error rule enrichment uses.
    let catalog_id = resolve_catalog_id(catalog, kind, &title, year, req.catalog_id, language).await?;

    match ScrapeStatus::parse(&file.status) {
        Some(ScrapeStatus::Scanned) | Some(ScrapeStatus::ScrapeFailed) => {
            reset_unplaced(
                pool,
                path,
                kind,
                &file,
                &title,
                year,
                catalog_id,
                season_number,
                episode_number,
            )
            .await
        }
        Some(ScrapeStatus::Renamed) => {
            mark_for_rollback(
                pool,
                kind,
                &file,
                &title,
                year,
                catalog_id,
                season_number,
                episode_number,
            )
            .await
        }
        other => Err(ScrapeError::Rollback(format!(
            "cannot re-scrape a record in status {}",
            other.map(|s| s.as_str()).unwrap_or("unknown")
        ))),
    }
}

/// Resolve the corrected work: explicit catalog id wins, otherwise a search
/// must return exactly one candidate.
async fn resolve_catalog_id(
    catalog: &Arc<dyn CatalogProvider>,
    kind: MediaKind,
    title: &str,
    year: Option<i64>,
    explicit: Option<i64>,
    language: &str,
) -> Result<Option<i64>, ScrapeError> {
    if kind == MediaKind::Other {
        return Ok(None);
    }

    if let Some(id) = explicit {
        // Confirm the id exists before committing to it.
        match kind {
            MediaKind::Movie => catalog.movie_detail(id, language).await?,
            MediaKind::TvShow => catalog.tv_detail(id, language).await?,
            MediaKind::Other => unreachable!(),
        };
        return Ok(Some(id));
    }

    let year32 = year.map(|y| y as i32);
    let candidates = match kind {
        MediaKind::Movie => catalog.search_movie(title, year32, language).await?,
        MediaKind::TvShow => catalog.search_tv(title, year32, language).await?,
        MediaKind::Other => unreachable!(),
    };
    match candidates.len() {
        1 => Ok(Some(candidates[0].catalog_id)),
        0 => Err(ScrapeError::Enrichment(format!(
            "no catalog match for '{title}'"
        ))),
        n => Err(ScrapeError::AmbiguousMatch {
            title: title.to_string(),
            count: n,
        }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn reset_unplaced(
    pool: &SqlitePool,
    path: &ScrapePathRow,
    kind: MediaKind,
    file: &ScrapeFileRow,
    title: &str,
    year: Option<i64>,
    catalog_id: Option<i64>,
    season_number: i64,
    episode_number: i64,
) -> Result<(), ScrapeError> {
    let targets = rescrape_targets(pool, path, kind, file).await?;

    // Nothing was placed yet; the old identification is discarded entirely.
    let mut old_media: Vec<String> = targets.iter().filter_map(|t| t.media_id.clone()).collect();
    old_media.sort();
    old_media.dedup();

    for target in &targets {
        if target.id == file.id {
            scrape_files::reset_to_scanned(
                pool,
                &target.id,
                title,
                year,
                catalog_id,
                season_number,
                episode_number,
            )
            .await?;
        } else {
            // Siblings take the corrected work but keep their own numbering.
            scrape_files::reset_to_scanned(
                pool,
                &target.id,
                title,
                year,
                catalog_id,
                target.season_number,
                target.episode_number,
            )
            .await?;
        }
    }

    for media_id in &old_media {
        media::delete_media(pool, media_id).await?;
    }

    info!(
        file = %file.id,
        siblings = targets.len(),
        dropped_media = old_media.len(),
        "identification rewritten, records reset to scanned"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn mark_for_rollback(
    pool: &SqlitePool,
    kind: MediaKind,
    file: &ScrapeFileRow,
    title: &str,
    year: Option<i64>,
    catalog_id: Option<i64>,
    season_number: i64,
    episode_number: i64,
) -> Result<(), ScrapeError> {
    let targets = match (kind, &file.media_id) {
        (MediaKind::TvShow, Some(media_id)) => {
            scrape_files::siblings_in_batch(pool, media_id, &file.batch_no).await?
        }
        _ => vec![file.clone()],
    };

    for target in &targets {
        let (s, e) = if target.id == file.id {
            (season_number, episode_number)
        } else {
            (target.season_number, target.episode_number)
        };
        scrape_files::set_identified(pool, &target.id, title, year, catalog_id, s, e).await?;
        scrape_files::update_status(pool, &target.id, ScrapeStatus::Rollbacking.as_str(), None)
            .await?;
    }

    info!(file = %file.id, siblings = targets.len(), "records parked for rollback sweep");
    Ok(())
}

/// Files to reset together with the corrected one: the whole show batch for
/// TV, just the file itself otherwise.
async fn rescrape_targets(
    pool: &SqlitePool,
    path: &ScrapePathRow,
    kind: MediaKind,
    file: &ScrapeFileRow,
) -> Result<Vec<ScrapeFileRow>, ScrapeError> {
    if kind == MediaKind::TvShow && !file.show_ident.is_empty() {
        Ok(scrape_files::siblings_by_show(pool, &path.id, &file.show_ident, &file.batch_no).await?)
    } else {
        Ok(vec![file.clone()])
    }
}

/// Periodic sweep: move every `rollbacking` file of this path back to its
/// source location, drop its generated destination artifacts, and reset it
/// for the next scan. A failed restore leaves the record in `rollbacking`
/// for manual retry.
pub async fn run_rollback_sweep(
    pool: &SqlitePool,
    path: &ScrapePathRow,
    backend: &Arc<dyn StorageBackend>,
) -> Result<usize, ScrapeError> {
    let rows = scrape_files::list_rollbacking(pool).await?;
    let mut restored = 0;

    for file in rows.iter().filter(|f| f.scrape_path_id == path.id) {
        match restore_placed_file(pool, backend, file).await {
            Ok(()) => restored += 1,
            Err(e) => {
                warn!(file = %file.id, error = %e, "rollback failed, record kept for retry");
            }
        }
    }

    if restored > 0 {
        let dropped = media::delete_unreferenced(pool).await?;
        info!(scrape_path = %path.id, restored, dropped_media = dropped, "rollback sweep finished");
    }
    Ok(restored)
}

async fn restore_placed_file(
    pool: &SqlitePool,
    backend: &Arc<dyn StorageBackend>,
    file: &ScrapeFileRow,
) -> Result<(), ScrapeError> {
    if !file.dest_path.is_empty() {
        let source_dir = source_parent_ref(file)?;
        let original_name = last_segment(&file.source_path);
        let placed = EntryRef::new(file.dest_path.clone(), file.dest_ident.clone());

        backend
            .relocate(&placed, &source_dir, &original_name, TransferMode::Move)
            .await
            .map_err(|e| ScrapeError::Rollback(e.to_string()))?;

        remove_dest_artifacts(backend, file).await;
    }

    scrape_files::reset_to_scanned(
        pool,
        &file.id,
        &file.title,
        file.year,
        file.catalog_id,
        file.season_number,
        file.episode_number,
    )
    .await?;
    info!(file = %file.id, back_to = %file.source_path, "placed file restored");
    Ok(())
}

/// Best-effort removal of generated sidecars at the destination, then of the
/// now-empty folders. Only entries matching the generated names are touched;
/// on id-addressed backends without a listable path this is skipped.
async fn remove_dest_artifacts(backend: &Arc<dyn StorageBackend>, file: &ScrapeFileRow) {
    let Some(dest_dir_path) = parent_of(&file.dest_path) else {
        return;
    };
    let dest_dir = EntryRef::from_path(dest_dir_path);

    let stem = file
        .new_file_name
        .rsplit_once('.')
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| file.new_file_name.clone());

    let children = match backend.list_children(&dest_dir).await {
        Ok(c) => c,
        Err(e) => {
            warn!(dir = %dest_dir.path, error = %e, "cannot list destination for artifact cleanup");
            return;
        }
    };

    for entry in &children {
        if !entry.is_dir && !stem.is_empty() && entry.name.starts_with(&stem) {
            if let Err(e) = backend.delete(&entry.to_ref()).await {
                warn!(entry = %entry.path, error = %e, "failed to delete generated artifact");
            }
        }
    }

    // Collapse generated folders: the season level and the work folder
    // itself, never the library root or a category folder. A folder goes
    // only when nothing but generated sidecars remains in it.
    for dir in [Some(dest_dir.clone()), parent_of(&dest_dir.path).map(EntryRef::from_path)]
        .into_iter()
        .flatten()
    {
        let name = last_segment(&dir.path);
        let generated_dir = name == file.new_folder_name
            || crate::extract::parse_season_folder(&name).is_some();
        if !generated_dir {
            break;
        }
        let Ok(remaining) = backend.list_children(&dir).await else {
            break;
        };
        if remaining
            .iter()
            .any(|e| e.is_dir || !is_generated_sidecar(&e.name))
        {
            break;
        }
        for entry in &remaining {
            if let Err(e) = backend.delete(&entry.to_ref()).await {
                warn!(entry = %entry.path, error = %e, "failed to delete generated sidecar");
            }
        }
        if let Err(e) = backend.delete(&dir).await {
            warn!(dir = %dir.path, error = %e, "failed to delete empty folder");
            break;
        }
    }
}

/// Names this pipeline generates for work- and season-level sidecars.
fn is_generated_sidecar(name: &str) -> bool {
    matches!(name, "tvshow.nfo" | "poster.jpg" | "fanart.jpg" | "logo.png")
        || name.ends_with("-poster.jpg")
        || name.ends_with("-fanart.jpg")
        || name.ends_with("-thumb.jpg")
}

fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit_once('/').map(|(dir, _)| {
        if dir.is_empty() {
            "/".to_string()
        } else {
            dir.to_string()
        }
    })
}

fn last_segment(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent_of("/a/b/c.mkv").as_deref(), Some("/a/b"));
        assert_eq!(parent_of("/a.mkv").as_deref(), Some("/"));
        assert_eq!(parent_of("nope"), None);
    }
}
