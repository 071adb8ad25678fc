//! Explicit admin maintenance actions. None of these run automatically:
//! failed records stay queryable until a user acts on them.

use medorg_core::ScrapeStatus;
use medorg_db::repo::{media, scrape_files, scrape_paths};
use sqlx::SqlitePool;
use tracing::info;

use crate::ScrapeError;

/// "Mark as pending": reset `rename_failed` rows to `scanned` so the next
/// run retries them from scratch, keeping their identification.
pub async fn retry_failed_renames(
    pool: &SqlitePool,
    scrape_path_id: &str,
) -> Result<u64, ScrapeError> {
    let rows = scrape_files::list_by_status(
        pool,
        scrape_path_id,
        ScrapeStatus::RenameFailed.as_str(),
    )
    .await?;

    let mut reset = 0;
    for row in &rows {
        scrape_files::reset_to_scanned(
            pool,
            &row.id,
            &row.title,
            row.year,
            row.catalog_id,
            row.season_number,
            row.episode_number,
        )
        .await?;
        reset += 1;
    }

    info!(scrape_path = %scrape_path_id, reset, "failed renames marked pending");
    Ok(reset)
}

/// "Clear failed": delete `scrape_failed` rows along with canonical metadata
/// that no remaining file references.
pub async fn clear_failed_scrapes(
    pool: &SqlitePool,
    scrape_path_id: &str,
) -> Result<u64, ScrapeError> {
    let rows = scrape_files::list_by_status(
        pool,
        scrape_path_id,
        ScrapeStatus::ScrapeFailed.as_str(),
    )
    .await?;

    let mut deleted = 0;
    for row in &rows {
        scrape_files::delete_scrape_file(pool, &row.id).await?;
        deleted += 1;
    }

    let dropped = media::delete_unreferenced(pool).await?;
    info!(scrape_path = %scrape_path_id, deleted, dropped_media = dropped, "failed scrapes cleared");
    Ok(deleted)
}

/// Clear `is_scraping` left behind by a crash. Run once at startup.
pub async fn reset_stuck_runs(pool: &SqlitePool) -> Result<u64, ScrapeError> {
    let reset = scrape_paths::reset_stuck_runs(pool).await?;
    if reset > 0 {
        info!(reset, "stuck scrape runs cleared");
    }
    Ok(reset)
}
