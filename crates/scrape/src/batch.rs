//! Batch/completion coordination: decide when a logical work's staging
//! subtree may be reclaimed.
//!
//! Sibling coordination happens purely through the persistent store; the
//! "am I last" check re-queries rows and outstanding transfer tasks instead
//! of any in-memory signal, so it stays correct across process restarts.
//! Cleanup is idempotent (deleting an already-empty subtree is a no-op), so
//! concurrent final completions are at-least-once safe.

use std::path::{Path, PathBuf};

use medorg_core::{ArtifactKind, MediaKind, ScrapeMode, ScrapeStatus};
use medorg_db::repo::scrape_files::{self, ScrapeFileRow};
use medorg_db::repo::scrape_paths::ScrapePathRow;
use medorg_db::repo::transfers;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::transfer::TaskOutcome;
use crate::ScrapeError;

/// Staging subtree shared by every file of one logical work.
pub fn work_staging_dir(staging_root: &Path, file: &ScrapeFileRow) -> PathBuf {
    let key = file.media_id.as_deref().unwrap_or(&file.id);
    staging_root.join(key)
}

/// Completion callback entry point, invoked once per finished transfer task
/// (and synthetically for placements the executor performed directly).
pub async fn handle_completion(
    pool: &SqlitePool,
    path: &ScrapePathRow,
    staging_root: &Path,
    outcome: &TaskOutcome,
) -> Result<(), ScrapeError> {
    let Some(file) = scrape_files::get_scrape_file(pool, &outcome.scrape_file_id).await? else {
        // Row was cleaned up underneath us; nothing left to coordinate.
        return Ok(());
    };

    if outcome.artifact == ArtifactKind::Video {
        if outcome.success {
            if let Some(dest) = &outcome.dest {
                scrape_files::set_dest(pool, &file.id, &dest.path, &dest.ident).await?;
            }
            scrape_files::update_status(pool, &file.id, ScrapeStatus::Renamed.as_str(), None)
                .await?;
        } else {
            scrape_files::update_status(
                pool,
                &file.id,
                ScrapeStatus::RenameFailed.as_str(),
                outcome.reason.as_deref(),
            )
            .await?;
        }
    } else if !outcome.success {
        // A failed sidecar never fails the file; it is recorded on the task
        // row and the artifact stays in staging.
        warn!(
            file = %file.id,
            artifact = %outcome.artifact,
            reason = outcome.reason.as_deref().unwrap_or("unknown"),
            "sidecar placement failed"
        );
    }

    // Remove this task's own staging artifact.
    if outcome.success {
        if let Some(staged) = &outcome.staged_path {
            if tokio::fs::remove_file(staged).await.is_ok() {
                debug!(staged = %staged.display(), "staging artifact removed");
            }
        }
    }

    // A per-episode artifact stops here, unless it was the file's last
    // outstanding sub-task, which makes it the file's placement completion.
    if !outcome.artifact.is_shared()
        && transfers::pending_for_file(pool, &file.id).await? > 0
    {
        return Ok(());
    }

    let file = match scrape_files::get_scrape_file(pool, &file.id).await? {
        Some(f) => f,
        None => return Ok(()),
    };

    match MediaKind::parse(&file.media_kind) {
        Some(MediaKind::TvShow) => sweep_tv_staging(pool, path, staging_root, &file).await,
        _ => sweep_movie_staging(pool, path, staging_root, &file).await,
    }
}

/// Delete the show's staging subtree only when every batch sibling is
/// terminal and no placement sub-task is outstanding anywhere in the batch.
async fn sweep_tv_staging(
    pool: &SqlitePool,
    _path: &ScrapePathRow,
    staging_root: &Path,
    file: &ScrapeFileRow,
) -> Result<(), ScrapeError> {
    let Some(media_id) = &file.media_id else {
        return Ok(());
    };

    let unfinished = scrape_files::count_unfinished_in_batch(pool, media_id, &file.batch_no).await?;
    if unfinished > 0 {
        debug!(media = %media_id, unfinished, "batch not finished, staging kept");
        return Ok(());
    }
    let pending = transfers::pending_for_batch(pool, &file.batch_no).await?;
    if pending > 0 {
        debug!(media = %media_id, pending, "transfers outstanding, staging kept");
        return Ok(());
    }

    let dir = work_staging_dir(staging_root, file);
    if tokio::fs::remove_dir_all(&dir).await.is_ok() {
        info!(media = %media_id, dir = %dir.display(), "show staging reclaimed");
    }
    Ok(())
}

/// Movie (single-file work) staging reclaim: the file must be terminal with
/// no outstanding sub-tasks; the remaining staging entries decide.
async fn sweep_movie_staging(
    pool: &SqlitePool,
    path: &ScrapePathRow,
    staging_root: &Path,
    file: &ScrapeFileRow,
) -> Result<(), ScrapeError> {
    let status = ScrapeStatus::parse(&file.status);
    if !status.is_some_and(|s| s.is_terminal()) {
        return Ok(());
    }
    if transfers::pending_for_file(pool, &file.id).await? > 0 {
        return Ok(());
    }

    let dir = work_staging_dir(staging_root, file);
    let mode = ScrapeMode::parse(&path.scrape_mode).unwrap_or(ScrapeMode::ScrapeRename);

    let removable = match mode {
        // Scrape-only keeps the file in place; reclaim once nothing is left
        // in the staging movie folder.
        ScrapeMode::ScrapeOnly => staging_is_empty(&dir).await,
        // Rename modes reclaim once no sidecar matching the generated name
        // remains staged.
        ScrapeMode::ScrapeRename | ScrapeMode::RenameOnly => {
            let stem = file
                .new_file_name
                .rsplit_once('.')
                .map(|(s, _)| s.to_string())
                .unwrap_or_else(|| file.new_file_name.clone());
            !staging_has_matching(&dir, &stem).await
        }
    };

    if removable {
        if tokio::fs::remove_dir_all(&dir).await.is_ok() {
            info!(file = %file.id, dir = %dir.display(), "movie staging reclaimed");
        }
    }
    Ok(())
}

async fn staging_is_empty(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut rd) => matches!(rd.next_entry().await, Ok(None)),
        // Never created or already gone; nothing to reclaim.
        Err(_) => false,
    }
}

async fn staging_has_matching(dir: &Path, stem: &str) -> bool {
    if stem.is_empty() {
        return false;
    }
    let Ok(mut rd) = tokio::fs::read_dir(dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(stem) {
            return true;
        }
    }
    false
}

/// Build the synthetic completion the executor reports after a placement it
/// performed directly (rename-only moves and scrape-only no-op placements).
pub fn direct_video_outcome(file: &ScrapeFileRow) -> TaskOutcome {
    TaskOutcome {
        scrape_file_id: file.id.clone(),
        batch_no: file.batch_no.clone(),
        artifact: ArtifactKind::Video,
        dest: None,
        staged_path: None,
        success: true,
        reason: None,
    }
}
