//! Source scanning: walk the backend listing, filter entries, and create
//! `scrape_file` rows in status `scanned`.

use std::collections::HashMap;
use std::sync::Arc;

use medorg_backend::{EntryRef, StorageBackend};
use medorg_core::MediaKind;
use medorg_db::repo::scrape_files::{self, NewScrapeFile};
use medorg_db::repo::scrape_paths::ScrapePathRow;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::extract;
use crate::ScrapeError;

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub added: usize,
    pub skipped: usize,
    pub unreadable_dirs: usize,
}

struct DirFrame {
    dir: EntryRef,
    name: String,
    parent: Option<(EntryRef, String)>,
}

/// Walk the source root and register every new video file.
///
/// An unreadable directory is logged and skipped; it never aborts the scan.
/// Files already tracked for this path are not re-queued.
pub async fn run_scan(
    pool: &SqlitePool,
    backend: &Arc<dyn StorageBackend>,
    path: &ScrapePathRow,
) -> Result<ScanOutcome, ScrapeError> {
    let media_kind = MediaKind::parse(&path.media_kind)
        .ok_or_else(|| ScrapeError::Config(format!("unknown media kind {}", path.media_kind)))?;
    let strip_keywords: Vec<String> =
        serde_json::from_str(&path.strip_keywords).unwrap_or_default();

    let root = EntryRef::new(path.source_path.clone(), path.source_ident.clone());
    let root_name = last_segment(&path.source_path);

    let mut outcome = ScanOutcome::default();
    // One batch number per show directory per scan pass.
    let mut batches: HashMap<String, String> = HashMap::new();
    let mut stack = vec![DirFrame {
        dir: root,
        name: root_name,
        parent: None,
    }];

    while let Some(frame) = stack.pop() {
        let children = match backend.list_children(&frame.dir).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %frame.dir.path, error = %e, "cannot list directory, skipping");
                outcome.unreadable_dirs += 1;
                continue;
            }
        };

        for child in &children {
            if child.name.starts_with('.') {
                continue;
            }

            if child.is_dir {
                if matches!(child.name.as_str(), "@eaDir" | "#recycle" | ".Trash") {
                    continue;
                }
                stack.push(DirFrame {
                    dir: child.to_ref(),
                    name: child.name.clone(),
                    parent: Some((frame.dir.clone(), frame.name.clone())),
                });
                continue;
            }

            if !extract::check_file_allowed(&child.name, child.size, path.min_video_size_mb) {
                outcome.skipped += 1;
                continue;
            }
            // Sidecars pass the filter but get no row of their own; they are
            // adopted when their video is renamed.
            if !extract::is_video_file(&child.name) {
                continue;
            }

            if scrape_files::find_by_source(pool, &path.id, &child.path)
                .await?
                .is_some()
            {
                outcome.skipped += 1;
                continue;
            }

            let new = build_record(path, media_kind, &frame, child, &children, &strip_keywords, &mut batches);
            scrape_files::create_scanned(pool, &new).await?;
            outcome.added += 1;
        }
    }

    info!(
        scrape_path = %path.id,
        added = outcome.added,
        skipped = outcome.skipped,
        unreadable_dirs = outcome.unreadable_dirs,
        "scan finished"
    );
    Ok(outcome)
}

fn build_record(
    path: &ScrapePathRow,
    media_kind: MediaKind,
    frame: &DirFrame,
    child: &medorg_backend::Entry,
    siblings: &[medorg_backend::Entry],
    strip_keywords: &[String],
    batches: &mut HashMap<String, String>,
) -> NewScrapeFile {
    let parsed = extract::parse_media_name(&child.name, strip_keywords);

    // Sidecar subtitles next to the video count as its external tracks.
    let stem = child
        .name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(&child.name);
    let subtitle_tracks = siblings
        .iter()
        .filter(|s| {
            !s.is_dir
                && s.name != child.name
                && s.name.starts_with(stem)
                && extract::is_subtitle_file(&s.name)
        })
        .count() as i64;

    let mut new = NewScrapeFile {
        scrape_path_id: path.id.clone(),
        media_kind: media_kind.as_str().to_string(),
        source_path: child.path.clone(),
        source_ident: child.ident.clone(),
        season_number: parsed.season,
        episode_number: parsed.episode,
        title: parsed.title.clone(),
        year: parsed.year,
        catalog_id: parsed.catalog_id,
        resolution: parsed.resolution.clone(),
        is_hdr: parsed.is_hdr,
        size_bytes: child.size as i64,
        subtitle_tracks,
        ..Default::default()
    };

    match media_kind {
        MediaKind::TvShow => {
            // A season-named containing folder wins over the filename marker
            // and pins the show one level further up.
            let (show, season) = match extract::parse_season_folder(&frame.name) {
                Some(folder_season) => {
                    new.season_number = folder_season;
                    let show = frame
                        .parent
                        .clone()
                        .unwrap_or_else(|| (frame.dir.clone(), frame.name.clone()));
                    (show, Some((frame.dir.clone(), frame.name.clone())))
                }
                None => ((frame.dir.clone(), frame.name.clone()), None),
            };

            if new.title.is_empty() {
                new.title = extract::clean_title(&show.1, strip_keywords);
            }
            if new.catalog_id.is_none() {
                new.catalog_id = extract::parse_catalog_id(&show.1);
            }

            new.show_path = show.0.path.clone();
            new.show_ident = show.0.ident.clone();
            if let Some((season_ref, _)) = season {
                new.season_path = season_ref.path.clone();
                new.season_ident = season_ref.ident.clone();
            }

            new.batch_no = batches
                .entry(new.show_ident.clone())
                .or_insert_with(|| uuid::Uuid::new_v4().to_string())
                .clone();
        }
        MediaKind::Movie | MediaKind::Other => {
            // The containing folder doubles as the grouping context, and often
            // carries a better title than the file itself.
            new.show_path = frame.dir.path.clone();
            new.show_ident = frame.dir.ident.clone();
            new.season_number = -1;
            new.episode_number = -1;

            if new.year.is_none() {
                let folder_parsed = extract::parse_media_name(&frame.name, strip_keywords);
                if folder_parsed.year.is_some() {
                    new.title = folder_parsed.title;
                    new.year = folder_parsed.year;
                }
            }
            if new.catalog_id.is_none() {
                new.catalog_id = extract::parse_catalog_id(&frame.name);
            }

            new.batch_no = uuid::Uuid::new_v4().to_string();
        }
    }

    new
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
    fn last_segment_of_path() {
        assert_eq!(last_segment("/media/tv"), "tv");
        assert_eq!(last_segment("/media/tv/"), "tv");
        assert_eq!(last_segment("tv"), "tv");
    }
}
