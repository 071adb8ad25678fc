//! Rename/relocation executor: compute destination names from templates and
//! category, stage sidecar artifacts, and drive the backend (directly for
//! rename-only moves) or the transfer queue (for staged placements).

use medorg_backend::{EntryRef, StorageBackend};
use medorg_core::{ArtifactKind, MediaKind, ScrapeMode, ScrapeStatus, SidecarLevel, TransferMode};
use medorg_db::repo::media::{self, MediaEpisodeRow, MediaRow, MediaSeasonRow};
use medorg_db::repo::scrape_files::{self, ScrapeFileRow};
use std::sync::Arc;
use tracing::{info, warn};

use crate::batch;
use crate::category;
use crate::nfo;
use crate::orchestrator::RunContext;
use crate::template::{self, TokenContext};
use crate::transfer::{TransferJob, TransferSource};
use crate::ScrapeError;

/// Drive one scraped file through renaming/relocation.
///
/// On return the row is `renaming` (queue placements outstanding), `renamed`
/// (direct placement done), or the error has been recorded as
/// `rename_failed` by the caller.
pub async fn execute_rename(ctx: &RunContext, file: &ScrapeFileRow) -> Result<(), ScrapeError> {
    let kind = MediaKind::parse(&file.media_kind)
        .ok_or_else(|| ScrapeError::Config(format!("unknown media kind {}", file.media_kind)))?;
    let mode = ScrapeMode::parse(&ctx.path.scrape_mode)
        .ok_or_else(|| ScrapeError::Config(format!("unknown scrape mode {}", ctx.path.scrape_mode)))?;
    let transfer_mode = TransferMode::parse(&ctx.path.transfer_mode).ok_or_else(|| {
        ScrapeError::Config(format!("unknown transfer mode {}", ctx.path.transfer_mode))
    })?;

    let media = match &file.media_id {
        Some(id) => media::get_media(&ctx.pool, id).await?,
        None => None,
    };
    let (season, episode) = match (&media, kind) {
        (Some(m), MediaKind::TvShow) => (
            media::get_season(&ctx.pool, &m.id, file.season_number).await?,
            media::get_episode(&ctx.pool, &m.id, file.season_number, file.episode_number).await?,
        ),
        _ => (None, None),
    };

    let source_name = last_segment(&file.source_path);
    let source_stem = stem_of(&source_name);
    let ext = source_name.rsplit('.').next().unwrap_or("mkv").to_string();

    let tokens = build_tokens(kind, file, media.as_ref(), episode.as_ref());
    let folder_name = template::sanitize_name(&template::render(&ctx.path.folder_template, &tokens));
    let file_stem = template::sanitize_name(&template::render(&ctx.path.file_template, &tokens));
    if folder_name.is_empty() || file_stem.is_empty() {
        return Err(ScrapeError::Relocation(
            "name template rendered empty".into(),
        ));
    }
    let new_file_name = format!("{file_stem}.{ext}");
    scrape_files::set_generated_names(&ctx.pool, &file.id, &folder_name, &new_file_name).await?;

    match mode {
        ScrapeMode::RenameOnly => {
            rename_in_place(ctx, file, &source_name, &source_stem, &file_stem, &new_file_name).await
        }
        ScrapeMode::ScrapeOnly => {
            place_sidecars_in_place(ctx, kind, file, media.as_ref(), season.as_ref(), episode.as_ref(), &source_stem)
                .await
        }
        ScrapeMode::ScrapeRename => {
            relocate_to_library(
                ctx,
                kind,
                file,
                media.as_ref(),
                season.as_ref(),
                episode.as_ref(),
                transfer_mode,
                &folder_name,
                &file_stem,
                &new_file_name,
                &source_name,
                &source_stem,
            )
            .await
        }
    }
}

/// Rename-only mode: the file stays under its source root; the executor
/// drives the backend directly.
async fn rename_in_place(
    ctx: &RunContext,
    file: &ScrapeFileRow,
    source_name: &str,
    source_stem: &str,
    file_stem: &str,
    new_file_name: &str,
) -> Result<(), ScrapeError> {
    if source_name == new_file_name {
        // Nothing to do; the name already matches.
        scrape_files::update_status(&ctx.pool, &file.id, ScrapeStatus::Renamed.as_str(), None)
            .await?;
        return Ok(());
    }

    let parent = source_parent_ref(file)?;
    scrape_files::update_status(&ctx.pool, &file.id, ScrapeStatus::Renaming.as_str(), None).await?;

    let source = EntryRef::new(file.source_path.clone(), file.source_ident.clone());
    let dest = ctx
        .backend
        .relocate(&source, &parent, new_file_name, TransferMode::Move)
        .await
        .map_err(|e| ScrapeError::Relocation(e.to_string()))?;
    scrape_files::set_dest(&ctx.pool, &file.id, &dest.path, &dest.ident).await?;

    adopt_adjacent_sidecars(ctx, file, &parent, &parent, source_name, source_stem, file_stem)
        .await;

    info!(from = %file.source_path, to = %dest.path, "renamed in place");
    let outcome = batch::direct_video_outcome(file);
    batch::handle_completion(&ctx.pool, &ctx.path, &ctx.staging_root, &outcome).await
}

/// Scrape-only mode: the video stays put; metadata sidecars are staged and
/// placed beside it through the queue.
async fn place_sidecars_in_place(
    ctx: &RunContext,
    kind: MediaKind,
    file: &ScrapeFileRow,
    media: Option<&MediaRow>,
    season: Option<&MediaSeasonRow>,
    episode: Option<&MediaEpisodeRow>,
    source_stem: &str,
) -> Result<(), ScrapeError> {
    let show_dir = show_dir_ref(file)?;
    let episode_dir = source_parent_ref(file)?;

    scrape_files::update_status(&ctx.pool, &file.id, ScrapeStatus::Renaming.as_str(), None).await?;
    stage_and_enqueue_sidecars(
        ctx,
        kind,
        file,
        media,
        season,
        episode,
        &show_dir,
        &episode_dir,
        source_stem,
    )
    .await?;

    // The video itself was never queued; report its placement done so the
    // coordinator can advance the row and, eventually, reclaim staging.
    let outcome = batch::direct_video_outcome(file);
    batch::handle_completion(&ctx.pool, &ctx.path, &ctx.staging_root, &outcome).await
}

/// Full scrape-and-rename: build the destination chain under the library
/// root, stage artifacts, then hand every placement to the queue.
#[allow(clippy::too_many_arguments)]
async fn relocate_to_library(
    ctx: &RunContext,
    kind: MediaKind,
    file: &ScrapeFileRow,
    media: Option<&MediaRow>,
    season: Option<&MediaSeasonRow>,
    episode: Option<&MediaEpisodeRow>,
    transfer_mode: TransferMode,
    folder_name: &str,
    file_stem: &str,
    new_file_name: &str,
    source_name: &str,
    source_stem: &str,
) -> Result<(), ScrapeError> {
    let dest_root = EntryRef::new(ctx.path.dest_path.clone(), ctx.path.dest_ident.clone());

    // Destination is dest_root / [category] / work folder [/ Season NN].
    let base = match (ctx.path.classify, media) {
        (true, Some(m)) => match category::resolve_bucket(&ctx.buckets, m)
            .and_then(|b| ctx.categories.get(&b.name))
        {
            Some(cat) => EntryRef::new(cat.folder_path.clone(), cat.folder_ident.clone()),
            None => dest_root,
        },
        _ => dest_root,
    };

    let work_dir = ensure_dir(&ctx.backend, &base, folder_name).await?;
    let target_dir = match kind {
        MediaKind::TvShow => {
            let season_folder = format!("Season {:02}", file.season_number.max(0));
            ensure_dir(&ctx.backend, &work_dir, &season_folder).await?
        }
        _ => work_dir.clone(),
    };

    scrape_files::update_status(&ctx.pool, &file.id, ScrapeStatus::Renaming.as_str(), None).await?;

    stage_and_enqueue_sidecars(
        ctx, kind, file, media, season, episode, &work_dir, &target_dir, file_stem,
    )
    .await?;
    adopt_adjacent_sidecars(
        ctx,
        file,
        &source_parent_ref(file)?,
        &target_dir,
        source_name,
        source_stem,
        file_stem,
    )
    .await;

    // Video last, so its completion always sees every sibling sub-task.
    ctx.queue
        .enqueue(TransferJob {
            scrape_file_id: file.id.clone(),
            batch_no: file.batch_no.clone(),
            artifact: ArtifactKind::Video,
            source: TransferSource::Backend {
                loc: EntryRef::new(file.source_path.clone(), file.source_ident.clone()),
                mode: transfer_mode,
            },
            dest_dir: target_dir,
            dest_name: new_file_name.to_string(),
        })
        .await?;

    Ok(())
}

/// Write nfo text into staging and queue every metadata artifact: show- and
/// season-level artifacts once per work, episode-level ones per file.
#[allow(clippy::too_many_arguments)]
async fn stage_and_enqueue_sidecars(
    ctx: &RunContext,
    kind: MediaKind,
    file: &ScrapeFileRow,
    media: Option<&MediaRow>,
    season: Option<&MediaSeasonRow>,
    episode: Option<&MediaEpisodeRow>,
    work_dir: &EntryRef,
    target_dir: &EntryRef,
    file_stem: &str,
) -> Result<(), ScrapeError> {
    let Some(media) = media else {
        // "Other" content carries no catalog metadata.
        return Ok(());
    };

    let staging = batch::work_staging_dir(&ctx.staging_root, file);
    tokio::fs::create_dir_all(&staging).await?;
    let suffix_style = ctx.backend.kind().addresses_by_id();

    match kind {
        MediaKind::Movie | MediaKind::Other => {
            let nfo_name = format!("{file_stem}.nfo");
            let nfo_path = staging.join(&nfo_name);
            tokio::fs::write(&nfo_path, nfo::movie_nfo(media)).await?;
            enqueue_staged(ctx, file, SidecarLevel::Show, nfo_path, None, work_dir, &nfo_name)
                .await?;

            if let Some(url) = &media.poster_url {
                let name = image_name(suffix_style, file_stem, "poster");
                enqueue_staged(
                    ctx,
                    file,
                    SidecarLevel::Show,
                    staging.join(&name),
                    Some(url.clone()),
                    work_dir,
                    &name,
                )
                .await?;
            }
            if let Some(url) = &media.backdrop_url {
                let name = image_name(suffix_style, file_stem, "fanart");
                enqueue_staged(
                    ctx,
                    file,
                    SidecarLevel::Show,
                    staging.join(&name),
                    Some(url.clone()),
                    work_dir,
                    &name,
                )
                .await?;
            }
        }
        MediaKind::TvShow => {
            // Show-level artifacts are shared by the whole batch; a staged
            // marker keeps sibling episodes from re-queueing them.
            let show_marker = staging.join(".show-staged");
            if !show_marker.exists() {
                tokio::fs::write(&show_marker, b"").await?;

                let nfo_path = staging.join("tvshow.nfo");
                tokio::fs::write(&nfo_path, nfo::tvshow_nfo(media)).await?;
                enqueue_staged(
                    ctx,
                    file,
                    SidecarLevel::Show,
                    nfo_path,
                    None,
                    work_dir,
                    "tvshow.nfo",
                )
                .await?;

                if let Some(url) = &media.poster_url {
                    let name = image_name(suffix_style, &template::sanitize_name(&media.title), "poster");
                    enqueue_staged(
                        ctx,
                        file,
                        SidecarLevel::Show,
                        staging.join(&name),
                        Some(url.clone()),
                        work_dir,
                        &name,
                    )
                    .await?;
                }
                if let Some(url) = &media.backdrop_url {
                    let name = image_name(suffix_style, &template::sanitize_name(&media.title), "fanart");
                    enqueue_staged(
                        ctx,
                        file,
                        SidecarLevel::Show,
                        staging.join(&name),
                        Some(url.clone()),
                        work_dir,
                        &name,
                    )
                    .await?;
                }
            }

            if let Some(season) = season {
                let season_marker = staging.join(format!(".season{:02}-staged", season.season_number));
                if !season_marker.exists() {
                    if let Some(url) = &season.poster_url {
                        tokio::fs::write(&season_marker, b"").await?;
                        let name = format!("season{:02}-poster.jpg", season.season_number);
                        enqueue_staged(
                            ctx,
                            file,
                            SidecarLevel::Season,
                            staging.join(&name),
                            Some(url.clone()),
                            work_dir,
                            &name,
                        )
                        .await?;
                    }
                }
            }

            if let Some(episode) = episode {
                let nfo_name = format!("{file_stem}.nfo");
                let nfo_path = staging.join(&nfo_name);
                tokio::fs::write(&nfo_path, nfo::episode_nfo(episode)).await?;
                enqueue_staged(
                    ctx,
                    file,
                    SidecarLevel::Episode,
                    nfo_path,
                    None,
                    target_dir,
                    &nfo_name,
                )
                .await?;

                if let Some(url) = &episode.still_url {
                    let name = format!("{file_stem}-thumb.jpg");
                    enqueue_staged(
                        ctx,
                        file,
                        SidecarLevel::Episode,
                        staging.join(&name),
                        Some(url.clone()),
                        target_dir,
                        &name,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}

async fn enqueue_staged(
    ctx: &RunContext,
    file: &ScrapeFileRow,
    level: SidecarLevel,
    staged_path: std::path::PathBuf,
    download_url: Option<String>,
    dest_dir: &EntryRef,
    dest_name: &str,
) -> Result<(), ScrapeError> {
    ctx.queue
        .enqueue(TransferJob {
            scrape_file_id: file.id.clone(),
            batch_no: file.batch_no.clone(),
            artifact: ArtifactKind::Sidecar(level),
            source: TransferSource::Staged {
                path: staged_path,
                download_url,
            },
            dest_dir: dest_dir.clone(),
            dest_name: dest_name.to_string(),
        })
        .await
}

/// Subtitle (and other sidecar) files sitting beside the video adopt its
/// generated name, keeping their language/format suffix.
async fn adopt_adjacent_sidecars(
    ctx: &RunContext,
    file: &ScrapeFileRow,
    source_dir: &EntryRef,
    target_dir: &EntryRef,
    source_name: &str,
    source_stem: &str,
    file_stem: &str,
) {
    let children = match ctx.backend.list_children(source_dir).await {
        Ok(c) => c,
        Err(e) => {
            warn!(dir = %source_dir.path, error = %e, "cannot list source dir for sidecars");
            return;
        }
    };

    for entry in children {
        if entry.is_dir
            || entry.name == source_name
            || !crate::extract::is_sidecar_file(&entry.name)
            || !entry.name.starts_with(source_stem)
        {
            continue;
        }
        let suffix = &entry.name[source_stem.len()..];
        let new_name = format!("{file_stem}{suffix}");
        let level = if file.media_kind == MediaKind::TvShow.as_str() {
            SidecarLevel::Episode
        } else {
            SidecarLevel::Show
        };
        let job = TransferJob {
            scrape_file_id: file.id.clone(),
            batch_no: file.batch_no.clone(),
            artifact: ArtifactKind::Sidecar(level),
            source: TransferSource::Backend {
                loc: entry.to_ref(),
                mode: TransferMode::Move,
            },
            dest_dir: target_dir.clone(),
            dest_name: new_name,
        };
        if let Err(e) = ctx.queue.enqueue(job).await {
            warn!(sidecar = %entry.name, error = %e, "failed to queue sidecar adoption");
        }
    }
}

/// Find or create a directory, carrying forward the backend-issued ident.
async fn ensure_dir(
    backend: &Arc<dyn StorageBackend>,
    parent: &EntryRef,
    name: &str,
) -> Result<EntryRef, ScrapeError> {
    match backend.find_child(parent, name).await? {
        Some(existing) if existing.is_dir => Ok(existing.to_ref()),
        _ => Ok(backend.create_dir(parent, name).await?),
    }
}

fn build_tokens(
    kind: MediaKind,
    file: &ScrapeFileRow,
    media: Option<&MediaRow>,
    episode: Option<&MediaEpisodeRow>,
) -> TokenContext {
    let cast = media.and_then(|m| {
        let actors: Vec<String> = serde_json::from_str(&m.actors).unwrap_or_default();
        if actors.is_empty() {
            None
        } else {
            Some(actors.into_iter().take(3).collect::<Vec<_>>().join(", "))
        }
    });
    let bitrate = file
        .stream_info
        .as_deref()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
        .and_then(|v| v["bitrate"].as_str().map(String::from));

    TokenContext {
        title: Some(
            media
                .map(|m| m.title.clone())
                .unwrap_or_else(|| file.title.clone()),
        ),
        year: media.and_then(|m| m.year).or(file.year),
        resolution: file.resolution.clone(),
        bitrate,
        catalog_id: media.map(|m| m.catalog_id).or(file.catalog_id),
        cast,
        num: match kind {
            // "Other" content uses its parsed identifier as the content code.
            MediaKind::Other => Some(file.title.clone()),
            _ => None,
        },
        season: (kind == MediaKind::TvShow && file.season_number >= 0)
            .then_some(file.season_number),
        episode: (kind == MediaKind::TvShow && file.episode_number >= 0)
            .then_some(file.episode_number),
        episode_title: episode.and_then(|e| e.title.clone()),
    }
}

/// Backends addressed by id disambiguate artwork with a name suffix; path
/// backends use the fixed Kodi-style name list.
fn image_name(suffix_style: bool, stem: &str, kind: &str) -> String {
    if suffix_style {
        format!("{stem}-{kind}.jpg")
    } else {
        format!("{kind}.jpg")
    }
}

/// The directory the source file sits in: the season folder when one was
/// recorded, else the show/grouping folder.
pub(crate) fn source_parent_ref(file: &ScrapeFileRow) -> Result<EntryRef, ScrapeError> {
    if !file.season_path.is_empty() {
        return Ok(EntryRef::new(
            file.season_path.clone(),
            file.season_ident.clone(),
        ));
    }
    show_dir_ref(file)
}

fn show_dir_ref(file: &ScrapeFileRow) -> Result<EntryRef, ScrapeError> {
    if file.show_path.is_empty() {
        return Err(ScrapeError::Relocation(format!(
            "no grouping folder recorded for {}",
            file.source_path
        )));
    }
    Ok(EntryRef::new(file.show_path.clone(), file.show_ident.clone()))
}

fn last_segment(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

fn stem_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_row() -> ScrapeFileRow {
        ScrapeFileRow {
            id: "f1".into(),
            scrape_path_id: "p1".into(),
            media_kind: "tvshow".into(),
            status: "scraped".into(),
            source_path: "/src/Show/Season 01/Show.S01E02.mkv".into(),
            source_ident: "/src/Show/Season 01/Show.S01E02.mkv".into(),
            dest_path: String::new(),
            dest_ident: String::new(),
            show_path: "/src/Show".into(),
            show_ident: "/src/Show".into(),
            season_path: "/src/Show/Season 01".into(),
            season_ident: "/src/Show/Season 01".into(),
            season_number: 1,
            episode_number: 2,
            title: "Show".into(),
            year: None,
            catalog_id: None,
            media_id: None,
            media_season_id: None,
            media_episode_id: None,
            new_folder_name: String::new(),
            new_file_name: String::new(),
            resolution: Some("1080p".into()),
            is_hdr: false,
            audio_tracks: 0,
            subtitle_tracks: 0,
            stream_info: Some(r#"{"bitrate":"8Mbps"}"#.into()),
            size_bytes: 0,
            batch_no: "b1".into(),
            fail_reason: None,
            created_ts: 0,
            updated_ts: 0,
        }
    }

    #[test]
    fn tokens_prefer_canonical_title_and_carry_stream_info() {
        let file = file_row();
        let tokens = build_tokens(MediaKind::TvShow, &file, None, None);
        assert_eq!(tokens.title.as_deref(), Some("Show"));
        assert_eq!(tokens.season, Some(1));
        assert_eq!(tokens.episode, Some(2));
        assert_eq!(tokens.bitrate.as_deref(), Some("8Mbps"));
        assert_eq!(tokens.resolution.as_deref(), Some("1080p"));
    }

    #[test]
    fn parent_ref_prefers_season_folder() {
        let file = file_row();
        let parent = source_parent_ref(&file).unwrap();
        assert_eq!(parent.path, "/src/Show/Season 01");

        let mut flat = file_row();
        flat.season_path = String::new();
        flat.season_ident = String::new();
        let parent = source_parent_ref(&flat).unwrap();
        assert_eq!(parent.path, "/src/Show");
    }

    #[test]
    fn image_names_per_addressing_style() {
        assert_eq!(image_name(false, "Show (2008)", "poster"), "poster.jpg");
        assert_eq!(
            image_name(true, "Show (2008)", "poster"),
            "Show (2008)-poster.jpg"
        );
    }
}
