//! Upload/download queue seam. Each placement sub-task is persisted as a
//! `transfer_task` row before the byte transfer runs, so the coordinator's
//! outstanding-work checks survive restarts.

use std::path::PathBuf;
use std::sync::Arc;

use medorg_backend::{join_path, EntryRef, StorageBackend};
use medorg_core::{ArtifactKind, TransferMode};
use medorg_db::repo::scrape_paths::ScrapePathRow;
use medorg_db::repo::transfers::{self, NewTransferTask};
use sqlx::SqlitePool;
use tracing::{debug, error, warn};

use crate::{batch, ScrapeError};

/// One placement sub-task handed to the queue.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub scrape_file_id: String,
    pub batch_no: String,
    pub artifact: ArtifactKind,
    pub source: TransferSource,
    pub dest_dir: EntryRef,
    pub dest_name: String,
}

#[derive(Debug, Clone)]
pub enum TransferSource {
    /// Same-backend relocation of an entry already on the backend.
    Backend { loc: EntryRef, mode: TransferMode },
    /// A staged local file, optionally fetched from a URL first.
    Staged {
        path: PathBuf,
        download_url: Option<String>,
    },
}

/// Completion callback payload.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub scrape_file_id: String,
    pub batch_no: String,
    pub artifact: ArtifactKind,
    pub dest: Option<EntryRef>,
    pub staged_path: Option<PathBuf>,
    pub success: bool,
    pub reason: Option<String>,
}

/// The external upload/download queue interface. Outstanding-work queries go
/// against the persisted `transfer_task` rows, not the queue object, so the
/// batch coordinator stays correct across restarts.
#[async_trait::async_trait]
pub trait TransferQueue: Send + Sync {
    async fn enqueue(&self, job: TransferJob) -> Result<(), ScrapeError>;

    /// Block until every accepted job has completed. Used at the end of a
    /// run; a no-op for queues that process synchronously.
    async fn wait_idle(&self) {}
}

/// Shipped queue implementation: persists each job, performs the transfer on
/// a spawned task, then feeds the outcome back into the batch coordinator.
pub struct StoreQueue {
    pool: SqlitePool,
    backend: Arc<dyn StorageBackend>,
    path: ScrapePathRow,
    staging_root: PathBuf,
    http: reqwest::Client,
    handles: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl StoreQueue {
    pub fn new(
        pool: SqlitePool,
        backend: Arc<dyn StorageBackend>,
        path: ScrapePathRow,
        staging_root: PathBuf,
    ) -> Self {
        Self {
            pool,
            backend,
            path,
            staging_root,
            http: reqwest::Client::new(),
            handles: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl TransferQueue for StoreQueue {
    async fn enqueue(&self, job: TransferJob) -> Result<(), ScrapeError> {
        let (source_path, source_url) = match &job.source {
            TransferSource::Backend { loc, .. } => (loc.path.clone(), None),
            TransferSource::Staged { path, download_url } => (
                path.to_string_lossy().to_string(),
                download_url.clone(),
            ),
        };

        let task = transfers::create_task(
            &self.pool,
            &NewTransferTask {
                scrape_file_id: job.scrape_file_id.clone(),
                batch_no: job.batch_no.clone(),
                artifact: job.artifact.as_str().to_string(),
                source_path,
                source_url,
                dest_path: join_path(&job.dest_dir.path, &job.dest_name),
                dest_ident: job.dest_dir.ident.clone(),
            },
        )
        .await?;

        let pool = self.pool.clone();
        let backend = self.backend.clone();
        let path = self.path.clone();
        let staging_root = self.staging_root.clone();
        let http = self.http.clone();

        let handle = tokio::spawn(async move {
            let outcome = process_job(&pool, &backend, &http, &task.id, &job).await;
            if let Err(e) = batch::handle_completion(&pool, &path, &staging_root, &outcome).await {
                error!(task = %task.id, error = %e, "completion handling failed");
            }
        });
        self.handles.lock().await.push(handle);
        Ok(())
    }

    async fn wait_idle(&self) {
        loop {
            let handle = self.handles.lock().await.pop();
            match handle {
                Some(h) => {
                    if let Err(e) = h.await {
                        warn!(error = %e, "transfer task panicked");
                    }
                }
                None => break,
            }
        }
    }
}

async fn process_job(
    pool: &SqlitePool,
    backend: &Arc<dyn StorageBackend>,
    http: &reqwest::Client,
    task_id: &str,
    job: &TransferJob,
) -> TaskOutcome {
    let result = run_transfer(backend, http, job).await;

    let mut outcome = TaskOutcome {
        scrape_file_id: job.scrape_file_id.clone(),
        batch_no: job.batch_no.clone(),
        artifact: job.artifact,
        dest: None,
        staged_path: match &job.source {
            TransferSource::Staged { path, .. } => Some(path.clone()),
            TransferSource::Backend { .. } => None,
        },
        success: false,
        reason: None,
    };

    match result {
        Ok(dest) => {
            if let Err(e) = transfers::mark_done(pool, task_id).await {
                error!(task = %task_id, error = %e, "failed to mark transfer done");
            }
            outcome.dest = Some(dest);
            outcome.success = true;
        }
        Err(e) => {
            let reason = e.to_string();
            if let Err(mark_err) = transfers::mark_failed(pool, task_id, &reason).await {
                error!(task = %task_id, error = %mark_err, "failed to mark transfer failed");
            }
            outcome.reason = Some(reason);
        }
    }

    outcome
}

async fn run_transfer(
    backend: &Arc<dyn StorageBackend>,
    http: &reqwest::Client,
    job: &TransferJob,
) -> Result<EntryRef, ScrapeError> {
    match &job.source {
        TransferSource::Backend { loc, mode } => {
            let dest = backend
                .relocate(loc, &job.dest_dir, &job.dest_name, *mode)
                .await?;
            Ok(dest)
        }
        TransferSource::Staged { path, download_url } => {
            if let Some(url) = download_url {
                debug!(url = %url, staged = %path.display(), "downloading artifact");
                let bytes = http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| ScrapeError::Relocation(format!("download {url}: {e}")))?
                    .error_for_status()
                    .map_err(|e| ScrapeError::Relocation(format!("download {url}: {e}")))?
                    .bytes()
                    .await
                    .map_err(|e| ScrapeError::Relocation(format!("download {url}: {e}")))?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, &bytes).await?;
            }

            let dest = backend.upload(path, &job.dest_dir, &job.dest_name).await?;
            Ok(dest)
        }
    }
}
