//! Per-path orchestration: owns the backend adapter, the running flag, the
//! staging directory, and the bounded worker pool that drives each scanned
//! file through enrichment and renaming.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use medorg_backend::{BackendAccount, StorageBackend};
use medorg_catalog::provider::CatalogProvider;
use medorg_core::{BackendKind, ScrapeStatus};
use medorg_db::repo::categories::CategoryRow;
use medorg_db::repo::scrape_files::{self, ScrapeFileRow};
use medorg_db::repo::scrape_paths::{self, ScrapePathRow};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::category::{self, Bucket, Taxonomy};
use crate::enrich::{self, NameAssist};
use crate::rename;
use crate::scan;
use crate::transfer::{StoreQueue, TransferQueue};
use crate::ScrapeError;

/// Worker floor, and the cap applied whenever the backend is remote or no
/// catalog credentials are configured, so remote APIs never see the full
/// configured parallelism.
pub const DEFAULT_MAX_WORKERS: usize = 1;

/// Everything a worker needs for one file; shared read-only across the pool.
pub struct RunContext {
    pub pool: SqlitePool,
    pub backend: Arc<dyn StorageBackend>,
    pub queue: Arc<dyn TransferQueue>,
    pub path: ScrapePathRow,
    pub staging_root: PathBuf,
    pub buckets: Vec<Bucket>,
    pub categories: HashMap<String, CategoryRow>,
    pub language: String,
}

/// Knobs supplied by the host process at init time.
#[derive(Default)]
pub struct OrchestratorOptions {
    pub data_dir: PathBuf,
    pub language: String,
    pub taxonomy: Taxonomy,
    pub account: Option<BackendAccount>,
    pub has_catalog_credentials: bool,
    pub assist: Option<Arc<dyn NameAssist>>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub scanned: usize,
    pub processed: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    pool: SqlitePool,
    path: ScrapePathRow,
    backend_kind: BackendKind,
    backend: Arc<dyn StorageBackend>,
    catalog: Arc<dyn CatalogProvider>,
    assist: Option<Arc<dyn NameAssist>>,
    queue: Arc<dyn TransferQueue>,
    staging_root: PathBuf,
    taxonomy: Taxonomy,
    language: String,
    has_catalog_credentials: bool,
    // In-memory running flag; `scrape_path.is_scraping` mirrors it so a
    // crash mid-run stays externally observable.
    running: tokio::sync::Mutex<bool>,
}

impl Orchestrator {
    /// Acquire the backend adapter (failing when account credentials are
    /// missing) and create the private staging directory for this path.
    pub async fn init(
        pool: SqlitePool,
        path: ScrapePathRow,
        catalog: Arc<dyn CatalogProvider>,
        opts: OrchestratorOptions,
    ) -> Result<Self, ScrapeError> {
        let backend_kind = BackendKind::parse(&path.backend_kind).ok_or_else(|| {
            ScrapeError::Config(format!("unknown backend kind {}", path.backend_kind))
        })?;
        let backend = medorg_backend::connect(backend_kind, opts.account.as_ref())?;

        let staging_root = opts
            .data_dir
            .join("staging")
            .join(&path.id)
            .join(&path.media_kind);
        tokio::fs::create_dir_all(&staging_root).await?;

        let queue: Arc<dyn TransferQueue> = Arc::new(StoreQueue::new(
            pool.clone(),
            backend.clone(),
            path.clone(),
            staging_root.clone(),
        ));

        let language = if opts.language.is_empty() {
            "en-US".to_string()
        } else {
            opts.language
        };

        Ok(Self {
            pool,
            path,
            backend_kind,
            backend,
            catalog,
            assist: opts.assist,
            queue,
            staging_root,
            taxonomy: opts.taxonomy,
            language,
            has_catalog_credentials: opts.has_catalog_credentials,
            running: tokio::sync::Mutex::new(false),
        })
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Effective worker count. Remote backends and missing catalog
    /// credentials pin the pool to the default regardless of configuration.
    pub fn max_workers(&self) -> usize {
        if self.backend_kind != BackendKind::Local || !self.has_catalog_credentials {
            return DEFAULT_MAX_WORKERS;
        }
        if self.path.max_workers <= 0 {
            return DEFAULT_MAX_WORKERS;
        }
        self.path.max_workers as usize
    }

    async fn set_running(&self) -> Result<(), ScrapeError> {
        {
            let mut guard = self.running.lock().await;
            if *guard {
                return Err(ScrapeError::AlreadyRunning);
            }
            *guard = true;
        }
        scrape_paths::set_scraping(&self.pool, &self.path.id, true).await?;
        Ok(())
    }

    async fn set_not_running(&self) {
        {
            let mut guard = self.running.lock().await;
            *guard = false;
        }
        if let Err(e) = scrape_paths::set_scraping(&self.pool, &self.path.id, false).await {
            error!(scrape_path = %self.path.id, error = %e, "failed to clear running flag");
        }
    }

    /// One full activation: category sync, scan, then the worker pool.
    /// The running flag is cleared on every exit path.
    pub async fn run(&self) -> Result<RunSummary, ScrapeError> {
        self.set_running().await?;
        let result = self.run_inner().await;
        self.set_not_running().await;
        result
    }

    async fn run_inner(&self) -> Result<RunSummary, ScrapeError> {
        let buckets = self.taxonomy.buckets_for(&self.path.media_kind).to_vec();
        let categories = if self.path.classify {
            category::sync_categories(&self.pool, &self.backend, &self.path, &buckets).await?
        } else {
            HashMap::new()
        };

        let scanned = scan::run_scan(&self.pool, &self.backend, &self.path).await?;

        let pending =
            scrape_files::list_by_status(&self.pool, &self.path.id, ScrapeStatus::Scanned.as_str())
                .await?;

        let ctx = Arc::new(RunContext {
            pool: self.pool.clone(),
            backend: self.backend.clone(),
            queue: self.queue.clone(),
            path: self.path.clone(),
            staging_root: self.staging_root.clone(),
            buckets,
            categories,
            language: self.language.clone(),
        });

        let workers = self.max_workers();
        info!(
            scrape_path = %self.path.id,
            pending = pending.len(),
            workers,
            "dispatching scrape workers"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut pool_set: JoinSet<bool> = JoinSet::new();

        for file in pending {
            let ctx = ctx.clone();
            let catalog = self.catalog.clone();
            let assist = self.assist.clone();
            let semaphore = semaphore.clone();
            pool_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return false;
                };
                process_file(&ctx, &catalog, assist.as_ref(), file).await
            });
        }

        let mut summary = RunSummary {
            scanned: scanned.added,
            ..Default::default()
        };
        while let Some(joined) = pool_set.join_next().await {
            match joined {
                Ok(true) => summary.processed += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "scrape worker panicked");
                    summary.failed += 1;
                }
            }
        }

        // Let queued placements drain before the run is declared over.
        self.queue.wait_idle().await;

        info!(
            scrape_path = %self.path.id,
            scanned = summary.scanned,
            processed = summary.processed,
            failed = summary.failed,
            "scrape run finished"
        );
        Ok(summary)
    }
}

/// Drive one file through enrichment and renaming. Failures are recorded on
/// the row; they never propagate to sibling workers.
async fn process_file(
    ctx: &Arc<RunContext>,
    catalog: &Arc<dyn CatalogProvider>,
    assist: Option<&Arc<dyn NameAssist>>,
    file: ScrapeFileRow,
) -> bool {
    let enriched =
        match enrich::enrich_file(&ctx.pool, catalog, assist, &ctx.path, &file, &ctx.language)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(file = %file.source_path, error = %e, "enrichment failed");
                let _ = scrape_files::update_status(
                    &ctx.pool,
                    &file.id,
                    ScrapeStatus::ScrapeFailed.as_str(),
                    Some(&e.to_string()),
                )
                .await;
                return false;
            }
        };

    match rename::execute_rename(ctx, &enriched).await {
        Ok(()) => true,
        Err(e) => {
            warn!(file = %file.source_path, error = %e, "rename failed");
            let _ = scrape_files::update_status(
                &ctx.pool,
                &enriched.id,
                ScrapeStatus::RenameFailed.as_str(),
                Some(&e.to_string()),
            )
            .await;
            false
        }
    }
}
