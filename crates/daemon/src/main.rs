use std::sync::Arc;

use anyhow::Context;
use medorg_backend::BackendAccount;
use medorg_catalog::provider::CatalogProvider;
use medorg_catalog::tmdb::TmdbCatalog;
use medorg_scrape::category::Taxonomy;
use medorg_scrape::orchestrator::{Orchestrator, OrchestratorOptions};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // DB path: use MEDORG_DB env or default
    let db_path = std::env::var("MEDORG_DB").unwrap_or_else(|_| "medorg.db".to_string());
    info!(db_path = %db_path, "connecting to database");

    let pool = medorg_db::connect(&db_path)
        .await
        .context("failed to connect to database")?;

    medorg_db::migrate::run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("migrations complete");

    // A crash mid-run leaves is_scraping set; clear it before scheduling.
    medorg_scrape::maintenance::reset_stuck_runs(&pool)
        .await
        .context("failed to reset stuck runs")?;

    let data_dir: std::path::PathBuf = std::env::var("MEDORG_DATA_DIR")
        .unwrap_or_else(|_| "/var/lib/medorg".to_string())
        .into();
    std::fs::create_dir_all(&data_dir).context("failed to create data dir")?;

    let api_key = std::env::var("MEDORG_TMDB_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("MEDORG_TMDB_API_KEY not set; worker pools stay at the default size and catalog lookups will fail");
    }
    let language = std::env::var("MEDORG_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());
    let region = std::env::var("MEDORG_REGION").unwrap_or_else(|_| "US".to_string());
    let catalog: Arc<dyn CatalogProvider> =
        Arc::new(TmdbCatalog::with_region(api_key.clone(), region));

    let interval_secs: u64 = std::env::var("MEDORG_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1800);

    info!(interval_secs, "scheduler loop starting");
    loop {
        if let Err(e) = run_all_paths(&pool, &catalog, &data_dir, &language, !api_key.is_empty()).await
        {
            error!(error = %e, "scrape cycle failed");
        }
        tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
    }
}

async fn run_all_paths(
    pool: &SqlitePool,
    catalog: &Arc<dyn CatalogProvider>,
    data_dir: &std::path::Path,
    language: &str,
    has_catalog_credentials: bool,
) -> anyhow::Result<()> {
    let taxonomy = load_taxonomy(pool).await?;
    let paths = medorg_db::repo::scrape_paths::list_scrape_paths(pool).await?;

    for path in paths {
        let account = load_account(pool, &path.backend_kind).await?;
        let orchestrator = match Orchestrator::init(
            pool.clone(),
            path.clone(),
            catalog.clone(),
            OrchestratorOptions {
                data_dir: data_dir.to_path_buf(),
                language: language.to_string(),
                taxonomy: taxonomy.clone(),
                account,
                has_catalog_credentials,
                assist: None,
            },
        )
        .await
        {
            Ok(o) => o,
            Err(e) => {
                error!(scrape_path = %path.name, error = %e, "orchestrator init failed");
                continue;
            }
        };

        // Restore anything a re-scrape parked before scanning again.
        if let Err(e) =
            medorg_scrape::rollback::run_rollback_sweep(pool, &path, orchestrator.backend()).await
        {
            error!(scrape_path = %path.name, error = %e, "rollback sweep failed");
        }

        match orchestrator.run().await {
            Ok(summary) => info!(
                scrape_path = %path.name,
                scanned = summary.scanned,
                processed = summary.processed,
                failed = summary.failed,
                "scrape path run complete"
            ),
            Err(medorg_scrape::ScrapeError::AlreadyRunning) => {
                warn!(scrape_path = %path.name, "run skipped, already in progress");
            }
            Err(e) => error!(scrape_path = %path.name, error = %e, "scrape path run failed"),
        }
    }

    Ok(())
}

/// Classification taxonomy, stored as JSON under the `taxonomy` setting.
async fn load_taxonomy(pool: &SqlitePool) -> anyhow::Result<Taxonomy> {
    let raw = medorg_db::repo::settings::get(pool, "taxonomy").await?;
    Ok(raw
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default())
}

/// Backend account credentials, stored per kind under `backend_account.<kind>`.
async fn load_account(
    pool: &SqlitePool,
    backend_kind: &str,
) -> anyhow::Result<Option<BackendAccount>> {
    let key = format!("backend_account.{backend_kind}");
    let raw = medorg_db::repo::settings::get(pool, &key).await?;
    Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
}
