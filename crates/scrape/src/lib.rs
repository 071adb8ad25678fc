#![allow(clippy::collapsible_if, clippy::manual_range_contains)]
pub mod batch;
pub mod category;
pub mod enrich;
pub mod extract;
pub mod maintenance;
pub mod nfo;
pub mod orchestrator;
pub mod rename;
pub mod rollback;
pub mod scan;
pub mod template;
pub mod transfer;

use thiserror::Error;

/// Pipeline error taxonomy. Every variant is recorded on the affected file
/// row; none of them aborts the worker pool.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("scan error: {0}")]
    Scan(String),

    #[error("ambiguous catalog match for '{title}': {count} candidates")]
    AmbiguousMatch { title: String, count: usize },

    #[error("enrichment error: {0}")]
    Enrichment(String),

    #[error("relocation error: {0}")]
    Relocation(String),

    #[error("rollback error: {0}")]
    Rollback(String),

    #[error("scrape path is already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("backend error: {0}")]
    Backend(#[from] medorg_backend::BackendError),

    #[error("catalog error: {0}")]
    Catalog(#[from] medorg_catalog::CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
