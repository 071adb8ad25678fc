pub mod clouddrive;
pub mod local;
pub mod pandrive;
pub mod remotefile;

use std::path::Path;
use std::sync::Arc;

use medorg_core::{BackendKind, TransferMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("missing account credentials for backend {0}")]
    MissingCredentials(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend API error: {0}")]
    Api(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A location on a backend. Both fields are always carried; each adapter
/// reads whichever its addressing scheme needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryRef {
    pub path: String,
    pub ident: String,
}

impl EntryRef {
    pub fn new(path: impl Into<String>, ident: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ident: ident.into(),
        }
    }

    /// For backends where the path *is* the identifier.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            ident: path.clone(),
            path,
        }
    }
}

/// Uniform view of one backend entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub ident: String,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl Entry {
    pub fn to_ref(&self) -> EntryRef {
        EntryRef::new(self.path.clone(), self.ident.clone())
    }
}

/// Capability interface implemented once per storage type.
///
/// Adapters must return a populated `Entry`/`EntryRef` from every mutating
/// call: callers track the returned ident because on id-addressed backends
/// the computed path string alone cannot drive later operations.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    async fn entry_detail(&self, loc: &EntryRef) -> Result<Entry, BackendError>;

    async fn list_children(&self, dir: &EntryRef) -> Result<Vec<Entry>, BackendError>;

    /// Create a directory under `parent`, returning its reference.
    async fn create_dir(&self, parent: &EntryRef, name: &str) -> Result<EntryRef, BackendError>;

    /// Same-backend move/link/copy into `dest_dir` under `new_name`.
    async fn relocate(
        &self,
        source: &EntryRef,
        dest_dir: &EntryRef,
        new_name: &str,
        mode: TransferMode,
    ) -> Result<EntryRef, BackendError>;

    async fn delete(&self, loc: &EntryRef) -> Result<(), BackendError>;

    /// Upload a locally staged file into `dest_dir` under `name`.
    async fn upload(
        &self,
        local_path: &Path,
        dest_dir: &EntryRef,
        name: &str,
    ) -> Result<EntryRef, BackendError>;

    /// Look up a direct child by name.
    async fn find_child(
        &self,
        dir: &EntryRef,
        name: &str,
    ) -> Result<Option<Entry>, BackendError> {
        let children = self.list_children(dir).await?;
        Ok(children.into_iter().find(|e| e.name == name))
    }
}

/// Stored credentials for one backend account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendAccount {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

/// Resolve the adapter for a backend kind, failing when the account
/// credentials a remote backend needs are absent.
pub fn connect(
    kind: BackendKind,
    account: Option<&BackendAccount>,
) -> Result<Arc<dyn StorageBackend>, BackendError> {
    match kind {
        BackendKind::Local => Ok(Arc::new(local::LocalBackend::new())),
        BackendKind::CloudDrive => {
            let (base_url, token) = require_account(kind, account)?;
            Ok(Arc::new(clouddrive::CloudDriveBackend::new(base_url, token)))
        }
        BackendKind::RemoteFile => {
            let (base_url, token) = require_account(kind, account)?;
            Ok(Arc::new(remotefile::RemoteFileBackend::new(base_url, token)))
        }
        BackendKind::PanDrive => {
            let (base_url, token) = require_account(kind, account)?;
            Ok(Arc::new(pandrive::PanDriveBackend::new(base_url, token)))
        }
    }
}

fn require_account(
    kind: BackendKind,
    account: Option<&BackendAccount>,
) -> Result<(String, String), BackendError> {
    let account = account.ok_or_else(|| BackendError::MissingCredentials(kind.to_string()))?;
    match (&account.base_url, &account.token) {
        (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
            Ok((url.trim_end_matches('/').to_string(), token.clone()))
        }
        _ => Err(BackendError::MissingCredentials(kind.to_string())),
    }
}

/// Join a backend path and a child name with forward slashes.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "/" {
        format!("/{name}")
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_ref_from_path_mirrors_ident() {
        let r = EntryRef::from_path("/media/movies");
        assert_eq!(r.path, "/media/movies");
        assert_eq!(r.ident, "/media/movies");
    }

    #[test]
    fn join_path_normalizes_slashes() {
        assert_eq!(join_path("/media/movies", "a.mkv"), "/media/movies/a.mkv");
        assert_eq!(join_path("/media/movies/", "a.mkv"), "/media/movies/a.mkv");
        assert_eq!(join_path("/", "a.mkv"), "/a.mkv");
        assert_eq!(join_path("", "a.mkv"), "/a.mkv");
    }

    #[test]
    fn connect_requires_credentials_for_remote_kinds() {
        let err = connect(BackendKind::CloudDrive, None).unwrap_err();
        assert!(matches!(err, BackendError::MissingCredentials(_)));

        let empty = BackendAccount::default();
        let err = connect(BackendKind::PanDrive, Some(&empty)).unwrap_err();
        assert!(matches!(err, BackendError::MissingCredentials(_)));

        assert!(connect(BackendKind::Local, None).is_ok());
    }
}
