//! Adapter for path-addressed remote file services: every operation takes a
//! path string and `ident == path` throughout.

use std::path::Path;

use medorg_core::{BackendKind, TransferMode};
use tracing::debug;

use crate::{join_path, BackendError, Entry, EntryRef, StorageBackend};

#[derive(Debug)]
pub struct RemoteFileBackend {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl RemoteFileBackend {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(url = %url, "remote file request");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.token.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(endpoint.to_string()));
        }
        if !resp.status().is_success() {
            return Err(BackendError::Api(format!(
                "{endpoint} returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| BackendError::Api(format!("parse JSON: {e}")))
    }

    fn parse_entry(value: &serde_json::Value, parent_path: &str) -> Entry {
        let name = value["name"].as_str().unwrap_or_default().to_string();
        let path = value["path"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| join_path(parent_path, &name));
        Entry {
            ident: path.clone(),
            path,
            name,
            size: value["size"].as_u64().unwrap_or(0),
            is_dir: value["is_dir"].as_bool().unwrap_or(false),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for RemoteFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteFile
    }

    async fn entry_detail(&self, loc: &EntryRef) -> Result<Entry, BackendError> {
        let body = serde_json::json!({ "path": loc.path });
        let data = self.post_json("/api/fs/get", &body).await?;
        Ok(Self::parse_entry(&data, &loc.path))
    }

    async fn list_children(&self, dir: &EntryRef) -> Result<Vec<Entry>, BackendError> {
        let body = serde_json::json!({ "path": dir.path });
        let data = self.post_json("/api/fs/list", &body).await?;
        let items = data["content"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .map(|v| Self::parse_entry(v, &dir.path))
            .collect())
    }

    async fn create_dir(&self, parent: &EntryRef, name: &str) -> Result<EntryRef, BackendError> {
        let path = join_path(&parent.path, name);
        let body = serde_json::json!({ "path": path });
        self.post_json("/api/fs/mkdir", &body).await?;
        Ok(EntryRef::from_path(path))
    }

    async fn relocate(
        &self,
        source: &EntryRef,
        dest_dir: &EntryRef,
        new_name: &str,
        mode: TransferMode,
    ) -> Result<EntryRef, BackendError> {
        let endpoint = match mode {
            TransferMode::Move => "/api/fs/move",
            TransferMode::Copy => "/api/fs/copy",
            TransferMode::HardLink | TransferMode::SoftLink => {
                return Err(BackendError::Unsupported(
                    "remote file service cannot link entries".into(),
                ))
            }
        };
        let body = serde_json::json!({
            "src_path": source.path,
            "dst_dir": dest_dir.path,
            "name": new_name,
        });
        self.post_json(endpoint, &body).await?;
        Ok(EntryRef::from_path(join_path(&dest_dir.path, new_name)))
    }

    async fn delete(&self, loc: &EntryRef) -> Result<(), BackendError> {
        let body = serde_json::json!({ "path": loc.path });
        match self.post_json("/api/fs/remove", &body).await {
            Ok(_) => Ok(()),
            // Already gone; deletion is idempotent.
            Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn upload(
        &self,
        local_path: &Path,
        dest_dir: &EntryRef,
        name: &str,
    ) -> Result<EntryRef, BackendError> {
        let bytes = tokio::fs::read(local_path).await?;
        let dest = join_path(&dest_dir.path, name);
        let url = format!("{}/api/fs/put", self.base_url);
        debug!(url = %url, dest = %dest, size = bytes.len(), "remote file upload");

        let resp = self
            .client
            .put(&url)
            .header("Authorization", self.token.as_str())
            .header("File-Path", dest.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BackendError::Api(format!(
                "upload {dest} returned {}",
                resp.status()
            )));
        }
        Ok(EntryRef::from_path(dest))
    }
}
