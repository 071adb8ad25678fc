//! Cloud-drive adapter for services that address entries by opaque numeric
//! ids. The path field on returned entries is informational; every operation
//! goes through the ident.

use std::path::Path;

use medorg_core::{BackendKind, TransferMode};
use tracing::debug;

use crate::{join_path, BackendError, Entry, EntryRef, StorageBackend};

#[derive(Debug)]
pub struct CloudDriveBackend {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl CloudDriveBackend {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "cloud drive request");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        check_status(resp, path).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "cloud drive request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        check_status(resp, path).await
    }

    fn parse_entry(&self, value: &serde_json::Value, parent_path: &str) -> Entry {
        let name = value["name"].as_str().unwrap_or_default().to_string();
        let path = value["path"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| join_path(parent_path, &name));
        Entry {
            ident: value["id"].as_u64().unwrap_or(0).to_string(),
            path,
            name,
            size: value["size"].as_u64().unwrap_or(0),
            is_dir: value["is_dir"].as_bool().unwrap_or(false),
        }
    }
}

async fn check_status(
    resp: reqwest::Response,
    context: &str,
) -> Result<serde_json::Value, BackendError> {
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound(context.to_string()));
    }
    if !resp.status().is_success() {
        return Err(BackendError::Api(format!(
            "{context} returned {}",
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| BackendError::Api(format!("parse JSON: {e}")))
}

#[async_trait::async_trait]
impl StorageBackend for CloudDriveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CloudDrive
    }

    async fn entry_detail(&self, loc: &EntryRef) -> Result<Entry, BackendError> {
        let data = self.get_json(&format!("/api/v1/files/{}", loc.ident)).await?;
        Ok(self.parse_entry(&data, &loc.path))
    }

    async fn list_children(&self, dir: &EntryRef) -> Result<Vec<Entry>, BackendError> {
        let data = self
            .get_json(&format!("/api/v1/files/{}/children", dir.ident))
            .await?;
        let items = data["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .map(|v| self.parse_entry(v, &dir.path))
            .collect())
    }

    async fn create_dir(&self, parent: &EntryRef, name: &str) -> Result<EntryRef, BackendError> {
        let body = serde_json::json!({ "parent_id": parent.ident, "name": name });
        let data = self.post_json("/api/v1/folders", &body).await?;
        let id = data["id"].as_u64().unwrap_or(0).to_string();
        Ok(EntryRef::new(join_path(&parent.path, name), id))
    }

    async fn relocate(
        &self,
        source: &EntryRef,
        dest_dir: &EntryRef,
        new_name: &str,
        mode: TransferMode,
    ) -> Result<EntryRef, BackendError> {
        let op = match mode {
            TransferMode::Move => "move",
            TransferMode::Copy => "copy",
            TransferMode::HardLink | TransferMode::SoftLink => {
                return Err(BackendError::Unsupported(
                    "cloud drive cannot link entries".into(),
                ))
            }
        };
        let body = serde_json::json!({
            "target_parent_id": dest_dir.ident,
            "new_name": new_name,
            "op": op,
        });
        let data = self
            .post_json(&format!("/api/v1/files/{}/relocate", source.ident), &body)
            .await?;
        // The service assigns a fresh id on copy; on move it keeps the old one.
        let id = data["id"]
            .as_u64()
            .map(|v| v.to_string())
            .unwrap_or_else(|| source.ident.clone());
        Ok(EntryRef::new(join_path(&dest_dir.path, new_name), id))
    }

    async fn delete(&self, loc: &EntryRef) -> Result<(), BackendError> {
        let url = format!("{}/api/v1/files/{}", self.base_url, loc.ident);
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status().is_success() {
            return Ok(());
        }
        Err(BackendError::Api(format!(
            "delete {} returned {}",
            loc.ident,
            resp.status()
        )))
    }

    async fn upload(
        &self,
        local_path: &Path,
        dest_dir: &EntryRef,
        name: &str,
    ) -> Result<EntryRef, BackendError> {
        let bytes = tokio::fs::read(local_path).await?;
        let url = format!(
            "{}/api/v1/files?parent_id={}&name={}",
            self.base_url, dest_dir.ident, name
        );
        debug!(url = %url, size = bytes.len(), "cloud drive upload");

        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let data = check_status(resp, "upload").await?;
        let id = data["id"].as_u64().unwrap_or(0).to_string();
        Ok(EntryRef::new(join_path(&dest_dir.path, name), id))
    }
}
