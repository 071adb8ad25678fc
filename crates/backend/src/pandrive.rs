//! Adapter for cloud drives whose identifiers look like paths but are issued
//! by the server. Operations address entries by the server-issued id, and the
//! id returned from each create/move/upload call must be carried forward;
//! the locally computed path string cannot stand in for it.

use std::path::Path;

use medorg_core::{BackendKind, TransferMode};
use tracing::debug;

use crate::{join_path, BackendError, Entry, EntryRef, StorageBackend};

#[derive(Debug)]
pub struct PanDriveBackend {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl PanDriveBackend {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, endpoint: &str) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(url = %url, "pan drive request");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        check_status(resp, endpoint).await
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(url = %url, "pan drive request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        check_status(resp, endpoint).await
    }

    fn parse_entry(value: &serde_json::Value, parent_path: &str) -> Entry {
        let name = value["name"].as_str().unwrap_or_default().to_string();
        Entry {
            ident: value["fid"].as_str().unwrap_or_default().to_string(),
            path: join_path(parent_path, &name),
            name,
            size: value["size"].as_u64().unwrap_or(0),
            is_dir: value["kind"].as_str() == Some("folder"),
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
impl StorageBackend for PanDriveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PanDrive
    }

    async fn entry_detail(&self, loc: &EntryRef) -> Result<Entry, BackendError> {
        let data = self
            .get_json(&format!("/api/drive/item?fid={}", loc.ident))
            .await?;
        let mut entry = Self::parse_entry(&data, "");
        // The service does not echo a browsable path; keep the one we carry.
        entry.path = loc.path.clone();
        Ok(entry)
    }

    async fn list_children(&self, dir: &EntryRef) -> Result<Vec<Entry>, BackendError> {
        let data = self
            .get_json(&format!("/api/drive/list?fid={}", dir.ident))
            .await?;
        let items = data["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .map(|v| Self::parse_entry(v, &dir.path))
            .collect())
    }

    async fn create_dir(&self, parent: &EntryRef, name: &str) -> Result<EntryRef, BackendError> {
        let body = serde_json::json!({ "parent_fid": parent.ident, "name": name });
        let data = self.post_json("/api/drive/folder", &body).await?;
        let fid = data["fid"].as_str().unwrap_or_default().to_string();
        Ok(EntryRef::new(join_path(&parent.path, name), fid))
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
                    "pan drive cannot link entries".into(),
                ))
            }
        };
        let body = serde_json::json!({
            "fid": source.ident,
            "to_fid": dest_dir.ident,
            "name": new_name,
            "op": op,
        });
        let data = self.post_json("/api/drive/relocate", &body).await?;
        let fid = data["fid"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| source.ident.clone());
        Ok(EntryRef::new(join_path(&dest_dir.path, new_name), fid))
    }

    async fn delete(&self, loc: &EntryRef) -> Result<(), BackendError> {
        let body = serde_json::json!({ "fid": loc.ident });
        match self.post_json("/api/drive/remove", &body).await {
            Ok(_) => Ok(()),
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
        let url = format!(
            "{}/api/drive/upload?parent_fid={}&name={}",
            self.base_url, dest_dir.ident, name
        );
        debug!(url = %url, size = bytes.len(), "pan drive upload");

        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let data = check_status(resp, "upload").await?;
        let fid = data["fid"].as_str().unwrap_or_default().to_string();
        Ok(EntryRef::new(join_path(&dest_dir.path, name), fid))
    }
}
