//! Local filesystem adapter. Paths are the identifiers; every returned
//! `EntryRef` has `ident == path`.

use std::path::{Path, PathBuf};

use medorg_core::{BackendKind, TransferMode};

use crate::{BackendError, Entry, EntryRef, StorageBackend};

#[derive(Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    fn entry_from_meta(path: &Path, meta: &std::fs::Metadata) -> Entry {
        let path_str = path.to_string_lossy().to_string();
        Entry {
            ident: path_str.clone(),
            path: path_str,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size: meta.len(),
            is_dir: meta.is_dir(),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn entry_detail(&self, loc: &EntryRef) -> Result<Entry, BackendError> {
        let path = PathBuf::from(&loc.path);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| BackendError::NotFound(loc.path.clone()))?;
        Ok(Self::entry_from_meta(&path, &meta))
    }

    async fn list_children(&self, dir: &EntryRef) -> Result<Vec<Entry>, BackendError> {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir.path)
            .await
            .map_err(|_| BackendError::NotFound(dir.path.clone()))?;

        while let Some(entry) = read_dir.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            entries.push(Self::entry_from_meta(&entry.path(), &meta));
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn create_dir(&self, parent: &EntryRef, name: &str) -> Result<EntryRef, BackendError> {
        let path = Path::new(&parent.path).join(name);
        tokio::fs::create_dir_all(&path).await?;
        Ok(EntryRef::from_path(path.to_string_lossy().to_string()))
    }

    async fn relocate(
        &self,
        source: &EntryRef,
        dest_dir: &EntryRef,
        new_name: &str,
        mode: TransferMode,
    ) -> Result<EntryRef, BackendError> {
        let dest = Path::new(&dest_dir.path).join(new_name);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match mode {
            TransferMode::Move => tokio::fs::rename(&source.path, &dest).await?,
            TransferMode::Copy => {
                tokio::fs::copy(&source.path, &dest).await?;
            }
            TransferMode::HardLink => tokio::fs::hard_link(&source.path, &dest).await?,
            TransferMode::SoftLink => {
                #[cfg(unix)]
                tokio::fs::symlink(&source.path, &dest).await?;
                #[cfg(not(unix))]
                return Err(BackendError::Unsupported(
                    "soft links are not available on this platform".into(),
                ));
            }
        }

        Ok(EntryRef::from_path(dest.to_string_lossy().to_string()))
    }

    async fn delete(&self, loc: &EntryRef) -> Result<(), BackendError> {
        let path = PathBuf::from(&loc.path);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            // Already gone; deletion is idempotent.
            Err(_) => return Ok(()),
        };
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        dest_dir: &EntryRef,
        name: &str,
    ) -> Result<EntryRef, BackendError> {
        // Local "upload" is a copy out of the staging directory.
        let dest = Path::new(&dest_dir.path).join(name);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest).await?;
        Ok(EntryRef::from_path(dest.to_string_lossy().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detail_list_and_relocate() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir(root.join("src")).unwrap();
        std::fs::create_dir(root.join("dst")).unwrap();
        std::fs::write(root.join("src/a.mkv"), b"video bytes").unwrap();

        let backend = LocalBackend::new();
        let src_dir = EntryRef::from_path(root.join("src").to_string_lossy().to_string());

        let children = backend.list_children(&src_dir).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a.mkv");
        assert!(!children[0].is_dir);
        assert_eq!(children[0].size, 11);

        let dst_dir = EntryRef::from_path(root.join("dst").to_string_lossy().to_string());
        let moved = backend
            .relocate(&children[0].to_ref(), &dst_dir, "b.mkv", TransferMode::Move)
            .await
            .unwrap();
        assert!(moved.path.ends_with("dst/b.mkv"));
        assert_eq!(moved.ident, moved.path);
        assert!(!root.join("src/a.mkv").exists());
        assert!(root.join("dst/b.mkv").exists());
    }

    #[tokio::test]
    async fn create_dir_and_find_child() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();
        let root = EntryRef::from_path(tmp.path().to_string_lossy().to_string());

        let created = backend.create_dir(&root, "Season 01").await.unwrap();
        assert!(created.path.ends_with("Season 01"));

        let found = backend.find_child(&root, "Season 01").await.unwrap();
        assert!(found.is_some_and(|e| e.is_dir));
        let missing = backend.find_child(&root, "Season 02").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new();
        let gone = EntryRef::from_path(tmp.path().join("nope").to_string_lossy().to_string());
        backend.delete(&gone).await.unwrap();
    }
}
