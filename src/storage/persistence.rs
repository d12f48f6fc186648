//! File-backed archive: one MessagePack file per archived document.

use super::engine::{ArchiveEntry, ArchiveStore};
use crate::core::{DocumentKey, DocumentKind, PhantomError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, event};

const ENTRY_EXTENSION: &str = "gpp";
const TEMP_PREFIX: &str = ".pending-";

pub struct FileArchive {
    root: PathBuf,
    kind: DocumentKind,
    initialized: AtomicBool,
}

impl FileArchive {
    pub fn new<P: AsRef<Path>>(root: P, kind: DocumentKind) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            kind,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archives of different kinds may share a root; each only owns its own temp files.
    fn temp_prefix(&self) -> String {
        format!("{}{}-", TEMP_PREFIX, self.kind)
    }

    pub fn entry_path(&self, key: &DocumentKey) -> PathBuf {
        self.root.join(format!(
            "{}-{}.{}",
            key.kind,
            encode_file_stem(key.id.as_str()),
            ENTRY_EXTENSION
        ))
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(PhantomError::NotInitialized(self.kind));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for FileArchive {
    async fn initialize(&self) -> Result<()> {
        let root = self.root.clone();
        let prefix = self.temp_prefix();
        let removed = tokio::task::spawn_blocking(move || open_archive_dir(&root, &prefix))
            .await
            .map_err(|e| PhantomError::Execution(format!("archive init join: {}", e)))??;
        if removed > 0 {
            event!(Level::WARN, kind = %self.kind, removed, "discarded unfinished archive writes");
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn write(&self, entry: &ArchiveEntry) -> Result<()> {
        self.ensure_initialized()?;
        let key = entry.key.clone();
        let bytes = rmp_serde::to_vec_named(entry).map_err(|e| PhantomError::ArchiveWrite {
            key: key.clone(),
            reason: format!("Failed to serialize entry: {}", e),
        })?;
        let root = self.root.clone();
        let target = self.entry_path(&key);
        let prefix = self.temp_prefix();

        tokio::task::spawn_blocking(move || write_atomic(&root, &prefix, &target, &bytes))
            .await
            .map_err(|e| PhantomError::Execution(format!("archive write join: {}", e)))?
            .map_err(|e| PhantomError::ArchiveWrite {
                key,
                reason: e.to_string(),
            })
    }

    async fn read(&self, key: &DocumentKey) -> Result<Option<ArchiveEntry>> {
        self.ensure_initialized()?;
        let data = match tokio::fs::read(self.entry_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PhantomError::ArchiveRead {
                    key: key.clone(),
                    reason: e.to_string(),
                });
            }
        };
        let entry: ArchiveEntry =
            rmp_serde::from_slice(&data).map_err(|e| PhantomError::ArchiveRead {
                key: key.clone(),
                reason: format!("Failed to deserialize entry: {}", e),
            })?;
        Ok(Some(entry))
    }

    async fn delete(&self, key: &DocumentKey) -> Result<()> {
        self.ensure_initialized()?;
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PhantomError::Io(format!(
                "Failed to delete archive entry {}: {}",
                key, e
            ))),
        }
    }

    async fn contains(&self, key: &DocumentKey) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(tokio::fs::try_exists(self.entry_path(key)).await?)
    }
}

/// Creates the archive directory and removes leftovers of interrupted writes.
fn open_archive_dir(root: &Path, prefix: &str) -> Result<usize> {
    std::fs::create_dir_all(root)
        .map_err(|e| PhantomError::Io(format!("Failed to create archive directory: {}", e)))?;

    let mut removed = 0;
    for dir_entry in std::fs::read_dir(root)? {
        let path = dir_entry?.path();
        let is_temp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        if is_temp {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write to a temp file in the same directory, fsync, then rename over the target.
fn write_atomic(dir: &Path, prefix: &str, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Ids are host-provided; anything outside `[A-Za-z0-9_-]` is hex-escaped.
fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02x}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fields;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(id: &str) -> ArchiveEntry {
        let data = json!({
            "name": "Ancient Red Dragon",
            "system": {"hp": {"value": 546, "max": 546}, "cr": 24.5},
            "items": [{"name": "Bite"}, {"name": "Claw"}],
            "flags": null
        });
        let data: Fields = data.as_object().cloned().unwrap();
        ArchiveEntry::new(DocumentKey::actor(id), 3, data)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(temp_dir.path(), DocumentKind::Actor);
        archive.initialize().await.unwrap();

        let written = entry("dragon");
        archive.write(&written).await.unwrap();
        let loaded = archive.read(&written.key).await.unwrap().unwrap();

        assert_eq!(loaded, written);
        assert!(archive.contains(&written.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(temp_dir.path(), DocumentKind::Actor);
        archive.initialize().await.unwrap();

        assert!(archive.read(&DocumentKey::actor("nobody")).await.unwrap().is_none());
        archive.delete(&DocumentKey::actor("nobody")).await.unwrap();
    }

    #[tokio::test]
    async fn test_use_before_initialize_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(temp_dir.path().join("pack"), DocumentKind::Scene);
        let err = archive.read(&DocumentKey::scene("s")).await.unwrap_err();
        assert_eq!(err, PhantomError::NotInitialized(DocumentKind::Scene));
    }

    #[tokio::test]
    async fn test_initialize_removes_pending_writes() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(temp_dir.path(), DocumentKind::Actor);
        let stray = temp_dir
            .path()
            .join(format!("{}abc", archive.temp_prefix()));
        std::fs::write(&stray, b"half written").unwrap();

        archive.initialize().await.unwrap();
        archive.initialize().await.unwrap();

        assert!(!stray.exists());
    }

    #[tokio::test]
    async fn test_shared_root_keeps_other_kind_pending_writes() {
        let temp_dir = TempDir::new().unwrap();
        let actors = FileArchive::new(temp_dir.path(), DocumentKind::Actor);
        let scenes = FileArchive::new(temp_dir.path(), DocumentKind::Scene);
        scenes.initialize().await.unwrap();

        let actor_stray = temp_dir
            .path()
            .join(format!("{}abc", actors.temp_prefix()));
        let scene_pending = temp_dir
            .path()
            .join(format!("{}abc", scenes.temp_prefix()));
        std::fs::write(&actor_stray, b"half written").unwrap();
        std::fs::write(&scene_pending, b"in flight").unwrap();

        actors.initialize().await.unwrap();

        assert!(!actor_stray.exists());
        assert!(scene_pending.exists());
    }

    #[tokio::test]
    async fn test_unsafe_ids_stay_inside_root() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(temp_dir.path(), DocumentKind::Actor);
        archive.initialize().await.unwrap();

        let written = entry("../escape");
        archive.write(&written).await.unwrap();

        let path = archive.entry_path(&written.key);
        assert_eq!(path.parent(), Some(temp_dir.path()));
        assert!(archive.read(&written.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(temp_dir.path(), DocumentKind::Actor);
        archive.initialize().await.unwrap();

        let mut first = entry("a");
        archive.write(&first).await.unwrap();
        first.revision = 9;
        archive.write(&first).await.unwrap();

        let loaded = archive.read(&first.key).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 9);
    }
}
