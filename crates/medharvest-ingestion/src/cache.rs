//! Extraction cache keyed by record identifier.
//!
//! A hit hands back the stored [`ProcessedRecord`] verbatim. The file-backed
//! store loads once, accumulates in memory and writes on [`flush`].
//!
//! [`flush`]: ExtractionCache::flush

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use medharvest_common::HarvestError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::ProcessedRecord;

#[async_trait]
pub trait ExtractionCache: Send + Sync {
    async fn get(&self, id: &str) -> Option<ProcessedRecord>;
    /// Last writer wins for a repeated id.
    async fn put(&self, id: &str, record: ProcessedRecord);
    /// Persist everything put so far.
    async fn flush(&self) -> Result<(), HarvestError>;
    async fn len(&self) -> usize;
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Non-persistent cache, lives as long as the value.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, ProcessedRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExtractionCache for MemoryCache {
    async fn get(&self, id: &str) -> Option<ProcessedRecord> {
        self.entries.lock().await.get(id).cloned()
    }

    async fn put(&self, id: &str, record: ProcessedRecord) {
        self.entries.lock().await.insert(id.to_string(), record);
    }

    async fn flush(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

// ── JSON file ─────────────────────────────────────────────────────────────────

/// Cache persisted as one JSON object `{ id: ProcessedRecord }`.
pub struct JsonFileCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ProcessedRecord>>,
}

impl JsonFileCache {
    /// Load `path`. A missing file starts empty; an unreadable one is logged
    /// and also starts empty, as do individual bad entries. A corrupt file is
    /// moved aside to `{path}.corrupt` before starting empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match parse_entries(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    let aside = corrupt_path(&path);
                    match tokio::fs::rename(&path, &aside).await {
                        Ok(()) => warn!(
                            path = %path.display(),
                            moved_to = %aside.display(),
                            error = %e,
                            "Corrupt cache file moved aside, starting empty"
                        ),
                        Err(rename_err) => warn!(
                            path = %path.display(),
                            error = %e,
                            rename_error = %rename_err,
                            "Corrupt cache file could not be moved aside, starting empty"
                        ),
                    }
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache, starting empty");
                BTreeMap::new()
            }
        };
        info!(path = %path.display(), entries = entries.len(), "Extraction cache loaded");
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `processed.json` becomes `processed.json.corrupt`.
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

fn parse_entries(text: &str) -> Result<BTreeMap<String, ProcessedRecord>, serde_json::Error> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(text)?;

    Ok(raw.into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<ProcessedRecord>(value) {
            Ok(record) => Some((id, record)),
            Err(e) => {
                debug!(%id, error = %e, "Skipping unreadable cache entry");
                None
            }
        })
        .collect())
}

#[async_trait]
impl ExtractionCache for JsonFileCache {
    async fn get(&self, id: &str) -> Option<ProcessedRecord> {
        self.entries.lock().await.get(id).cloned()
    }

    async fn put(&self, id: &str, record: ProcessedRecord) {
        self.entries.lock().await.insert(id.to_string(), record);
    }

    async fn flush(&self) -> Result<(), HarvestError> {
        let json = {
            let entries = self.entries.lock().await;
            serde_json::to_string_pretty(&*entries)?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::Cache(format!("create {}: {e}", parent.display())))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| HarvestError::Cache(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HarvestError::Cache(format!("rename to {}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), "Extraction cache flushed");
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Delete the cache file. Returns whether a file was removed.
pub async fn clear(path: impl AsRef<Path>) -> Result<bool, HarvestError> {
    match tokio::fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HarvestError::Cache(format!("remove {}: {e}", path.as_ref().display()))),
    }
}
