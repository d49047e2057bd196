use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;

static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Last seen version per app id.
///
/// Backed by a `BTreeMap` so the persisted file is key-sorted and two saves of
/// the same mapping produce identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VersionRecord {
    versions: BTreeMap<String, String>,
}

impl VersionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_id: &str) -> Option<&str> {
        self.versions.get(app_id).map(String::as_str)
    }

    /// Returns the previously stored version, if any.
    pub fn insert(&mut self, app_id: impl Into<String>, version: impl Into<String>) -> Option<String> {
        self.versions.insert(app_id.into(), version.into())
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.versions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VersionRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            versions: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// Older cache files stored an object per app instead of a bare version string.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Version(String),
    Detailed { version: String },
}

impl<'de> Deserialize<'de> for VersionRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<String, StoredEntry>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(app_id, entry)| match entry {
                StoredEntry::Version(version) | StoredEntry::Detailed { version } => {
                    (app_id, version)
                }
            })
            .collect())
    }
}

/// JSON file holding the [`VersionRecord`] between scheduled runs.
#[derive(Debug, Clone)]
pub struct VersionCache {
    path: PathBuf,
}

impl VersionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Unique per process and per save, so overlapping saves never share a tmp file.
    fn tmp_path(&self) -> PathBuf {
        let seq = SAVE_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir().join(format!(
            "{}.{}-{}.tmp",
            self.file_name(),
            std::process::id(),
            seq
        ))
    }

    fn is_tmp_sibling(&self, name: &str) -> bool {
        name.len() > self.file_name().len() + ".tmp".len()
            && name.starts_with(&format!("{}.", self.file_name()))
            && name.ends_with(".tmp")
    }

    /// Newest parsable tmp file left behind by an interrupted save.
    async fn load_tmp_fallback(&self) -> Option<VersionRecord> {
        let mut entries = tokio::fs::read_dir(self.dir()).await.ok()?;
        let mut candidates = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !self.is_tmp_sibling(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            candidates.push((modified, entry.path()));
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in candidates {
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(record) = serde_json::from_slice(&bytes) {
                    debug!(path = %path.display(), "recovered version cache from tmp file");
                    return Some(record);
                }
            }
        }
        None
    }

    /// Loads the mapping. A missing, empty or unreadable file yields an empty
    /// record; a corrupt file falls back to a `.tmp` sibling left by an
    /// interrupted save.
    pub async fn load(&self) -> VersionRecord {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                debug!(path = %self.path.display(), "version cache is empty");
                VersionRecord::default()
            }
            Ok(bytes) => match serde_json::from_slice::<VersionRecord>(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, path = %self.path.display(), "failed to parse version cache, trying tmp fallback");
                    self.load_tmp_fallback().await.unwrap_or_default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no version cache yet, starting empty");
                VersionRecord::default()
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "failed to read version cache, starting empty");
                VersionRecord::default()
            }
        }
    }

    /// Replaces the stored mapping with `record` (write to tmp, then rename).
    pub async fn save(&self, record: &VersionRecord) -> Result<(), CacheError> {
        let mut bytes = serde_json::to_vec_pretty(record)?;
        bytes.push(b'\n');

        tokio::fs::create_dir_all(self.dir()).await?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), entries = record.len(), "version cache saved");
        Ok(())
    }
}
