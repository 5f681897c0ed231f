//! Installed-version stamps, kept separately from the ledger.
//!
//! The map from livery id to the version string that was actually installed.
//! Stamps are written best-effort after a successful install and are the
//! preferred source when asking the backend about updates; ledger-recorded
//! versions are the fallback for installs that predate stamping.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Version-stamp store backed by one JSON file.
pub struct VersionStore {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl VersionStore {
    /// Open the store at `path`, tolerating a missing or corrupt file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match load_map(&path) {
            Ok(map) => map,
            Err(e) => {
                warn!("Could not load version stamps from {:?}: {:#}. Starting empty.", path, e);
                HashMap::new()
            }
        };
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    pub fn get(&self, livery_id: &str) -> Option<String> {
        self.map.lock().unwrap().get(livery_id).cloned()
    }

    pub fn set(&self, livery_id: &str, version: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        map.insert(livery_id.to_string(), version.to_string());
        persist(&self.path, &map)
    }

    pub fn remove(&self, livery_id: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        if map.remove(livery_id).is_some() {
            persist(&self.path, &map)?;
        }
        Ok(())
    }
}

fn load_map(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn persist(path: &Path, map: &HashMap<String, String>) -> Result<()> {
    let parent = path.parent().context("Version store path has no parent directory")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {:?}", parent))?;

    let tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
    serde_json::to_writer_pretty(&tmp, map).context("Failed to serialize version stamps")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::open(dir.path().join("versions.json"));

        assert!(store.get("lvr-1").is_none());
        store.set("lvr-1", "1.2.0").unwrap();
        assert_eq!(store.get("lvr-1").as_deref(), Some("1.2.0"));

        store.remove("lvr-1").unwrap();
        assert!(store.get("lvr-1").is_none());

        // Removing an absent key is a no-op
        store.remove("lvr-1").unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");

        {
            let store = VersionStore::open(&path);
            store.set("lvr-1", "1.2.0").unwrap();
            store.set("lvr-2", "0.9.0").unwrap();
        }

        let reopened = VersionStore::open(&path);
        assert_eq!(reopened.get("lvr-1").as_deref(), Some("1.2.0"));
        assert_eq!(reopened.get("lvr-2").as_deref(), Some("0.9.0"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(&path, "][").unwrap();
        let store = VersionStore::open(&path);
        assert!(store.get("anything").is_none());
    }
}
