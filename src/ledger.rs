//! Installed-liveries ledger: the JSON record of what is on disk.
//!
//! The ledger is a cache over filesystem truth, not the other way round: a
//! record whose install path no longer exists is stale and gets pruned by
//! `validate`. All writes go through an atomic temp-file rename so a crash
//! mid-write never leaves a half-written ledger behind.

use crate::model::{InstallationRecord, Resolution, Simulator};
use crate::paths::paths_equal;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Current on-disk schema version.
const LEDGER_VERSION: u32 = 1;

/// On-disk shape of the ledger file.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    liveries: Vec<InstallationRecord>,
}

/// Record store for installed liveries, backed by one JSON file.
pub struct Ledger {
    path: PathBuf,
    records: Mutex<Vec<InstallationRecord>>,
}

impl Ledger {
    /// Open the ledger at `path`, tolerating a missing or corrupt file.
    ///
    /// A corrupt ledger is logged and treated as empty rather than failing
    /// the whole application; `validate` will rebuild consistency with disk.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match load_records(&path) {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not load ledger from {:?}: {:#}. Starting empty.", path, e);
                Vec::new()
            }
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Insert or replace a record.
    ///
    /// Any existing record with the same `(name, resolution, simulator)`
    /// identity is removed first, so re-installing a livery replaces its row
    /// instead of duplicating it.
    pub fn upsert(&self, record: InstallationRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| {
            !r.matches_identity(&record.original_name, record.resolution, record.simulator)
        });
        records.push(record);
        persist(&self.path, &records)
    }

    /// Remove the record whose install path matches `path`, comparing
    /// case-insensitively and separator-agnostically. Returns the removed
    /// record, or None when no record matched.
    pub fn remove_by_path(&self, path: &Path) -> Result<Option<InstallationRecord>> {
        let mut records = self.records.lock().unwrap();
        let idx = records.iter().position(|r| paths_equal(&r.install_path, path));
        match idx {
            Some(idx) => {
                let removed = records.remove(idx);
                persist(&self.path, &records)?;
                Ok(Some(removed))
            }
            None => Ok(None),
        }
    }

    /// Drop records whose install path no longer exists on disk.
    ///
    /// Persists only when something was actually pruned. Returns the number
    /// of pruned records; running it twice in a row prunes nothing the
    /// second time.
    pub fn validate(&self) -> Result<usize> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.install_path.exists());
        let pruned = before - records.len();

        if pruned > 0 {
            debug!("Pruned {} stale ledger record(s)", pruned);
            persist(&self.path, &records)?;
        }
        Ok(pruned)
    }

    /// All current records, validated against disk first.
    pub fn list(&self) -> Result<Vec<InstallationRecord>> {
        self.validate()?;
        Ok(self.records.lock().unwrap().clone())
    }

    /// All current records without touching disk.
    pub fn snapshot(&self) -> Vec<InstallationRecord> {
        self.records.lock().unwrap().clone()
    }

    /// An installed record for the same livery and simulator but a different
    /// resolution, if one exists.
    pub fn find_conflicting(
        &self,
        name: &str,
        resolution: Resolution,
        simulator: Simulator,
    ) -> Option<InstallationRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.original_name.eq_ignore_ascii_case(name)
                    && r.simulator == simulator
                    && r.resolution != resolution
            })
            .cloned()
    }
}

fn load_records(path: &Path) -> Result<Vec<InstallationRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file: LedgerFile =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

    Ok(file.liveries)
}

/// Write the ledger atomically: serialize to a temp file in the same
/// directory, then rename over the target.
fn persist(path: &Path, records: &[InstallationRecord]) -> Result<()> {
    let parent = path.parent().context("Ledger path has no parent directory")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {:?}", parent))?;

    let file = LedgerFile {
        version: LEDGER_VERSION,
        liveries: records.to_vec(),
    };

    let tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
    serde_json::to_writer_pretty(&tmp, &file).context("Failed to serialize ledger")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {:?}", path))?;

    Ok(())
}
