//! Update reconciliation between the ledger, version stamps and the catalog.
//!
//! All installed liveries are submitted to the backend in one batch request,
//! whatever their number. The backend answers per livery id; the answers are
//! enriched from local state so the caller gets everything needed to render
//! and act on an update without further lookups.

use crate::api::{ApiError, LiveryApi, VersionCheck};
use crate::ledger::Ledger;
use crate::model::{CatalogLivery, Resolution, Simulator};
use crate::versions::VersionStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Version used for installs that predate version stamping.
const UNKNOWN_VERSION: &str = "unknown";

/// One actionable update, enriched with local install state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescriptor {
    pub livery_id: String,
    pub name: String,
    pub install_path: PathBuf,
    pub current_version: String,
    pub latest_version: String,
    pub resolution: Resolution,
    pub simulator: Simulator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
}

/// Ask the backend which installed liveries have newer builds.
///
/// The version submitted per livery prefers the stamp written at install
/// time over the ledger-recorded one. Backend answers for ids that no longer
/// exist in the catalog are dropped: there is nothing to download for them.
pub async fn check_for_updates(
    api: &dyn LiveryApi,
    ledger: &Ledger,
    versions: &VersionStore,
    catalog: &[CatalogLivery],
    token: &str,
) -> Result<Vec<UpdateDescriptor>, ApiError> {
    let records = ledger.snapshot();
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let pairs: Vec<VersionCheck> = records
        .iter()
        .map(|r| VersionCheck {
            livery_id: r.livery_id.clone(),
            current_version: versions.get(&r.livery_id).unwrap_or_else(|| {
                if r.version.is_empty() {
                    UNKNOWN_VERSION.to_string()
                } else {
                    r.version.clone()
                }
            }),
        })
        .collect();

    debug!("Checking updates for {} installed liveries", pairs.len());
    let entries = api.check_updates(token, &pairs).await?;

    let mut updates = Vec::new();
    for entry in entries.into_iter().filter(|e| e.has_update) {
        let Some(record) = records.iter().find(|r| r.livery_id == entry.livery_id) else {
            continue;
        };
        let Some(catalog_entry) = catalog.iter().find(|c| c.id == entry.livery_id) else {
            warn!("Update reported for '{}' which is no longer in the catalog; dropping",
                record.original_name);
            continue;
        };

        let latest = entry
            .latest_version
            .unwrap_or_else(|| catalog_entry.version.clone());

        updates.push(UpdateDescriptor {
            livery_id: record.livery_id.clone(),
            name: record.original_name.clone(),
            install_path: record.install_path.clone(),
            current_version: versions
                .get(&record.livery_id)
                .unwrap_or_else(|| record.version.clone()),
            latest_version: latest,
            resolution: record.resolution,
            simulator: record.simulator,
            changelog: entry.changelog,
        });
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{SignedDownload, UpdateCheckEntry};
    use crate::model::InstallationRecord;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct BatchStub {
        calls: AtomicUsize,
        seen_pairs: Mutex<Vec<VersionCheck>>,
        entries: Mutex<Vec<UpdateCheckEntry>>,
    }

    impl BatchStub {
        fn new(entries: Vec<UpdateCheckEntry>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen_pairs: Mutex::new(Vec::new()),
                entries: Mutex::new(entries),
            }
        }
    }

    #[async_trait]
    impl LiveryApi for BatchStub {
        async fn resolve_download_url(
            &self,
            _endpoint: &str,
            _token: &str,
        ) -> Result<SignedDownload, ApiError> {
            unreachable!("update checking never resolves URLs")
        }

        async fn check_updates(
            &self,
            _token: &str,
            pairs: &[VersionCheck],
        ) -> Result<Vec<UpdateCheckEntry>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_pairs.lock().unwrap().extend(pairs.iter().cloned());
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn track_install(
            &self,
            _livery_id: &str,
            _simulator: Simulator,
            _resolution: Resolution,
        ) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn record(id: &str, name: &str, version: &str, dir: &TempDir) -> InstallationRecord {
        InstallationRecord {
            livery_id: id.into(),
            original_name: name.into(),
            folder_name: name.to_lowercase().replace(' ', "-"),
            install_path: dir.path().join(name.to_lowercase().replace(' ', "-")),
            resolution: Resolution::FourK,
            simulator: Simulator::Fs20,
            install_date: Utc::now(),
            version: version.into(),
        }
    }

    fn catalog_entry(id: &str, version: &str) -> CatalogLivery {
        CatalogLivery {
            id: id.into(),
            name: format!("Livery {}", id),
            download_endpoint: format!("https://api.example.com/liveries/{}/download", id),
            developer: String::new(),
            aircraft_type: String::new(),
            resolution: Resolution::FourK,
            simulator: Simulator::Fs20,
            version: version.into(),
        }
    }

    fn entry(id: &str, has_update: bool, latest: Option<&str>) -> UpdateCheckEntry {
        UpdateCheckEntry {
            livery_id: id.into(),
            has_update,
            latest_version: latest.map(String::from),
            current_version: "1.0.0".into(),
            changelog: None,
        }
    }

    #[tokio::test]
    async fn test_single_batch_request_for_many_records() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        for i in 0..5 {
            ledger.upsert(record(&format!("lvr-{}", i), &format!("Livery {}", i), "1.0.0", &dir)).unwrap();
        }
        let versions = VersionStore::open(dir.path().join("versions.json"));
        let stub = BatchStub::new(Vec::new());

        let updates = check_for_updates(&stub, &ledger, &versions, &[], "tok").await.unwrap();
        assert!(updates.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stub.seen_pairs.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_no_request_when_nothing_installed() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        let versions = VersionStore::open(dir.path().join("versions.json"));
        let stub = BatchStub::new(Vec::new());

        let updates = check_for_updates(&stub, &ledger, &versions, &[], "tok").await.unwrap();
        assert!(updates.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stamped_version_preferred_over_ledger_version() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        ledger.upsert(record("lvr-1", "Livery lvr-1", "0.5.0", &dir)).unwrap();
        let versions = VersionStore::open(dir.path().join("versions.json"));
        versions.set("lvr-1", "1.1.0").unwrap();

        let stub = BatchStub::new(Vec::new());
        check_for_updates(&stub, &ledger, &versions, &[], "tok").await.unwrap();

        let pairs = stub.seen_pairs.lock().unwrap();
        assert_eq!(pairs[0].current_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_unstamped_unversioned_record_submits_unknown() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        ledger.upsert(record("lvr-1", "Livery lvr-1", "", &dir)).unwrap();
        let versions = VersionStore::open(dir.path().join("versions.json"));

        let stub = BatchStub::new(Vec::new());
        check_for_updates(&stub, &ledger, &versions, &[], "tok").await.unwrap();

        let pairs = stub.seen_pairs.lock().unwrap();
        assert_eq!(pairs[0].current_version, "unknown");
    }

    #[tokio::test]
    async fn test_updates_enriched_from_local_state() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        ledger.upsert(record("lvr-1", "PMDG 737", "1.0.0", &dir)).unwrap();
        let versions = VersionStore::open(dir.path().join("versions.json"));
        let catalog = vec![catalog_entry("lvr-1", "2.0.0")];

        let stub = BatchStub::new(vec![entry("lvr-1", true, Some("2.0.0"))]);
        let updates = check_for_updates(&stub, &ledger, &versions, &catalog, "tok").await.unwrap();

        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.name, "PMDG 737");
        assert_eq!(update.current_version, "1.0.0");
        assert_eq!(update.latest_version, "2.0.0");
        assert_eq!(update.resolution, Resolution::FourK);
        assert!(update.install_path.ends_with("pmdg-737"));
    }

    #[tokio::test]
    async fn test_entries_missing_from_catalog_are_dropped() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        ledger.upsert(record("lvr-gone", "Retired Livery", "1.0.0", &dir)).unwrap();
        let versions = VersionStore::open(dir.path().join("versions.json"));

        let stub = BatchStub::new(vec![entry("lvr-gone", true, Some("2.0.0"))]);
        let updates = check_for_updates(&stub, &ledger, &versions, &[], "tok").await.unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_no_update_entries_are_filtered() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json"));
        ledger.upsert(record("lvr-1", "PMDG 737", "2.0.0", &dir)).unwrap();
        let versions = VersionStore::open(dir.path().join("versions.json"));
        let catalog = vec![catalog_entry("lvr-1", "2.0.0")];

        let stub = BatchStub::new(vec![entry("lvr-1", false, None)]);
        let updates = check_for_updates(&stub, &ledger, &versions, &catalog, "tok").await.unwrap();
        assert!(updates.is_empty());
    }
}
