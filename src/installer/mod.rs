//! Install pipeline orchestrator.
//!
//! Drives one livery from catalog entry to recorded installation: policy
//! checks, signed-URL resolution, streaming download, extraction, ledger
//! record, cleanup. Every public operation settles into an
//! [`InstallOutcome`] so the UI layer never sees a raw error.
//!
//! Ordering rules the pipeline maintains:
//! - policy checks (auth, conflicts, install path) run before any network
//!   traffic
//! - the ledger is written only after extraction succeeded
//! - install tracking is fire-and-forget and can never fail an install

pub mod download;
pub mod extract;

use crate::api::{ApiError, HttpClient, LiveryApi, SignedDownload};
use crate::error::{InstallError, InstallOutcome};
use crate::ledger::Ledger;
use crate::model::{CatalogLivery, InstallationRecord, Resolution, Simulator};
use crate::paths::{derive_archive_name, folder_name_from_archive};
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::settings::Settings;
use crate::versions::VersionStore;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Maximum attempts at exchanging a download endpoint for a signed URL.
const RESOLVE_ATTEMPTS: u32 = 2;

/// Backoff unit between resolution attempts; multiplied by the attempt number.
const RESOLVE_BACKOFF_STEP: Duration = Duration::from_millis(800);

pub struct Installer {
    api: Arc<dyn LiveryApi>,
    http: HttpClient,
    settings: Settings,
    ledger: Ledger,
    versions: VersionStore,
    progress: ProgressTracker,
}

impl Installer {
    /// Build the pipeline and the progress receiver its consumer subscribes to.
    pub fn new(
        api: Arc<dyn LiveryApi>,
        http: HttpClient,
        settings: Settings,
        ledger: Ledger,
        versions: VersionStore,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (progress, rx) = ProgressTracker::channel();
        (
            Self {
                api,
                http,
                settings,
                ledger,
                versions,
                progress,
            },
            rx,
        )
    }

    /// Install one catalog livery at the chosen resolution into the chosen
    /// simulator's community folder.
    pub async fn install_livery(
        &self,
        livery: &CatalogLivery,
        resolution: Resolution,
        simulator: Simulator,
        token: &str,
    ) -> InstallOutcome {
        let result = self.install_inner(livery, resolution, simulator, token).await;
        self.progress.finish(&livery.name);

        match result {
            Ok(record) => {
                info!("Installed '{}' ({}, {}) at {:?}",
                    record.original_name, record.resolution, record.simulator, record.install_path);
                InstallOutcome::ok()
            }
            Err(e) => {
                warn!("Install of '{}' failed: {}", livery.name, e.message());
                InstallOutcome::failure(&e)
            }
        }
    }

    async fn install_inner(
        &self,
        livery: &CatalogLivery,
        resolution: Resolution,
        simulator: Simulator,
        token: &str,
    ) -> Result<InstallationRecord, InstallError> {
        if token.trim().is_empty() {
            return Err(InstallError::Unauthenticated);
        }

        // Conflict and path checks come before any network traffic
        if let Some(existing) = self.ledger.find_conflicting(&livery.name, resolution, simulator) {
            return Err(InstallError::ConflictingVariantInstalled {
                name: livery.name.clone(),
                installed: existing.resolution,
            });
        }

        let community = self
            .settings
            .community_dir(simulator)
            .ok_or(InstallError::NoInstallPathConfigured(simulator))?;
        std::fs::create_dir_all(&community)
            .map_err(|e| InstallError::TransferFailed(ApiError::Io(e)))?;

        let signed = self.resolve_signed_url(&livery.download_endpoint, token).await?;

        let archive_name = derive_archive_name(&signed.download_url);
        let folder_name = folder_name_from_archive(&archive_name);
        let archive_path = community.join(&archive_name);
        let install_path = community.join(&folder_name);

        let written = download::download_with_retry(
            &self.http,
            &signed.download_url,
            &archive_path,
            &self.progress,
            &livery.name,
        )
        .await
        .map_err(InstallError::TransferFailed)?;

        self.progress.begin_extracting(&livery.name, Some(written));
        extract::extract(&archive_path, &community)
            .await
            .map_err(InstallError::ExtractionFailed)?;

        let version = signed
            .version
            .clone()
            .unwrap_or_else(|| livery.version.clone());
        let record = InstallationRecord {
            livery_id: livery.id.clone(),
            original_name: livery.name.clone(),
            folder_name,
            install_path,
            resolution,
            simulator,
            install_date: Utc::now(),
            version,
        };

        self.ledger
            .upsert(record.clone())
            .map_err(InstallError::LedgerWriteFailed)?;

        // Stamp and cleanup failures degrade gracefully; the install stands
        if let Err(e) = self.versions.set(&livery.id, &record.version) {
            warn!("Could not stamp installed version for '{}': {:#}", livery.name, e);
        }
        if let Err(e) = std::fs::remove_file(&archive_path) {
            warn!("Could not remove downloaded archive {:?}: {}", archive_path, e);
        }

        // Fire-and-forget install tracking
        let api = Arc::clone(&self.api);
        let livery_id = record.livery_id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.track_install(&livery_id, simulator, resolution).await {
                debug!("Install tracking failed for {}: {}", livery_id, e);
            }
        });

        Ok(record)
    }

    /// Exchange the catalog's download endpoint for a short-lived signed URL.
    ///
    /// Retried once on transient failure. Authorization rejections are not
    /// retried: the same token cannot start succeeding.
    async fn resolve_signed_url(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<SignedDownload, InstallError> {
        let mut last_err = None;

        for attempt in 1..=RESOLVE_ATTEMPTS {
            if attempt > 1 {
                let delay = RESOLVE_BACKOFF_STEP * (attempt - 1);
                debug!("Retrying URL resolution in {:?} (attempt {}/{})", delay, attempt, RESOLVE_ATTEMPTS);
                tokio::time::sleep(delay).await;
            }

            match self.api.resolve_download_url(endpoint, token).await {
                Ok(signed) => return Ok(signed),
                Err(e) => {
                    let fatal = e.is_auth_rejection();
                    warn!("URL resolution attempt {}/{} failed: {}", attempt, RESOLVE_ATTEMPTS, e);
                    last_err = Some(e);
                    if fatal {
                        break;
                    }
                }
            }
        }

        Err(InstallError::UrlResolutionFailed(last_err.unwrap_or_else(
            || ApiError::Io(std::io::Error::other("resolution failed with no attempts made")),
        )))
    }

    /// Remove an installed livery by its install path.
    ///
    /// A path that is already gone from disk is not an error; the ledger
    /// entry (if any) is still removed so the two stay consistent.
    pub async fn uninstall_by_path(&self, path: &Path) -> InstallOutcome {
        match self.uninstall_inner(path) {
            Ok(()) => InstallOutcome::ok(),
            Err(e) => {
                warn!("Uninstall of {:?} failed: {}", path, e.message());
                InstallOutcome::failure(&e)
            }
        }
    }

    fn uninstall_inner(&self, path: &Path) -> Result<(), InstallError> {
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| {
                InstallError::UninstallFailed(
                    anyhow::Error::new(e).context(format!("could not delete {:?}", path)),
                )
            })?;
        }

        let removed = self
            .ledger
            .remove_by_path(path)
            .map_err(InstallError::LedgerWriteFailed)?;

        if let Some(record) = removed {
            info!("Uninstalled '{}' from {:?}", record.original_name, path);
            if let Err(e) = self.versions.remove(&record.livery_id) {
                warn!("Could not drop version stamp for '{}': {:#}", record.original_name, e);
            }
        }
        Ok(())
    }

    /// Replace an installed livery with the catalog's current build.
    ///
    /// The existing install is removed first; when that removal fails the
    /// update aborts before any download, leaving the old install's ledger
    /// state as it was.
    pub async fn update_livery(
        &self,
        livery: &CatalogLivery,
        resolution: Resolution,
        simulator: Simulator,
        token: &str,
    ) -> InstallOutcome {
        let existing = self
            .ledger
            .snapshot()
            .into_iter()
            .find(|r| r.matches_identity(&livery.name, resolution, simulator));

        if let Some(record) = existing {
            let outcome = self.uninstall_by_path(&record.install_path).await;
            if !outcome.success {
                return outcome;
            }
        }

        self.install_livery(livery, resolution, simulator, token).await
    }

    /// Installed liveries, validated against disk.
    ///
    /// Never fails: when validation cannot persist its pruning, the
    /// unvalidated records are returned and the problem is logged.
    pub fn list_installed(&self) -> Vec<InstallationRecord> {
        match self.ledger.list() {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not validate the ledger: {:#}. Listing unvalidated records.", e);
                self.ledger.snapshot()
            }
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn api(&self) -> &Arc<dyn LiveryApi> {
        &self.api
    }
}
