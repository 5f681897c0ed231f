//! Typed failure modes of the install pipeline and the outcome shape
//! returned across the process boundary.
//!
//! The pipeline never lets an error escape as a panic or a raw `Err` to the
//! UI layer: every operation settles into an [`InstallOutcome`].

use crate::api::ApiError;
use crate::model::{Resolution, Simulator};
use serde::Serialize;

/// Everything that can go wrong between "user clicked install" and a
/// recorded installation.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("not signed in - a valid session token is required")]
    Unauthenticated,

    #[error("no install path configured for {0}")]
    NoInstallPathConfigured(Simulator),

    #[error("'{name}' already has its {installed} variant installed - uninstall it first")]
    ConflictingVariantInstalled { name: String, installed: Resolution },

    #[error("could not resolve the download URL")]
    UrlResolutionFailed(#[source] ApiError),

    #[error("download failed")]
    TransferFailed(#[source] ApiError),

    #[error("archive extraction failed")]
    ExtractionFailed(#[source] anyhow::Error),

    #[error("could not record the installation")]
    LedgerWriteFailed(#[source] anyhow::Error),

    #[error("uninstall failed: {0}")]
    UninstallFailed(#[source] anyhow::Error),
}

impl InstallError {
    /// The HTTP status code behind this failure, when the underlying cause
    /// was a non-2xx response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            InstallError::UrlResolutionFailed(e) | InstallError::TransferFailed(e) => e.status(),
            _ => None,
        }
    }

    /// Full human-readable message including the underlying cause.
    pub fn message(&self) -> String {
        use std::error::Error;
        match self.source() {
            Some(source) => format!("{}: {}", self, source),
            None => self.to_string(),
        }
    }
}

/// Result of one pipeline operation, shaped for the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Secondary detail line naming the HTTP status, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl InstallOutcome {
    pub fn ok() -> Self {
        Self { success: true, error: None, details: None }
    }

    pub fn failure(err: &InstallError) -> Self {
        Self {
            success: false,
            error: Some(err.message()),
            details: err
                .http_status()
                .map(|code| format!("Server responded with {}", code)),
        }
    }
}

impl From<Result<(), InstallError>> for InstallOutcome {
    fn from(result: Result<(), InstallError>) -> Self {
        match result {
            Ok(()) => InstallOutcome::ok(),
            Err(e) => InstallOutcome::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_detail_present_for_http_failures() {
        let err = InstallError::UrlResolutionFailed(ApiError::Status {
            code: 401,
            body: "expired".into(),
        });
        let outcome = InstallOutcome::failure(&err);
        assert!(!outcome.success);
        assert_eq!(outcome.details.as_deref(), Some("Server responded with 401"));
        assert_eq!(err.http_status(), Some(401));
    }

    #[test]
    fn test_no_detail_for_network_failures() {
        let err = InstallError::TransferFailed(ApiError::Io(std::io::Error::other("broken pipe")));
        let outcome = InstallOutcome::failure(&err);
        assert!(outcome.details.is_none());
        assert!(outcome.error.unwrap().contains("broken pipe"));
    }

    #[test]
    fn test_policy_errors_have_no_status() {
        let err = InstallError::ConflictingVariantInstalled {
            name: "PMDG 737".into(),
            installed: Resolution::FourK,
        };
        assert_eq!(err.http_status(), None);
        assert!(err.message().contains("4K"));
    }
}
