//! Core data model shared across the catalog, ledger and installer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Texture resolution variant of a livery package.
///
/// The wire and ledger representation is the bare string ("4K" / "8K"),
/// matching what the catalog backend serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "4K")]
    FourK,
    #[serde(rename = "8K")]
    EightK,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::FourK => write!(f, "4K"),
            Resolution::EightK => write!(f, "8K"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "4K" => Ok(Resolution::FourK),
            "8K" => Ok(Resolution::EightK),
            other => Err(format!("unknown resolution '{}' (expected 4K or 8K)", other)),
        }
    }
}

/// Target simulator for an install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Simulator {
    #[default]
    #[serde(rename = "FS20")]
    Fs20,
    #[serde(rename = "FS24")]
    Fs24,
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Simulator::Fs20 => write!(f, "FS20"),
            Simulator::Fs24 => write!(f, "FS24"),
        }
    }
}

impl FromStr for Simulator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FS20" | "MSFS2020" | "2020" => Ok(Simulator::Fs20),
            "FS24" | "MSFS2024" | "2024" => Ok(Simulator::Fs24),
            other => Err(format!("unknown simulator '{}' (expected FS20 or FS24)", other)),
        }
    }
}

/// Remote livery descriptor served by the catalog endpoint.
///
/// Read-only from the core's perspective: it is cross-referenced against the
/// ledger for conflict checks and version comparison, never mutated.
/// `download_endpoint` is *not* a direct file URL; it must be exchanged
/// (bearer-authenticated) for a short-lived signed URL before downloading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogLivery {
    pub id: String,
    pub name: String,
    pub download_endpoint: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub aircraft_type: String,
    pub resolution: Resolution,
    pub simulator: Simulator,
    #[serde(default)]
    pub version: String,
}

/// One row per concretely installed livery variant.
///
/// Identity for upsert purposes is the `(original_name, resolution,
/// simulator)` triple; `install_path` is the unique key surface for removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub livery_id: String,
    pub original_name: String,
    pub folder_name: String,
    pub install_path: PathBuf,
    pub resolution: Resolution,
    pub simulator: Simulator,
    pub install_date: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
}

impl InstallationRecord {
    /// Whether this record occupies the given identity triple.
    pub fn matches_identity(&self, name: &str, resolution: Resolution, simulator: Simulator) -> bool {
        self.original_name.eq_ignore_ascii_case(name)
            && self.resolution == resolution
            && self.simulator == simulator
    }
}
