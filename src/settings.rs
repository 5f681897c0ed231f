//! Settings persistence for liveryhub.
//!
//! Stores simulator install paths and install defaults in
//! ~/.config/liveryhub/settings.json. Paths gate which installs are visible
//! and legal, so consumers should refresh derived state (the ledger view)
//! after every update.

use crate::model::{Resolution, Simulator};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Process-wide configuration. An empty path string means unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// MSFS 2020 community-folder root
    #[serde(default)]
    pub msfs2020_path: String,

    /// MSFS 2024 community-folder root
    #[serde(default)]
    pub msfs2024_path: String,

    #[serde(default)]
    pub default_resolution: Resolution,

    #[serde(default)]
    pub default_simulator: Simulator,
}

impl Settings {
    /// Get the config directory path (~/.config/liveryhub)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("liveryhub");

        Ok(config_dir)
    }

    /// Get the settings file path
    fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load settings from the default location, or return defaults if not found.
    pub fn load() -> Self {
        match Self::settings_path().and_then(|p| Self::load_from(&p)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load settings: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit path, normalizing legacy path suffixes.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

        let mut settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        settings.msfs2020_path = normalize_sim_path(&settings.msfs2020_path);
        settings.msfs2024_path = normalize_sim_path(&settings.msfs2024_path);

        Ok(settings)
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {:?}", config_dir))?;

        self.save_to(&Self::settings_path()?)
    }

    /// Save settings to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// The configured community folder for a simulator, or None when unset.
    pub fn community_dir(&self, simulator: Simulator) -> Option<PathBuf> {
        let raw = match simulator {
            Simulator::Fs20 => &self.msfs2020_path,
            Simulator::Fs24 => &self.msfs2024_path,
        };
        if raw.is_empty() {
            None
        } else {
            Some(PathBuf::from(raw))
        }
    }

    /// Whether any simulator path is configured.
    pub fn has_any_simulator(&self) -> bool {
        !self.msfs2020_path.is_empty() || !self.msfs2024_path.is_empty()
    }
}

/// Normalize a stored simulator path.
///
/// Pre-1.0 builds saved the `Packages` root rather than the Community
/// folder inside it, and some saved trailing separators. Install code
/// expects the Community folder itself.
fn normalize_sim_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return String::new();
    }

    let last = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed);
    if last.eq_ignore_ascii_case("packages") {
        return Path::new(trimmed)
            .join("Community")
            .to_string_lossy()
            .to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.msfs2020_path.is_empty());
        assert!(!settings.has_any_simulator());
        assert!(settings.community_dir(Simulator::Fs20).is_none());
        assert_eq!(settings.default_resolution, Resolution::FourK);
        assert_eq!(settings.default_simulator, Simulator::Fs20);
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            msfs2020_path: "/sims/msfs2020/Community".into(),
            msfs2024_path: String::new(),
            default_resolution: Resolution::EightK,
            default_simulator: Simulator::Fs24,
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.msfs2020_path, "/sims/msfs2020/Community");
        assert_eq!(loaded.default_resolution, Resolution::EightK);
        assert_eq!(loaded.default_simulator, Simulator::Fs24);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Settings::load_from(&dir.path().join("nope.json")).unwrap();
        assert!(!loaded.has_any_simulator());
    }

    #[test]
    fn test_legacy_packages_suffix_normalized() {
        assert_eq!(
            normalize_sim_path("/sims/msfs2020/Packages/"),
            Path::new("/sims/msfs2020/Packages")
                .join("Community")
                .to_string_lossy()
        );
        assert_eq!(
            normalize_sim_path("/sims/msfs2020/Community///"),
            "/sims/msfs2020/Community"
        );
        assert_eq!(normalize_sim_path("  "), "");
    }

    #[test]
    fn test_community_dir_selects_by_simulator() {
        let settings = Settings {
            msfs2020_path: "/a/Community".into(),
            msfs2024_path: "/b/Community".into(),
            ..Default::default()
        };
        assert_eq!(
            settings.community_dir(Simulator::Fs20).unwrap(),
            PathBuf::from("/a/Community")
        );
        assert_eq!(
            settings.community_dir(Simulator::Fs24).unwrap(),
            PathBuf::from("/b/Community")
        );
    }
}
