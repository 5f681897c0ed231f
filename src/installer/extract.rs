//! Archive extraction with a native-tool strategy and a library fallback.
//!
//! The platform's own extraction tool is preferred when present (it handles
//! large archives faster and with less memory), and the pure-Rust zip
//! library covers machines without one. Strategies are tried in order and
//! the last failure is surfaced when all of them fail.

use crate::paths::sanitize_relative_path;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

/// One way of unpacking an archive into a destination directory.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can run on the current machine.
    fn available(&self) -> bool;

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Child-process extraction via the platform's native tool.
pub struct NativeToolExtractor;

#[async_trait]
impl ExtractStrategy for NativeToolExtractor {
    fn name(&self) -> &'static str {
        "native tool"
    }

    #[cfg(windows)]
    fn available(&self) -> bool {
        which::which("powershell").is_ok()
    }

    #[cfg(not(windows))]
    fn available(&self) -> bool {
        which::which("unzip").is_ok()
    }

    #[cfg(windows)]
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let output = tokio::process::Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(format!(
                "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
                archive.display(),
                dest.display()
            ))
            .output()
            .await
            .context("Failed to run powershell Expand-Archive")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Expand-Archive exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(())
    }

    #[cfg(not(windows))]
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let output = tokio::process::Command::new("unzip")
            .arg("-o")
            .arg(archive)
            .arg("-d")
            .arg(dest)
            .output()
            .await
            .context("Failed to run unzip")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("unzip exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(())
    }
}

/// In-process extraction with the zip library.
///
/// Entry paths are sanitized; entries that escape the destination (absolute
/// paths, `..` components) are skipped with a warning rather than written.
pub struct LibraryExtractor;

#[async_trait]
impl ExtractStrategy for LibraryExtractor {
    fn name(&self) -> &'static str {
        "zip library"
    }

    fn available(&self) -> bool {
        true
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || extract_zip_blocking(&archive, &dest))
            .await
            .context("Extraction task panicked")?
    }
}

fn extract_zip_blocking(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)
        .with_context(|| format!("Failed to open archive {:?}", archive))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read archive {:?}", archive))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).context("Failed to read archive entry")?;

        let Some(raw_path) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let Some(rel_path) = sanitize_relative_path(&raw_path) else {
            warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };

        let out_path = dest.join(rel_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {:?}", out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let mut out = std::fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {:?}", out_path))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to write {:?}", out_path))?;
    }

    Ok(())
}

/// Extract `archive` into `dest`, trying each available strategy in order.
pub async fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let strategies: Vec<Box<dyn ExtractStrategy>> =
        vec![Box::new(NativeToolExtractor), Box::new(LibraryExtractor)];

    let mut last_err = None;
    for strategy in &strategies {
        if !strategy.available() {
            debug!("Extraction strategy '{}' not available, skipping", strategy.name());
            continue;
        }

        debug!("Extracting {:?} with '{}'", archive, strategy.name());
        match strategy.extract(archive, dest).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("Extraction strategy '{}' failed: {:#}", strategy.name(), e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no extraction strategy available")))
        .context("all extraction strategies failed")
}
