//! Streaming archive download with bounded retries.
//!
//! Failed attempts never leave partial files behind and never resume: each
//! retry deletes the partial, resets progress and starts the transfer from
//! byte zero.

use crate::api::{ApiError, HttpClient};
use crate::progress::ProgressTracker;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Maximum transfer attempts for one archive.
const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Backoff unit between attempts; multiplied by the attempt number.
const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(800);

/// Minimum interval between progress emissions when the total size is
/// unknown and percent-change cannot gate them.
const PROGRESS_THROTTLE: Duration = Duration::from_millis(250);

/// Download `url` to `dest`, retrying up to [`DOWNLOAD_ATTEMPTS`] times.
///
/// Returns the number of bytes written. On failure the partial file at
/// `dest` has been removed, including after the final attempt.
pub async fn download_with_retry(
    http: &HttpClient,
    url: &str,
    dest: &Path,
    progress: &ProgressTracker,
    livery_name: &str,
) -> Result<u64, ApiError> {
    let mut last_err = None;

    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        if attempt > 1 {
            remove_partial(dest);
            progress.reset(livery_name);
            let delay = RETRY_BACKOFF_STEP * (attempt - 1);
            debug!("Retrying download in {:?} (attempt {}/{})", delay, attempt, DOWNLOAD_ATTEMPTS);
            tokio::time::sleep(delay).await;
        }

        match download_once(http, url, dest, progress, livery_name).await {
            Ok(written) => return Ok(written),
            Err(e) => {
                warn!("Download attempt {}/{} failed: {}", attempt, DOWNLOAD_ATTEMPTS, e);
                last_err = Some(e);
            }
        }
    }

    remove_partial(dest);
    Err(last_err.unwrap_or_else(|| {
        ApiError::Io(std::io::Error::other("download failed with no attempts made"))
    }))
}

/// One streaming transfer from byte zero into a freshly created `dest`.
async fn download_once(
    http: &HttpClient,
    url: &str,
    dest: &Path,
    progress: &ProgressTracker,
    livery_name: &str,
) -> Result<u64, ApiError> {
    let response = http.get_download(url).await?;
    let total = response.content_length().filter(|t| *t > 0);

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut last_percent: Option<u8> = None;
    let mut last_emit = tokio::time::Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;

        // Emit on whole-percent change, or time-throttled when total unknown
        let should_emit = match total {
            Some(t) => {
                let percent = ((written as f64 / t as f64) * 100.0).round().min(100.0) as u8;
                let changed = last_percent != Some(percent);
                if changed {
                    last_percent = Some(percent);
                }
                changed
            }
            None => last_emit.elapsed() >= PROGRESS_THROTTLE,
        };

        if should_emit {
            progress.update_download(livery_name, written, total);
            last_emit = tokio::time::Instant::now();
        }
    }

    file.flush().await?;
    progress.update_download(livery_name, written, total);

    debug!("Downloaded {} bytes to {:?}", written, dest);
    Ok(written)
}

fn remove_partial(dest: &Path) {
    if dest.exists() {
        if let Err(e) = std::fs::remove_file(dest) {
            warn!("Could not remove partial download {:?}: {}", dest, e);
        }
    }
}
