//! Progress event channel between the install pipeline and its consumers.
//!
//! The orchestrator publishes events; the UI layer (or a test) subscribes to
//! the receiving end. This keeps the pipeline free of any rendering concern
//! and makes progress assertable headlessly.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One progress tick for an in-flight transfer or extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub livery_name: String,
    /// Rounded percentage, only when the total size is known.
    pub percent: Option<u8>,
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Set on the single hand-off event before extraction begins, so a
    /// consumer can switch from a percentage bar to an indeterminate one.
    pub extracting: bool,
}

/// Snapshot of one in-flight operation, keyed by livery name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub percent: Option<u8>,
    pub transferred: u64,
    pub total: Option<u64>,
    pub extracting: bool,
}

/// Publisher side of the progress channel plus the in-flight map.
///
/// Entries exist only for the duration of one download/extract cycle and are
/// discarded when the operation settles.
pub struct ProgressTracker {
    events: mpsc::UnboundedSender<ProgressEvent>,
    in_flight: Mutex<HashMap<String, DownloadProgress>>,
}

impl ProgressTracker {
    /// Create a tracker and the receiver a consumer subscribes to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            events: tx,
            in_flight: Mutex::new(HashMap::new()),
        };
        (tracker, rx)
    }

    /// Record transferred bytes and publish a download tick.
    ///
    /// Percent is `round(transferred / total * 100)` when the total is
    /// known; otherwise only raw byte counts are carried.
    pub fn update_download(&self, livery_name: &str, transferred: u64, total: Option<u64>) {
        let percent = total.filter(|t| *t > 0).map(|t| {
            let pct = (transferred as f64 / t as f64 * 100.0).round();
            pct.min(100.0) as u8
        });

        let snapshot = DownloadProgress {
            percent,
            transferred,
            total,
            extracting: false,
        };
        self.in_flight
            .lock()
            .unwrap()
            .insert(livery_name.to_string(), snapshot);

        // A dropped receiver just means nobody is listening; not an error.
        let _ = self.events.send(ProgressEvent {
            livery_name: livery_name.to_string(),
            percent,
            downloaded: transferred,
            total,
            extracting: false,
        });
    }

    /// Reset an in-flight entry to zero at the start of a retry attempt.
    pub fn reset(&self, livery_name: &str) {
        self.in_flight
            .lock()
            .unwrap()
            .insert(livery_name.to_string(), DownloadProgress::default());
    }

    /// Publish the single hand-off event before extraction begins.
    pub fn begin_extracting(&self, livery_name: &str, total: Option<u64>) {
        let transferred = total.unwrap_or_default();
        self.in_flight.lock().unwrap().insert(
            livery_name.to_string(),
            DownloadProgress {
                percent: Some(100),
                transferred,
                total,
                extracting: true,
            },
        );

        let _ = self.events.send(ProgressEvent {
            livery_name: livery_name.to_string(),
            percent: Some(100),
            downloaded: transferred,
            total,
            extracting: true,
        });
    }

    /// Discard the in-flight entry once the operation settles.
    pub fn finish(&self, livery_name: &str) {
        self.in_flight.lock().unwrap().remove(livery_name);
    }

    /// Current snapshot for a livery, if one is in flight.
    pub fn snapshot(&self, livery_name: &str) -> Option<DownloadProgress> {
        self.in_flight.lock().unwrap().get(livery_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds() {
        let (tracker, mut rx) = ProgressTracker::channel();
        tracker.update_download("L1", 333, Some(1000));
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.percent, Some(33));

        tracker.update_download("L1", 335, Some(1000));
        let ev = rx.try_recv().unwrap();
        // 33.5 rounds up
        assert_eq!(ev.percent, Some(34));
    }

    #[test]
    fn test_no_percent_without_total() {
        let (tracker, mut rx) = ProgressTracker::channel();
        tracker.update_download("L1", 512, None);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.percent, None);
        assert_eq!(ev.downloaded, 512);
    }

    #[test]
    fn test_extracting_event_shape() {
        let (tracker, mut rx) = ProgressTracker::channel();
        tracker.begin_extracting("L1", Some(1000));
        let ev = rx.try_recv().unwrap();
        assert!(ev.extracting);
        assert_eq!(ev.percent, Some(100));
    }

    #[test]
    fn test_finish_discards_in_flight_entry() {
        let (tracker, _rx) = ProgressTracker::channel();
        tracker.update_download("L1", 10, Some(100));
        assert!(tracker.snapshot("L1").is_some());
        tracker.finish("L1");
        assert!(tracker.snapshot("L1").is_none());
    }

    #[test]
    fn test_events_survive_dropped_receiver() {
        let (tracker, rx) = ProgressTracker::channel();
        drop(rx);
        // Must not panic or error when nobody listens.
        tracker.update_download("L1", 10, Some(100));
        tracker.begin_extracting("L1", Some(100));
        tracker.finish("L1");
    }

    #[test]
    fn test_independent_entries_per_livery() {
        let (tracker, _rx) = ProgressTracker::channel();
        tracker.update_download("L1", 10, Some(100));
        tracker.update_download("L2", 90, Some(100));
        assert_eq!(tracker.snapshot("L1").unwrap().percent, Some(10));
        assert_eq!(tracker.snapshot("L2").unwrap().percent, Some(90));
    }
}
