//! Stream-ready watcher
//!
//! Observes the output directory for a bounded window and fires once when the
//! expected manifest shows up. The scan and the window timer race inside one
//! task; whichever finishes first wins and the other is dropped. Dotfiles are
//! ignored.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How an observation finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Expected file appeared
    Ready(PathBuf),
    /// Window elapsed without a match
    TimedOut,
    /// Disarmed or replaced by a newer observation
    Cancelled,
}

struct ArmedWatch {
    generation: u64,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

/// Single-slot directory watcher with a deadline
///
/// The directory is scanned every `poll_interval`, so a manifest is noticed
/// at most one interval after it is written (250 ms by default).
pub struct StreamReadyWatcher {
    poll_interval: Duration,
    generation: AtomicU64,
    slot: Arc<Mutex<Option<ArmedWatch>>>,
}

impl StreamReadyWatcher {
    /// Create a watcher that scans every `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            generation: AtomicU64::new(0),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Start observing `dir` for `expected`.
    ///
    /// Any previous observation is cancelled first. `on_ready` runs at most
    /// once, and never after [`disarm`](Self::disarm) has returned.
    pub async fn arm<F>(&self, dir: &Path, expected: &str, window: Duration, on_ready: F)
    where
        F: FnOnce(PathBuf) + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            debug!(generation = previous.generation, "Replacing armed watch");
            previous.cancel.cancel();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        let task = tokio::spawn(observe(
            Arc::clone(&self.slot),
            generation,
            cancel.clone(),
            dir.to_path_buf(),
            expected.to_string(),
            window,
            self.poll_interval,
            on_ready,
        ));

        debug!(
            generation,
            dir = %dir.display(),
            expected,
            window_ms = window.as_millis() as u64,
            "Watching for stream start"
        );

        *slot = Some(ArmedWatch {
            generation,
            cancel,
            _task: task,
        });
    }

    /// Stop observing. Safe to call repeatedly or when never armed.
    pub async fn disarm(&self) {
        if let Some(armed) = self.slot.lock().await.take() {
            debug!(generation = armed.generation, "Watch disarmed");
            armed.cancel.cancel();
        }
    }

    /// True while an observation is in progress
    pub async fn is_armed(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

impl Default for StreamReadyWatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[allow(clippy::too_many_arguments)]
async fn observe<F>(
    slot: Arc<Mutex<Option<ArmedWatch>>>,
    generation: u64,
    cancel: CancellationToken,
    dir: PathBuf,
    expected: String,
    window: Duration,
    poll_interval: Duration,
    on_ready: F,
) where
    F: FnOnce(PathBuf) + Send + 'static,
{
    let outcome = tokio::select! {
        _ = cancel.cancelled() => WatchOutcome::Cancelled,
        _ = tokio::time::sleep(window) => WatchOutcome::TimedOut,
        path = scan_until_present(&dir, &expected, poll_interval) => WatchOutcome::Ready(path),
    };

    // Whoever takes the slot owns the outcome; a concurrent disarm wins ties.
    {
        let mut slot = slot.lock().await;
        let owned = matches!(slot.as_ref(), Some(armed) if armed.generation == generation);
        if !owned {
            return;
        }
        slot.take();
    }

    match outcome {
        WatchOutcome::Ready(path) => {
            info!(path = %path.display(), "Stream output is available");
            on_ready(path);
        }
        WatchOutcome::TimedOut => {
            debug!(generation, "Stream watch window elapsed without a match");
        }
        WatchOutcome::Cancelled => {}
    }
}

async fn scan_until_present(dir: &Path, expected: &str, poll_interval: Duration) -> PathBuf {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if let Some(path) = find_entry(dir, expected).await {
            return path;
        }
    }
}

async fn find_entry(dir: &Path, expected: &str) -> Option<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Output directory not readable yet");
            return None;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if name == expected {
            return Some(entry.path());
        }
    }

    None
}
