//! Background cleanup sweeper
//!
//! An owned repeating task that periodically runs [`Repository::sweep`].
//! Stopping it (explicitly or by drop) signals the thread, joins it, and
//! runs one final synchronous sweep so a clean shutdown leaves no obsolete
//! files behind that a pass could have retired.

use crate::error::{Error, Result};
use crate::repo::Repository;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Cleanup scheduling configuration.
#[derive(Debug, Clone)]
pub struct CleanupSettings {
    /// Interval between sweeps. `None` disables background cleanup
    /// entirely; no thread is spawned.
    pub cleanup_period: Option<Duration>,
    /// Minimum time an expired entry stays on disk past its expiration
    /// before a sweep may delete it. Must exceed realistic read latency so a
    /// sweep never deletes a winner out from under an in-flight read.
    /// `None` keeps expired current entries forever.
    pub guaranty_file_lifetime: Option<Duration>,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            cleanup_period: Some(Duration::from_secs(2)),
            guaranty_file_lifetime: Some(Duration::from_secs(5)),
        }
    }
}

impl CleanupSettings {
    /// Settings that never sweep and never delete expired entries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            cleanup_period: None,
            guaranty_file_lifetime: None,
        }
    }
}

struct SweeperInner {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Owned background sweep task over one repository.
pub struct CleanupSweeper {
    repo: Arc<Repository>,
    grace: Option<Duration>,
    inner: Mutex<Option<SweeperInner>>,
}

impl CleanupSweeper {
    /// Start sweeping `repo` on the configured period.
    ///
    /// With a `None` period the sweeper is inert: no thread runs and
    /// [`stop`](Self::stop) does nothing.
    ///
    /// # Errors
    ///
    /// Fails when the background thread cannot be spawned.
    pub fn start(repo: Arc<Repository>, settings: &CleanupSettings) -> Result<Self> {
        let grace = settings.guaranty_file_lifetime;
        let inner = match settings.cleanup_period {
            Some(period) => {
                let (stop, stop_rx) = mpsc::channel::<()>();
                let sweep_repo = Arc::clone(&repo);
                let thread = std::thread::Builder::new()
                    .name("filecache-sweeper".to_string())
                    .spawn(move || {
                        loop {
                            match stop_rx.recv_timeout(period) {
                                Err(RecvTimeoutError::Timeout) => sweep_repo.sweep(grace),
                                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                            }
                        }
                    })
                    .map_err(|e| {
                        Error::configuration(format!("failed to spawn sweeper thread: {e}"))
                    })?;
                Some(SweeperInner { stop, thread })
            }
            None => None,
        };

        Ok(Self {
            repo,
            grace,
            inner: Mutex::new(inner),
        })
    }

    /// Stop the background task and run one final synchronous sweep.
    ///
    /// Idempotent; later calls are no-ops.
    pub fn stop(&self) {
        let Some(inner) = self.inner.lock().take() else {
            return;
        };
        // A dead receiver just means the thread already exited.
        let _ = inner.stop.send(());
        if inner.thread.join().is_err() {
            tracing::warn!("sweeper thread panicked");
        }
        self.repo.sweep(self.grace);
    }
}

impl Drop for CleanupSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
