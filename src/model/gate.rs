//! Single-flight guard for model pulls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Tracks whether a model pull is running: `Idle` or `Downloading`.
#[derive(Debug, Clone, Default)]
pub struct DownloadGate {
    downloading: Arc<AtomicBool>,
}

impl DownloadGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move from `Idle` to `Downloading`.
    ///
    /// The returned ticket moves the gate back to `Idle` when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadInProgress`] if a pull is already running.
    pub fn try_begin(&self) -> Result<DownloadTicket> {
        self.downloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::DownloadInProgress)?;

        Ok(DownloadTicket {
            downloading: Arc::clone(&self.downloading),
        })
    }

    /// Whether a pull currently holds the gate.
    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the `Downloading` state.
#[derive(Debug)]
#[must_use = "dropping the ticket ends the download immediately"]
pub struct DownloadTicket {
    downloading: Arc<AtomicBool>,
}

impl DownloadTicket {
    /// Return the gate to `Idle`.
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for DownloadTicket {
    fn drop(&mut self) {
        self.downloading.store(false, Ordering::Release);
    }
}
