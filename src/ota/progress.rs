//! Progress tracking and the reporting seam.
//!
//! Nothing here feeds back into the protocol; reporters only observe.

use crate::ota::protocol::UpdateKind;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

/// Running transfer totals.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Bytes written so far
    pub sent: usize,
    /// Payload length
    pub total: usize,
    /// Chunks written so far
    pub chunks: usize,
    started: Instant,
}

impl TransferProgress {
    pub fn new(total: usize) -> Self {
        Self {
            sent: 0,
            total,
            chunks: 0,
            started: Instant::now(),
        }
    }

    pub fn advance(&mut self, len: usize) {
        self.sent += len;
        self.chunks += 1;
    }

    /// Filled positions out of `total_bars`.
    pub fn bar_position(&self, total_bars: u64) -> u64 {
        if self.total == 0 {
            return total_bars;
        }
        (self.sent as u64 * total_bars) / self.total as u64
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Observer for user-facing progress. Every hook defaults to a no-op.
pub trait Reporter: Send + Sync {
    fn signed_image(&self, _path: &Path) {}

    fn converting_elf(&self, _path: &Path) {}

    fn sending_request(&self, _kind: UpdateKind, _host: &str, _port: u16) {}

    /// Called before connect attempt `attempt` (1-based) when `attempt > 1`.
    fn retrying(&self, _attempt: u32) {}

    /// Called once establishment ends, only if at least one retry happened.
    fn connect_outcome(&self, _connected: bool) {}

    fn authenticating(&self) {}

    fn authenticated(&self, _ok: bool) {}

    fn upload_started(&self, _head: &[u8], _total: usize) {}

    fn chunk_sent(&self, _progress: &TransferProgress) {}

    fn upload_finished(&self, _progress: &TransferProgress) {}

    fn verifying(&self) {}

    fn verify_tick(&self) {}

    fn verified(&self, _ok: bool) {}

    fn finished(&self, _elapsed: Duration) {}
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Reporter for Silent {}
