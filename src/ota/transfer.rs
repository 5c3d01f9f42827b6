//! Chunked image transfer with per-chunk acknowledgment.

use crate::error::{OtaError, Result};
use crate::ota::connection::Connection;
use crate::ota::progress::{Reporter, TransferProgress};
use crate::ota::protocol::{chunk_plan, ChunkAck};
use crate::ota::session::Timings;

/// What the device said about one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Echoed the chunk length
    Acknowledged,
    /// Nothing arrived within the wait; allowed
    Silent,
    /// Device reported it is done; stop sending
    EarlyCompletion,
}

/// Result of the transfer loop.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub progress: TransferProgress,
    pub outcomes: Vec<ChunkOutcome>,
}

impl TransferSummary {
    pub fn early_completion(&self) -> bool {
        self.outcomes.last() == Some(&ChunkOutcome::EarlyCompletion)
    }
}

/// Stream `payload` in fixed-size chunks.
pub async fn send_image(
    conn: &mut Connection,
    payload: &[u8],
    timings: &Timings,
    reporter: &dyn Reporter,
) -> Result<TransferSummary> {
    let mut progress = TransferProgress::new(payload.len());
    let mut outcomes = Vec::new();

    for chunk in chunk_plan(payload.len()) {
        conn.write(chunk.slice(payload)).await?;

        let outcome = match conn.wait_for(1, timings.data_timeout).await {
            Ok(()) => {
                let reply = conn.read_all_text();
                match ChunkAck::parse(&reply, chunk.len) {
                    ChunkAck::Matched => ChunkOutcome::Acknowledged,
                    ChunkAck::EarlyCompletion => ChunkOutcome::EarlyCompletion,
                    ChunkAck::Mismatch { received, expected } => {
                        return Err(OtaError::BadChunkResponse { received, expected });
                    }
                }
            }
            Err(OtaError::DataTimeout { .. }) => {
                tracing::debug!("No acknowledgment for chunk at offset {}", chunk.offset);
                ChunkOutcome::Silent
            }
            Err(e) => return Err(e),
        };

        progress.advance(chunk.len);
        outcomes.push(outcome);
        reporter.chunk_sent(&progress);

        if outcome == ChunkOutcome::EarlyCompletion {
            tracing::debug!(
                "Device signaled completion after {} of {} bytes",
                progress.sent,
                progress.total
            );
            break;
        }
    }

    reporter.upload_finished(&progress);
    Ok(TransferSummary { progress, outcomes })
}
