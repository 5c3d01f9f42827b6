//! One complete update session.
//!
//! Orchestrates establish -> negotiate -> transfer -> verify over a single
//! connection, and closes that connection exactly once however the run ends.

use crate::error::Result;
use crate::ota::auth::md5_hex;
use crate::ota::connection::Connection;
use crate::ota::establish::establish;
use crate::ota::handshake::negotiate;
use crate::ota::progress::Reporter;
use crate::ota::protocol::{invitation, UpdateKind};
use crate::ota::transfer::send_image;
use crate::ota::verify::verify;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

/// Protocol wait and delay budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// TCP connect bound per attempt
    pub connect_timeout: Duration,
    /// Bounded "wait for data"
    pub data_timeout: Duration,
    /// Delay between connect+invite attempts
    pub retry_backoff: Duration,
    /// Pause after an `OK` invitation reply before draining the late notice
    pub invitation_settle: Duration,
    /// Pause before the first verification poll
    pub verify_grace: Duration,
    pub poll_interval: Duration,
    /// Consecutive empty polls before verification gives up
    pub silent_polls: u32,
    /// Pause between acknowledgment and reading the final reply
    pub verify_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            data_timeout: Duration::from_millis(1500),
            retry_backoff: Duration::from_millis(100),
            invitation_settle: Duration::from_millis(200),
            verify_grace: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            silent_polls: 100,
            verify_settle: Duration::from_millis(10),
        }
    }
}

impl Timings {
    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            data_timeout: Duration::from_millis(200),
            retry_backoff: Duration::from_millis(10),
            invitation_settle: Duration::from_millis(100),
            verify_grace: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            silent_polls: 20,
            verify_settle: Duration::from_millis(5),
        }
    }
}

/// Everything needed to push one image. Immutable once built.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub host: String,
    pub port: u16,
    pub kind: UpdateKind,
    /// Path of the image actually sent (after `.signed`/`.elf` rewriting)
    pub image_path: String,
    pub payload: Bytes,
    /// Lower-case hex MD5 of `payload`
    pub digest: String,
    pub password: Option<String>,
}

impl UpdateRequest {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        kind: UpdateKind,
        image_path: impl Into<String>,
        payload: Bytes,
        password: Option<String>,
    ) -> Self {
        let digest = md5_hex(&payload);
        Self {
            host: host.into(),
            port,
            kind,
            image_path: image_path.into(),
            payload,
            digest,
            password,
        }
    }

    /// Payload byte length
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn invitation(&self) -> String {
        invitation(self.kind, self.len(), &self.digest)
    }
}

/// Successful verdict.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub bytes_sent: usize,
    pub chunks_sent: usize,
    pub early_completion: bool,
    pub upload_elapsed: Duration,
    pub total_elapsed: Duration,
    /// Final device reply
    pub reply: String,
}

pub struct Session<'a> {
    request: &'a UpdateRequest,
    timings: Timings,
    reporter: &'a dyn Reporter,
}

impl<'a> Session<'a> {
    pub fn new(request: &'a UpdateRequest, timings: Timings, reporter: &'a dyn Reporter) -> Self {
        Self {
            request,
            timings,
            reporter,
        }
    }

    /// Run the full protocol. `Ok` is the success verdict.
    pub async fn run(&self) -> Result<SessionReport> {
        let started = Instant::now();
        let request = self.request;

        self.reporter
            .sending_request(request.kind, &request.host, request.port);
        let mut conn = establish(
            &request.host,
            request.port,
            request.invitation().as_bytes(),
            &self.timings,
            self.reporter,
        )
        .await?;

        let result = self.drive(&mut conn, started).await;
        conn.close().await;

        if let Ok(report) = &result {
            self.reporter.finished(report.total_elapsed);
        }
        result
    }

    async fn drive(&self, conn: &mut Connection, started: Instant) -> Result<SessionReport> {
        let request = self.request;

        negotiate(conn, request, &self.timings, self.reporter).await?;

        let head = &request.payload[..request.len().min(16)];
        self.reporter.upload_started(head, request.len());
        let summary = send_image(conn, &request.payload, &self.timings, self.reporter).await?;
        let upload_elapsed = summary.progress.elapsed();

        let reply = verify(conn, &self.timings, self.reporter).await?;

        Ok(SessionReport {
            bytes_sent: summary.progress.sent,
            chunks_sent: summary.progress.chunks,
            early_completion: summary.early_completion(),
            upload_elapsed,
            total_elapsed: started.elapsed(),
            reply,
        })
    }
}
