//! Buffered byte-stream connection to the device.
//!
//! A background task drains the socket into an owned inbound buffer; the
//! protocol only ever looks at that buffer. All buffer operations are
//! synchronous. `wait_for` is the single suspension point on the read side
//! and is a condition wait with a deadline, not a poll.

use crate::error::{OtaError, Result};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Read size for the background delivery task
const READ_BUF_SIZE: usize = 4096;

/// Writes longer than this are logged by size only
const TRACE_PREVIEW_LIMIT: usize = 80;

#[derive(Debug, Default)]
struct Inbound {
    buf: BytesMut,
    eof: bool,
}

#[derive(Debug, Default)]
struct Shared {
    inbound: Mutex<Inbound>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inbound> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, data: &[u8]) {
        self.lock().buf.extend_from_slice(data);
        self.notify.notify_waiters();
    }

    fn mark_eof(&self) {
        self.lock().eof = true;
        self.notify.notify_waiters();
    }
}

/// One live duplex channel plus its inbound FIFO.
pub struct Connection {
    peer: String,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Open a TCP connection, bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {}:{} timed out", host, port),
                )
            })??;
        stream.set_nodelay(true)?;
        tracing::debug!("Connecting to {}:{} SUCCESS", host, port);
        Ok(Self::from_stream(stream, format!("{}:{}", host, port)))
    }

    /// Wrap any duplex stream. Spawns the delivery task, so this must run
    /// inside a tokio runtime.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(deliver(read_half, shared.clone(), peer.clone()));

        Self {
            peer,
            writer: Some(Box::new(write_half)),
            shared,
            reader: Some(reader),
        }
    }

    /// `host:port` of the remote end
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write raw bytes and flush.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "connection closed")
        })?;

        if data.len() <= TRACE_PREVIEW_LIMIT {
            tracing::debug!("> TO {} {:?}", self.peer, String::from_utf8_lossy(data));
        } else {
            tracing::debug!("> TO {} <{} bytes>", self.peer, data.len());
        }

        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Remove and return up to `size` bytes from the front.
    pub fn read(&self, size: usize) -> Bytes {
        let mut inbound = self.shared.lock();
        let n = size.min(inbound.buf.len());
        inbound.buf.split_to(n).freeze()
    }

    /// Remove bytes up to and including `delimiter`, or everything if absent.
    pub fn read_until(&self, delimiter: &[u8]) -> Bytes {
        let mut inbound = self.shared.lock();
        let n = find(&inbound.buf, delimiter)
            .map(|idx| idx + delimiter.len())
            .unwrap_or(inbound.buf.len());
        inbound.buf.split_to(n).freeze()
    }

    /// The next `size` bytes (or fewer) without consuming them.
    pub fn peek(&self, size: usize) -> Bytes {
        let inbound = self.shared.lock();
        let n = size.min(inbound.buf.len());
        Bytes::copy_from_slice(&inbound.buf[..n])
    }

    pub fn peek_all(&self) -> Bytes {
        Bytes::copy_from_slice(&self.shared.lock().buf)
    }

    /// Drain the whole buffer.
    pub fn read_all(&self) -> Bytes {
        self.shared.lock().buf.split().freeze()
    }

    /// Drain the whole buffer as text.
    pub fn read_all_text(&self) -> String {
        String::from_utf8_lossy(&self.read_all()).into_owned()
    }

    /// Buffered-but-unread byte count
    pub fn available(&self) -> usize {
        self.shared.lock().buf.len()
    }

    /// Suspend until at least `size` bytes are buffered.
    ///
    /// Fails with `DataTimeout` once `timeout` elapses, or with `PeerClosed`
    /// as soon as the transport hits EOF without enough data.
    pub async fn wait_for(&self, size: usize, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a delivery in between is not lost
            notified.as_mut().enable();

            {
                let inbound = self.shared.lock();
                if inbound.buf.len() >= size {
                    return Ok(());
                }
                if inbound.eof {
                    return Err(OtaError::PeerClosed {
                        peer: self.peer.clone(),
                    });
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(OtaError::DataTimeout {
                    peer: self.peer.clone(),
                    size,
                });
            }
        }
    }

    /// Close the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("shutdown of {} failed: {}", self.peer, e);
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Background delivery path: socket -> inbound buffer.
async fn deliver<R>(mut reader: R, shared: Arc<Shared>, peer: String)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                tracing::debug!("< FROM {} {:?}", peer, String::from_utf8_lossy(&buf[..n]));
                shared.deliver(&buf[..n]);
            }
            Err(e) => {
                tracing::debug!("read from {} failed: {}", peer, e);
                break;
            }
        }
    }
    shared.mark_eof();
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
