//! Connection establishment with bounded retry.
//!
//! One attempt = TCP connect + invitation write + wait for the first reply
//! byte. Any failure in that cycle closes the socket, backs off, and retries.

use crate::error::{OtaError, Result};
use crate::ota::connection::Connection;
use crate::ota::progress::Reporter;
use crate::ota::protocol::MAX_CONNECT_ATTEMPTS;
use crate::ota::session::Timings;

/// Connect to `host:port` and deliver `invitation`.
///
/// On success the returned connection has the invitation sent and at least
/// one reply byte buffered.
pub async fn establish(
    host: &str,
    port: u16,
    invitation: &[u8],
    timings: &Timings,
    reporter: &dyn Reporter,
) -> Result<Connection> {
    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        if attempt > 1 {
            reporter.retrying(attempt);
        }

        match attempt_once(host, port, invitation, timings).await {
            Ok(conn) => {
                if attempt > 1 {
                    reporter.connect_outcome(true);
                }
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(
                    "Connection attempt {}/{} to {}:{} failed: {}",
                    attempt,
                    MAX_CONNECT_ATTEMPTS,
                    host,
                    port,
                    e
                );
                if attempt < MAX_CONNECT_ATTEMPTS {
                    tokio::time::sleep(timings.retry_backoff).await;
                }
            }
        }
    }

    reporter.connect_outcome(false);
    Err(OtaError::ConnectionExhausted {
        host: host.to_string(),
        port,
        attempts: MAX_CONNECT_ATTEMPTS,
    })
}

async fn attempt_once(
    host: &str,
    port: u16,
    invitation: &[u8],
    timings: &Timings,
) -> Result<Connection> {
    let mut conn = Connection::connect(host, port, timings.connect_timeout).await?;

    let handshake = async {
        conn.write(invitation).await?;
        conn.wait_for(1, timings.data_timeout).await
    }
    .await;

    match handshake {
        Ok(()) => Ok(conn),
        Err(e) => {
            conn.close().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RetryLog {
        retries: AtomicU32,
        outcome: std::sync::Mutex<Option<bool>>,
    }

    impl Reporter for RetryLog {
        fn retrying(&self, _attempt: u32) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn connect_outcome(&self, connected: bool) {
            *self.outcome.lock().unwrap() = Some(connected);
        }
    }

    #[tokio::test]
    async fn test_establish_first_try() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = sock.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"0 3 abc\n");
            sock.write_all(b"OK").await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let log = RetryLog::default();
        let conn = establish("127.0.0.1", port, b"0 3 abc\n", &Timings::fast(), &log).await?;

        assert_eq!(conn.read_all_text(), "OK");
        assert_eq!(log.retries.load(Ordering::SeqCst), 0);
        assert_eq!(*log.outcome.lock().unwrap(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_establish_retries_until_device_answers() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        tokio::spawn(async move {
            // First two sessions are dropped without a reply
            for _ in 0..2 {
                let (sock, _) = listener.accept().await.unwrap();
                drop(sock);
            }
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"OK").await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let log = RetryLog::default();
        let conn = establish("127.0.0.1", port, b"0 1 x\n", &Timings::fast(), &log).await?;

        assert_eq!(conn.read_all_text(), "OK");
        assert_eq!(log.retries.load(Ordering::SeqCst), 2);
        assert_eq!(*log.outcome.lock().unwrap(), Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn test_establish_gives_up_after_ten_attempts() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let accepted = Arc::new(AtomicU32::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (sock, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                drop(sock);
            }
        });

        let log = RetryLog::default();
        let err = establish("127.0.0.1", port, b"0 1 x\n", &Timings::fast(), &log)
            .await
            .unwrap_err();

        match err {
            OtaError::ConnectionExhausted {
                host,
                port: p,
                attempts,
            } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(p, port);
                assert_eq!(attempts, 10);
            }
            other => panic!("Expected ConnectionExhausted, got {:?}", other),
        }
        assert_eq!(log.retries.load(Ordering::SeqCst), 9);
        assert_eq!(*log.outcome.lock().unwrap(), Some(false));

        // No 11th attempt shows up later
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_establish_retries_silent_device() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        tokio::spawn(async move {
            // First session stays open but never answers
            let (mut mute, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = mute.read(&mut buf).await.unwrap();

            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"OK").await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(mute);
        });

        let timings = Timings::fast();
        let log = RetryLog::default();
        let start = std::time::Instant::now();
        let conn = establish("127.0.0.1", port, b"0 1 x\n", &timings, &log).await?;

        assert!(start.elapsed() >= timings.data_timeout);
        assert_eq!(conn.read_all_text(), "OK");
        assert_eq!(log.retries.load(Ordering::SeqCst), 1);
        assert_eq!(*log.outcome.lock().unwrap(), Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn test_establish_refused() -> anyhow::Result<()> {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            listener.local_addr()?.port()
        };

        let err = establish("127.0.0.1", port, b"0 1 x\n", &Timings::fast(), &crate::ota::Silent)
            .await
            .unwrap_err();

        assert!(matches!(err, OtaError::ConnectionExhausted { attempts: 10, .. }));
        Ok(())
    }
}
