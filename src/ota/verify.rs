//! Post-transfer verification.
//!
//! The device writes stray progress digits before its verdict and may take
//! several seconds to commit the image, so the connection is polled on a
//! fixed interval with a silence budget instead of a single bounded wait.

use crate::error::{OtaError, Result};
use crate::ota::connection::Connection;
use crate::ota::progress::Reporter;
use crate::ota::protocol::{is_verification_noise, ACCEPT_TOKEN};
use crate::ota::session::Timings;

/// Polls between progress ticks
const TICK_EVERY: u32 = 10;

/// Wait for the device's final verdict and check it.
///
/// Returns the raw reply on success.
pub async fn verify(
    conn: &Connection,
    timings: &Timings,
    reporter: &dyn Reporter,
) -> Result<String> {
    reporter.verifying();
    tokio::time::sleep(timings.verify_grace).await;

    let mut silent = 0u32;
    let mut polls = 0u32;
    loop {
        if polls % TICK_EVERY == 0 {
            reporter.verify_tick();
        }
        polls += 1;

        tokio::time::sleep(timings.poll_interval).await;

        if conn.available() == 0 {
            silent += 1;
            if silent >= timings.silent_polls {
                reporter.verified(false);
                return Err(OtaError::VerificationTimeout);
            }
            continue;
        }
        silent = 0;

        if skip_noise(conn) {
            break;
        }
    }

    tokio::time::sleep(timings.verify_settle).await;
    let reply = conn.read_all_text();
    let ok = reply.contains(ACCEPT_TOKEN);
    reporter.verified(ok);

    if ok {
        Ok(reply)
    } else {
        Err(OtaError::UploadVerificationFailed(reply))
    }
}

/// Drop leading noise bytes. True once a meaningful byte is at the front.
fn skip_noise(conn: &Connection) -> bool {
    loop {
        match conn.peek(1).first() {
            Some(&byte) if is_verification_noise(byte) => {
                conn.read(1);
            }
            Some(_) => return true,
            None => return false,
        }
    }
}
