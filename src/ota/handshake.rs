//! Invitation reply handling and optional authentication.

use crate::error::{OtaError, Result};
use crate::ota::auth::AuthChallenge;
use crate::ota::connection::Connection;
use crate::ota::progress::Reporter;
use crate::ota::protocol::{auth_response, InvitationReply, ACCEPT_TOKEN};
use crate::ota::session::{Timings, UpdateRequest};

/// Interpret the buffered invitation reply and authenticate if asked.
///
/// Returns once the device is ready for the first chunk.
pub async fn negotiate(
    conn: &mut Connection,
    request: &UpdateRequest,
    timings: &Timings,
    reporter: &dyn Reporter,
) -> Result<()> {
    let reply = conn.read_all_text();

    match InvitationReply::parse(&reply) {
        InvitationReply::Accepted => {
            // Devices emit a second, late ready notice; drop it
            tokio::time::sleep(timings.invitation_settle).await;
            let late = conn.read_all();
            if !late.is_empty() {
                tracing::debug!("Discarded {} bytes after invitation", late.len());
            }
            Ok(())
        }
        InvitationReply::AuthRequired { nonce } => {
            let password = match request.password.as_deref() {
                Some(password) if !password.is_empty() => password,
                _ => return Err(OtaError::PasswordRequired),
            };
            let nonce = nonce.ok_or(OtaError::InvalidInvitationResponse(reply))?;
            authenticate(conn, request, password, &nonce, timings, reporter).await
        }
        InvitationReply::Unexpected(raw) => Err(OtaError::InvalidInvitationResponse(raw)),
    }
}

async fn authenticate(
    conn: &mut Connection,
    request: &UpdateRequest,
    password: &str,
    nonce: &str,
    timings: &Timings,
    reporter: &dyn Reporter,
) -> Result<()> {
    let auth = AuthChallenge::new(
        &request.image_path,
        request.len(),
        &request.digest,
        &request.host,
        password,
        nonce,
    );
    tracing::debug!("Authenticating with cnonce {}", auth.cnonce);

    reporter.authenticating();
    conn.write(auth_response(&auth.cnonce, &auth.challenge).as_bytes())
        .await?;

    let reply = match conn.wait_for(1, timings.data_timeout).await {
        Ok(()) => conn.read_all_text(),
        Err(OtaError::DataTimeout { .. }) | Err(OtaError::PeerClosed { .. }) => String::new(),
        Err(e) => return Err(e),
    };

    if reply == ACCEPT_TOKEN {
        reporter.authenticated(true);
        return Ok(());
    }

    reporter.authenticated(false);
    Err(OtaError::AuthenticationRejected {
        reply: (!reply.is_empty()).then_some(reply),
    })
}
