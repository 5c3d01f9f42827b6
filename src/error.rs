//! Error types for the OTA uploader.
//!
//! Every failure is fatal to the session; the binary maps each variant to a
//! one-line diagnostic and an exit status.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OtaError {
    /// Every connect+invite cycle failed
    #[error("Failed to connect to {host}:{port} after {attempts} attempts")]
    ConnectionExhausted {
        host: String,
        port: u16,
        attempts: u32,
    },

    /// No bytes arrived within the bounded wait
    #[error("Timeout while waiting for {peer} to receive {size} bytes of data")]
    DataTimeout { peer: String, size: usize },

    /// Transport reached EOF while a wait was outstanding
    #[error("Connection closed by {peer}")]
    PeerClosed { peer: String },

    /// Peer stayed silent during the completion poll
    #[error("No response from target")]
    VerificationTimeout,

    #[error("Bad invitation response: {0:?}")]
    InvalidInvitationResponse(String),

    #[error("Target requires authentication. Please provide the password with [-a] / [--auth]")]
    PasswordRequired,

    #[error("{}", auth_rejected_message(.reply))]
    AuthenticationRejected { reply: Option<String> },

    #[error("Bad response: {received:?} (expected: {expected:?})")]
    BadChunkResponse { received: String, expected: String },

    #[error("Problem while uploading: {0:?}")]
    UploadVerificationFailed(String),

    #[error("File {0:?} does not exist.")]
    FileNotFound(PathBuf),

    #[error("Failed to convert {path:?} to a raw binary: {reason}")]
    ImageConversion { path: PathBuf, reason: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Missing parameter {0}")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OtaError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

fn auth_rejected_message(reply: &Option<String>) -> String {
    match reply {
        Some(text) => format!("Authentication rejected: {text:?}"),
        None => "No Answer to our Authentication".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, OtaError>;
