//! Challenge-response authentication.
//!
//! The companion nonce is derived from local context (image path, size,
//! digest, host) rather than fresh entropy. Existing devices expect exactly
//! this derivation, so it stays, replay weakness included.

use md5::{Digest, Md5};

/// Lower-case hex MD5 of `data`.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Md5::digest(data.as_ref()))
}

/// All digests exchanged for one authentication round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Token the device sent with its `AUTH` reply
    pub nonce: String,
    /// Client-side nonce
    pub cnonce: String,
    pub password_digest: String,
    /// `md5("<password_digest>:<nonce>:<cnonce>")`
    pub challenge: String,
}

impl AuthChallenge {
    pub fn new(
        image_path: &str,
        content_len: usize,
        content_digest: &str,
        host: &str,
        password: &str,
        nonce: &str,
    ) -> Self {
        let cnonce = md5_hex(format!(
            "{}{}{}{}",
            image_path, content_len, content_digest, host
        ));
        let password_digest = md5_hex(password);
        let challenge = md5_hex(format!("{}:{}:{}", password_digest, nonce, cnonce));

        Self {
            nonce: nonce.to_string(),
            cnonce,
            password_digest,
            challenge,
        }
    }
}
