//! Wire format for the OTA update protocol.
//!
//! Newline-terminated ASCII command lines from the client, bare text tokens
//! from the device, raw binary chunks for the image itself. There is no
//! framing beyond that, so every reply is interpreted by content.

/// Default device port
pub const DEFAULT_PORT: u16 = 8266;

/// Maximum bytes per chunk write
pub const CHUNK_SIZE: usize = 2048;

/// Connect+invite cycles before giving up
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Positions in the coarse progress indicator
pub const TOTAL_BARS: u64 = 40;

/// Command code for the authentication response line
pub const AUTH_COMMAND: u16 = 200;

/// Acceptance token (invitation, auth result, chunk early-completion, final verdict)
pub const ACCEPT_TOKEN: &str = "OK";

/// Prefix of an invitation reply that demands authentication
pub const AUTH_MARKER: &str = "AUTH";

// =============================================================================
// Update kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Application flash image
    Flash,
    /// Filesystem (SPIFFS) image
    Filesystem,
}

impl UpdateKind {
    pub fn command(&self) -> u16 {
        match self {
            UpdateKind::Flash => 0,
            UpdateKind::Filesystem => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpdateKind::Flash => "Flash",
            UpdateKind::Filesystem => "SPIFFS",
        }
    }
}

// =============================================================================
// Client -> device
// =============================================================================

/// `"<cmd> <size> <md5hex>\n"`
pub fn invitation(kind: UpdateKind, size: usize, digest: &str) -> String {
    format!("{} {} {}\n", kind.command(), size, digest)
}

/// `"200 <cnonce> <challenge>\n"`
pub fn auth_response(cnonce: &str, challenge: &str) -> String {
    format!("{} {} {}\n", AUTH_COMMAND, cnonce, challenge)
}

// =============================================================================
// Device -> client
// =============================================================================

/// Interpretation of the reply to the invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationReply {
    /// Exact acceptance token
    Accepted,
    /// Authentication demanded; carries the peer nonce when one was sent
    AuthRequired { nonce: Option<String> },
    /// Anything else, kept verbatim for diagnostics
    Unexpected(String),
}

impl InvitationReply {
    pub fn parse(reply: &str) -> Self {
        if reply == ACCEPT_TOKEN {
            return Self::Accepted;
        }
        if reply.starts_with(AUTH_MARKER) {
            return Self::AuthRequired {
                nonce: reply.split_whitespace().nth(1).map(str::to_string),
            };
        }
        Self::Unexpected(reply.to_string())
    }
}

/// Interpretation of a per-chunk acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAck {
    /// Device signaled it has everything it needs
    EarlyCompletion,
    /// Device echoed the chunk length
    Matched,
    /// Neither of the above
    Mismatch { received: String, expected: String },
}

impl ChunkAck {
    pub fn parse(reply: &str, chunk_len: usize) -> Self {
        if reply.contains(ACCEPT_TOKEN) {
            return Self::EarlyCompletion;
        }
        let expected = chunk_len.to_string();
        if reply == expected {
            Self::Matched
        } else {
            Self::Mismatch {
                received: reply.to_string(),
                expected,
            }
        }
    }
}

/// Bytes the device sprinkles in front of its final verdict.
pub fn is_verification_noise(byte: u8) -> bool {
    byte.is_ascii_digit() || byte.is_ascii_whitespace()
}

// =============================================================================
// Chunk plan
// =============================================================================

/// A contiguous slice of the payload, never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub len: usize,
}

impl Chunk {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn slice<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        &payload[self.offset..self.end()]
    }
}

/// Chunks covering `0..total` in `CHUNK_SIZE` steps.
pub fn chunk_plan(total: usize) -> impl Iterator<Item = Chunk> {
    (0..total).step_by(CHUNK_SIZE).map(move |offset| Chunk {
        offset,
        len: CHUNK_SIZE.min(total - offset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invitation_format() {
        let digest = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            invitation(UpdateKind::Flash, 5000, digest),
            format!("0 5000 {}\n", digest)
        );
        assert_eq!(
            invitation(UpdateKind::Filesystem, 1, digest),
            format!("100 1 {}\n", digest)
        );
    }

    #[test]
    fn test_auth_response_format() {
        assert_eq!(auth_response("aa", "bb"), "200 aa bb\n");
    }

    #[test]
    fn test_invitation_reply_parse() {
        assert_eq!(InvitationReply::parse("OK"), InvitationReply::Accepted);
        assert_eq!(
            InvitationReply::parse("AUTH abc123"),
            InvitationReply::AuthRequired {
                nonce: Some("abc123".to_string())
            }
        );
        // Acceptance must be exact
        assert_eq!(
            InvitationReply::parse("OK\n"),
            InvitationReply::Unexpected("OK\n".to_string())
        );
        assert_eq!(
            InvitationReply::parse("AUTH"),
            InvitationReply::AuthRequired { nonce: None }
        );
        assert_eq!(
            InvitationReply::parse("BUSY"),
            InvitationReply::Unexpected("BUSY".to_string())
        );
    }

    #[test]
    fn test_chunk_ack_parse() {
        assert_eq!(ChunkAck::parse("2048", 2048), ChunkAck::Matched);
        assert_eq!(ChunkAck::parse("904", 904), ChunkAck::Matched);
        assert_eq!(ChunkAck::parse("2048OK", 2048), ChunkAck::EarlyCompletion);
        assert_eq!(
            ChunkAck::parse("9999", 2048),
            ChunkAck::Mismatch {
                received: "9999".to_string(),
                expected: "2048".to_string(),
            }
        );
    }

    #[test]
    fn test_noise_bytes() {
        assert!(is_verification_noise(b'0'));
        assert!(is_verification_noise(b'9'));
        assert!(is_verification_noise(b'\n'));
        assert!(!is_verification_noise(b'O'));
    }

    #[test]
    fn test_chunk_plan_5000() {
        let chunks: Vec<_> = chunk_plan(5000).collect();
        assert_eq!(
            chunks.iter().map(|c| c.len).collect::<Vec<_>>(),
            vec![2048, 2048, 904]
        );
        assert_eq!(chunks[2].offset, 4096);
    }

    #[test]
    fn test_chunk_plan_empty() {
        assert_eq!(chunk_plan(0).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_chunk_plan_covers_payload_once(total in 0usize..50_000) {
            let chunks: Vec<_> = chunk_plan(total).collect();
            prop_assert_eq!(chunks.len(), total.div_ceil(CHUNK_SIZE));

            let mut cursor = 0;
            for chunk in &chunks {
                prop_assert_eq!(chunk.offset, cursor);
                prop_assert!(chunk.len > 0 && chunk.len <= CHUNK_SIZE);
                cursor = chunk.end();
            }
            prop_assert_eq!(cursor, total);
        }
    }
}
