//! OTA update protocol engine.
//!
//! Pushes a firmware image to a device over a raw TCP socket.
//!
//! # Architecture
//!
//! ```text
//! +-----------+     +-----------+     +-----------+     +-----------+
//! | Establish | --> | Negotiate | --> | Transfer  | --> |  Verify   |
//! | (retry)   |     | (auth)    |     | (chunks)  |     | (poll)    |
//! +-----------+     +-----------+     +-----------+     +-----------+
//!        \________________ one Connection ________________/
//! ```
//!
//! # Wire protocol
//!
//! 1. Client sends `"<cmd> <size> <md5>\n"`; device answers `OK` or `AUTH <nonce>`
//! 2. On `AUTH`, client sends `"200 <cnonce> <challenge>\n"`; device answers `OK`
//! 3. Raw chunks of at most 2048 bytes, each optionally acknowledged with its length
//! 4. Device emits progress digits, then a final reply containing `OK`

pub mod auth;
pub mod connection;
pub mod establish;
pub mod handshake;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod verify;

pub use auth::{md5_hex, AuthChallenge};
pub use connection::Connection;
pub use progress::{Reporter, Silent, TransferProgress};
pub use protocol::{
    chunk_plan, Chunk, ChunkAck, InvitationReply, UpdateKind, CHUNK_SIZE, DEFAULT_PORT,
    MAX_CONNECT_ATTEMPTS, TOTAL_BARS,
};
pub use session::{Session, SessionReport, Timings, UpdateRequest};
pub use transfer::{ChunkOutcome, TransferSummary};
