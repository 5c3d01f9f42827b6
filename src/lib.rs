//! nota - network OTA uploader.
//!
//! Pushes a raw firmware image to an embedded device over a plain TCP
//! socket: invitation, optional MD5 challenge-response, 2048-byte chunks
//! with per-chunk acknowledgment, then a polled verification verdict.

pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod image;
pub mod ota;

pub use error::{OtaError, Result};
