//! Network error types

use std::io;
use std::time::Duration;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Core(#[from] campus_core::Error),
}
