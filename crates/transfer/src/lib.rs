//! Local-file side of an upload: offset-addressed byte windows and
//! content digests.
//!
//! Nothing here knows about HTTP. The client asks for a window, gets a
//! buffer, and attaches the digest it needs; file handles never outlive a
//! single call.

mod checksum;
mod window;

pub use checksum::{HashAlgorithm, digest_bytes, digest_file, digest_file_from};
pub use window::{file_size, read_window};

/// Default upper bound for a single request body.
///
/// Larger windows amortize per-request overhead (digest, headers, ACK);
/// the client may configure a smaller cap.
pub const DEFAULT_WINDOW_SIZE: u64 = 4 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported checksum algorithm: {0:?}")]
    UnsupportedAlgorithm(String),
}
