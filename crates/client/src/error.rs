//! Client error taxonomy.

use tusling_transfer::TransferError;

/// Errors surfaced by upload operations.
///
/// `NotFound` during discovery is recovered internally by creating the
/// upload; every other variant fails the current operation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("resource creation failed: {0}")]
    ResourceCreate(String),

    #[error("resource not found on the server")]
    NotFound,

    #[error("server rejected the chunk at offset {offset}; upload is corrupt")]
    CorruptUpload { offset: u64 },

    #[error("unexpected protocol response: status {status}: {body}")]
    Protocol { status: u16, body: String },
}

impl From<TransferError> for ClientError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => ClientError::Io(e),
            TransferError::UnsupportedAlgorithm(_) => ClientError::Config(err.to_string()),
        }
    }
}
