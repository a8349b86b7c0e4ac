//! Client for the tus resumable-upload protocol (v1.0.0).
//!
//! The state machine discovers remote progress with HEAD, creates or
//! resumes the upload, streams offset-addressed byte windows with PATCH,
//! and classifies failures into recoverable and fatal outcomes. Partial
//! uploads can later be concatenated server-side into a single object.
//!
//! Transport and cache are pluggable; a `reqwest`-backed transport and
//! in-memory/file-backed caches are bundled.

mod cache;
mod client;
mod concat;
mod error;
mod http;
mod transport;
mod upload;

pub use cache::{CacheRecord, FileCache, MemoryCache, UploadCache};
pub use client::{ChecksumMode, Client, Config, UploadEvent};
pub use error::ClientError;
pub use http::HttpTransport;
pub use transport::{Method, Response, Transport, TransportError, TransportFuture};
pub use upload::{FileSource, Upload};

pub use tusling_protocol::PROTOCOL_VERSION;
pub use tusling_transfer::HashAlgorithm;
