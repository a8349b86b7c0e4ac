//! Wire-level types for the tus resumable upload protocol.
//!
//! Everything this protocol has to say travels in HTTP headers, so the
//! codec has to be bit-exact: a stray space in `Upload-Metadata` or a
//! non-decimal `Upload-Offset` is a failed upload, not a cosmetic bug.
//! This crate owns header construction and parsing so the client never
//! assembles a header string by hand.

mod headers;
mod partial;

pub use headers::{
    CONCAT_PARTIAL, CONTENT_TYPE, CONTENT_TYPE_OFFSET_STREAM, ConcatHeader, HeaderError, LOCATION,
    TUS_RESUMABLE, UPLOAD_CHECKSUM, UPLOAD_CONCAT, UPLOAD_KEY, UPLOAD_LENGTH, UPLOAD_METADATA,
    UPLOAD_OFFSET, concat_final, encode_checksum, encode_metadata, merge_headers, parse_checksum,
    parse_concat, parse_location, parse_metadata, parse_offset,
};
pub use partial::{PARTIAL_KEY_SEPARATOR, is_partial_key, parent_key, partial_key};

/// Protocol version announced as `Tus-Resumable` on every request.
pub const PROTOCOL_VERSION: &str = "1.0.0";
