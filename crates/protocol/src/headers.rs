use base64::{Engine as _, engine::general_purpose::STANDARD};

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

pub const TUS_RESUMABLE: &str = "Tus-Resumable";
pub const UPLOAD_OFFSET: &str = "Upload-Offset";
pub const UPLOAD_LENGTH: &str = "Upload-Length";
pub const UPLOAD_KEY: &str = "Upload-Key";
pub const UPLOAD_METADATA: &str = "Upload-Metadata";
pub const UPLOAD_CHECKSUM: &str = "Upload-Checksum";
pub const UPLOAD_CONCAT: &str = "Upload-Concat";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const LOCATION: &str = "Location";

/// `Content-Type` value required on every PATCH body.
pub const CONTENT_TYPE_OFFSET_STREAM: &str = "application/offset+octet-stream";

/// `Upload-Concat` value marking a partial upload.
pub const CONCAT_PARTIAL: &str = "partial";

/// Errors produced while parsing protocol headers.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("invalid offset value: {0:?}")]
    InvalidOffset(String),

    #[error("invalid metadata pair: {0:?}")]
    InvalidMetadata(String),

    #[error("metadata value is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid checksum value: {0:?}")]
    InvalidChecksum(String),

    #[error("invalid concat value: {0:?}")]
    InvalidConcat(String),

    #[error("location has no key segment: {0:?}")]
    InvalidLocation(String),

    #[error("base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}

// ---------------------------------------------------------------------------
// Offsets
// ---------------------------------------------------------------------------

/// Parses a decimal byte count from `Upload-Offset` or `Upload-Length`.
pub fn parse_offset(value: &str) -> Result<u64, HeaderError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| HeaderError::InvalidOffset(value.to_string()))
}

// ---------------------------------------------------------------------------
// Upload-Metadata
// ---------------------------------------------------------------------------

/// Encodes metadata pairs as `<key> <base64(value)>`, comma-joined.
pub fn encode_metadata<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key} {}", STANDARD.encode(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses an `Upload-Metadata` value back into decoded pairs.
///
/// A key without a value decodes to the empty string, which the protocol
/// allows for flag-style metadata.
pub fn parse_metadata(value: &str) -> Result<Vec<(String, String)>, HeaderError> {
    let mut pairs = Vec::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut tokens = entry.split_whitespace();
        let key = tokens
            .next()
            .ok_or_else(|| HeaderError::InvalidMetadata(entry.to_string()))?;
        let decoded = match tokens.next() {
            Some(encoded) => {
                let bytes = STANDARD.decode(encoded)?;
                String::from_utf8(bytes).map_err(|_| HeaderError::InvalidUtf8)?
            }
            None => String::new(),
        };
        if tokens.next().is_some() {
            return Err(HeaderError::InvalidMetadata(entry.to_string()));
        }
        pairs.push((key.to_string(), decoded));
    }
    Ok(pairs)
}

// ---------------------------------------------------------------------------
// Upload-Checksum
// ---------------------------------------------------------------------------

/// Encodes an `Upload-Checksum` value: the literal algorithm name followed
/// by the base64 digest.
pub fn encode_checksum(algorithm: &str, digest: &[u8]) -> String {
    format!("{algorithm} {}", STANDARD.encode(digest))
}

/// Parses an `Upload-Checksum` value into algorithm name and digest bytes.
pub fn parse_checksum(value: &str) -> Result<(String, Vec<u8>), HeaderError> {
    let mut tokens = value.trim().split_whitespace();
    let (Some(algorithm), Some(encoded), None) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(HeaderError::InvalidChecksum(value.to_string()));
    };
    let digest = STANDARD.decode(encoded)?;
    Ok((algorithm.to_string(), digest))
}

// ---------------------------------------------------------------------------
// Upload-Concat
// ---------------------------------------------------------------------------

/// Parsed `Upload-Concat` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatHeader {
    Partial,
    Final(Vec<String>),
}

/// Encodes the final-upload form: `final;<k1> <k2> …`.
///
/// Order is significant and preserved exactly as given; duplicates are
/// the caller's business.
pub fn concat_final<S: AsRef<str>>(keys: &[S]) -> String {
    let keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
    format!("final;{}", keys.join(" "))
}

/// Parses an `Upload-Concat` value.
pub fn parse_concat(value: &str) -> Result<ConcatHeader, HeaderError> {
    let value = value.trim();
    if value == CONCAT_PARTIAL {
        return Ok(ConcatHeader::Partial);
    }
    if let Some(rest) = value.strip_prefix("final;") {
        let keys: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
        return Ok(ConcatHeader::Final(keys));
    }
    Err(HeaderError::InvalidConcat(value.to_string()))
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Extracts the server key from a creation `Location` header.
///
/// Accepts absolute (`http://h/files/abc`) and path-relative (`/files/abc`)
/// forms; the key is the final path segment once `<base><api_path>/` is
/// stripped. Query and fragment are ignored.
pub fn parse_location(
    location: &str,
    base_url: &str,
    api_path: &str,
) -> Result<String, HeaderError> {
    let path = location
        .split(['?', '#'])
        .next()
        .unwrap_or(location)
        .trim();
    let path = path.strip_prefix(base_url).unwrap_or(path);
    let path = path.strip_prefix(api_path).unwrap_or(path);

    let key = path.trim_matches('/').rsplit('/').next().unwrap_or("");
    if key.is_empty() {
        return Err(HeaderError::InvalidLocation(location.to_string()));
    }
    Ok(key.to_string())
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merges caller-supplied headers into a protocol header set.
///
/// Protocol headers always win: a user header whose name matches one
/// already present (case-insensitively) is dropped. Merging the same user
/// set twice yields the same result.
pub fn merge_headers(
    protocol: Vec<(String, String)>,
    user: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged = protocol;
    for (name, value) in user {
        let taken = merged
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name));
        if !taken {
            merged.push((name.clone(), value.clone()));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_parses_decimal() {
        assert_eq!(parse_offset("0").unwrap(), 0);
        assert_eq!(parse_offset("1000").unwrap(), 1000);
        assert_eq!(parse_offset(" 42 ").unwrap(), 42);
    }

    #[test]
    fn offset_rejects_non_decimal() {
        assert!(parse_offset("").is_err());
        assert!(parse_offset("abc").is_err());
        assert!(parse_offset("-1").is_err());
        assert!(parse_offset("10.5").is_err());
    }

    #[test]
    fn metadata_encodes_filename() {
        let encoded = encode_metadata([("filename", "hello.txt")]);
        assert_eq!(encoded, "filename aGVsbG8udHh0");
    }

    #[test]
    fn metadata_roundtrip_utf8() {
        let name = "änderung ß 日本語.txt";
        let encoded = encode_metadata([("filename", name)]);
        let pairs = parse_metadata(&encoded).unwrap();
        assert_eq!(pairs, vec![("filename".to_string(), name.to_string())]);
    }

    #[test]
    fn metadata_multiple_pairs_keep_order() {
        let encoded = encode_metadata([("filename", "a.bin"), ("filetype", "application/x-bin")]);
        let pairs = parse_metadata(&encoded).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "filename");
        assert_eq!(pairs[1], ("filetype".into(), "application/x-bin".into()));
    }

    #[test]
    fn metadata_parses_valueless_key() {
        let pairs = parse_metadata("is_confidential").unwrap();
        assert_eq!(pairs, vec![("is_confidential".to_string(), String::new())]);
    }

    #[test]
    fn metadata_tolerates_space_after_comma() {
        let pairs = parse_metadata("filename aGVsbG8udHh0, filetype dGV4dA==").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("filetype".into(), "text".into()));
    }

    #[test]
    fn metadata_rejects_extra_tokens() {
        assert!(parse_metadata("filename aGVsbG8= extra").is_err());
    }

    #[test]
    fn checksum_encodes_algorithm_and_base64() {
        let value = encode_checksum("sha256", b"\x01\x02\x03");
        assert_eq!(value, "sha256 AQID");
    }

    #[test]
    fn checksum_roundtrip() {
        let digest = vec![0xde, 0xad, 0xbe, 0xef];
        let value = encode_checksum("sha1", &digest);
        let (algorithm, parsed) = parse_checksum(&value).unwrap();
        assert_eq!(algorithm, "sha1");
        assert_eq!(parsed, digest);
    }

    #[test]
    fn checksum_rejects_malformed() {
        assert!(parse_checksum("sha256").is_err());
        assert!(parse_checksum("sha256 a b").is_err());
        assert!(parse_checksum("sha256 !!!").is_err());
    }

    #[test]
    fn concat_final_preserves_order() {
        assert_eq!(concat_final(&["p_a", "p_b", "p_c"]), "final;p_a p_b p_c");
        assert_eq!(concat_final(&["z", "a"]), "final;z a");
    }

    #[test]
    fn concat_final_keeps_duplicates() {
        assert_eq!(concat_final(&["a", "a"]), "final;a a");
    }

    #[test]
    fn concat_parses_both_forms() {
        assert_eq!(parse_concat("partial").unwrap(), ConcatHeader::Partial);
        assert_eq!(
            parse_concat("final;a b").unwrap(),
            ConcatHeader::Final(vec!["a".into(), "b".into()])
        );
        assert!(parse_concat("neither").is_err());
    }

    #[test]
    fn location_absolute_url() {
        let key = parse_location("http://h/files/srv1", "http://h", "/files").unwrap();
        assert_eq!(key, "srv1");
    }

    #[test]
    fn location_path_relative() {
        let key = parse_location("/files/xyz", "http://h", "/files").unwrap();
        assert_eq!(key, "xyz");
    }

    #[test]
    fn location_ignores_query_and_trailing_slash() {
        let key = parse_location("http://h/files/abc/?sig=1", "http://h", "/files").unwrap();
        assert_eq!(key, "abc");
    }

    #[test]
    fn location_without_key_is_rejected() {
        assert!(parse_location("http://h/files/", "http://h", "/files").is_err());
        assert!(parse_location("", "http://h", "/files").is_err());
    }

    #[test]
    fn merge_user_headers_never_override() {
        let protocol = vec![(TUS_RESUMABLE.to_string(), "1.0.0".to_string())];
        let user = vec![
            ("tus-resumable".to_string(), "0.2.2".to_string()),
            ("X-Trace".to_string(), "abc".to_string()),
        ];
        let merged = merge_headers(protocol, &user);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], (TUS_RESUMABLE.to_string(), "1.0.0".to_string()));
        assert_eq!(merged[1], ("X-Trace".to_string(), "abc".to_string()));
    }

    #[test]
    fn merge_is_idempotent() {
        let protocol = vec![(UPLOAD_OFFSET.to_string(), "10".to_string())];
        let user = vec![("X-One".to_string(), "1".to_string())];
        let once = merge_headers(protocol, &user);
        let twice = merge_headers(once.clone(), &user);
        assert_eq!(once, twice);
    }
}
