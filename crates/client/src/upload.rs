//! The upload entity: everything the state machine knows about one file.

use std::path::{Path, PathBuf};

use tusling_protocol as protocol;
use tusling_transfer::HashAlgorithm;

use crate::error::ClientError;

/// The local file behind an upload.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    /// Name transported as `filename` metadata.
    pub filename: String,
    /// File size captured when the file was configured.
    pub length: u64,
}

/// State of a single upload as the client sees it.
///
/// For a partial upload the key carries a derived suffix and `base_offset`
/// marks where in the file the partial's byte 0 lives; the protocol-level
/// offset is always relative to the upload resource, not the file.
#[derive(Debug, Clone)]
pub struct Upload {
    file: Option<FileSource>,
    key: Option<String>,
    server_key: Option<String>,
    algorithm: HashAlgorithm,
    digest: Option<Vec<u8>>,
    partial: bool,
    base_offset: u64,
    offset: Option<u64>,
}

impl Upload {
    /// An empty upload using `algorithm` for checksums.
    ///
    /// The algorithm is fixed for the upload's lifetime: a memoized digest
    /// can never disagree with the header that announces it.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            file: None,
            key: None,
            server_key: None,
            algorithm,
            digest: None,
            partial: false,
            base_offset: 0,
            offset: None,
        }
    }

    /// Configures the local file, resetting any per-file session state.
    pub fn set_file(&mut self, path: &Path, name: Option<&str>) -> Result<(), ClientError> {
        let meta = std::fs::metadata(path)
            .map_err(|e| ClientError::Config(format!("file {} is not readable: {e}", path.display())))?;
        if !meta.is_file() {
            return Err(ClientError::Config(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let filename = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    ClientError::Config(format!("{} has no file name", path.display()))
                })?,
        };
        self.file = Some(FileSource {
            path: path.to_path_buf(),
            filename,
            length: meta.len(),
        });
        self.digest = None;
        self.offset = None;
        self.base_offset = 0;
        Ok(())
    }

    /// Sets the client key, resetting any per-key session state.
    pub fn set_key(&mut self, key: &str) {
        self.key = Some(key.to_string());
        self.server_key = None;
        self.offset = None;
        self.partial = false;
        self.base_offset = 0;
    }

    /// Marks the upload partial, deriving a suffixed key.
    pub fn mark_partial(&mut self) -> Result<(), ClientError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| ClientError::Config("a key must be set before seeking".into()))?;
        if !self.partial {
            self.key = Some(protocol::partial_key(key));
            self.partial = true;
        }
        Ok(())
    }

    /// Positions the upload's byte 0 at `offset` within the file and marks
    /// it partial.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ClientError> {
        let file = self.require_file()?;
        if offset > file.length {
            return Err(ClientError::Config(format!(
                "seek to {offset} is past the end of a {}-byte file",
                file.length
            )));
        }
        self.mark_partial()?;
        self.base_offset = offset;
        self.offset = None;
        // The memoized digest covers [base_offset, EOF); moving the base
        // invalidates it.
        self.digest = None;
        Ok(())
    }

    pub fn require_file(&self) -> Result<&FileSource, ClientError> {
        self.file
            .as_ref()
            .ok_or_else(|| ClientError::Config("no file configured".into()))
    }

    pub fn require_key(&self) -> Result<&str, ClientError> {
        self.key
            .as_deref()
            .ok_or_else(|| ClientError::Config("no upload key configured".into()))
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn server_key(&self) -> Option<&str> {
        self.server_key.as_deref()
    }

    pub fn set_server_key(&mut self, key: &str) {
        self.server_key = Some(key.to_string());
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// File position where this upload's byte 0 lives.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Byte count this upload reports as `Upload-Length`.
    pub fn length(&self) -> Result<u64, ClientError> {
        Ok(self.require_file()?.length - self.base_offset)
    }

    /// Last server-confirmed offset, if any round-trip established one.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Memoized digest of the upload's body span, if computed.
    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    pub fn set_digest(&mut self, digest: Vec<u8>) {
        self.digest = Some(digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn upload_with_file(dir: &TempDir, data: &[u8]) -> Upload {
        let path = dir.path().join("video.bin");
        std::fs::File::create(&path).unwrap().write_all(data).unwrap();
        let mut upload = Upload::new(HashAlgorithm::Sha256);
        upload.set_file(&path, None).unwrap();
        upload
    }

    #[test]
    fn set_file_captures_name_and_length() {
        let dir = TempDir::new().unwrap();
        let upload = upload_with_file(&dir, b"0123456789");
        let file = upload.require_file().unwrap();
        assert_eq!(file.filename, "video.bin");
        assert_eq!(file.length, 10);
        assert_eq!(upload.length().unwrap(), 10);
    }

    #[test]
    fn set_file_rejects_missing_path() {
        let mut upload = Upload::new(HashAlgorithm::Sha256);
        let err = upload.set_file(Path::new("/nonexistent/file.bin"), None).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn explicit_name_overrides_basename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.tmp");
        std::fs::write(&path, b"x").unwrap();
        let mut upload = Upload::new(HashAlgorithm::Sha256);
        upload.set_file(&path, Some("hello.txt")).unwrap();
        assert_eq!(upload.require_file().unwrap().filename, "hello.txt");
    }

    #[test]
    fn seek_marks_partial_and_rewrites_key() {
        let dir = TempDir::new().unwrap();
        let mut upload = upload_with_file(&dir, &[7u8; 50]);
        upload.set_key("p");
        upload.seek_to(20).unwrap();

        assert!(upload.is_partial());
        assert!(upload.key().unwrap().starts_with("p~"));
        assert_eq!(upload.base_offset(), 20);
        assert_eq!(upload.length().unwrap(), 30);
    }

    #[test]
    fn seek_requires_key() {
        let dir = TempDir::new().unwrap();
        let mut upload = upload_with_file(&dir, b"abc");
        assert!(matches!(upload.seek_to(0), Err(ClientError::Config(_))));
    }

    #[test]
    fn seek_past_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut upload = upload_with_file(&dir, b"abc");
        upload.set_key("p");
        assert!(matches!(upload.seek_to(4), Err(ClientError::Config(_))));
    }

    #[test]
    fn repeated_seek_keeps_one_suffix() {
        let dir = TempDir::new().unwrap();
        let mut upload = upload_with_file(&dir, &[0u8; 10]);
        upload.set_key("p");
        upload.seek_to(2).unwrap();
        let first_key = upload.key().unwrap().to_string();
        upload.seek_to(4).unwrap();
        assert_eq!(upload.key().unwrap(), first_key);
        assert_eq!(upload.base_offset(), 4);
    }

    #[test]
    fn set_key_resets_session() {
        let dir = TempDir::new().unwrap();
        let mut upload = upload_with_file(&dir, b"abc");
        upload.set_key("a");
        upload.set_server_key("srv");
        upload.set_offset(2);
        upload.set_key("b");
        assert!(upload.server_key().is_none());
        assert!(upload.offset().is_none());
        assert!(!upload.is_partial());
    }
}
