use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;

/// Returns the current size of `path` in bytes.
pub fn file_size(path: &Path) -> Result<u64, TransferError> {
    Ok(std::fs::metadata(path)?.len())
}

/// Reads the byte window `[offset, offset + length)` of `path`.
///
/// The file handle is scoped to this call and released on every exit path.
/// A window running past the end of the file yields the shorter slice; the
/// caller treats that as the final chunk.
pub fn read_window(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, TransferError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = vec![0u8; length as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break; // end of file
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn reads_exact_window() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        assert_eq!(read_window(&path, 0, 4).unwrap(), b"AABB");
        assert_eq!(read_window(&path, 4, 4).unwrap(), b"CCDD");
    }

    #[test]
    fn short_read_at_end_of_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        assert_eq!(read_window(&path, 8, 4).unwrap(), b"89");
    }

    #[test]
    fn window_past_end_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        assert!(read_window(&path, 10, 4).unwrap().is_empty());
        assert!(read_window(&path, 100, 4).unwrap().is_empty());
    }

    #[test]
    fn zero_length_window_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        assert!(read_window(&path, 5, 0).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = read_window(&dir.path().join("absent.bin"), 0, 4);
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[test]
    fn file_size_reports_length() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");
        assert_eq!(file_size(&path).unwrap(), 10);
    }
}
