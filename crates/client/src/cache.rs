//! Local memory of upload progress.
//!
//! A cache record is a resume hint, never an authority: the state machine
//! re-confirms offsets against the server before trusting them, so cache
//! failures degrade resume quality without corrupting the protocol. The
//! trait is therefore infallible at the call site; implementations
//! swallow and log their own errors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Resume state for one upload, keyed by client key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Last server-acknowledged offset.
    pub offset: u64,
    /// Key parsed from the creation `Location`, when known.
    pub server_key: Option<String>,
    /// Total upload length, for sanity checks on resume.
    pub length: u64,
}

/// Pluggable key → record store.
pub trait UploadCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheRecord>;
    fn put(&self, key: &str, record: CacheRecord);
    fn delete(&self, key: &str);
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryCache {
    records: Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UploadCache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheRecord> {
        self.records.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, record: CacheRecord) {
        self.records.lock().unwrap().insert(key.to_string(), record);
    }

    fn delete(&self, key: &str) {
        self.records.lock().unwrap().remove(key);
    }
}

/// JSON-file-backed store that survives process restarts.
///
/// Records are held in memory and rewritten to disk on every mutation.
pub struct FileCache {
    path: PathBuf,
    records: RwLock<HashMap<String, CacheRecord>>,
}

impl FileCache {
    /// Opens the store at `path`, loading any existing records.
    ///
    /// An unreadable or corrupt file degrades to an empty store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "upload cache corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "upload cache unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    fn persist(&self) {
        let records = self.records.read().unwrap();
        let json = match serde_json::to_vec_pretty(&*records) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode upload cache");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "failed to persist upload cache");
        }
    }
}

impl UploadCache for FileCache {
    fn get(&self, key: &str) -> Option<CacheRecord> {
        self.records.read().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, record: CacheRecord) {
        self.records.write().unwrap().insert(key.to_string(), record);
        self.persist();
    }

    fn delete(&self, key: &str) {
        self.records.write().unwrap().remove(key);
        self.persist();
    }
}
