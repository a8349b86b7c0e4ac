//! The upload state machine.
//!
//! Drives discover → create-or-resume → stream → finalize against a
//! [`Transport`], consulting the [`UploadCache`] between rounds. The
//! server's HEAD answer is authoritative for offsets; cached state only
//! ever narrows the work, so a PATCH can never carry an offset the server
//! has not confirmed.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tusling_protocol as protocol;
use tusling_transfer::{self as transfer, HashAlgorithm};

use crate::cache::{CacheRecord, UploadCache};
use crate::error::ClientError;
use crate::transport::{Method, Response, Transport, TransportError};
use crate::upload::Upload;

/// How much of the upload an `Upload-Checksum` covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumMode {
    /// Digest of the upload's full body on every request, memoized.
    ///
    /// For a sought partial this covers `[seek, end-of-file)` — exactly
    /// the bytes the resource will receive, never the whole file.
    #[default]
    WholeFile,
    /// Digest of exactly the bytes in each request body.
    PerChunk,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheme + authority of the server, e.g. `http://localhost:1080`.
    pub base_url: String,
    /// Path under which uploads are created and addressed, e.g. `/files`.
    pub api_path: String,
    /// Digest algorithm announced in `Upload-Checksum`.
    pub algorithm: HashAlgorithm,
    pub checksum_mode: ChecksumMode,
    /// Upper bound for a single request body, in bytes.
    pub window_size: u64,
    /// Extra headers sent on every request; protocol headers always win.
    pub headers: Vec<(String, String)>,
}

impl Config {
    pub fn new(base_url: &str, api_path: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_path: format!("/{}", api_path.trim_matches('/')),
            algorithm: HashAlgorithm::default(),
            checksum_mode: ChecksumMode::default(),
            window_size: transfer::DEFAULT_WINDOW_SIZE,
            headers: Vec::new(),
        }
    }

    /// Selects the checksum algorithm by its wire name.
    ///
    /// Unknown names fail here, before any request is sent.
    pub fn with_algorithm_name(mut self, name: &str) -> Result<Self, ClientError> {
        self.algorithm = name.parse::<HashAlgorithm>()?;
        Ok(self)
    }
}

/// Progress notifications emitted during an upload, best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// The server created the upload resource.
    Created { server_key: String },
    /// A chunk was acknowledged.
    Progress { offset: u64, length: u64 },
    /// The upload reached its full length.
    Completed { offset: u64 },
}

/// Resumable-upload client driving a single upload at a time.
pub struct Client {
    config: Config,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn UploadCache>,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<UploadEvent>>,
    upload: Upload,
}

impl Client {
    pub fn new(config: Config, transport: Arc<dyn Transport>, cache: Arc<dyn UploadCache>) -> Self {
        let upload = Upload::new(config.algorithm);
        Self {
            config,
            transport,
            cache,
            cancel: CancellationToken::new(),
            events: None,
            upload,
        }
    }

    /// Registers a channel for progress notifications.
    pub fn with_events(mut self, events: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Token that aborts in-flight operations when cancelled.
    ///
    /// Cancellation surfaces as [`ClientError::Connection`]; the server may
    /// hold at most the last acknowledged offset.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configures the file to upload; its basename becomes the transported
    /// filename.
    pub fn set_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, ClientError> {
        self.upload.set_file(path.as_ref(), None)?;
        Ok(self)
    }

    /// Configures the file to upload under an explicit filename.
    pub fn set_file_named(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<&mut Self, ClientError> {
        self.upload.set_file(path.as_ref(), Some(name))?;
        Ok(self)
    }

    /// Sets the client key proposed on creation.
    pub fn set_key(&mut self, key: &str) -> &mut Self {
        self.upload.set_key(key);
        self
    }

    /// Positions the upload's first byte at `offset` within the file and
    /// marks it partial, deriving a suffixed key.
    pub fn seek(&mut self, offset: u64) -> Result<&mut Self, ClientError> {
        self.upload.seek_to(offset)?;
        Ok(self)
    }

    /// The upload entity currently driven by this client.
    pub fn upload_state(&self) -> &Upload {
        &self.upload
    }

    /// Uploads to completion and returns the final offset.
    pub async fn upload(&mut self) -> Result<u64, ClientError> {
        self.run_upload(None).await
    }

    /// Uploads at most `max` further bytes and returns the reached offset.
    ///
    /// A budget of zero still issues one empty-bodied request, which
    /// leaves the offset unchanged.
    pub async fn upload_bytes(&mut self, max: u64) -> Result<u64, ClientError> {
        self.run_upload(Some(max)).await
    }

    /// Asks the server for the current offset of the configured key.
    ///
    /// `None` means the server has no usable upload under this key.
    pub async fn get_offset(&self) -> Result<Option<u64>, ClientError> {
        self.discover().await
    }

    /// Creates the upload under `key` and returns the adopted server key.
    pub async fn create(&mut self, key: &str) -> Result<String, ClientError> {
        self.upload.set_key(key);
        self.create_current().await
    }

    /// Deletes the upload addressed by `key` and drops its cache record.
    ///
    /// A server answering 404/410 reports the resource already gone.
    pub async fn delete(&mut self, key: &str) -> Result<(), ClientError> {
        let suffix = format!("{}/{}", self.config.api_path, key);
        self.check_cancelled()?;
        let result = self
            .transport
            .send(Method::Delete, &suffix, self.base_headers(), None)
            .await;
        match result {
            Ok(resp) => {
                debug!(key = %key, status = resp.status, "upload deleted");
                self.cache.delete(key);
                Ok(())
            }
            Err(TransportError::Client(resp)) if matches!(resp.status, 404 | 410) => {
                self.cache.delete(key);
                Err(ClientError::NotFound)
            }
            Err(TransportError::Client(resp)) | Err(TransportError::Server(resp)) => {
                Err(ClientError::Protocol {
                    status: resp.status,
                    body: resp.body_text(),
                })
            }
            Err(TransportError::Connect(msg)) => Err(ClientError::Connection(msg)),
        }
    }

    // -----------------------------------------------------------------------
    // State machine internals
    // -----------------------------------------------------------------------

    async fn run_upload(&mut self, budget: Option<u64>) -> Result<u64, ClientError> {
        let key = self.upload.require_key()?.to_string();
        self.upload.require_file()?;

        // Cached state is a hint only; discovery below confirms it.
        let cached = if self.upload.offset().is_none() {
            self.cache.get(&key)
        } else {
            None
        };
        if let Some(record) = &cached
            && self.upload.server_key().is_none()
            && let Some(server_key) = &record.server_key
        {
            debug!(
                key = %key,
                server_key = %server_key,
                cached_offset = record.offset,
                "resuming from cached record"
            );
            self.upload.set_server_key(server_key);
        }

        match self.discover().await? {
            Some(offset) => {
                if let Some(record) = &cached
                    && record.offset > offset
                {
                    warn!(
                        key = %key,
                        cached = record.offset,
                        server = offset,
                        "cached offset is ahead of the server, trusting the server"
                    );
                }
                self.upload.set_offset(offset);
            }
            None => {
                self.create_current().await?;
            }
        }

        self.stream(budget).await
    }

    /// HEAD round-trip. `Some(offset)` means the upload is live on the
    /// server; `None` means it must be created.
    ///
    /// Addresses the server key once one is known (the canonical identity
    /// after creation), the client key otherwise — the same resolution the
    /// PATCH loop uses.
    async fn discover(&self) -> Result<Option<u64>, ClientError> {
        let key = self.upload.require_key()?;
        let addr = self.upload.server_key().unwrap_or(key);
        let suffix = format!("{}/{}", self.config.api_path, addr);
        self.check_cancelled()?;
        match self
            .transport
            .send(Method::Head, &suffix, self.base_headers(), None)
            .await
        {
            Ok(resp) => {
                require_tus_header(&resp)?;
                let offset = required_offset(&resp, "HEAD")?;
                debug!(key = %key, addr = %addr, offset, "upload present on server");
                Ok(Some(offset))
            }
            Err(TransportError::Client(resp)) | Err(TransportError::Server(resp)) => {
                if matches!(resp.status, 404 | 410) {
                    self.cache.delete(key);
                }
                debug!(key = %key, addr = %addr, status = resp.status, "no usable upload on server");
                Ok(None)
            }
            Err(TransportError::Connect(msg)) => Err(ClientError::Connection(msg)),
        }
    }

    /// POST creation round-trip for the currently configured upload.
    async fn create_current(&mut self) -> Result<String, ClientError> {
        let key = self.upload.require_key()?.to_string();
        let length = self.upload.length()?;
        let filename = self.upload.require_file()?.filename.clone();

        let mut headers = vec![
            (
                protocol::TUS_RESUMABLE.to_string(),
                protocol::PROTOCOL_VERSION.to_string(),
            ),
            (protocol::UPLOAD_LENGTH.to_string(), length.to_string()),
            (protocol::UPLOAD_KEY.to_string(), key.clone()),
            (
                protocol::UPLOAD_METADATA.to_string(),
                protocol::encode_metadata([("filename", filename.as_str())]),
            ),
        ];
        if self.upload.is_partial() {
            headers.push((
                protocol::UPLOAD_CONCAT.to_string(),
                protocol::CONCAT_PARTIAL.to_string(),
            ));
        }
        let headers = protocol::merge_headers(headers, &self.config.headers);

        self.check_cancelled()?;
        let resp = match self
            .transport
            .send(Method::Post, &self.config.api_path, headers, None)
            .await
        {
            Ok(resp) => resp,
            Err(TransportError::Client(resp)) | Err(TransportError::Server(resp)) => {
                return Err(ClientError::ResourceCreate(format!(
                    "creation failed with status {}",
                    resp.status
                )));
            }
            Err(TransportError::Connect(msg)) => return Err(ClientError::Connection(msg)),
        };
        if resp.status != 201 {
            return Err(ClientError::ResourceCreate(format!(
                "expected 201 Created, got {}",
                resp.status
            )));
        }
        let location = resp.header(protocol::LOCATION).ok_or_else(|| {
            ClientError::ResourceCreate("creation response lacked a Location header".into())
        })?;
        let server_key =
            protocol::parse_location(location, &self.config.base_url, &self.config.api_path)
                .map_err(|e| ClientError::ResourceCreate(e.to_string()))?;
        debug!(key = %key, server_key = %server_key, length, "upload created");

        self.upload.set_server_key(&server_key);
        self.upload.set_offset(0);
        self.cache.put(
            &key,
            CacheRecord {
                offset: 0,
                server_key: Some(server_key.clone()),
                length,
            },
        );
        self.emit(UploadEvent::Created {
            server_key: server_key.clone(),
        })
        .await;
        Ok(server_key)
    }

    /// PATCH loop: sends windows until the length or the byte budget is
    /// reached, persisting the acknowledged offset after every round-trip.
    async fn stream(&mut self, budget: Option<u64>) -> Result<u64, ClientError> {
        let key = self.upload.require_key()?.to_string();
        let path = self.upload.require_file()?.path.clone();
        let length = self.upload.length()?;
        let base_offset = self.upload.base_offset();
        let algorithm = self.upload.algorithm();
        let is_partial = self.upload.is_partial();
        let patch_key = self.upload.server_key().unwrap_or(key.as_str()).to_string();
        let suffix = format!("{}/{}", self.config.api_path, patch_key);
        let window_cap = self.config.window_size.max(1);

        let mut offset = self.upload.offset().unwrap_or(0);
        if offset >= length {
            debug!(key = %key, offset, "upload already complete");
            self.emit(UploadEvent::Completed { offset }).await;
            return Ok(offset);
        }

        let whole_digest = match self.config.checksum_mode {
            ChecksumMode::WholeFile => Some(self.ensure_upload_digest().await?),
            ChecksumMode::PerChunk => None,
        };

        let mut budget_left = budget;
        loop {
            self.check_cancelled()?;

            let mut window = (length - offset).min(window_cap);
            if let Some(limit) = budget_left {
                window = window.min(limit);
            }

            let body = if window == 0 {
                Vec::new()
            } else {
                let path = path.clone();
                let read_at = base_offset + offset;
                tokio::task::spawn_blocking(move || transfer::read_window(&path, read_at, window))
                    .await
                    .map_err(|e| {
                        ClientError::Io(std::io::Error::other(format!("read task failed: {e}")))
                    })??
            };
            let sent = body.len() as u64;

            let digest = match &whole_digest {
                Some(digest) => digest.clone(),
                None => transfer::digest_bytes(algorithm, &body),
            };

            let mut headers = vec![
                (
                    protocol::TUS_RESUMABLE.to_string(),
                    protocol::PROTOCOL_VERSION.to_string(),
                ),
                (protocol::UPLOAD_OFFSET.to_string(), offset.to_string()),
                (
                    protocol::CONTENT_TYPE.to_string(),
                    protocol::CONTENT_TYPE_OFFSET_STREAM.to_string(),
                ),
                ("Content-Length".to_string(), sent.to_string()),
                (
                    protocol::UPLOAD_CHECKSUM.to_string(),
                    protocol::encode_checksum(algorithm.name(), &digest),
                ),
            ];
            if is_partial {
                headers.push((
                    protocol::UPLOAD_CONCAT.to_string(),
                    protocol::CONCAT_PARTIAL.to_string(),
                ));
            }
            let headers = protocol::merge_headers(headers, &self.config.headers);

            let resp = match self
                .transport
                .send(Method::Patch, &suffix, headers, Some(body))
                .await
            {
                Ok(resp) => resp,
                Err(TransportError::Client(resp)) if resp.status == 416 => {
                    return Err(ClientError::CorruptUpload { offset });
                }
                // Some stacks surface 100 Continue as a terminal client
                // error when the request is aborted mid-flight.
                Err(TransportError::Client(resp)) if resp.status == 100 => {
                    return Err(ClientError::Connection("request aborted by user".into()));
                }
                Err(TransportError::Client(resp)) | Err(TransportError::Server(resp)) => {
                    return Err(ClientError::Protocol {
                        status: resp.status,
                        body: resp.body_text(),
                    });
                }
                Err(TransportError::Connect(msg)) => return Err(ClientError::Connection(msg)),
            };

            require_tus_header(&resp)?;
            let acked = required_offset(&resp, "PATCH")?;
            if acked < offset + sent {
                return Err(ClientError::Protocol {
                    status: resp.status,
                    body: format!(
                        "server offset did not advance: {acked} after sending [{offset}, {})",
                        offset + sent
                    ),
                });
            }

            offset = acked;
            self.upload.set_offset(offset);
            self.cache.put(
                &key,
                CacheRecord {
                    offset,
                    server_key: self.upload.server_key().map(str::to_string),
                    length,
                },
            );
            debug!(key = %key, offset, length, sent, "chunk acknowledged");
            self.emit(UploadEvent::Progress { offset, length }).await;

            if let Some(limit) = budget_left.as_mut() {
                *limit = limit.saturating_sub(sent);
            }
            if offset >= length {
                self.emit(UploadEvent::Completed { offset }).await;
                break;
            }
            if budget_left == Some(0) {
                break;
            }
        }

        Ok(offset)
    }

    /// Digest of the upload's full body, computed once per upload off the
    /// async runtime. Starts at the seek position for a partial.
    async fn ensure_upload_digest(&mut self) -> Result<Vec<u8>, ClientError> {
        if let Some(digest) = self.upload.digest() {
            return Ok(digest.to_vec());
        }
        let path = self.upload.require_file()?.path.clone();
        let algorithm = self.upload.algorithm();
        let base_offset = self.upload.base_offset();
        let digest = tokio::task::spawn_blocking(move || {
            transfer::digest_file_from(algorithm, &path, base_offset)
        })
        .await
        .map_err(|e| ClientError::Io(std::io::Error::other(format!("digest task failed: {e}"))))??;
        debug!(algorithm = %algorithm, digest = %hex::encode(&digest), "computed upload digest");
        self.upload.set_digest(digest.clone());
        Ok(digest)
    }

    fn base_headers(&self) -> Vec<(String, String)> {
        protocol::merge_headers(
            vec![(
                protocol::TUS_RESUMABLE.to_string(),
                protocol::PROTOCOL_VERSION.to_string(),
            )],
            &self.config.headers,
        )
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            Err(ClientError::Connection("cancelled".into()))
        } else {
            Ok(())
        }
    }

    async fn emit(&self, event: UploadEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }
}

/// Every HEAD/PATCH response must announce the protocol version.
pub(crate) fn require_tus_header(resp: &Response) -> Result<(), ClientError> {
    if resp.header(protocol::TUS_RESUMABLE).is_none() {
        return Err(ClientError::Protocol {
            status: resp.status,
            body: "response missing Tus-Resumable header".into(),
        });
    }
    Ok(())
}

fn required_offset(resp: &Response, verb: &str) -> Result<u64, ClientError> {
    match resp.header(protocol::UPLOAD_OFFSET) {
        Some(value) => protocol::parse_offset(value).map_err(|e| ClientError::Protocol {
            status: resp.status,
            body: e.to_string(),
        }),
        None => Err(ClientError::Protocol {
            status: resp.status,
            body: format!("{verb} response missing Upload-Offset"),
        }),
    }
}
