//! `reqwest`-backed [`Transport`].

use tracing::debug;

use crate::error::ClientError;
use crate::transport::{Method, Response, Transport, TransportError, TransportFuture};

/// Default transport speaking HTTP via `reqwest`.
///
/// Redirects are followed transparently; only terminal responses reach
/// the caller.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url` (scheme + authority).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::build(base_url, None)
    }

    /// Creates a transport with a per-request timeout, surfaced as a
    /// connection failure when exceeded.
    pub fn with_timeout(base_url: &str, timeout: std::time::Duration) -> Result<Self, ClientError> {
        Self::build(base_url, Some(timeout))
    }

    fn build(base_url: &str, timeout: Option<std::time::Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        method: Method,
        suffix: &str,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> TransportFuture<'_> {
        let url = format!("{}{}", self.base_url, suffix);
        Box::pin(async move {
            let verb = match method {
                Method::Head => reqwest::Method::HEAD,
                Method::Post => reqwest::Method::POST,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };

            let mut request = self.http.request(verb, &url);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = body {
                request = request.body(body);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let status = resp.status().as_u16();
            let mut out = Response::new(status);
            for (name, value) in resp.headers() {
                if let Ok(value) = value.to_str() {
                    out = out.with_header(name.as_str(), value);
                }
            }
            out.body = resp
                .bytes()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?
                .to_vec();

            debug!(%method, url = %url, status, "request complete");

            match status {
                200..=399 => Ok(out),
                500..=599 => Err(TransportError::Server(out)),
                // 4xx, plus any sub-2xx status that somehow became terminal.
                _ => Err(TransportError::Client(out)),
            }
        })
    }
}
