//! Pluggable request/response transport.
//!
//! The state machine needs four verbs and terminal responses; redirects,
//! TLS, and timeouts are the transport's business. A trait keeps the
//! protocol logic decoupled from any HTTP stack and testable with
//! scripted responses.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// HTTP verbs the protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        })
    }
}

/// A terminal response.
///
/// Header names are normalized to lowercase on insertion so lookups are
/// case-insensitive, as HTTP requires.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    headers: BTreeMap<String, String>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The body as text, lossily decoded, for error reporting.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Errors a transport may surface.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never reached a terminal response.
    #[error("could not reach server: {0}")]
    Connect(String),

    /// Terminal 4xx (and any sub-2xx status a transport chooses to
    /// surface as terminal).
    #[error("client error: status {}", .0.status)]
    Client(Response),

    /// Terminal 5xx.
    #[error("server error: status {}", .0.status)]
    Server(Response),
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>>;

/// Abstract HTTP transport.
///
/// Implementations follow redirects and enforce timeouts; the client only
/// ever sees terminal responses or [`TransportError`]s.
pub trait Transport: Send + Sync {
    /// Issues `method` against `<base><suffix>` with the given headers and
    /// optional body.
    fn send(
        &self,
        method: Method,
        suffix: &str,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> TransportFuture<'_>;
}
