//! Concatenation of partial uploads into a final object.

use serde::Deserialize;
use tracing::debug;

use tusling_protocol as protocol;

use crate::client::Client;
use crate::error::ClientError;
use crate::transport::{Method, TransportError};

/// Envelope of a concat creation response body.
#[derive(Debug, Deserialize)]
struct ConcatResponse {
    data: ConcatData,
}

#[derive(Debug, Deserialize)]
struct ConcatData {
    checksum: String,
}

impl Client {
    /// Creates the final upload concatenating `partials`, in the order
    /// given, and returns the server-computed checksum of the result.
    ///
    /// The checksum is returned verbatim: the partials may have been
    /// produced by other processes, so no local verification is possible.
    /// The final resource itself never streams bytes.
    pub async fn concat(
        &mut self,
        final_key: &str,
        partials: &[&str],
    ) -> Result<String, ClientError> {
        if partials.is_empty() {
            return Err(ClientError::Config(
                "concatenation requires at least one partial key".into(),
            ));
        }

        let mut headers = vec![
            (
                protocol::TUS_RESUMABLE.to_string(),
                protocol::PROTOCOL_VERSION.to_string(),
            ),
            (protocol::UPLOAD_KEY.to_string(), final_key.to_string()),
            (
                protocol::UPLOAD_CONCAT.to_string(),
                protocol::concat_final(partials),
            ),
        ];
        if let Ok(file) = self.upload_state().require_file() {
            headers.push((
                protocol::UPLOAD_METADATA.to_string(),
                protocol::encode_metadata([("filename", file.filename.as_str())]),
            ));
        }
        let headers = protocol::merge_headers(headers, &self.config().headers);

        self.check_cancelled()?;
        let api_path = self.config().api_path.clone();
        let resp = match self
            .transport()
            .send(Method::Post, &api_path, headers, None)
            .await
        {
            Ok(resp) => resp,
            Err(TransportError::Client(resp)) | Err(TransportError::Server(resp)) => {
                return Err(ClientError::ResourceCreate(format!(
                    "concatenation failed with status {}",
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

        let parsed: ConcatResponse = serde_json::from_slice(&resp.body).map_err(|_| {
            ClientError::ResourceCreate("concatenation response lacked a checksum".into())
        })?;
        debug!(key = %final_key, parts = partials.len(), "partials concatenated");
        Ok(parsed.data.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::client::Config;
    use crate::transport::{Response, Transport, TransportFuture};
    use std::sync::{Arc, Mutex};

    /// Single-shot transport recording the one request concat issues.
    struct OneShot {
        response: Mutex<Option<Result<Response, TransportError>>>,
        request: Mutex<Option<(Method, String, Vec<(String, String)>)>>,
    }

    impl OneShot {
        fn new(response: Result<Response, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                request: Mutex::new(None),
            })
        }

        fn header(&self, name: &str) -> Option<String> {
            let request = self.request.lock().unwrap();
            let (_, _, headers) = request.as_ref().unwrap();
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        }
    }

    impl Transport for OneShot {
        fn send(
            &self,
            method: Method,
            suffix: &str,
            headers: Vec<(String, String)>,
            _body: Option<Vec<u8>>,
        ) -> TransportFuture<'_> {
            *self.request.lock().unwrap() = Some((method, suffix.to_string(), headers));
            Box::pin(async move {
                self.response
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or(Err(TransportError::Connect("exhausted".into())))
            })
        }
    }

    fn client_with(transport: &Arc<OneShot>) -> Client {
        Client::new(
            Config::new("http://h", "/files"),
            transport.clone(),
            Arc::new(MemoryCache::new()),
        )
    }

    #[tokio::test]
    async fn concat_posts_final_header_and_returns_checksum() {
        let body = br#"{"data":{"checksum":"deadbeef"}}"#.to_vec();
        let transport = OneShot::new(Ok(Response::new(201).with_body(body)));
        let mut client = client_with(&transport);

        let checksum = client
            .concat("final", &["p_a", "p_b", "p_c"])
            .await
            .unwrap();
        assert_eq!(checksum, "deadbeef");

        let request = transport.request.lock().unwrap().clone().unwrap();
        assert_eq!(request.0, Method::Post);
        assert_eq!(request.1, "/files");
        assert_eq!(
            transport.header(protocol::UPLOAD_CONCAT).as_deref(),
            Some("final;p_a p_b p_c")
        );
        assert_eq!(
            transport.header(protocol::UPLOAD_KEY).as_deref(),
            Some("final")
        );
        assert_eq!(
            transport.header(protocol::TUS_RESUMABLE).as_deref(),
            Some("1.0.0")
        );
    }

    #[tokio::test]
    async fn missing_checksum_is_resource_create_error() {
        let transport = OneShot::new(Ok(
            Response::new(201).with_body(br#"{"data":{}}"#.to_vec())
        ));
        let mut client = client_with(&transport);

        let err = client.concat("final", &["p_a"]).await.unwrap_err();
        assert!(matches!(err, ClientError::ResourceCreate(_)));
    }

    #[tokio::test]
    async fn non_created_status_is_resource_create_error() {
        let body = br#"{"data":{"checksum":"deadbeef"}}"#.to_vec();
        let transport = OneShot::new(Ok(Response::new(200).with_body(body)));
        let mut client = client_with(&transport);

        let err = client.concat("final", &["p_a"]).await.unwrap_err();
        assert!(matches!(err, ClientError::ResourceCreate(_)));
    }

    #[tokio::test]
    async fn rejected_concat_is_resource_create_error() {
        let transport = OneShot::new(Err(TransportError::Client(Response::new(403))));
        let mut client = client_with(&transport);

        let err = client.concat("final", &["p_a"]).await.unwrap_err();
        assert!(matches!(err, ClientError::ResourceCreate(_)));
    }

    #[tokio::test]
    async fn empty_partial_list_is_rejected_locally() {
        let transport = OneShot::new(Ok(Response::new(201)));
        let mut client = client_with(&transport);

        let err = client.concat("final", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(transport.request.lock().unwrap().is_none());
    }
}
