//! HTTP chunk transport.
//!
//! Each chunk is one `PUT` of its byte range to a pre-authorized URL,
//! identified by a `Content-Range` header. Downloads are a single `GET`.

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::TransferError;
use crate::body::ProgressStream;
use crate::transport::{ChunkTransport, ProgressFn, TransferFuture};
use crate::types::Chunk;

/// Placeholder in a destination template replaced by the file name.
const NAME_PLACEHOLDER: &str = "{name}";

/// Characters left unescaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Resolves a destination template for one file.
///
/// Every `{name}` is replaced by the percent-encoded file name; a template
/// without the placeholder is used as is.
pub fn destination_for(template: &str, file_name: &str) -> String {
    if !template.contains(NAME_PLACEHOLDER) {
        return template.to_string();
    }
    let encoded = utf8_percent_encode(file_name, PATH_SEGMENT).to_string();
    template.replace(NAME_PLACEHOLDER, &encoded)
}

/// [`ChunkTransport`] over `reqwest`.
pub struct HttpChunkTransport {
    http: reqwest::Client,
    block_size: Option<u64>,
}

impl HttpChunkTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            block_size: None,
        }
    }

    /// Sets the body block size used for progress reporting.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    async fn put_chunk(
        &self,
        destination: &str,
        chunk: Chunk,
        progress: ProgressFn,
    ) -> Result<u64, TransferError> {
        let range = chunk.range;
        trace!(%destination, %range, "sending chunk");

        let body = ProgressStream::new(chunk.data, progress, self.block_size);
        let resp = self
            .http
            .put(destination)
            .header(CONTENT_RANGE, range.content_range(chunk.total_size))
            .header(CONTENT_TYPE, chunk.content_type)
            .header(CONTENT_LENGTH, range.len())
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| TransferError::TransportFailure(format!("PUT {destination}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::TransportFailure(format!(
                "PUT {destination} returned status {status}: {body}"
            )));
        }

        Ok(range.end)
    }

    async fn get_object(&self, destination: &str) -> Result<Bytes, TransferError> {
        let resp = self
            .http
            .get(destination)
            .send()
            .await
            .map_err(|e| TransferError::TransportFailure(format!("GET {destination}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::TransportFailure(format!(
                "GET {destination} returned status {status}"
            )));
        }

        resp.bytes().await.map_err(|e| {
            TransferError::TransportFailure(format!("failed to read body of {destination}: {e}"))
        })
    }
}

impl ChunkTransport for HttpChunkTransport {
    fn send_chunk<'a>(
        &'a self,
        destination: &'a str,
        chunk: Chunk,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> TransferFuture<'a, u64> {
        Box::pin(async move {
            // Dropping the request future aborts the connection.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransferError::Cancelled),
                result = self.put_chunk(destination, chunk, progress) => result,
            }
        })
    }

    fn fetch<'a>(&'a self, destination: &'a str) -> TransferFuture<'a, Bytes> {
        Box::pin(self.get_object(destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkRange;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk(data: &'static [u8], start: u64, total: u64) -> Chunk {
        Chunk {
            range: ChunkRange {
                start,
                end: start + data.len() as u64,
            },
            total_size: total,
            content_type: "video/mp4".into(),
            data: Bytes::from_static(data),
        }
    }

    fn no_progress() -> ProgressFn {
        Arc::new(|_| {})
    }

    #[test]
    fn destination_for_encodes_name() {
        assert_eq!(
            destination_for("https://store.example/up/{name}?sig=abc", "my clip.mp4"),
            "https://store.example/up/my%20clip.mp4?sig=abc"
        );
    }

    #[test]
    fn destination_without_placeholder_is_unchanged() {
        let url = "https://store.example/presigned?sig=abc";
        assert_eq!(destination_for(url, "a.bin"), url);
    }

    #[tokio::test]
    async fn put_sends_range_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/obj"))
            .and(header("content-range", "bytes 5-9/12"))
            .and(header("content-type", "video/mp4"))
            .and(body_bytes(b"56789".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new()).with_block_size(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |n| s.lock().unwrap().push(n));

        let url = format!("{}/obj", server.uri());
        let end = transport
            .send_chunk(&url, chunk(b"56789", 5, 12), progress, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(end, 10);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&5));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn put_empty_object_uses_star_range() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes */0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let end = transport
            .send_chunk(
                &server.uri(),
                chunk(b"", 0, 0),
                no_progress(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(end, 0);
    }

    #[tokio::test]
    async fn error_status_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("expired signature"))
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let result = transport
            .send_chunk(
                &server.uri(),
                chunk(b"abc", 0, 3),
                no_progress(),
                CancellationToken::new(),
            )
            .await;

        match result {
            Err(TransferError::TransportFailure(msg)) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("expired signature"));
            }
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let result = transport
            .send_chunk(&url, chunk(b"abc", 0, 3), no_progress(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TransferError::TransportFailure(_))));
    }

    #[tokio::test]
    async fn cancel_aborts_hanging_request() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.send_chunk(&server.uri(), chunk(b"abc", 0, 3), no_progress(), cancel),
        )
        .await
        .expect("cancellation must resolve promptly");

        assert!(matches!(result, Err(TransferError::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_token_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport
            .send_chunk(&server.uri(), chunk(b"abc", 0, 3), no_progress(), cancel)
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/obj"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let body = transport
            .fetch(&format!("{}/obj", server.uri()))
            .await
            .unwrap();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn fetch_missing_object_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = HttpChunkTransport::new(reqwest::Client::new());
        let result = transport.fetch(&server.uri()).await;
        assert!(matches!(result, Err(TransferError::TransportFailure(_))));
    }
}
