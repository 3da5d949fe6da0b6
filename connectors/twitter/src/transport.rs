//! Byte transport for streaming connections.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chirp_streaming::{StreamError, StreamResult};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::TwitterConfig;
use crate::request::{HttpRequest, Method};

/// Body of an open streaming response.
pub type ByteStream = BoxStream<'static, StreamResult<Bytes>>;

/// Opens a streaming HTTP request and hands back the response body.
///
/// A non-2xx response must surface as [`StreamError::HttpStatus`]; failures
/// before a response as [`StreamError::Connect`].
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send the request and return the response body as a byte stream.
    async fn open(&self, request: &HttpRequest) -> StreamResult<ByteStream>;
}

/// [`StreamTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the given connect timeout.
    ///
    /// No overall request timeout is set; idle connections are caught by
    /// stall detection instead.
    pub fn new(connect_timeout: Duration) -> StreamResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(format!("chirp/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        Ok(Self { client })
    }

    /// Create a transport from configuration.
    pub fn from_config(config: &TwitterConfig) -> StreamResult<Self> {
        Self::new(config.timeout)
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamTransport for ReqwestTransport {
    async fn open(&self, request: &HttpRequest) -> StreamResult<ByteStream> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.full_url()),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, HttpRequest::FORM_CONTENT_TYPE)
                .body(body);
        }

        debug!(method = %request.method, url = %request.url, "Opening stream");

        let response = builder
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let message = response
                .text()
                .await
                .ok()
                .map(|body| body.trim().to_string())
                .filter(|body| !body.is_empty())
                .unwrap_or_else(|| reason(status));

            return Err(StreamError::HttpStatus {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Read(e.to_string())))
            .boxed())
    }
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map_or_else(|| status.as_str().to_string(), ToString::to_string)
}

/// `Retry-After` in its delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
