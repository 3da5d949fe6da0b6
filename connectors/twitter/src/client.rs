//! Twitter REST API client.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::{
    config::{RateLimitInfo, TwitterConfig},
    error::{TwitterError, TwitterResult},
    oauth::{OAuthSigner, RequestSigner},
    params::Parameters,
    request::{HttpRequest, Method},
    types::{MediaUploadResponse, SearchResponse, Status},
};

const SEARCH_PATH: &str = "/1.1/search/tweets.json";
const UPDATE_PATH: &str = "/1.1/statuses/update.json";
const UPLOAD_PATH: &str = "/1.1/media/upload.json";

/// Twitter REST API client.
#[derive(Debug)]
pub struct RestClient {
    client: Client,
    api_url: String,
    upload_url: String,
    signer: Box<dyn RequestSigner>,
}

impl RestClient {
    /// Create a new API client from configuration.
    pub fn new(config: &TwitterConfig) -> TwitterResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("chirp/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            signer: Box::new(OAuthSigner::from_config(config)),
        })
    }

    /// Replace the request signer.
    #[must_use]
    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Box::new(signer);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Search recent statuses.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> TwitterResult<SearchResponse> {
        let params = Parameters::from([("q".to_string(), query.to_string())]);
        self.send(HttpRequest::new(
            Method::Get,
            format!("{}{SEARCH_PATH}", self.api_url),
            params,
        ))
        .await
    }

    /// Post a status.
    #[instrument(skip(self))]
    pub async fn update_status(&self, text: &str) -> TwitterResult<Status> {
        self.post_status(text, None).await
    }

    /// Upload a media file and post a status with it attached.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn update_status_with_media(
        &self,
        text: &str,
        path: impl AsRef<Path>,
    ) -> TwitterResult<Status> {
        let media = self.upload_media(path).await?;
        self.post_status(text, Some(&media.id_string())).await
    }

    async fn post_status(&self, text: &str, media_ids: Option<&str>) -> TwitterResult<Status> {
        let mut params = Parameters::from([("status".to_string(), text.to_string())]);
        if let Some(ids) = media_ids {
            params.insert("media_ids".into(), ids.into());
        }

        self.send(HttpRequest::new(
            Method::Post,
            format!("{}{UPDATE_PATH}", self.api_url),
            params,
        ))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Media endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload a file as-is, base64 transfer-encoded.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn upload_media(&self, path: impl AsRef<Path>) -> TwitterResult<MediaUploadResponse> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        debug!(size = bytes.len(), "Uploading media");

        let params = Parameters::from([("media_data".to_string(), BASE64.encode(&bytes))]);
        self.send(HttpRequest::new(
            Method::Post,
            format!("{}{UPLOAD_PATH}", self.upload_url),
            params,
        ))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    async fn send<T: DeserializeOwned>(&self, mut request: HttpRequest) -> TwitterResult<T> {
        self.signer.sign(&mut request)?;
        debug!(method = %request.method, url = %request.url, "Making Twitter API request");

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

        let response = builder.send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> TwitterResult<T> {
        let status = response.status();

        let rate_limit = RateLimitInfo::from_headers(response.headers());
        if rate_limit.is_exhausted() {
            debug!(reset = ?rate_limit.reset, "Rate limit exhausted");
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = rate_limit
                .time_until_reset()
                .map_or(60, |d| d.as_secs());

            return Err(TwitterError::RateLimited { retry_after });
        }

        let bytes = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(TwitterError::from);
        }

        #[derive(serde::Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            errors: Vec<ErrorEntry>,
        }

        #[derive(serde::Deserialize)]
        struct ErrorEntry {
            #[serde(default)]
            code: Option<i32>,
            #[serde(default)]
            message: Option<String>,
        }

        let first = serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(|body| body.errors.into_iter().next());

        let (error_code, message) = match first {
            Some(entry) => (entry.code, entry.message),
            None => (None, None),
        };
        let message = message.unwrap_or_else(|| {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                text
            }
        });

        Err(TwitterError::Api {
            status: status.as_u16(),
            message,
            error_code,
            retry_after: rate_limit.time_until_reset().map(|d| d.as_secs()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string, body_string_contains, header_exists, method, path, query_param},
    };

    /// Create a test config pointing to the mock server.
    fn test_config(mock_server: &MockServer) -> TwitterConfig {
        TwitterConfig {
            consumer_key: "test_consumer_key".into(),
            consumer_secret: "test_consumer_secret".into(),
            access_token: "test_access_token".into(),
            access_token_secret: "test_access_token_secret".into(),
            api_url: mock_server.uri(),
            upload_url: mock_server.uri(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_search_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.1/search/tweets.json"))
            .and(query_param("q", "rust lang"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "statuses": [
                    {
                        "id": 1234,
                        "text": "Hello world",
                        "metadata": {"iso_language_code": "en", "result_type": "recent"}
                    },
                    {"id": 5678, "text": "Test tweet"}
                ],
                "search_metadata": {"count": 2, "query": "rust+lang", "max_id": 5678}
            })))
            .mount(&mock_server)
            .await;

        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let response = client.search("rust lang").await.unwrap();
        assert_eq!(response.statuses.len(), 2);
        assert_eq!(response.statuses[0].text.as_deref(), Some("Hello world"));
        assert_eq!(
            response.statuses[0]
                .metadata
                .as_ref()
                .and_then(|m| m.iso_language_code.as_deref()),
            Some("en")
        );
        assert_eq!(response.search_metadata.unwrap().count, Some(2));
    }

    #[tokio::test]
    async fn test_update_status_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(header_exists("Authorization"))
            .and(body_string("status=Hello%2C%20Twitter%21"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1_234_567_890_u64,
                "text": "Hello, Twitter!"
            })))
            .mount(&mock_server)
            .await;

        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let status = client.update_status("Hello, Twitter!").await.unwrap();
        assert_eq!(status.id, 1_234_567_890);
        assert_eq!(status.text.as_deref(), Some("Hello, Twitter!"));
    }

    #[tokio::test]
    async fn test_update_status_with_media() {
        let mock_server = MockServer::start().await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"GIF89a").unwrap();

        // base64("GIF89a") == "R0lGODlh"
        Mock::given(method("POST"))
            .and(path("/1.1/media/upload.json"))
            .and(body_string("media_data=R0lGODlh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "media_id": 710_511_363_345_354_753_u64,
                "media_id_string": "710511363345354753",
                "size": 6
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(body_string_contains("media_ids=710511363345354753"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 99,
                "text": "with a picture",
                "extended_entities": {"media": [{"id": 710_511_363_345_354_753_u64, "type": "photo"}]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let status = client
            .update_status_with_media("with a picture", file.path())
            .await
            .unwrap();
        assert_eq!(status.id, 99);
        assert_eq!(
            status.extended_entities.unwrap().media[0].kind.as_deref(),
            Some("photo")
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let mock_server = MockServer::start().await;
        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let err = client
            .upload_media("/definitely/not/here.png")
            .await
            .unwrap_err();
        assert!(matches!(err, TwitterError::Io(_)));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.1/search/tweets.json"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-rate-limit-reset", "1700000000")
                    .set_body_json(serde_json::json!({
                        "errors": [{"code": 88, "message": "Rate limit exceeded"}]
                    })),
            )
            .mount(&mock_server)
            .await;

        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let err = client.search("x").await.unwrap_err();
        assert!(matches!(err, TwitterError::RateLimited { retry_after: 60 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "errors": [{"code": 32, "message": "Could not authenticate you."}]
            })))
            .mount(&mock_server)
            .await;

        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let err = client.update_status("hi").await.unwrap_err();
        assert!(matches!(
            err,
            TwitterError::Api {
                status: 401,
                error_code: Some(32),
                ref message,
                ..
            } if message == "Could not authenticate you."
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_plain_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.1/search/tweets.json"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Over capacity"))
            .mount(&mock_server)
            .await;

        let client = RestClient::new(&test_config(&mock_server)).unwrap();

        let err = client.search("x").await.unwrap_err();
        assert!(matches!(
            err,
            TwitterError::Api { status: 503, error_code: None, ref message, .. } if message == "Over capacity"
        ));
        assert!(err.is_retryable());
    }
}
