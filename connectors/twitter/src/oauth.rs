//! OAuth 1.0a implementation for Twitter API authentication.
//!
//! Twitter requires OAuth 1.0a signatures for user-context requests.
//! This module handles generating proper authorization headers.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::config::TwitterConfig;
use crate::error::{TwitterError, TwitterResult};
use crate::params::Parameters;
use crate::request::{HttpRequest, percent_encode};

/// Decorates a request with authentication before it is sent.
pub trait RequestSigner: Send + Sync + fmt::Debug {
    /// Add whatever headers the scheme needs.
    fn sign(&self, request: &mut HttpRequest) -> TwitterResult<()>;
}

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl RequestSigner for NoAuth {
    fn sign(&self, _request: &mut HttpRequest) -> TwitterResult<()> {
        Ok(())
    }
}

/// OAuth 1.0a user credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

impl From<&TwitterConfig> for OAuthCredentials {
    fn from(config: &TwitterConfig) -> Self {
        Self {
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            access_token: config.access_token.clone(),
            access_token_secret: config.access_token_secret.clone(),
        }
    }
}

/// OAuth 1.0a HMAC-SHA1 signer for Twitter API requests.
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    credentials: OAuthCredentials,
}

impl OAuthSigner {
    /// Create a signer from explicit credentials.
    #[must_use]
    pub const fn new(credentials: OAuthCredentials) -> Self {
        Self { credentials }
    }

    /// Create a signer from config.
    #[must_use]
    pub fn from_config(config: &TwitterConfig) -> Self {
        Self::new(OAuthCredentials::from(config))
    }

    /// Generate the OAuth 1.0a Authorization header value.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `url` - URL without query parameters
    /// * `params` - Query parameters or form body parameters
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &Parameters,
    ) -> TwitterResult<String> {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| TwitterError::OAuth(format!("Failed to get timestamp: {e}")))?
            .as_secs()
            .to_string();

        self.authorization_with(method, url, params, &generate_nonce(), &timestamp)
    }

    fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &Parameters,
        nonce: &str,
        timestamp: &str,
    ) -> TwitterResult<String> {
        let mut oauth_params = self.oauth_parameters(nonce, timestamp);

        let base_string = signature_base_string(method, url, &oauth_params, params);
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.credentials.consumer_secret),
            percent_encode(&self.credentials.access_token_secret)
        );
        let signature = hmac_sha1(&signing_key, &base_string)?;

        oauth_params.push(("oauth_signature".to_string(), signature));

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {header}"))
    }

    fn oauth_parameters(&self, nonce: &str, timestamp: &str) -> Vec<(String, String)> {
        vec![
            (
                "oauth_consumer_key".to_string(),
                self.credentials.consumer_key.clone(),
            ),
            ("oauth_nonce".to_string(), nonce.to_string()),
            (
                "oauth_signature_method".to_string(),
                "HMAC-SHA1".to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            (
                "oauth_token".to_string(),
                self.credentials.access_token.clone(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
        ]
    }
}

impl RequestSigner for OAuthSigner {
    fn sign(&self, request: &mut HttpRequest) -> TwitterResult<()> {
        let header = self.authorization(request.method.as_str(), &request.url, &request.params)?;
        request.set_header("Authorization", header);
        Ok(())
    }
}

/// Build the OAuth signature base string.
fn signature_base_string(
    method: &str,
    url: &str,
    oauth_params: &[(String, String)],
    params: &Parameters,
) -> String {
    let mut encoded: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();

    // Sorted by encoded key, then encoded value
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

/// Generate a random nonce for OAuth.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute HMAC-SHA1 and return base64-encoded result.
fn hmac_sha1(key: &str, data: &str) -> TwitterResult<String> {
    type HmacSha1 = Hmac<Sha1>;

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| TwitterError::OAuth(e.to_string()))?;

    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
