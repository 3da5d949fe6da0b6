//! Streaming requests.
//!
//! A streaming request turns a parameter set into an [`HttpRequest`] aimed at
//! one of the streaming resources. The request is rebuilt on every connection
//! attempt so that signatures are always fresh.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::config::TwitterConfig;
use crate::params::{
    Delimited, FilterParameters, Parameters, StreamingParameters, ToParameters, UserParameters,
};

/// Public sample stream resource path.
pub const SAMPLE_PATH: &str = "/1.1/statuses/sample.json";

/// Public filter stream resource path.
pub const FILTER_PATH: &str = "/1.1/statuses/filter.json";

/// User stream resource path.
pub const USER_PATH: &str = "/1.1/user.json";

const DEFAULT_STREAM_URL: &str = "https://stream.twitter.com";
const DEFAULT_USER_STREAM_URL: &str = "https://userstream.twitter.com";

/// RFC 3986 unreserved characters pass through, everything else is escaped.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string according to RFC 3986.
pub(crate) fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, RFC3986).to_string()
}

/// Encode parameters as `k=v&k=v`, in key order.
pub(crate) fn encode_parameters(params: &Parameters) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport-neutral HTTP request.
///
/// `GET` requests carry their parameters in the query string, `POST`
/// requests as an `application/x-www-form-urlencoded` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method
    pub method: Method,
    /// Resource URL without query string
    pub url: String,
    /// Request parameters
    pub params: Parameters,
    /// Extra headers, e.g. `Authorization`
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Content type of a `POST` body.
    pub const FORM_CONTENT_TYPE: &'static str = "application/x-www-form-urlencoded";

    /// Create a request without headers.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, params: Parameters) -> Self {
        Self {
            method,
            url: url.into(),
            params,
            headers: Vec::new(),
        }
    }

    /// URL to send the request to, including the query string for `GET`.
    #[must_use]
    pub fn full_url(&self) -> String {
        match self.method {
            Method::Get if !self.params.is_empty() => {
                format!("{}?{}", self.url, encode_parameters(&self.params))
            }
            _ => self.url.clone(),
        }
    }

    /// Form body for `POST` requests.
    #[must_use]
    pub fn body(&self) -> Option<String> {
        match self.method {
            Method::Post => Some(encode_parameters(&self.params)),
            Method::Get => None,
        }
    }

    /// First header value with the given name, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// A request for one of the streaming resources.
pub trait StreamingRequest: Send + Sync + fmt::Debug {
    /// Serialize into an HTTP request. Same parameters, same request.
    fn build(&self) -> HttpRequest;

    /// Delimiting the server was asked to use.
    fn delimited(&self) -> Delimited;

    /// Whether the server was asked for stall warnings.
    fn stall_warnings(&self) -> bool;
}

fn resource(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

/// `GET statuses/sample`: a random sample of all public statuses.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStreamRequest {
    url: String,
    parameters: StreamingParameters,
}

impl SampleStreamRequest {
    /// Create a request against the public stream host.
    #[must_use]
    pub fn new(parameters: StreamingParameters) -> Self {
        Self {
            url: resource(DEFAULT_STREAM_URL, SAMPLE_PATH),
            parameters,
        }
    }

    /// Create a request against the configured stream host.
    #[must_use]
    pub fn from_config(config: &TwitterConfig, parameters: StreamingParameters) -> Self {
        Self::new(parameters).with_base_url(&config.stream_url)
    }

    /// Point the request at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.url = resource(base, SAMPLE_PATH);
        self
    }

    /// Replace the parameters.
    pub fn set_parameters(&mut self, parameters: StreamingParameters) {
        self.parameters = parameters;
    }

    /// Current parameters.
    #[must_use]
    pub const fn parameters(&self) -> &StreamingParameters {
        &self.parameters
    }
}

impl StreamingRequest for SampleStreamRequest {
    fn build(&self) -> HttpRequest {
        HttpRequest::new(Method::Get, &self.url, self.parameters.to_parameters())
    }

    fn delimited(&self) -> Delimited {
        self.parameters.delimited()
    }

    fn stall_warnings(&self) -> bool {
        self.parameters.stall_warnings()
    }
}

/// `POST statuses/filter`: public statuses matching tracks, locations or follows.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStreamRequest {
    url: String,
    parameters: FilterParameters,
}

impl FilterStreamRequest {
    /// Create a request against the public stream host.
    #[must_use]
    pub fn new(parameters: FilterParameters) -> Self {
        Self {
            url: resource(DEFAULT_STREAM_URL, FILTER_PATH),
            parameters,
        }
    }

    /// Create a request against the configured stream host.
    #[must_use]
    pub fn from_config(config: &TwitterConfig, parameters: FilterParameters) -> Self {
        Self::new(parameters).with_base_url(&config.stream_url)
    }

    /// Point the request at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.url = resource(base, FILTER_PATH);
        self
    }

    /// Replace the parameters.
    pub fn set_parameters(&mut self, parameters: FilterParameters) {
        self.parameters = parameters;
    }

    /// Current parameters.
    #[must_use]
    pub const fn parameters(&self) -> &FilterParameters {
        &self.parameters
    }
}

impl StreamingRequest for FilterStreamRequest {
    fn build(&self) -> HttpRequest {
        HttpRequest::new(Method::Post, &self.url, self.parameters.to_parameters())
    }

    fn delimited(&self) -> Delimited {
        self.parameters.filter().streaming().delimited()
    }

    fn stall_warnings(&self) -> bool {
        self.parameters.filter().streaming().stall_warnings()
    }
}

/// `GET user`: messages for the authenticated user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStreamRequest {
    url: String,
    parameters: UserParameters,
}

impl UserStreamRequest {
    /// Create a request against the user stream host.
    #[must_use]
    pub fn new(parameters: UserParameters) -> Self {
        Self {
            url: resource(DEFAULT_USER_STREAM_URL, USER_PATH),
            parameters,
        }
    }

    /// Create a request against the configured user stream host.
    #[must_use]
    pub fn from_config(config: &TwitterConfig, parameters: UserParameters) -> Self {
        Self::new(parameters).with_base_url(&config.user_stream_url)
    }

    /// Point the request at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.url = resource(base, USER_PATH);
        self
    }

    /// Replace the parameters.
    pub fn set_parameters(&mut self, parameters: UserParameters) {
        self.parameters = parameters;
    }

    /// Current parameters.
    #[must_use]
    pub const fn parameters(&self) -> &UserParameters {
        &self.parameters
    }
}

impl StreamingRequest for UserStreamRequest {
    fn build(&self) -> HttpRequest {
        HttpRequest::new(Method::Get, &self.url, self.parameters.to_parameters())
    }

    fn delimited(&self) -> Delimited {
        self.parameters.filter().streaming().delimited()
    }

    fn stall_warnings(&self) -> bool {
        self.parameters.filter().streaming().stall_warnings()
    }
}
