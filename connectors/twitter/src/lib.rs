//! chirp Twitter client
//!
//! Typed access to the Twitter v1.1 streaming and REST APIs.
//!
//! ## Streaming
//! - Parameter builders for the sample, filter and user streams
//! - A resilient connection core: reconnect with per-failure-class backoff,
//!   stall detection, newline or length-delimited framing
//! - Decoding of statuses and stream notices into [`StreamEvent`]s
//!
//! ## REST
//! - Search, status update, media upload
//!
//! # Example
//!
//! ```rust,no_run
//! use chirp_twitter::{
//!     FilterParameters, FilterStreamRequest, StreamEvent, StreamingClient, TwitterConfig,
//! };
//!
//! # async fn run() -> Result<(), chirp_twitter::TwitterError> {
//! let config = TwitterConfig::from_env();
//! let client = StreamingClient::from_config(&config)?;
//! let request = FilterStreamRequest::from_config(&config, FilterParameters::new().with_follow("12"));
//!
//! let handle = client.start(request, |event: StreamEvent| println!("{}", event.kind()));
//! handle.stop();
//! handle.closed().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod decode;
mod error;
mod oauth;
mod params;
mod request;
mod stream;
mod transport;
mod types;

pub use client::RestClient;
pub use config::{RateLimitInfo, StreamConfig, TwitterConfig};
pub use decode::{decode, decode_slice};
pub use error::{TwitterError, TwitterResult};
pub use oauth::{NoAuth, OAuthCredentials, OAuthSigner, RequestSigner};
pub use params::{
    BaseFilterParameters, Delimited, FilterLevel, FilterParameters, Parameters,
    StreamingParameters, ToParameters, UserParameters, With,
};
pub use request::{
    FILTER_PATH, FilterStreamRequest, HttpRequest, Method, SAMPLE_PATH, SampleStreamRequest,
    StreamingRequest, USER_PATH, UserStreamRequest,
};
pub use stream::{ConnectionState, EventSink, StopHandle, StreamHandle, StreamingClient};
pub use transport::{ByteStream, ReqwestTransport, StreamTransport};
pub use types::*;
