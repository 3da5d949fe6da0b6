//! chirp streaming - building blocks for long-lived HTTP streaming clients
//!
//! This crate is service agnostic:
//!
//! - **Framing**: newline and length-prefixed message demarcation
//! - **Backoff**: linear (network) and exponential (HTTP) reconnect schedules
//! - **Stall detection**: per-item timeout over a byte stream
//! - **Errors**: the failure taxonomy that drives reconnect decisions
//!
//! # Quick Start
//!
//! ```rust
//! use chirp_streaming::{Delimiting, Framer};
//!
//! let mut framer = Framer::new(Delimiting::Length);
//! let frames = framer.push(b"5\n{\"a\":1}\n3\n{}\n");
//! assert_eq!(frames.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod backoff;
mod error;
mod framing;
mod stall;

pub use backoff::*;
pub use error::*;
pub use framing::*;
pub use stall::*;

use std::time::Duration;

/// Default stall timeout, streaming API convention.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(90);

/// First network-class reconnect delay.
pub const DEFAULT_NETWORK_BACKOFF_INITIAL: Duration = Duration::from_millis(250);

/// Added per consecutive network-class failure.
pub const DEFAULT_NETWORK_BACKOFF_STEP: Duration = Duration::from_millis(250);

/// Network-class reconnect ceiling.
pub const DEFAULT_NETWORK_BACKOFF_MAX: Duration = Duration::from_secs(16);

/// First HTTP-class reconnect delay.
pub const DEFAULT_HTTP_BACKOFF_INITIAL: Duration = Duration::from_secs(5);

/// HTTP-class reconnect ceiling.
pub const DEFAULT_HTTP_BACKOFF_MAX: Duration = Duration::from_secs(320);

/// Default initial buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Largest single message accepted before the framer resynchronizes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;
