//! Streaming connection core.
//!
//! A [`StreamingClient`] spawns one task per connection. The task opens the
//! request, frames and decodes the response body, hands each event to the
//! [`EventSink`] in arrival order and reconnects with backoff whenever the
//! connection drops. Only [`StreamHandle::stop`] ends it.
//!
//! ```text
//! Disconnected ─start─▶ Connecting ─ok─▶ Connected
//!                         ▲   │ fail        │ read error / remote close / stall
//!                         │   ▼             ▼
//!                         └─ Backoff(d) ◀───┘
//!            any state ─stop─▶ Closed
//! ```

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chirp_streaming::{Delimiting, Frame, Framer, ReconnectBackoff, StallExt, StreamError};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{StreamConfig, TwitterConfig};
use crate::decode::decode_slice;
use crate::error::TwitterResult;
use crate::oauth::{NoAuth, OAuthSigner, RequestSigner};
use crate::params::Delimited;
use crate::request::StreamingRequest;
use crate::transport::{ReqwestTransport, StreamTransport};
use crate::types::{ParseError, StreamEvent, WarningNotice};

/// Receives decoded events, one call per event, on the connection task.
///
/// A slow sink slows down reading; events are never queued internally.
pub trait EventSink: Send + 'static {
    fn on_event(&mut self, event: StreamEvent);
}

impl<F> EventSink for F
where
    F: FnMut(StreamEvent) + Send + 'static,
{
    fn on_event(&mut self, event: StreamEvent) {
        self(event);
    }
}

/// Lifecycle of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started yet.
    Disconnected,
    /// Opening the request.
    Connecting,
    /// Response headers received, reading the body.
    Connected,
    /// Waiting this long before reconnecting.
    Backoff(Duration),
    /// Stopped for good.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Backoff(delay) => write!(f, "backoff({}ms)", delay.as_millis()),
            Self::Closed => f.write_str("closed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Starts streaming connections.
#[derive(Clone)]
pub struct StreamingClient {
    transport: Arc<dyn StreamTransport>,
    signer: Arc<dyn RequestSigner>,
    config: StreamConfig,
}

impl fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingClient")
            .field("signer", &self.signer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StreamingClient {
    /// Create an unauthenticated client over `transport`.
    pub fn new(transport: impl StreamTransport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            signer: Arc::new(NoAuth),
            config: StreamConfig::default(),
        }
    }

    /// Create an OAuth-signed client over HTTP.
    pub fn from_config(config: &TwitterConfig) -> TwitterResult<Self> {
        let transport = ReqwestTransport::from_config(config)?;

        Ok(Self::new(transport)
            .with_signer(OAuthSigner::from_config(config))
            .with_stream_config(config.stream.clone()))
    }

    /// Sign every connection attempt with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    /// Replace stall and backoff tuning.
    #[must_use]
    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Current stall and backoff tuning.
    #[must_use]
    pub const fn stream_config(&self) -> &StreamConfig {
        &self.config
    }

    /// Spawn a connection for `request` delivering into `sink`.
    ///
    /// Returns immediately. Must be called inside a tokio runtime. Dropping
    /// the returned handle detaches the connection; it keeps running until
    /// stopped through a [`StopHandle`].
    pub fn start(
        &self,
        request: impl StreamingRequest + 'static,
        sink: impl EventSink,
    ) -> StreamHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            shutdown,
            closed: AtomicBool::new(false),
            delivering: Mutex::new(()),
        });

        let span = info_span!("stream", url = %request.build().url);
        let connection = Connection {
            delimiting: match request.delimited() {
                Delimited::None => Delimiting::Newline,
                Delimited::Length => Delimiting::Length,
            },
            request: Box::new(request),
            transport: Arc::clone(&self.transport),
            signer: Arc::clone(&self.signer),
            sink: Box::new(sink),
            shared: Arc::clone(&shared),
            state: state_tx,
            backoff: self.config.backoff(),
            stall_timeout: self.config.stall_timeout(),
            max_message_bytes: self.config.max_message_bytes,
        };

        let task = tokio::spawn(connection.run(shutdown_rx).instrument(span));

        StreamHandle {
            stopper: StopHandle { shared },
            state: state_rx,
            task,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Control over a running connection.
#[derive(Debug)]
pub struct StreamHandle {
    stopper: StopHandle,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Stop the connection. See [`StopHandle::stop`].
    pub fn stop(&self) {
        self.stopper.stop();
    }

    /// A cloneable stopper, usable from inside the sink.
    #[must_use]
    pub fn stopper(&self) -> StopHandle {
        self.stopper.clone()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopper.is_stopped()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver observing every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the connection reached [`ConnectionState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // An error means the task is gone, which is closed as well.
        let _ = state
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }

    /// Wait for the connection task to finish.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

/// Stops a connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stop the connection.
    ///
    /// Synchronous and idempotent. Once this returns no further event is
    /// delivered. Drops the open response, if any.
    ///
    /// Called from inside any sink, this does not wait for the target's
    /// in-flight delivery: a sink stopping its own connection lets its
    /// current call finish, and a sink stopping another connection may see
    /// that connection deliver the one event it is already handing over.
    pub fn stop(&self) {
        let first = !self.shared.closed.swap(true, Ordering::AcqRel);
        self.shared.shutdown.send_replace(true);

        // Wait out an in-flight delivery on another thread.
        if !delivering_on_this_thread() {
            drop(self.shared.delivering.lock());
        }

        if first {
            info!("Stream stop requested");
        }
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.is_closed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delivery gate
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    /// Address of the gate whose sink is running on this thread, or 0.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Whether a sink of any connection is running on this thread.
fn delivering_on_this_thread() -> bool {
    DELIVERING.with(Cell::get) != 0
}

#[derive(Debug)]
struct Shared {
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    delivering: Mutex<()>,
}

impl Shared {
    fn id(&self) -> usize {
        std::ptr::from_ref(self).addr()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Deliver unless stopped. Returns whether the event was delivered.
    fn deliver(&self, sink: &mut dyn EventSink, event: StreamEvent) -> bool {
        let _guard = self.delivering.lock();
        if self.is_closed() {
            return false;
        }

        let _mark = DeliveryMark::enter(self.id());
        sink.on_event(event);
        true
    }
}

struct DeliveryMark {
    previous: usize,
}

impl DeliveryMark {
    fn enter(id: usize) -> Self {
        Self {
            previous: DELIVERING.with(|current| current.replace(id)),
        }
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|current| current.set(self.previous));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection task
// ─────────────────────────────────────────────────────────────────────────────

/// How a single connection attempt ended.
enum SessionEnd {
    Stopped,
    Failed(StreamError),
}

struct Connection {
    request: Box<dyn StreamingRequest>,
    delimiting: Delimiting,
    transport: Arc<dyn StreamTransport>,
    signer: Arc<dyn RequestSigner>,
    sink: Box<dyn EventSink>,
    shared: Arc<Shared>,
    state: watch::Sender<ConnectionState>,
    backoff: ReconnectBackoff,
    stall_timeout: Duration,
    max_message_bytes: usize,
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Connection {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !self.shared.is_closed() {
            self.set_state(ConnectionState::Connecting);

            let end = tokio::select! {
                biased;
                () = stopped(&mut shutdown) => SessionEnd::Stopped,
                end = self.session() => end,
            };

            let error = match end {
                SessionEnd::Stopped => break,
                SessionEnd::Failed(error) => error,
            };

            if let StreamError::Stall(timeout) = error {
                warn!(timeout_secs = timeout.as_secs(), "Stream stalled");
                if self.request.stall_warnings()
                    && !self.emit(StreamEvent::Warning(WarningNotice::stall(timeout)))
                {
                    break;
                }
            } else {
                warn!(error = %error, "Stream disconnected");
            }

            let delay = self.backoff.next_delay(&error);
            self.set_state(ConnectionState::Backoff(delay));

            tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Closed);
    }

    /// One connection attempt, from open to disconnect.
    async fn session(&mut self) -> SessionEnd {
        let mut request = self.request.build();
        if let Err(e) = self.signer.sign(&mut request) {
            return SessionEnd::Failed(StreamError::Connect(format!("signing failed: {e}")));
        }

        // Headers must arrive within the stall timeout too.
        let body = match tokio::time::timeout(self.stall_timeout, self.transport.open(&request)).await
        {
            Ok(Ok(body)) => body,
            Ok(Err(error)) => return SessionEnd::Failed(error),
            Err(_) => {
                return SessionEnd::Failed(StreamError::Connect(format!(
                    "no response within {}s",
                    self.stall_timeout.as_secs()
                )));
            }
        };
        self.set_state(ConnectionState::Connected);

        let mut framer = Framer::new(self.delimiting).with_max_frame_size(self.max_message_bytes);
        let mut body = std::pin::pin!(body.stall_after(self.stall_timeout));
        let mut received = false;

        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    if !received && !chunk.is_empty() {
                        received = true;
                        self.backoff.reset();
                    }

                    for frame in framer.push(&chunk) {
                        if !self.emit_frame(frame) {
                            return SessionEnd::Stopped;
                        }
                    }
                }
                Some(Err(error)) => return SessionEnd::Failed(error),
                None => {
                    if let Some(error) = framer.finish() {
                        if !self.emit_frame(Err(error)) {
                            return SessionEnd::Stopped;
                        }
                    }
                    return SessionEnd::Failed(StreamError::Closed);
                }
            }
        }
    }

    fn emit_frame(&mut self, frame: Frame) -> bool {
        let event = match frame {
            Ok(bytes) => {
                let event = decode_slice(&bytes);
                debug!(kind = event.kind(), bytes = bytes.len(), "Received message");
                event
            }
            Err(error) => {
                warn!(error = %error, "Dropped unframeable data");
                StreamEvent::ParseError(ParseError {
                    message: error.to_string(),
                    raw: String::new(),
                })
            }
        };

        if let StreamEvent::ParseError(ref error) = event {
            warn!(message = %error.message, "Failed to decode stream message");
        }

        self.emit(event)
    }

    fn emit(&mut self, event: StreamEvent) -> bool {
        self.shared.deliver(self.sink.as_mut(), event)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(%state, "Stream state changed");
        }
    }
}
