//! Connection core behavior against a scripted transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chirp_streaming::{StreamError, StreamResult};
use chirp_twitter::{
    BaseFilterParameters, ByteStream, ConnectionState, Delimited, FilterParameters,
    FilterStreamRequest, HttpRequest, Method, RequestSigner, SampleStreamRequest, StreamConfig,
    StreamEvent, StreamTransport, StreamingClient, StreamingParameters, TwitterResult,
    WarningNotice,
};
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted transport
// ─────────────────────────────────────────────────────────────────────────────

enum Step {
    Chunk(&'static str),
    Fail(StreamError),
    Hang,
}

enum Attempt {
    Refuse(StreamError),
    /// Accepts the request and never answers.
    Silent,
    Body(Vec<Step>),
}

struct Opened {
    at: Instant,
    request: HttpRequest,
}

/// Plays back one attempt per `open`, then hangs forever.
struct ScriptedTransport {
    attempts: Mutex<VecDeque<Attempt>>,
    opened: mpsc::UnboundedSender<Opened>,
}

impl ScriptedTransport {
    fn new(attempts: Vec<Attempt>) -> (Self, mpsc::UnboundedReceiver<Opened>) {
        let (opened, rx) = mpsc::unbounded_channel();
        let transport = Self {
            attempts: Mutex::new(attempts.into()),
            opened,
        };
        (transport, rx)
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, request: &HttpRequest) -> StreamResult<ByteStream> {
        let _ = self.opened.send(Opened {
            at: Instant::now(),
            request: request.clone(),
        });

        let attempt = self
            .attempts
            .lock()
            .pop_front()
            .unwrap_or(Attempt::Body(vec![Step::Hang]));

        let steps = match attempt {
            Attempt::Refuse(error) => return Err(error),
            Attempt::Silent => return futures_util::future::pending().await,
            Attempt::Body(steps) => steps,
        };

        let mut items = Vec::new();
        let mut hang = false;
        for step in steps {
            match step {
                Step::Chunk(text) => items.push(Ok(Bytes::from_static(text.as_bytes()))),
                Step::Fail(error) => items.push(Err(error)),
                Step::Hang => hang = true,
            }
        }

        let body = stream::iter(items);
        Ok(if hang {
            body.chain(stream::pending()).boxed()
        } else {
            body.boxed()
        })
    }
}

#[derive(Debug)]
struct TagSigner;

impl RequestSigner for TagSigner {
    fn sign(&self, request: &mut HttpRequest) -> TwitterResult<()> {
        request.set_header("Authorization", "OAuth signed");
        Ok(())
    }
}

fn channel_sink() -> (
    impl FnMut(StreamEvent) + Send + 'static,
    mpsc::UnboundedReceiver<StreamEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event: StreamEvent| {
            let _ = tx.send(event);
        },
        rx,
    )
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

fn status_id(event: &StreamEvent) -> u64 {
    match event {
        StreamEvent::Status(status) => status.id,
        other => panic!("expected status, got {other:?}"),
    }
}

fn sample() -> SampleStreamRequest {
    SampleStreamRequest::new(StreamingParameters::new())
}

fn assert_gap(earlier: &Opened, later: &Opened, expected: Duration) {
    let gap = later.at - earlier.at;
    assert!(
        gap >= expected && gap < expected + Duration::from_millis(50),
        "expected a gap of {expected:?}, got {gap:?}"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Delivery
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_frames_in_one_read_arrive_in_order() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("{\"id\":1,\"text\":\"a\"}\r\n{\"id\":2,\"text\":\"b\"}\r\n{\"id\":3,\"text\":\"c\"}\r\n"),
        Step::Hang,
    ])]);
    let (sink, mut events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    let ids = [
        status_id(&next(&mut events).await),
        status_id(&next(&mut events).await),
        status_id(&next(&mut events).await),
    ];
    assert_eq!(ids, [1, 2, 3]);
    assert_eq!(handle.state(), ConnectionState::Connected);

    handle.stop();
    handle.closed().await;
    assert_eq!(handle.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_keep_alives_and_garbage() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("\r\n\r\n"),
        Step::Chunk("not json\r\n"),
        Step::Chunk("{\"friends\":[1,2]}\r\n"),
        Step::Chunk("{\"id\":7,\"te"),
        Step::Chunk("xt\":\"split\"}\r\n"),
        Step::Hang,
    ])]);
    let (sink, mut events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    assert!(matches!(next(&mut events).await, StreamEvent::ParseError(_)));
    assert!(matches!(next(&mut events).await, StreamEvent::ParseError(_)));
    assert_eq!(status_id(&next(&mut events).await), 7);

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_length_delimited_stream() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("21\r\n{\"id\":1,\"t"),
        Step::Chunk("ext\":\"a\"}\r\n\r\n22\r\n{\"id\":22,\"text\":\"b\"}\r\n"),
        Step::Hang,
    ])]);
    let (sink, mut events) = channel_sink();
    let request =
        SampleStreamRequest::new(StreamingParameters::new().with_delimited(Delimited::Length));

    let handle = StreamingClient::new(transport).start(request, sink);

    assert_eq!(status_id(&next(&mut events).await), 1);
    assert_eq!(status_id(&next(&mut events).await), 22);

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_notices_are_delivered() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("{\"delete\":{\"status\":{\"id\":5,\"user_id\":6}}}\n"),
        Step::Chunk("{\"limit\":{\"track\":10}}\n"),
        Step::Chunk("{\"disconnect\":{\"code\":7,\"reason\":\"admin logout\"}}\n"),
        Step::Hang,
    ])]);
    let (sink, mut events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    assert!(matches!(next(&mut events).await, StreamEvent::Deletion(d) if d.id == 5));
    assert!(matches!(next(&mut events).await, StreamEvent::Limit(l) if l.track == 10));
    assert!(matches!(next(&mut events).await, StreamEvent::Disconnect(d) if d.code == 7));

    handle.stop();
    handle.closed().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconnect and backoff
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backoff_grows_then_resets() {
    let (transport, mut opened) = ScriptedTransport::new(vec![
        Attempt::Refuse(StreamError::http(420, "Enhance Your Calm")),
        Attempt::Refuse(StreamError::http(420, "Enhance Your Calm")),
        Attempt::Refuse(StreamError::http(429, "Too Many Requests")),
        Attempt::Body(vec![Step::Chunk("{\"id\":1,\"text\":\"a\"}\n")]),
        Attempt::Refuse(StreamError::http(420, "Enhance Your Calm")),
    ]);
    let (sink, mut events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    let mut opens = Vec::new();
    for _ in 0..6 {
        opens.push(next(&mut opened).await);
    }

    assert_gap(&opens[0], &opens[1], Duration::from_secs(5));
    assert_gap(&opens[1], &opens[2], Duration::from_secs(10));
    assert_gap(&opens[2], &opens[3], Duration::from_secs(20));
    // Bytes arrived, then the remote closed: network schedule from the start.
    assert_gap(&opens[3], &opens[4], Duration::from_millis(250));
    // HTTP schedule was reset as well.
    assert_gap(&opens[4], &opens[5], Duration::from_secs(5));

    assert_eq!(status_id(&next(&mut events).await), 1);

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_delays_are_capped() {
    let attempts = (0..9)
        .map(|_| Attempt::Refuse(StreamError::http(420, "Enhance Your Calm")))
        .collect();
    let (transport, mut opened) = ScriptedTransport::new(attempts);
    let (sink, _events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    let mut opens = Vec::new();
    for _ in 0..10 {
        opens.push(next(&mut opened).await);
    }

    let gaps: Vec<Duration> = opens.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "{gaps:?}");
    assert!(gaps.iter().all(|gap| *gap < Duration::from_secs(321)), "{gaps:?}");
    assert_gap(&opens[8], &opens[9], Duration::from_secs(320));

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_network_backoff_is_linear() {
    let (transport, mut opened) = ScriptedTransport::new(vec![
        Attempt::Refuse(StreamError::Connect("refused".into())),
        Attempt::Refuse(StreamError::Connect("refused".into())),
        Attempt::Body(vec![Step::Fail(StreamError::Read("reset".into()))]),
    ]);
    let (sink, _events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    let mut opens = Vec::new();
    for _ in 0..4 {
        opens.push(next(&mut opened).await);
    }

    assert_gap(&opens[0], &opens[1], Duration::from_millis(250));
    assert_gap(&opens[1], &opens[2], Duration::from_millis(500));
    assert_gap(&opens[2], &opens[3], Duration::from_millis(750));

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_raises_delay() {
    let (transport, mut opened) = ScriptedTransport::new(vec![Attempt::Refuse(
        StreamError::HttpStatus {
            status: 503,
            message: "Service Unavailable".into(),
            retry_after: Some(Duration::from_secs(30)),
        },
    )]);
    let (sink, _events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);

    let first = next(&mut opened).await;
    let second = next(&mut opened).await;
    assert_gap(&first, &second, Duration::from_secs(30));

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_backoff_state_is_published() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Refuse(StreamError::http(
        401,
        "Unauthorized",
    ))]);
    let (sink, _events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);
    let mut state = handle.subscribe_state();

    let seen = timeout(
        Duration::from_secs(60),
        state.wait_for(|s| matches!(s, ConnectionState::Backoff(_))),
    )
    .await
    .expect("timed out")
    .map(|s| *s)
    .unwrap();
    assert_eq!(seen, ConnectionState::Backoff(Duration::from_secs(5)));

    handle.stop();
    handle.closed().await;
    assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Stall detection
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stall_emits_warning_and_reconnects() {
    let (transport, mut opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("{\"id\":1,\"text\":\"a\"}\n"),
        Step::Hang,
    ])]);
    let (sink, mut events) = channel_sink();
    let request =
        SampleStreamRequest::new(StreamingParameters::new().with_stall_warnings(true));

    let handle = StreamingClient::new(transport).start(request, sink);

    let first = next(&mut opened).await;
    assert_eq!(status_id(&next(&mut events).await), 1);

    let StreamEvent::Warning(warning) = next(&mut events).await else {
        panic!("expected a stall warning");
    };
    assert_eq!(warning.code, WarningNotice::STALL);

    let second = next(&mut opened).await;
    assert_gap(&first, &second, Duration::from_secs(90) + Duration::from_millis(250));

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
    let (transport, mut opened) = ScriptedTransport::new(vec![
        Attempt::Silent,
        Attempt::Silent,
        Attempt::Body(vec![Step::Chunk("{\"id\":1,\"text\":\"a\"}\n"), Step::Hang]),
    ]);
    let (sink, mut events) = channel_sink();
    let config = StreamConfig {
        stall_timeout_secs: 5,
        ..StreamConfig::default()
    };
    let request =
        SampleStreamRequest::new(StreamingParameters::new().with_stall_warnings(true));

    let handle = StreamingClient::new(transport)
        .with_stream_config(config)
        .start(request, sink);

    let first = next(&mut opened).await;
    let second = next(&mut opened).await;
    let third = next(&mut opened).await;
    assert_gap(&first, &second, Duration::from_secs(5) + Duration::from_millis(250));
    assert_gap(&second, &third, Duration::from_secs(5) + Duration::from_millis(500));

    // Not a stall of an open stream: no warning, straight to the status.
    assert_eq!(status_id(&next(&mut events).await), 1);

    handle.stop();
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_stall_without_warnings_is_silent() {
    let (transport, mut opened) =
        ScriptedTransport::new(vec![Attempt::Body(vec![Step::Hang])]);
    let (sink, mut events) = channel_sink();
    let config = StreamConfig {
        stall_timeout_secs: 10,
        ..StreamConfig::default()
    };

    let handle = StreamingClient::new(transport)
        .with_stream_config(config)
        .start(sample(), sink);

    let first = next(&mut opened).await;
    let second = next(&mut opened).await;
    assert_gap(&first, &second, Duration::from_secs(10) + Duration::from_millis(250));
    assert!(events.try_recv().is_err());

    handle.stop();
    handle.closed().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Stopping
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stop_twice() {
    let (transport, mut opened) = ScriptedTransport::new(Vec::new());
    let (sink, _events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);
    next(&mut opened).await;

    handle.stop();
    handle.stop();
    handle.closed().await;
    handle.stopper().stop();

    assert!(handle.is_stopped());
    assert_eq!(handle.state(), ConnectionState::Closed);
    handle.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff() {
    let (transport, mut opened) = ScriptedTransport::new(vec![Attempt::Refuse(
        StreamError::http(420, "Enhance Your Calm"),
    )]);
    let (sink, _events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);
    let mut state = handle.subscribe_state();
    state
        .wait_for(|s| matches!(s, ConnectionState::Backoff(_)))
        .await
        .unwrap();

    let before = Instant::now();
    handle.stop();
    handle.closed().await;

    assert!(Instant::now() - before < Duration::from_secs(5));
    next(&mut opened).await;
    assert!(opened.try_recv().is_err(), "no reconnect after stop");
}

#[tokio::test(start_paused = true)]
async fn test_stop_inside_sink_ends_delivery() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("{\"id\":1,\"text\":\"a\"}\n{\"id\":2,\"text\":\"b\"}\n{\"id\":3,\"text\":\"c\"}\n"),
        Step::Hang,
    ])]);
    let (tx, mut events) = mpsc::unbounded_channel();
    let stopper = Arc::new(Mutex::new(None::<chirp_twitter::StopHandle>));

    let sink = {
        let stopper = Arc::clone(&stopper);
        move |event: StreamEvent| {
            let _ = tx.send(event);
            if let Some(stopper) = stopper.lock().as_ref() {
                stopper.stop();
            }
        }
    };

    // The task first runs at the next await, after the stopper is in place.
    let handle = StreamingClient::new(transport).start(sample(), sink);
    *stopper.lock() = Some(handle.stopper());

    handle.closed().await;

    assert_eq!(status_id(&events.recv().await.unwrap()), 1);
    assert!(events.recv().await.is_none(), "nothing delivered after stop");
}

#[tokio::test(start_paused = true)]
async fn test_no_events_after_stop_returns() {
    let (transport, _opened) = ScriptedTransport::new(vec![Attempt::Body(vec![
        Step::Chunk("{\"id\":1,\"text\":\"a\"}\n"),
        Step::Hang,
    ])]);
    let (sink, mut events) = channel_sink();

    let handle = StreamingClient::new(transport).start(sample(), sink);
    assert_eq!(status_id(&next(&mut events).await), 1);

    handle.stop();
    handle.closed().await;
    handle.join().await.unwrap();

    // The sink, and with it the sender, is dropped with the task.
    assert!(events.recv().await.is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests on the wire
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_filter_request_is_signed_post() {
    let (transport, mut opened) = ScriptedTransport::new(Vec::new());
    let (sink, _events) = channel_sink();
    let request = FilterStreamRequest::new(
        FilterParameters::from_filter(BaseFilterParameters::new().with_track("rust"))
            .with_follow("12"),
    );

    let handle = StreamingClient::new(transport)
        .with_signer(TagSigner)
        .start(request, sink);

    let Opened { request, .. } = next(&mut opened).await;
    assert_eq!(request.method, Method::Post);
    assert_eq!(
        request.url,
        "https://stream.twitter.com/1.1/statuses/filter.json"
    );
    assert_eq!(request.body().as_deref(), Some("follow=12&track=rust"));
    assert_eq!(request.header("authorization"), Some("OAuth signed"));

    handle.stop();
    handle.closed().await;
}
