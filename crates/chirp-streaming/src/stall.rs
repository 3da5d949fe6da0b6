//! Stall detection for long-lived response bodies.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep, sleep};

use crate::{StreamError, StreamResult};

/// Extension trait for streams.
pub trait StallExt: Stream {
    /// Fail with [`StreamError::Stall`] when no item arrives within `timeout`.
    fn stall_after(self, timeout: Duration) -> StallGuard<Self>
    where
        Self: Sized,
    {
        StallGuard::new(self, timeout)
    }
}

impl<S: Stream> StallExt for S {}

pin_project! {
    /// Stream whose items must arrive no further apart than a timeout.
    pub struct StallGuard<S> {
        #[pin]
        inner: S,
        timeout: Duration,
        #[pin]
        deadline: Sleep,
    }
}

impl<S> StallGuard<S> {
    /// Create a new stall guard. Must be called inside a tokio runtime.
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: sleep(timeout),
        }
    }

    /// Configured stall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<S, T> Stream for StallGuard<S>
where
    S: Stream<Item = StreamResult<T>>,
{
    type Item = StreamResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Poll::Ready(item) = this.inner.poll_next(cx) {
            this.deadline.as_mut().reset(Instant::now() + *this.timeout);
            return Poll::Ready(item);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            this.deadline.as_mut().reset(Instant::now() + *this.timeout);
            return Poll::Ready(Some(Err(StreamError::Stall(*this.timeout))));
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::{self, StreamExt as _};

    #[tokio::test(start_paused = true)]
    async fn test_items_pass_through() {
        let inner = stream::iter(vec![Ok::<_, StreamError>(1), Ok(2), Ok(3)]);
        let guarded = inner.stall_after(Duration::from_secs(1));

        let items: Vec<i32> = guarded.map(Result::unwrap).collect().await;
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_reports_stall() {
        let inner = stream::iter(vec![Ok::<_, StreamError>(1)]).chain(stream::pending());
        let mut guarded = Box::pin(inner.stall_after(Duration::from_secs(90)));

        assert_eq!(guarded.next().await.unwrap().unwrap(), 1);

        let started = Instant::now();
        let err = guarded.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Stall(t) if t == Duration::from_secs(90)));
        assert!(started.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_errors_are_forwarded() {
        let inner = stream::iter(vec![Err::<i32, _>(StreamError::Read("reset".into()))]);
        let mut guarded = Box::pin(inner.stall_after(Duration::from_secs(1)));

        assert!(matches!(
            guarded.next().await,
            Some(Err(StreamError::Read(_)))
        ));
        assert!(guarded.next().await.is_none());
    }
}
