//! Stream throttling utilities

use futures::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per period
    ///
    /// Uses "latest-wins" semantics - if multiple items arrive
    /// during a period, only the latest is emitted.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        delay: Pin<Box<Sleep>>,
        period: Duration,
        pending: Option<S::Item>,
        finished: bool,
    }
}

impl<S: Stream> Throttle<S> {
    /// Create a new throttled stream; the first item passes straight through
    pub fn new(stream: S, period: Duration) -> Self {
        Self {
            stream,
            delay: Box::pin(sleep(Duration::ZERO)),
            period,
            pending: None,
            finished: false,
        }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything ready upstream, keeping only the latest
        while !*this.finished {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.finished = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return if *this.finished { Poll::Ready(None) } else { Poll::Pending };
        }
        if *this.finished {
            return Poll::Ready(this.pending.take());
        }

        ready!(this.delay.as_mut().poll(cx));
        let deadline = Instant::now() + *this.period;
        this.delay.as_mut().reset(deadline);
        Poll::Ready(this.pending.take())
    }
}
