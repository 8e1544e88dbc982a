//! Keyed latest-wins throttling

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait adding keyed throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Emit at most one item per key per interval.
    ///
    /// Latest-wins per key: items arriving within one interval replace the
    /// pending item with the same key, and each flush yields the pending
    /// items in the order their keys first appeared. Pending items are
    /// flushed when the inner stream ends.
    fn throttle_latest_by<K, F>(self, duration: Duration, key: F) -> KeyedThrottle<Self, K, F>
    where
        Self: Sized,
        K: PartialEq,
        F: FnMut(&Self::Item) -> K,
    {
        KeyedThrottle::new(self, duration, key)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream combinator returned by [`ThrottleExt::throttle_latest_by`]
    pub struct KeyedThrottle<S: Stream, K, F> {
        #[pin]
        stream: S,
        interval: Interval,
        key: F,
        pending: Vec<(K, S::Item)>,
        ready: std::collections::VecDeque<S::Item>,
        done: bool,
    }
}

impl<S: Stream, K, F> KeyedThrottle<S, K, F> {
    /// Create a throttled stream. Needs a tokio runtime for its timer.
    pub fn new(stream: S, duration: Duration, key: F) -> Self {
        let mut interval = interval(duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            stream,
            interval,
            key,
            pending: Vec::new(),
            ready: std::collections::VecDeque::new(),
            done: false,
        }
    }
}

impl<S, K, F> Stream for KeyedThrottle<S, K, F>
where
    S: Stream,
    K: PartialEq,
    F: FnMut(&S::Item) -> K,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.ready.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            // Drain everything available, keeping the latest per key
            loop {
                match this.stream.as_mut().poll_next(cx) {
                    Poll::Ready(Some(item)) => {
                        let key = (this.key)(&item);
                        match this.pending.iter_mut().find(|(existing, _)| *existing == key) {
                            Some(slot) => slot.1 = item,
                            None => this.pending.push((key, item)),
                        }
                    }
                    Poll::Ready(None) => {
                        *this.done = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }

            if this.pending.is_empty() {
                if *this.done {
                    return Poll::Ready(None);
                }
                return Poll::Pending;
            }

            if !*this.done && this.interval.poll_tick(cx).is_pending() {
                return Poll::Pending;
            }
            this.ready.extend(this.pending.drain(..).map(|(_, item)| item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_latest_per_key() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut throttled = UnboundedReceiverStream::new(rx)
            .throttle_latest_by(Duration::from_millis(100), |(source, _): &(u64, u32)| *source);

        // The first tick is immediate, so the first item passes straight through.
        tx.send((1, 0)).unwrap();
        assert_eq!(throttled.next().await, Some((1, 0)));

        for value in 1..=5 {
            tx.send((1, value)).unwrap();
            tx.send((2, value * 10)).unwrap();
        }

        let start = tokio::time::Instant::now();
        assert_eq!(throttled.next().await, Some((1, 5)));
        assert_eq!(throttled.next().await, Some((2, 50)));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_items_flush_when_inner_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let throttled = UnboundedReceiverStream::new(rx)
            .throttle_latest_by(Duration::from_secs(10), |value: &u32| *value % 2);

        for value in 0..6u32 {
            tx.send(value).unwrap();
        }
        drop(tx);

        let items: Vec<u32> = throttled.collect().await;
        assert_eq!(items, vec![4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_stream_waits_without_ending() {
        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let mut throttled =
            UnboundedReceiverStream::new(rx).throttle_latest_by(Duration::from_millis(50), |_| ());

        let nothing = tokio::time::timeout(Duration::from_secs(1), throttled.next()).await;
        assert!(nothing.is_err());

        tx.send(7).unwrap();
        assert_eq!(throttled.next().await, Some(7));
    }
}
