//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is for live distribution, not storage:
//!
//! - **Best-effort broadcast**: every subscriber attached at publish time gets its own copy
//! - **No replay**: a subscriber only sees events published after it attached
//! - **Non-blocking publish**: a full subscriber queue drops the event for that subscriber
//!   instead of stalling the publisher
//!
//! The job store remains the source of truth; observers that missed events reload
//! through the history query.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::{Stream, StreamExt};

/// Outcome of a single publish, for logging and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the event.
    pub delivered: usize,
    /// Subscribers whose queue was full; the event was dropped for them.
    pub dropped: usize,
}

/// Periodic synthetic message merged into a subscription.
pub struct Heartbeat<M> {
    ticker: Interval,
    make: Arc<dyn Fn() -> M + Send + Sync>,
}

impl<M> Heartbeat<M> {
    /// First heartbeat fires one full `period` after creation.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(period: Duration, make: Arc<dyn Fn() -> M + Send + Sync>) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker, make }
    }

    fn poll_beat(&mut self, cx: &mut Context<'_>) -> Poll<M> {
        self.ticker.poll_tick(cx).map(|_| (self.make)())
    }
}

/// A subscription to an event stream.
///
/// Yields every message published while attached, interleaved with heartbeats
/// (if the bus emits them) in the order they reach this subscription. The
/// stream ends when the bus shuts down.
///
/// Dropping the subscription detaches it from the bus and releases its queue.
pub struct Subscription<M> {
    receiver: mpsc::Receiver<M>,
    heartbeat: Option<Heartbeat<M>>,
    on_detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<M> Unpin for Subscription<M> {}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::Receiver<M>) -> Self {
        Self {
            receiver,
            heartbeat: None,
            on_detach: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat<M>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Run `f` once when this subscription is dropped.
    pub fn on_detach(mut self, f: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_detach = Some(Box::new(f));
        self
    }

    /// Wait for the next message or heartbeat. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.next().await
    }

    /// Take an already-queued published message, without waiting and without
    /// heartbeats.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<M> Stream for Subscription<M> {
    type Item = M;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<M>> {
        let this = self.get_mut();

        // Queued events win over a due heartbeat.
        match this.receiver.poll_recv(cx) {
            Poll::Ready(msg) => return Poll::Ready(msg),
            Poll::Pending => {}
        }

        match this.heartbeat.as_mut() {
            Some(hb) => hb.poll_beat(cx).map(Some),
            None => Poll::Pending,
        }
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Some(f) = self.on_detach.take() {
            f();
        }
    }
}

impl<M> core::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("heartbeat", &self.heartbeat.is_some())
            .field("closed", &self.receiver.is_closed())
            .finish()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish` never fails from the caller's point of view: slow or departed
/// subscribers are the bus's problem, reported through `PublishReport` and
/// logs. Implementations must be safe to share across tasks.
pub trait EventBus<M>: Send + Sync {
    fn publish(&self, message: M) -> PublishReport;

    fn subscribe(&self) -> Subscription<M>;

    /// Currently attached subscribers.
    fn subscriber_count(&self) -> usize;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    fn publish(&self, message: M) -> PublishReport {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }

    fn subscriber_count(&self) -> usize {
        (**self).subscriber_count()
    }
}
