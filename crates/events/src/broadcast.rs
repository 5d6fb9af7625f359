//! Bounded multicast bus with one queue per subscriber.
//!
//! - publish = enqueue-or-drop into every registered queue (never blocks)
//! - subscribe = create a queue + register it
//! - detach (drop the `Subscription`) = deregister + release the queue
//!
//! The registry lock is only held for map operations, never across an await
//! or while sending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use crate::bus::{EventBus, Heartbeat, PublishReport, Subscription};

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Bus sizing and heartbeat cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Per-subscriber queue capacity.
    pub capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

struct Registry<M> {
    next_id: u64,
    queues: HashMap<u64, mpsc::Sender<M>>,
    closed: bool,
}

struct HeartbeatSource<M> {
    period: Duration,
    make: Arc<dyn Fn() -> M + Send + Sync>,
}

/// In-process multicast bus.
///
/// Created once at startup and torn down with `shutdown()`; after shutdown
/// every subscription stream ends and new subscriptions yield nothing.
pub struct BroadcastEventBus<M> {
    registry: Arc<Mutex<Registry<M>>>,
    capacity: usize,
    heartbeat: Option<HeartbeatSource<M>>,
}

fn lock<M>(registry: &Mutex<Registry<M>>) -> MutexGuard<'_, Registry<M>> {
    // A panic while holding the lock cannot leave the map half-updated.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M> BroadcastEventBus<M> {
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                queues: HashMap::new(),
                closed: false,
            })),
            capacity: capacity.max(1),
            heartbeat: None,
        }
    }

    /// Merge a heartbeat produced by `make` into every subscription, once per `period`.
    pub fn with_heartbeat(
        mut self,
        period: Duration,
        make: impl Fn() -> M + Send + Sync + 'static,
    ) -> Self {
        self.heartbeat = Some(HeartbeatSource {
            period,
            make: Arc::new(make),
        });
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.registry).closed
    }

    /// Detach every subscriber and refuse new ones.
    pub fn shutdown(&self) {
        let mut reg = lock(&self.registry);
        reg.closed = true;
        let detached = reg.queues.len();
        reg.queues.clear();
        info!(detached, "event bus shut down");
    }
}

impl<M> EventBus<M> for BroadcastEventBus<M>
where
    M: Clone + Send + 'static,
{
    fn publish(&self, message: M) -> PublishReport {
        let targets: Vec<(u64, mpsc::Sender<M>)> = {
            let reg = lock(&self.registry);
            if reg.closed {
                debug!("publish on closed event bus ignored");
                return PublishReport::default();
            }
            reg.queues.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut report = PublishReport::default();
        let mut departed = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(
                        subscriber = id,
                        capacity = self.capacity,
                        "subscriber queue full; event dropped for this subscriber"
                    );
                }
                Err(TrySendError::Closed(_)) => departed.push(id),
            }
        }

        if !departed.is_empty() {
            let mut reg = lock(&self.registry);
            for id in departed {
                reg.queues.remove(&id);
            }
        }

        trace!(delivered = report.delivered, dropped = report.dropped, "event published");
        report
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel(self.capacity);

        let attached = {
            let mut reg = lock(&self.registry);
            if reg.closed {
                None
            } else {
                let id = reg.next_id;
                reg.next_id += 1;
                reg.queues.insert(id, tx);
                Some((id, reg.queues.len()))
            }
        };

        let Some((id, subscribers)) = attached else {
            // Sender already dropped: the stream ends immediately.
            debug!("subscribe on closed event bus; subscription yields nothing");
            return Subscription::new(rx);
        };

        info!(subscriber = id, subscribers, "subscriber attached");

        let registry: Weak<Mutex<Registry<M>>> = Arc::downgrade(&self.registry);
        let subscription = Subscription::new(rx).on_detach(move || {
            if let Some(registry) = registry.upgrade() {
                let mut reg = lock(&registry);
                reg.queues.remove(&id);
                info!(subscriber = id, subscribers = reg.queues.len(), "subscriber detached");
            }
        });

        match &self.heartbeat {
            Some(hb) => subscription.with_heartbeat(Heartbeat::new(hb.period, hb.make.clone())),
            None => subscription,
        }
    }

    fn subscriber_count(&self) -> usize {
        lock(&self.registry).queues.len()
    }
}

impl<M> core::fmt::Debug for BroadcastEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reg = lock(&self.registry);
        f.debug_struct("BroadcastEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &reg.queues.len())
            .field("closed", &reg.closed)
            .field("heartbeat", &self.heartbeat.as_ref().map(|hb| hb.period))
            .finish()
    }
}
