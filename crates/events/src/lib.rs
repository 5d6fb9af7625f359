//! Live job event distribution.
//!
//! - `bus`: the `EventBus` contract and the `Subscription` stream handed to observers
//! - `broadcast`: bounded multicast implementation with per-subscriber queues
//! - `job_event`: the `JobEvent` projection broadcast for every job change

pub mod broadcast;
pub mod bus;
pub mod job_event;

pub use broadcast::{BroadcastEventBus, BusConfig};
pub use bus::{EventBus, Heartbeat, PublishReport, Subscription};
pub use job_event::{job_event_bus, JobEvent, KEEP_ALIVE_TASK_ID};
