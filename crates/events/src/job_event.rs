//! `JobEvent`: the live projection of an `AlignJob` pushed to observers.
//!
//! Events are never persisted. A heartbeat is a `JobEvent` carrying the
//! `KEEP_ALIVE` task id and no job fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seqalign_core::{AlignJob, AlignJobStatus, AlignTool, FileRecordId, TaskId, UserId};

use crate::broadcast::{BroadcastEventBus, BusConfig};

/// Task id carried by heartbeat events.
pub const KEEP_ALIVE_TASK_ID: &str = "KEEP_ALIVE";

const KEEP_ALIVE_MESSAGE: &str = "Keep-alive signal";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub input_path: Option<String>,
    pub input_file_record_id: Option<FileRecordId>,
    pub align_tool: Option<AlignTool>,
    pub options: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub output_file_record_id: Option<FileRecordId>,
    pub status: AlignJobStatus,
    /// Error text for failed jobs; fixed text for heartbeats.
    pub message: Option<String>,
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

impl JobEvent {
    pub fn heartbeat() -> Self {
        Self::heartbeat_at(Utc::now())
    }

    pub fn heartbeat_at(now: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(now);
        Self {
            task_id: TaskId::new(KEEP_ALIVE_TASK_ID),
            user_id: UserId::new(0),
            input_path: None,
            input_file_record_id: None,
            align_tool: None,
            options: None,
            created_at: stamp.clone(),
            updated_at: stamp,
            output_file_record_id: None,
            status: AlignJobStatus::Pending,
            message: Some(KEEP_ALIVE_MESSAGE.to_string()),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.task_id.as_str() == KEEP_ALIVE_TASK_ID
    }
}

impl From<&AlignJob> for JobEvent {
    fn from(job: &AlignJob) -> Self {
        Self {
            task_id: job.task_id.clone(),
            user_id: job.user_id,
            input_path: Some(job.input_file_path.clone()),
            input_file_record_id: Some(job.input_file_record_id),
            align_tool: Some(job.align_tool),
            options: Some(job.options.clone()),
            created_at: format_timestamp(job.created_at),
            updated_at: format_timestamp(job.updated_at),
            output_file_record_id: job.output_file_record_id,
            status: job.status,
            message: job.error_message.clone(),
        }
    }
}

/// Bus for job events, with heartbeats merged into every subscription.
pub fn job_event_bus(config: BusConfig) -> BroadcastEventBus<JobEvent> {
    BroadcastEventBus::new(config.capacity)
        .with_heartbeat(config.heartbeat_interval, || {
            tracing::trace!("heartbeat emitted");
            JobEvent::heartbeat()
        })
}
