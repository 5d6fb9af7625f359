//! The alignment job record and its status state machine.

use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{FileRecordId, JobId, TaskId, UserId};

/// Lifecycle status of an alignment job.
///
/// ```text
/// PENDING ──> RUNNING ──> SUCCESS
///    │           └──────> ERROR
///    ├──────────────────> SUCCESS
///    └──────────────────> ERROR
/// ```
///
/// `SUCCESS` and `ERROR` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlignJobStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl AlignJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignJobStatus::Pending => "PENDING",
            AlignJobStatus::Running => "RUNNING",
            AlignJobStatus::Success => "SUCCESS",
            AlignJobStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlignJobStatus::Success | AlignJobStatus::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Repeating a non-terminal status is allowed; the engine may notify
    /// `RUNNING` more than once.
    pub fn can_transition_to(&self, next: AlignJobStatus) -> bool {
        use AlignJobStatus::*;
        match (self, next) {
            (Success | Error, _) => false,
            (Pending, _) => true,
            (Running, Pending) => false,
            (Running, _) => true,
        }
    }
}

impl core::fmt::Display for AlignJobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignJobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(AlignJobStatus::Pending),
            "RUNNING" => Ok(AlignJobStatus::Running),
            "SUCCESS" => Ok(AlignJobStatus::Success),
            "ERROR" => Ok(AlignJobStatus::Error),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Supported external alignment engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignTool {
    Mafft,
    Uclust,
    Vsearch,
}

impl AlignTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignTool::Mafft => "mafft",
            AlignTool::Uclust => "uclust",
            AlignTool::Vsearch => "vsearch",
        }
    }
}

impl core::fmt::Display for AlignTool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignTool {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mafft" => Ok(AlignTool::Mafft),
            "uclust" => Ok(AlignTool::Uclust),
            "vsearch" => Ok(AlignTool::Vsearch),
            other => Err(DomainError::validation(format!("unknown align tool: {other}"))),
        }
    }
}

/// A job that has been accepted by the engine but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlignJob {
    pub user_id: UserId,
    pub align_tool: AlignTool,
    pub options: String,
    pub input_file_record_id: FileRecordId,
    pub input_file_path: String,
    pub task_id: TaskId,
    pub status: AlignJobStatus,
}

/// Persisted record of one alignment request and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignJob {
    pub id: JobId,
    pub user_id: UserId,
    pub align_tool: AlignTool,
    /// Passed through to the engine verbatim.
    pub options: String,
    pub input_file_record_id: FileRecordId,
    pub input_file_path: String,
    pub status: AlignJobStatus,
    pub task_id: TaskId,
    /// Set only when a `SUCCESS` completion named a non-empty output artifact.
    pub output_file_record_id: Option<FileRecordId>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlignJob {
    /// Materialize a new job with its storage-assigned id.
    pub fn create(id: JobId, new: NewAlignJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            align_tool: new.align_tool,
            options: new.options,
            input_file_record_id: new.input_file_record_id,
            input_file_path: new.input_file_path,
            status: new.status,
            task_id: new.task_id,
            output_file_record_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a completion notification.
    ///
    /// Leaves the job untouched and returns `InvalidTransition` when the state
    /// machine rejects the new status.
    pub fn apply_completion(
        &mut self,
        status: AlignJobStatus,
        error_message: Option<String>,
        output_file_record_id: Option<FileRecordId>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        self.error_message = error_message;
        if let Some(id) = output_file_record_id {
            self.output_file_record_id = Some(id);
        }
        self.touch(now);
        Ok(())
    }

    /// Bump `updated_at`, keeping it strictly increasing even if the clock
    /// did not advance (or went backwards).
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = if now > self.updated_at { now } else { floor };
    }
}

/// Completion notification delivered by the engine's webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUpdate {
    pub task_id: TaskId,
    pub status: AlignJobStatus,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CompletionUpdate {
    /// The output artifact name, when one is present and non-empty.
    pub fn output_artifact(&self) -> Option<&str> {
        self.output_file.as_deref().filter(|name| !name.is_empty())
    }

    /// Whether this update should register an output file record.
    pub fn carries_output(&self) -> bool {
        self.status == AlignJobStatus::Success && self.output_artifact().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AlignJobStatus::*;

    fn job(status: AlignJobStatus) -> AlignJob {
        AlignJob::create(
            JobId::new(1),
            NewAlignJob {
                user_id: UserId::new(7),
                align_tool: AlignTool::Mafft,
                options: "--auto".to_string(),
                input_file_record_id: FileRecordId::new(3),
                input_file_path: "seqs.fasta".to_string(),
                task_id: TaskId::new("task-1"),
                status,
            },
            Utc::now(),
        )
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Success));
        assert!(Pending.can_transition_to(Error));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Error));
        assert!(Running.can_transition_to(Running));
    }

    #[test]
    fn terminal_states_and_backward_moves_are_rejected() {
        for next in [Pending, Running, Success, Error] {
            assert!(!Success.can_transition_to(next));
            assert!(!Error.can_transition_to(next));
        }
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn apply_completion_sets_output_and_bumps_updated_at() {
        let mut j = job(Pending);
        let before = j.updated_at;

        j.apply_completion(Success, None, Some(FileRecordId::new(9)), before)
            .unwrap();

        assert_eq!(j.status, Success);
        assert_eq!(j.output_file_record_id, Some(FileRecordId::new(9)));
        assert!(j.updated_at > before);
    }

    #[test]
    fn rejected_completion_leaves_job_untouched() {
        let mut j = job(Error);
        let snapshot = j.clone();

        let err = j
            .apply_completion(Running, Some("late".into()), None, Utc::now())
            .unwrap_err();

        assert_eq!(err, DomainError::InvalidTransition { from: Error, to: Running });
        assert_eq!(j, snapshot);
    }

    #[test]
    fn completion_with_empty_output_does_not_carry_output() {
        let update = CompletionUpdate {
            task_id: TaskId::new("t"),
            status: Success,
            output_file: Some(String::new()),
            error: None,
        };
        assert!(!update.carries_output());

        let error_with_file = CompletionUpdate {
            status: Error,
            output_file: Some("r.out".into()),
            ..update.clone()
        };
        assert!(!error_with_file.carries_output());

        let success_with_file = CompletionUpdate {
            output_file: Some("r.out".into()),
            ..update
        };
        assert!(success_with_file.carries_output());
    }

    #[test]
    fn wire_names_match_engine_format() {
        assert_eq!(serde_json::to_string(&Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(serde_json::to_string(&AlignTool::Vsearch).unwrap(), "\"vsearch\"");
        assert_eq!("Uclust".parse::<AlignTool>().unwrap(), AlignTool::Uclust);
        assert_eq!("running".parse::<AlignJobStatus>().unwrap(), Running);
    }
}
