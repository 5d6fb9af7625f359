//! Outbound submission of alignment work to the external engine.

mod http;

pub use http::HttpSubmissionClient;

use serde::{Deserialize, Serialize};

use seqalign_core::{AlignJobStatus, AlignTool, TaskId};

/// Payload sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub align_tool: AlignTool,
    pub options: String,
    /// Stored (unique) name of the input artifact.
    pub input_path: String,
}

/// Engine acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: AlignJobStatus,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// The request was malformed before it left this process.
    #[error("invalid submission request: {0}")]
    InvalidRequest(String),

    /// The engine answered but refused the job (4xx, or a reply we could not use).
    #[error("engine rejected submission: HTTP {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    /// The engine could not be reached, failed (5xx), or did not answer in time.
    #[error("engine unavailable: {0}")]
    RemoteUnavailable(String),
}

impl SubmissionError {
    /// Only transient engine failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::RemoteUnavailable(_))
    }
}

/// Submits one job to the engine. A single call makes a single attempt;
/// retry and timeout are the caller's concern.
#[async_trait::async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, SubmissionError>;
}

#[async_trait::async_trait]
impl<C> SubmissionClient for std::sync::Arc<C>
where
    C: SubmissionClient + ?Sized,
{
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, SubmissionError> {
        (**self).submit(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_engine_field_names() {
        let req = SubmitRequest {
            align_tool: AlignTool::Mafft,
            options: "--auto".into(),
            input_path: "abc123.fasta".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"align_tool": "mafft", "options": "--auto", "input_path": "abc123.fasta"})
        );

        let resp: SubmitResponse =
            serde_json::from_str(r#"{"status":"PENDING","task_id":"t-9"}"#).unwrap();
        assert_eq!(resp.task_id, TaskId::new("t-9"));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(SubmissionError::RemoteUnavailable("down".into()).is_retryable());
        assert!(!SubmissionError::InvalidRequest("empty".into()).is_retryable());
        assert!(
            !SubmissionError::RemoteRejected {
                status: 400,
                body: "bad".into()
            }
            .is_retryable()
        );
    }
}
