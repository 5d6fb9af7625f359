//! Infrastructure layer: engine client, stores, config, job orchestration.

pub mod config;
pub mod lifecycle;
pub mod query;
pub mod retry;
pub mod store;
pub mod submission;

pub use config::AppConfig;
pub use lifecycle::{AlignJobOrchestrator, CreateAlignJob, LifecycleError};
pub use query::JobHistoryQuery;
pub use retry::RetryPolicy;
pub use store::{AlignJobStore, FileRecordStore, StoreError};
pub use submission::{HttpSubmissionClient, SubmissionClient, SubmissionError, SubmitRequest, SubmitResponse};
