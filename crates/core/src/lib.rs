//! `seqalign-core`: domain building blocks for alignment jobs.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! the job record and its status state machine, file records, the sort
//! specification used by job history queries, and page arithmetic.

pub mod error;
pub mod file_record;
pub mod id;
pub mod job;
pub mod paging;
pub mod sort;

pub use error::{DomainError, DomainResult};
pub use file_record::{FileRecord, FileType, NewFileRecord};
pub use id::{FileRecordId, JobId, TaskId, UserId};
pub use job::{AlignJob, AlignJobStatus, AlignTool, CompletionUpdate, NewAlignJob};
pub use paging::{PageRequest, PagedResponse};
pub use sort::{SortDirection, SortField, SortOrder, SortSpec};
