//! Job and file-record persistence.
//!
//! The store is the source of truth for job state. Writes are individually
//! atomic; conflicting writes to one job row are serialized by the backend.

mod in_memory;
mod postgres;

pub use in_memory::{InMemoryAlignJobStore, InMemoryFileRecordStore};
pub use postgres::{connect, PostgresAlignJobStore, PostgresFileRecordStore};

use std::sync::Arc;

use chrono::Utc;

use seqalign_core::{
    AlignJob, FileRecord, FileRecordId, JobId, NewAlignJob, NewFileRecord, PageRequest, SortSpec,
    TaskId,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("task id already exists: {0}")]
    DuplicateTaskId(TaskId),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait::async_trait]
pub trait AlignJobStore: Send + Sync {
    /// Persist a new job; the store assigns its id and timestamps.
    async fn insert(&self, job: NewAlignJob) -> Result<AlignJob, StoreError>;

    /// Overwrite an existing job with `job`'s fields.
    async fn save(&self, job: &AlignJob) -> Result<AlignJob, StoreError>;

    async fn find_by_task_id(&self, task_id: &TaskId) -> Result<Option<AlignJob>, StoreError>;

    /// One page of jobs ordered by `sort`.
    async fn find_page(
        &self,
        page: PageRequest,
        sort: &SortSpec,
    ) -> Result<Vec<AlignJob>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
pub trait FileRecordStore: Send + Sync {
    async fn find_by_id(&self, id: FileRecordId) -> Result<Option<FileRecord>, StoreError>;

    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, StoreError>;

    /// Record an output artifact named by the engine.
    async fn register_output(&self, name: &str) -> Result<FileRecord, StoreError> {
        self.insert(NewFileRecord::output(name, Utc::now())).await
    }
}

#[async_trait::async_trait]
impl<S> AlignJobStore for Arc<S>
where
    S: AlignJobStore + ?Sized,
{
    async fn insert(&self, job: NewAlignJob) -> Result<AlignJob, StoreError> {
        (**self).insert(job).await
    }

    async fn save(&self, job: &AlignJob) -> Result<AlignJob, StoreError> {
        (**self).save(job).await
    }

    async fn find_by_task_id(&self, task_id: &TaskId) -> Result<Option<AlignJob>, StoreError> {
        (**self).find_by_task_id(task_id).await
    }

    async fn find_page(
        &self,
        page: PageRequest,
        sort: &SortSpec,
    ) -> Result<Vec<AlignJob>, StoreError> {
        (**self).find_page(page, sort).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        (**self).count().await
    }
}

#[async_trait::async_trait]
impl<S> FileRecordStore for Arc<S>
where
    S: FileRecordStore + ?Sized,
{
    async fn find_by_id(&self, id: FileRecordId) -> Result<Option<FileRecord>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, StoreError> {
        (**self).insert(record).await
    }

    async fn register_output(&self, name: &str) -> Result<FileRecord, StoreError> {
        (**self).register_output(name).await
    }
}
