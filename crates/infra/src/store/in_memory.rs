use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use seqalign_core::{
    AlignJob, FileRecord, FileRecordId, JobId, NewAlignJob, NewFileRecord, PageRequest, SortSpec,
    TaskId,
};

use super::{AlignJobStore, FileRecordStore, StoreError};

#[derive(Debug, Default)]
struct JobTable {
    next_id: i64,
    rows: HashMap<JobId, AlignJob>,
    by_task: HashMap<TaskId, JobId>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAlignJobStore {
    table: RwLock<JobTable>,
}

impl InMemoryAlignJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait::async_trait]
impl AlignJobStore for InMemoryAlignJobStore {
    async fn insert(&self, job: NewAlignJob) -> Result<AlignJob, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.by_task.contains_key(&job.task_id) {
            return Err(StoreError::DuplicateTaskId(job.task_id));
        }

        table.next_id += 1;
        let id = JobId::new(table.next_id);
        let stored = AlignJob::create(id, job, Utc::now());
        table.by_task.insert(stored.task_id.clone(), id);
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn save(&self, job: &AlignJob) -> Result<AlignJob, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match table.rows.get_mut(&job.id) {
            Some(row) => {
                *row = job.clone();
                Ok(job.clone())
            }
            None => Err(StoreError::NotFound(job.id)),
        }
    }

    async fn find_by_task_id(&self, task_id: &TaskId) -> Result<Option<AlignJob>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table
            .by_task
            .get(task_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_page(
        &self,
        page: PageRequest,
        sort: &SortSpec,
    ) -> Result<Vec<AlignJob>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut jobs: Vec<&AlignJob> = table.rows.values().collect();
        // Id breaks ties so pages are stable.
        jobs.sort_by(|a, b| sort.compare(a, b).then(a.id.cmp(&b.id)));

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        Ok(jobs
            .into_iter()
            .skip(offset)
            .take(page.size() as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.rows.len() as u64)
    }
}

#[derive(Debug, Default)]
struct FileTable {
    next_id: i64,
    rows: HashMap<FileRecordId, FileRecord>,
}

/// In-memory file-record store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFileRecordStore {
    table: RwLock<FileTable>,
}

impl InMemoryFileRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl FileRecordStore for InMemoryFileRecordStore {
    async fn find_by_id(&self, id: FileRecordId) -> Result<Option<FileRecord>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.rows.get(&id).cloned())
    }

    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.next_id += 1;
        let id = FileRecordId::new(table.next_id);
        let stored = FileRecord::from_new(id, record);
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }
}
