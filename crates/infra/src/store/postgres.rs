//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateTaskId` (on job insert) |
//! | Database (other) | any | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |
//!
//! `ORDER BY` clauses are built only from `SortSpec` column names, never from
//! raw request text.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::{debug, info};

use seqalign_core::{
    AlignJob, FileRecord, FileRecordId, FileType, JobId, NewAlignJob, NewFileRecord, PageRequest,
    SortSpec, TaskId, UserId,
};

use super::{AlignJobStore, FileRecordStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const JOB_COLUMNS: &str = "id, user_id, align_tool, options, input_file_record_id, \
     input_file_path, status, task_id, output_file_record_id, error_message, created_at, updated_at";

/// Open a pool and apply the schema.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    info!("database schema ready");
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PostgresAlignJobStore {
    pool: Arc<PgPool>,
}

impl PostgresAlignJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl AlignJobStore for PostgresAlignJobStore {
    async fn insert(&self, job: NewAlignJob) -> Result<AlignJob, StoreError> {
        let now = Utc::now();
        let task_id = job.task_id.clone();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO align_jobs
                (user_id, align_tool, options, input_file_record_id, input_file_path,
                 status, task_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.user_id.get())
        .bind(job.align_tool.as_str())
        .bind(&job.options)
        .bind(job.input_file_record_id.get())
        .bind(&job.input_file_path)
        .bind(job.status.as_str())
        .bind(job.task_id.as_str())
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                StoreError::DuplicateTaskId(task_id)
            } else {
                map_sqlx_error("insert_job", e)
            }
        })?;

        let stored = job_from_row(&row)?;
        debug!(job_id = %stored.id, task_id = %stored.task_id, "job inserted");
        Ok(stored)
    }

    async fn save(&self, job: &AlignJob) -> Result<AlignJob, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE align_jobs
            SET status = $2,
                error_message = $3,
                output_file_record_id = $4,
                updated_at = $5
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.id.get())
        .bind(job.status.as_str())
        .bind(job.error_message.as_deref())
        .bind(job.output_file_record_id.map(|id| id.get()))
        .bind(job.updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_job", e))?
        .ok_or(StoreError::NotFound(job.id))?;

        job_from_row(&row)
    }

    async fn find_by_task_id(&self, task_id: &TaskId) -> Result<Option<AlignJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM align_jobs WHERE task_id = $1"
        ))
        .bind(task_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_task_id", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_page(
        &self,
        page: PageRequest,
        sort: &SortSpec,
    ) -> Result<Vec<AlignJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM align_jobs ORDER BY {}, id ASC LIMIT $1 OFFSET $2",
            sort.to_sql()
        ))
        .bind(i64::from(page.size()))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_page", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM align_jobs")
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_jobs", e))?;
        Ok(total.max(0) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct PostgresFileRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresFileRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl FileRecordStore for PostgresFileRecordStore {
    async fn find_by_id(&self, id: FileRecordId) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, unique_filename, created_at, file_type, size
            FROM file_records
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_file_record", e))?;

        row.as_ref().map(file_record_from_row).transpose()
    }

    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO file_records (filename, unique_filename, created_at, file_type, size)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, filename, unique_filename, created_at, file_type, size
            "#,
        )
        .bind(&record.filename)
        .bind(&record.unique_filename)
        .bind(record.created_at)
        .bind(record.file_type.as_str())
        .bind(i64::try_from(record.size).unwrap_or(i64::MAX))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_file_record", e))?;

        file_record_from_row(&row)
    }
}

#[derive(Debug)]
struct AlignJobRow {
    id: i64,
    user_id: i64,
    align_tool: String,
    options: String,
    input_file_record_id: i64,
    input_file_path: String,
    status: String,
    task_id: String,
    output_file_record_id: Option<i64>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AlignJobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AlignJobRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            align_tool: row.try_get("align_tool")?,
            options: row.try_get("options")?,
            input_file_record_id: row.try_get("input_file_record_id")?,
            input_file_path: row.try_get("input_file_path")?,
            status: row.try_get("status")?,
            task_id: row.try_get("task_id")?,
            output_file_record_id: row.try_get("output_file_record_id")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<AlignJobRow> for AlignJob {
    type Error = StoreError;

    fn try_from(row: AlignJobRow) -> Result<Self, Self::Error> {
        let corrupt = |e: seqalign_core::DomainError| {
            StoreError::Storage(format!("corrupt align_jobs row {}: {e}", row.id))
        };
        Ok(AlignJob {
            id: JobId::new(row.id),
            user_id: UserId::new(row.user_id),
            align_tool: row.align_tool.parse().map_err(corrupt)?,
            options: row.options,
            input_file_record_id: FileRecordId::new(row.input_file_record_id),
            input_file_path: row.input_file_path,
            status: row.status.parse().map_err(corrupt)?,
            task_id: TaskId::new(row.task_id),
            output_file_record_id: row.output_file_record_id.map(FileRecordId::new),
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn job_from_row(row: &PgRow) -> Result<AlignJob, StoreError> {
    let raw = AlignJobRow::from_row(row)
        .map_err(|e| StoreError::Storage(format!("failed to deserialize job row: {e}")))?;
    AlignJob::try_from(raw)
}

fn file_record_from_row(row: &PgRow) -> Result<FileRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Storage(format!("failed to deserialize file record row: {e}"));
    let id: i64 = row.try_get("id").map_err(decode)?;
    let file_type: String = row.try_get("file_type").map_err(decode)?;
    let size: i64 = row.try_get("size").map_err(decode)?;

    Ok(FileRecord {
        id: FileRecordId::new(id),
        filename: row.try_get("filename").map_err(decode)?,
        unique_filename: row.try_get("unique_filename").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        file_type: file_type
            .parse::<FileType>()
            .map_err(|e| StoreError::Storage(format!("corrupt file_records row {id}: {e}")))?,
        size: size.max(0) as u64,
    })
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
