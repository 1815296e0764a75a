//! Persistent job and principal records backed by SQLite
//!
//! Every analysis request becomes a job row owned by a principal. Status
//! transitions out of `processing` are guarded at the SQL level so that a
//! late or duplicate completion cannot overwrite a terminal state.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use video_recon_common::JobStatus;

/// Storage layer errors
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value that should be impossible, e.g. an unknown status
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

/// One job row as stored
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub owner_id: i64,
    pub input_reference: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Serialized report; set only when the job completed
    pub result: Option<String>,
    /// Failure detail; set only when the job failed
    pub error: Option<String>,
}

/// Handle to the jobs database; cheap to clone, shared across workers
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (creating if absent) the database at `path` and run migrations
    pub async fn open(path: &Path) -> Result<Self, JobStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("job store ready at {}", path.display());
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS principals (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        INTEGER NOT NULL REFERENCES principals(id),
                input_reference TEXT NOT NULL,
                status          TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                result          TEXT,
                error           TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up the principal for an authenticated subject, creating the row
    /// on first sight. Called explicitly by the request layer, never as a
    /// hidden side effect of job queries.
    pub async fn resolve_or_create_principal(
        &self,
        subject: &str,
    ) -> Result<i64, JobStoreError> {
        if let Some(row) = sqlx::query("SELECT id FROM principals WHERE subject = ?1")
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(row.get("id"));
        }

        // Two concurrent first requests can race here; the UNIQUE constraint
        // makes the loser fall through to the re-read.
        let inserted = sqlx::query("INSERT OR IGNORE INTO principals (subject) VALUES (?1)")
            .bind(subject)
            .execute(&self.pool)
            .await?;
        if inserted.rows_affected() > 0 {
            debug!(subject, "created principal");
        }

        let row = sqlx::query("SELECT id FROM principals WHERE subject = ?1")
            .bind(subject)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("id"))
    }

    /// Insert a new job in `processing` state and return its id
    pub async fn create_job(
        &self,
        owner_id: i64,
        input_reference: &str,
    ) -> Result<i64, JobStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (owner_id, input_reference, status, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(owner_id)
        .bind(input_reference)
        .bind(JobStatus::Processing.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Mark a job completed with its serialized report
    ///
    /// Returns `true` if the transition applied. A job that already reached a
    /// terminal state is left untouched and `false` is returned.
    pub async fn complete_job(&self, job_id: i64, report: &str) -> Result<bool, JobStoreError> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?1, result = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(report)
        .bind(job_id)
        .bind(JobStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Mark a job failed with its error detail; same guard as `complete_job`
    ///
    /// The failure text lives in its own column; `result` stays unset so a
    /// failed job never carries a report.
    pub async fn fail_job(&self, job_id: i64, error: &str) -> Result<bool, JobStoreError> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?1, error = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .bind(job_id)
        .bind(JobStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Fetch one job, scoped to its owner
    ///
    /// A job that exists but belongs to someone else is indistinguishable
    /// from one that does not exist.
    pub async fn get_job(
        &self,
        job_id: i64,
        owner_id: i64,
    ) -> Result<Option<JobRecord>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, input_reference, status, created_at, result, error
            FROM jobs WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(job_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// All jobs for an owner, newest first
    pub async fn list_jobs(&self, owner_id: i64) -> Result<Vec<JobRecord>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, input_reference, status, created_at, result, error
            FROM jobs WHERE owner_id = ?1
            ORDER BY id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<JobRecord, JobStoreError> {
    let status_text: String = row.get("status");
    let status = JobStatus::parse(&status_text)
        .ok_or_else(|| JobStoreError::Corrupt(format!("unknown status '{status_text}'")))?;

    let created_text: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_text)
        .map_err(|e| JobStoreError::Corrupt(format!("bad created_at: {e}")))?
        .with_timezone(&Utc);

    Ok(JobRecord {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        input_reference: row.get("input_reference"),
        status,
        created_at,
        result: row.get("result"),
        error: row.get("error"),
    })
}
