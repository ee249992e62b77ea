// 📋 Job Store - where ConversionJob records live between polls
//
// Jobs are stored whole, as JSON, keyed by id. Lookups by source key return
// the most recently created job for that key.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ConvertError, Result};
use crate::job::ConversionJob;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fails if a job with the same id already exists
    async fn insert(&self, job: &ConversionJob) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<ConversionJob>>;

    async fn find_by_source_key(&self, source_key: &str) -> Result<Option<ConversionJob>>;

    /// Matches the key a job will write to, whether or not it has finished
    async fn find_by_output_key(&self, output_key: &str) -> Result<Option<ConversionJob>>;

    /// Replace the stored record; the job must already exist
    async fn update(&self, job: &ConversionJob) -> Result<()>;

    /// Newest first
    async fn list(&self) -> Result<Vec<ConversionJob>>;
}

fn newest(jobs: impl Iterator<Item = ConversionJob>) -> Option<ConversionJob> {
    jobs.max_by_key(|job| job.created_at)
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Default, Clone)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<Uuid, ConversionJob>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &ConversionJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(ConvertError::Storage(anyhow!("Job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConversionJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_by_source_key(&self, source_key: &str) -> Result<Option<ConversionJob>> {
        let jobs = self.jobs.read().await;
        Ok(newest(
            jobs.values()
                .filter(|job| job.source_keys.iter().any(|k| k == source_key))
                .cloned(),
        ))
    }

    async fn find_by_output_key(&self, output_key: &str) -> Result<Option<ConversionJob>> {
        let jobs = self.jobs.read().await;
        Ok(newest(
            jobs.values()
                .filter(|job| job.planned_output_key == output_key)
                .cloned(),
        ))
    }

    async fn update(&self, job: &ConversionJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(ConvertError::NotFound(format!("job {}", job.id))),
        }
    }

    async fn list(&self) -> Result<Vec<ConversionJob>> {
        let mut jobs: Vec<ConversionJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

// ============================================================================
// SQLITE
// ============================================================================

/// Durable job store. One `jobs` row per job plus one `job_sources` row per
/// uploaded file, so any source key finds its job.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open job database {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        setup_job_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("Job database lock poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| ConvertError::Storage(anyhow!("Job database task failed: {}", e)))?
        .map_err(ConvertError::Storage)
    }
}

pub fn setup_job_tables(conn: &Connection) -> anyhow::Result<()> {
    // Enable WAL mode for crash recovery (no-op for in-memory databases)
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            planned_output_key TEXT NOT NULL,
            stage TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            body TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS job_sources (
            source_key TEXT NOT NULL,
            job_id TEXT NOT NULL REFERENCES jobs(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (source_key, job_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_output_key ON jobs(planned_output_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_job_sources_key ON job_sources(source_key)",
        [],
    )?;

    Ok(())
}

/// Fixed-width so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_job(body: String) -> anyhow::Result<ConversionJob> {
    serde_json::from_str(&body).context("Corrupt job record")
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &ConversionJob) -> Result<()> {
        let job = job.clone();
        self.with_conn(move |conn| {
            let body = serde_json::to_string(&job)?;
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO jobs (id, planned_output_key, stage, created_at, updated_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    job.id.to_string(),
                    job.planned_output_key,
                    job.stage.to_string(),
                    timestamp(job.created_at),
                    timestamp(job.updated_at),
                    body,
                ],
            )
            .with_context(|| format!("Failed to insert job {}", job.id))?;

            for (position, key) in job.source_keys.iter().enumerate() {
                tx.execute(
                    "INSERT INTO job_sources (source_key, job_id, position) VALUES (?1, ?2, ?3)",
                    params![key, job.id.to_string(), position as i64],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConversionJob>> {
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM jobs WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(decode_job).transpose()
        })
        .await
    }

    async fn find_by_source_key(&self, source_key: &str) -> Result<Option<ConversionJob>> {
        let source_key = source_key.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT j.body FROM jobs j
                     JOIN job_sources s ON s.job_id = j.id
                     WHERE s.source_key = ?1
                     ORDER BY j.created_at DESC
                     LIMIT 1",
                    params![source_key],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(decode_job).transpose()
        })
        .await
    }

    async fn find_by_output_key(&self, output_key: &str) -> Result<Option<ConversionJob>> {
        let output_key = output_key.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM jobs
                     WHERE planned_output_key = ?1
                     ORDER BY created_at DESC
                     LIMIT 1",
                    params![output_key],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(decode_job).transpose()
        })
        .await
    }

    async fn update(&self, job: &ConversionJob) -> Result<()> {
        let job = job.clone();
        let id = job.id;
        let updated = self
            .with_conn(move |conn| {
                let body = serde_json::to_string(&job)?;
                let changed = conn.execute(
                    "UPDATE jobs SET stage = ?2, updated_at = ?3, body = ?4 WHERE id = ?1",
                    params![
                        job.id.to_string(),
                        job.stage.to_string(),
                        timestamp(job.updated_at),
                        body,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if updated == 0 {
            return Err(ConvertError::NotFound(format!("job {}", id)));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConversionJob>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT body FROM jobs ORDER BY created_at DESC")?;
            let bodies = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            bodies.into_iter().map(decode_job).collect()
        })
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
