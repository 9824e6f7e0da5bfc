//! SQLite-backed job queue.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

use super::{Job, JobQueue, JobStatus, QueueError, QueueStats, RetryPolicy};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const JOB_COLUMNS: &str = "id, handler, report_id, status, attempts, max_attempts, timeout_secs, available_at, locked_by, locked_until, last_error, created_at";

pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
}

impl SqliteJobQueue {
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handler TEXT NOT NULL,
                report_id TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                timeout_secs INTEGER NOT NULL,
                available_at TEXT NOT NULL,
                locked_by TEXT,
                locked_until TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_ready ON jobs(status, available_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_report ON jobs(report_id);
            "#,
        )
        .map_err(db_err)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let status: String = row.get(3)?;
        let timeout_secs: i64 = row.get(6)?;
        Ok(Job {
            id: row.get(0)?,
            handler: row.get(1)?,
            report_id: row.get(2)?,
            status: status
                .parse::<JobStatus>()
                .map_err(|e| conversion_err(3, e))?,
            attempts: row.get(4)?,
            max_attempts: row.get(5)?,
            timeout_secs: timeout_secs as u64,
            available_at: parse_ts(row, 7)?,
            locked_by: row.get(8)?,
            locked_until: parse_opt_ts(row, 9)?,
            last_error: row.get(10)?,
            created_at: parse_ts(row, 11)?,
        })
    }

    fn select_job(conn: &Connection, id: i64) -> Result<Option<Job>, QueueError> {
        conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> QueueError {
    QueueError::Database(e.to_string())
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e.to_string()))
}

fn parse_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e.to_string()))
    })
    .transpose()
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(
        &self,
        handler: &str,
        report_id: &str,
        policy: RetryPolicy,
        timeout_secs: u64,
    ) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap();
        let now = format_ts(&Utc::now());

        conn.execute(
            "INSERT INTO jobs (handler, report_id, status, attempts, max_attempts, timeout_secs, available_at, created_at) \
             VALUES (?, ?, 'queued', 0, ?, ?, ?, ?)",
            params![
                handler,
                report_id,
                policy.max_attempts,
                timeout_secs as i64,
                now,
                now
            ],
        )
        .map_err(db_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn dequeue(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_str = format_ts(&now);

        // Expired locks with attempts left are redelivered.
        let candidate: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, timeout_secs FROM jobs \
                 WHERE (status = 'queued' AND available_at <= ?1) \
                    OR (status = 'running' AND locked_until < ?1 AND attempts < max_attempts) \
                 ORDER BY available_at ASC, id ASC LIMIT 1",
                params![now_str],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((id, timeout_secs)) = candidate else {
            return Ok(None);
        };

        let locked_until = now + chrono::Duration::seconds(timeout_secs);
        tx.execute(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, locked_by = ?, locked_until = ? \
             WHERE id = ?",
            params![worker_id, format_ts(&locked_until), id],
        )
        .map_err(db_err)?;

        let job = Self::select_job(&tx, id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }

    fn ack(&self, job_id: i64, worker_id: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE jobs SET status = 'done', locked_by = NULL, locked_until = NULL \
                 WHERE id = ? AND status = 'running' AND locked_by = ?",
                params![job_id, worker_id],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return match Self::select_job(&conn, job_id)? {
                Some(_) => Err(QueueError::NotOwned {
                    job_id,
                    worker_id: worker_id.to_string(),
                }),
                None => Err(QueueError::NotFound(job_id)),
            };
        }
        Ok(())
    }

    fn retry(
        &self,
        job_id: i64,
        worker_id: &str,
        error: &str,
        backoff_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<JobStatus, QueueError> {
        let conn = self.conn.lock().unwrap();

        let job = Self::select_job(&conn, job_id)?.ok_or(QueueError::NotFound(job_id))?;
        if job.status != JobStatus::Running || job.locked_by.as_deref() != Some(worker_id) {
            return Err(QueueError::NotOwned {
                job_id,
                worker_id: worker_id.to_string(),
            });
        }

        if job.attempts >= job.max_attempts {
            conn.execute(
                "UPDATE jobs SET status = 'dead', last_error = ?, locked_by = NULL, locked_until = NULL \
                 WHERE id = ? AND locked_by = ?",
                params![error, job_id, worker_id],
            )
            .map_err(db_err)?;
            return Ok(JobStatus::Dead);
        }

        let delay = backoff_secs.saturating_mul(job.attempts.max(1) as u64);
        let available_at = now + chrono::Duration::seconds(delay as i64);
        conn.execute(
            "UPDATE jobs SET status = 'queued', last_error = ?, available_at = ?, locked_by = NULL, locked_until = NULL \
             WHERE id = ? AND locked_by = ?",
            params![error, format_ts(&available_at), job_id, worker_id],
        )
        .map_err(db_err)?;

        Ok(JobStatus::Queued)
    }

    fn reap_expired(&self, now: DateTime<Utc>) -> Result<Vec<Job>, QueueError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_str = format_ts(&now);

        let mut jobs = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM jobs WHERE status = 'running' AND locked_until < ? \
                     AND attempts >= max_attempts ORDER BY id ASC",
                    JOB_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![now_str], Self::row_to_job)
                .map_err(db_err)?;
            let mut jobs = Vec::new();
            for row_result in rows {
                jobs.push(row_result.map_err(db_err)?);
            }
            jobs
        };

        for job in &mut jobs {
            tx.execute(
                "UPDATE jobs SET status = 'dead', last_error = 'timed out', locked_by = NULL, locked_until = NULL WHERE id = ?",
                params![job.id],
            )
            .map_err(db_err)?;
            job.status = JobStatus::Dead;
            job.last_error = Some("timed out".to_string());
        }

        tx.commit().map_err(db_err)?;
        Ok(jobs)
    }

    fn get(&self, job_id: i64) -> Result<Option<Job>, QueueError> {
        let conn = self.conn.lock().unwrap();
        Self::select_job(&conn, job_id)
    }

    fn stats(&self) -> Result<QueueStats, QueueError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?;

        let mut stats = QueueStats::default();
        for row_result in rows {
            let (status, count) = row_result.map_err(db_err)?;
            let count = count as u64;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Queued) => stats.queued = count,
                Ok(JobStatus::Running) => stats.running = count,
                Ok(JobStatus::Done) => stats.done = count,
                Ok(JobStatus::Dead) => stats.dead = count,
                Err(_) => {}
            }
        }
        Ok(stats)
    }
}
