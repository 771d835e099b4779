use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use thiserror::Error;

use crate::job::{Job, JobStatus, ParseFieldError, Track, VideoType};

/// Failures from the shared job store
///
/// Transient lock contention is a structured property of the error value:
/// callers and the retry loop ask `is_retryable()` instead of inspecting
/// error text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The retry budget was exhausted while the store stayed locked
    #[error("store still locked after {attempts} attempts")]
    Contended { attempts: u32 },

    /// A status change was requested that the lifecycle does not allow
    #[error("illegal status transition {from} -> {to} for job {job_id}")]
    Transition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {0} not found")]
    Missing(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for transient busy/locked conditions that are safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

/// The legal mutable fields of a job
///
/// Every ripper-side mutation goes through this structure, so a field the
/// ripper must not touch (like the UI-owned manual title) simply cannot be
/// written. Only the fields present are included in the UPDATE, which keeps
/// concurrent UI writes to other columns intact.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub video_type: Option<VideoType>,
    pub poster_url: Option<String>,
    pub hasnicetitle: Option<bool>,
    pub updated: Option<bool>,
    pub errors: Option<String>,
    pub crc_id: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Fail),
            errors: Some(error.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.title.is_none()
            && self.year.is_none()
            && self.video_type.is_none()
            && self.poster_url.is_none()
            && self.hasnicetitle.is_none()
            && self.updated.is_none()
            && self.errors.is_none()
            && self.crc_id.is_none()
    }
}

/// Gateway to the job database shared with the web UI process
///
/// SQLite allows a single writer at a time and the UI writes concurrently,
/// so every mutation runs through a bounded retry loop: locked/busy errors
/// are retried once per second up to the configured budget, anything else
/// propagates immediately. Successful writes are durable before the call
/// returns.
pub struct JobStore {
    conn: Connection,
    wait_attempts: u32,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("wait_attempts", &self.wait_attempts)
            .finish_non_exhaustive()
    }
}

const JOB_COLUMNS: &str = "job_id, devpath, label, crc_id, title, year, video_type, poster_url, \
     disctype, status, pid, pid_hash, start_time, title_manual, updated, hasnicetitle, errors, logfile";

impl JobStore {
    /// Open (creating if needed) the job database at `db_path`
    pub fn open(db_path: &Path, wait_attempts: u32) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        // WAL lets the UI keep reading while a rip writes; the short busy
        // timeout absorbs brief contention before the outer retry loop kicks in.
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(Duration::from_millis(1000))?;

        let store = Self {
            conn,
            wait_attempts,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id TEXT PRIMARY KEY,
    devpath TEXT NOT NULL,
    label TEXT NOT NULL,
    crc_id TEXT,
    title TEXT,
    year TEXT,
    video_type TEXT,
    poster_url TEXT,
    disctype TEXT NOT NULL,
    status TEXT NOT NULL,
    pid INTEGER NOT NULL,
    pid_hash INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    title_manual TEXT,
    updated INTEGER NOT NULL DEFAULT 0,
    hasnicetitle INTEGER NOT NULL DEFAULT 0,
    errors TEXT,
    logfile TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tracks (
    job_id TEXT NOT NULL,
    track_number INTEGER NOT NULL,
    length INTEGER NOT NULL,
    aspect_ratio TEXT NOT NULL,
    fps TEXT NOT NULL,
    main_feature INTEGER NOT NULL,
    source TEXT NOT NULL,
    basename TEXT NOT NULL,
    filename TEXT NOT NULL,
    ripped INTEGER NOT NULL,
    PRIMARY KEY (job_id, track_number)
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_crc ON jobs(crc_id);
"#,
        )?;
        Ok(())
    }

    /// Apply a typed update to the job, durably, then mirror it in memory
    ///
    /// The in-memory record is only mutated after the row is written, so a
    /// failed persist leaves the caller's job untouched (the caller can
    /// simply drop the update to discard it).
    pub fn apply(&self, job: &mut Job, update: JobUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                return Err(StoreError::Transition {
                    job_id: job.job_id.clone(),
                    from: job.status,
                    to: next,
                });
            }
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(title) = &update.title {
            sets.push("title = ?");
            values.push(Value::Text(title.clone()));
        }
        if let Some(year) = &update.year {
            sets.push("year = ?");
            values.push(Value::Text(year.clone()));
        }
        if let Some(video_type) = update.video_type {
            sets.push("video_type = ?");
            values.push(Value::Text(video_type.as_str().to_string()));
        }
        if let Some(poster_url) = &update.poster_url {
            sets.push("poster_url = ?");
            values.push(Value::Text(poster_url.clone()));
        }
        if let Some(hasnicetitle) = update.hasnicetitle {
            sets.push("hasnicetitle = ?");
            values.push(Value::Integer(hasnicetitle as i64));
        }
        if let Some(updated) = update.updated {
            sets.push("updated = ?");
            values.push(Value::Integer(updated as i64));
        }
        if let Some(errors) = &update.errors {
            sets.push("errors = ?");
            values.push(Value::Text(errors.clone()));
        }
        if let Some(crc_id) = &update.crc_id {
            sets.push("crc_id = ?");
            values.push(Value::Text(crc_id.clone()));
        }
        values.push(Value::Text(job.job_id.clone()));

        let sql = format!("UPDATE jobs SET {} WHERE job_id = ?", sets.join(", "));
        let changed = self.write(|conn| {
            conn.execute(&sql, params_from_iter(values.iter()))
                .map_err(StoreError::from)
        })?;
        if changed == 0 {
            return Err(StoreError::Missing(job.job_id.clone()));
        }

        // the row is durable; mirror the change in memory
        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(title) = update.title {
            job.title = Some(title);
        }
        if let Some(year) = update.year {
            job.year = Some(year);
        }
        if let Some(video_type) = update.video_type {
            job.video_type = Some(video_type);
        }
        if let Some(poster_url) = update.poster_url {
            job.poster_url = Some(poster_url);
        }
        if let Some(hasnicetitle) = update.hasnicetitle {
            job.hasnicetitle = hasnicetitle;
        }
        if let Some(updated) = update.updated {
            job.updated = updated;
        }
        if let Some(errors) = update.errors {
            job.errors = Some(errors);
        }
        if let Some(crc_id) = update.crc_id {
            job.crc_id = Some(crc_id);
        }
        debug!("job {}: update written to the database", job.job_id);
        Ok(())
    }

    /// Insert a new job row
    pub fn add_job(&self, job: &Job) -> Result<(), StoreError> {
        self.write(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
                ),
                params![
                    job.job_id,
                    job.devpath,
                    job.label,
                    job.crc_id,
                    job.title,
                    job.year,
                    job.video_type.map(|v| v.as_str()),
                    job.poster_url,
                    job.disctype.as_str(),
                    job.status.as_str(),
                    job.pid,
                    job.pid_hash,
                    job.start_time.to_rfc3339(),
                    job.title_manual,
                    job.updated,
                    job.hasnicetitle,
                    job.errors,
                    job.logfile.display().to_string(),
                ],
            )
            .map_err(StoreError::from)?;
            Ok(())
        })
    }

    /// Insert a new track row
    pub fn add_track(&self, track: &Track) -> Result<(), StoreError> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO tracks (job_id, track_number, length, aspect_ratio, fps, \
                 main_feature, source, basename, filename, ripped) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    track.job_id,
                    track.track_number,
                    track.length,
                    track.aspect_ratio,
                    track.fps,
                    track.main_feature,
                    track.source,
                    track.basename,
                    track.filename,
                    track.ripped,
                ],
            )
            .map_err(StoreError::from)?;
            Ok(())
        })
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"),
                params![job_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Re-read the job row, picking up fields written by the UI process
    pub fn refresh(&self, job: &mut Job) -> Result<(), StoreError> {
        match self.get_job(&job.job_id)? {
            Some(fresh) => {
                *job = fresh;
                Ok(())
            }
            None => Err(StoreError::Missing(job.job_id.clone())),
        }
    }

    /// All jobs not yet in a terminal state
    pub fn active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.query_jobs(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status NOT IN ('success', 'fail')"),
            params![],
        )
    }

    /// Non-terminal jobs bound to a device path
    pub fn active_jobs_on_device(&self, devpath: &str) -> Result<Vec<Job>, StoreError> {
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 WHERE status NOT IN ('success', 'fail') AND devpath = ?1"
            ),
            params![devpath],
        )
    }

    /// Prior successful rips of the same content, most recent first
    ///
    /// The explicit start-time ordering makes the newest prior rip the
    /// authoritative source when several match.
    pub fn successful_rips_with_fingerprint(&self, crc_id: &str) -> Result<Vec<Job>, StoreError> {
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 WHERE crc_id = ?1 AND status = 'success' AND hasnicetitle = 1 \
                 ORDER BY start_time DESC"
            ),
            params![crc_id],
        )
    }

    pub fn tracks_for_job(&self, job_id: &str) -> Result<Vec<Track>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, track_number, length, aspect_ratio, fps, main_feature, \
             source, basename, filename, ripped \
             FROM tracks WHERE job_id = ?1 ORDER BY track_number",
        )?;
        let tracks = stmt
            .query_map(params![job_id], |row| {
                Ok(Track {
                    job_id: row.get(0)?,
                    track_number: row.get(1)?,
                    length: row.get(2)?,
                    aspect_ratio: row.get(3)?,
                    fps: row.get(4)?,
                    main_feature: row.get(5)?,
                    source: row.get(6)?,
                    basename: row.get(7)?,
                    filename: row.get(8)?,
                    ripped: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn query_jobs(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let jobs = stmt
            .query_map(params, row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Run a mutation under the bounded lock-retry policy
    fn write<T>(&self, mut op: impl FnMut(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        retry_on_contention(
            self.wait_attempts,
            |delay| std::thread::sleep(delay),
            || op(&self.conn),
        )
    }
}

/// Retry `op` while it reports transient contention
///
/// Sleeps one second between attempts; gives up after `attempts` tries with
/// `StoreError::Contended`. Any non-retryable error propagates immediately.
fn retry_on_contention<T>(
    attempts: u32,
    mut sleep: impl FnMut(Duration),
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() => {
                debug!("database is locked - try {attempt}/{attempts}");
                if attempt == attempts {
                    break;
                }
                sleep(Duration::from_secs(1));
            }
            Err(error) => return Err(error),
        }
    }
    warn!("giving up on database write after {attempts} attempts");
    Err(StoreError::Contended { attempts })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let crc_id: Option<String> = row.get(3)?;
    let video_type: Option<String> = row.get(6)?;
    let disctype: String = row.get(8)?;
    let status: String = row.get(9)?;
    let start_time: String = row.get(12)?;
    let logfile: String = row.get(17)?;

    Ok(Job {
        job_id: row.get(0)?,
        devpath: row.get(1)?,
        label: row.get(2)?,
        crc_id,
        title: row.get(4)?,
        year: row.get(5)?,
        video_type: video_type
            .map(|v| parse_column(6, &v))
            .transpose()?,
        poster_url: row.get(7)?,
        disctype: parse_column(8, &disctype)?,
        status: parse_column(9, &status)?,
        pid: row.get(10)?,
        pid_hash: row.get(11)?,
        start_time: DateTime::parse_from_rfc3339(&start_time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    12,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
        title_manual: row.get(13)?,
        updated: row.get(14)?,
        hasnicetitle: row.get(15)?,
        errors: row.get(16)?,
        logfile: PathBuf::from(logfile),
    })
}

fn parse_column<T>(index: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseFieldError>,
{
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}
