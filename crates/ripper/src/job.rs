use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a stored enum value cannot be recognized
#[derive(Debug, Error)]
#[error("unrecognized {what}: {value}")]
pub struct ParseFieldError {
    pub what: &'static str,
    pub value: String,
}

/// Lifecycle status of a rip job
///
/// Transitions only move forward: identifying -> waiting (optional) ->
/// active -> success/fail. Terminal jobs never change status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Identifying,
    Waiting,
    Active,
    Success,
    Fail,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Identifying => "identifying",
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Success => "success",
            JobStatus::Fail => "fail",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Fail)
    }

    /// Whether a status change to `next` is legal
    ///
    /// Re-asserting the current status is always allowed so that idempotent
    /// writes (e.g. a repeated failure record) do not error.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Identifying, Waiting)
                | (Identifying, Active)
                | (Identifying, Fail)
                | (Waiting, Active)
                | (Waiting, Fail)
                | (Active, Success)
                | (Active, Fail)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identifying" => Ok(JobStatus::Identifying),
            "waiting" => Ok(JobStatus::Waiting),
            "active" => Ok(JobStatus::Active),
            "success" => Ok(JobStatus::Success),
            "fail" => Ok(JobStatus::Fail),
            other => Err(ParseFieldError {
                what: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// Disc classification, determined before a job reaches this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscType {
    Unknown,
    Dvd,
    Bluray,
    Music,
    Data,
}

impl DiscType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscType::Unknown => "unknown",
            DiscType::Dvd => "dvd",
            DiscType::Bluray => "bluray",
            DiscType::Music => "music",
            DiscType::Data => "data",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, DiscType::Dvd | DiscType::Bluray)
    }
}

impl std::fmt::Display for DiscType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscType {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(DiscType::Unknown),
            "dvd" => Ok(DiscType::Dvd),
            "bluray" => Ok(DiscType::Bluray),
            "music" => Ok(DiscType::Music),
            "data" => Ok(DiscType::Data),
            other => Err(ParseFieldError {
                what: "disc type",
                value: other.to_string(),
            }),
        }
    }
}

/// Video content category, used for the destination library sub-folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    Movie,
    Series,
    Unknown,
}

impl VideoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoType::Movie => "movie",
            VideoType::Series => "series",
            VideoType::Unknown => "unknown",
        }
    }
}

impl FromStr for VideoType {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(VideoType::Movie),
            "series" => Ok(VideoType::Series),
            "unknown" => Ok(VideoType::Unknown),
            other => Err(ParseFieldError {
                what: "video type",
                value: other.to_string(),
            }),
        }
    }
}

/// A single rip job, one per inserted disc
///
/// The job record lives in the shared store and is also read and partially
/// written by the web UI process: the UI owns `title_manual` (and may flip
/// `updated`), this crate only ever reads those fields back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub devpath: String,
    pub label: String,
    /// Content fingerprint of the disc; None until identification computes it
    pub crc_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub video_type: Option<VideoType>,
    pub poster_url: Option<String>,
    pub disctype: DiscType,
    pub status: JobStatus,
    /// PID of the process running this job
    pub pid: u32,
    /// Identity token of that process, guards against PID reuse
    pub pid_hash: i64,
    pub start_time: DateTime<Utc>,
    /// Manual title override submitted through the UI while the job waits
    pub title_manual: Option<String>,
    pub updated: bool,
    pub hasnicetitle: bool,
    pub errors: Option<String>,
    /// Log file all external tool output for this job is appended to
    pub logfile: PathBuf,
}

impl Job {
    pub fn new(devpath: &str, label: &str, disctype: DiscType, logfile: PathBuf) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            devpath: devpath.to_string(),
            label: label.to_string(),
            crc_id: None,
            title: None,
            year: None,
            video_type: None,
            poster_url: None,
            disctype,
            status: JobStatus::Identifying,
            pid: std::process::id(),
            pid_hash: 0,
            start_time: Utc::now(),
            title_manual: None,
            updated: false,
            hasnicetitle: false,
            errors: None,
            logfile,
        }
    }
}

/// One ripped title/stream candidate belonging to a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub job_id: String,
    pub track_number: i64,
    /// Length in seconds
    pub length: i64,
    pub aspect_ratio: String,
    pub fps: String,
    pub main_feature: bool,
    /// Where the track metadata came from
    pub source: String,
    pub basename: String,
    pub filename: String,
    /// Derived at creation: the track is long enough to count as ripped
    pub ripped: bool,
}

impl Track {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job: &Job,
        track_number: i64,
        length: i64,
        aspect_ratio: &str,
        fps: &str,
        main_feature: bool,
        source: &str,
        filename: &str,
        min_length_secs: i64,
    ) -> Self {
        Self {
            job_id: job.job_id.clone(),
            track_number,
            length,
            aspect_ratio: aspect_ratio.to_string(),
            fps: fps.to_string(),
            main_feature,
            source: source.to_string(),
            basename: job.title.clone().unwrap_or_else(|| job.label.clone()),
            filename: filename.to_string(),
            ripped: length > min_length_secs,
        }
    }
}
