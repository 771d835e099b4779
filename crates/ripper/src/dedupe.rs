use chrono::Utc;
use log::{debug, error, info};

use crate::error::RipError;
use crate::job::{Job, VideoType};
use crate::store::{JobStore, JobUpdate, StoreError};

/// Two triggers on the same device within this window are one double-fired
/// hardware event, not two discs
pub const DUPLICATE_RUN_WINDOW_SECS: i64 = 60;

/// Result of the content-identity duplicate check
#[derive(Debug)]
pub struct DupeCheck {
    pub is_duplicate: bool,
    /// Prior successful rips of the same content, most recent first
    pub priors: Vec<Job>,
}

impl DupeCheck {
    fn none() -> Self {
        Self {
            is_duplicate: false,
            priors: Vec::new(),
        }
    }
}

/// Look for prior successful rips of the same disc content
///
/// A match means the disc was already identified once; the most recent
/// prior's title/year/poster/category are copied onto this job as
/// higher-confidence identification.
pub fn check(store: &JobStore, job: &mut Job) -> Result<DupeCheck, StoreError> {
    let Some(crc_id) = job.crc_id.clone() else {
        // nothing to compare yet
        return Ok(DupeCheck::none());
    };

    debug!("looking for previous rips with fingerprint {crc_id}");
    let priors = store.successful_rips_with_fingerprint(&crc_id)?;
    if priors.is_empty() {
        debug!("no previous rips match fingerprint {crc_id}");
        return Ok(DupeCheck::none());
    }

    let best = &priors[0];
    let update = JobUpdate {
        title: Some(
            best.title
                .clone()
                .unwrap_or_else(|| job.label.clone()),
        ),
        year: best.year.clone(),
        poster_url: best.poster_url.clone(),
        video_type: Some(best.video_type.unwrap_or(VideoType::Unknown)),
        hasnicetitle: Some(best.hasnicetitle),
        ..Default::default()
    };
    store.apply(job, update)?;

    info!(
        "job {}: disc matches {} previous rip(s), inheriting identification from job {}",
        job.job_id,
        priors.len(),
        best.job_id
    );
    Ok(DupeCheck {
        is_duplicate: true,
        priors,
    })
}

/// Abort when another rip started on this device only moments ago
///
/// Two concurrent rippers on one drive corrupt the session, so this is a
/// hard stop: the caller maps the error to a non-zero exit. Runs before the
/// new job row is inserted.
pub fn check_running(store: &JobStore, devpath: &str) -> Result<(), RipError> {
    for prior in store.active_jobs_on_device(devpath)? {
        let age_secs = (Utc::now() - prior.start_time).num_seconds().abs();
        if age_secs <= DUPLICATE_RUN_WINDOW_SECS {
            error!("job already running on {devpath} (started {age_secs}s ago)");
            return Err(RipError::DuplicateRun {
                device: devpath.to_string(),
            });
        }
    }
    Ok(())
}
