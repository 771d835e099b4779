use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info};

use crate::config::RipConfig;
use crate::dedupe;
use crate::dispatch::{fix_job_title, RipDispatcher, RipOutcome};
use crate::error::RipError;
use crate::job::{DiscType, Job, JobStatus};
use crate::notify::{Notifier, NOTIFY_TITLE};
use crate::store::{JobStore, JobUpdate};

/// Drives one job from identification through ripping to a terminal state
///
/// Every transition is written to the store before the next step begins, so
/// a crash at any point leaves an accurate record for the reconciliation
/// sweep to act on.
pub struct JobLifecycle<'a> {
    cfg: RipConfig,
    config_path: Option<PathBuf>,
    store: &'a JobStore,
    notifier: &'a Notifier,
}

impl<'a> JobLifecycle<'a> {
    pub fn new(
        cfg: RipConfig,
        config_path: Option<PathBuf>,
        store: &'a JobStore,
        notifier: &'a Notifier,
    ) -> Self {
        Self {
            cfg,
            config_path,
            store,
            notifier,
        }
    }

    pub async fn run(&self, job: &mut Job) -> Result<RipOutcome, RipError> {
        self.notify_entry(job).await;

        if job.disctype == DiscType::Unknown {
            let err = "could not identify disc";
            self.store.apply(job, JobUpdate::failed(err))?;
            return Ok(RipOutcome::Failed(err.to_string()));
        }

        let dupes = dedupe::check(self.store, job)?;

        if self.cfg.manual_wait {
            self.wait_for_manual_override(job).await?;
        }

        self.store.apply(job, JobUpdate::status(JobStatus::Active))?;

        let dispatcher = RipDispatcher::new(&self.cfg, self.store, self.notifier);
        match dispatcher.dispatch(job, dupes.is_duplicate).await {
            Ok(RipOutcome::Success) => {
                self.store.apply(job, JobUpdate::status(JobStatus::Success))?;
                info!("job {}: ✅ rip completed successfully", job.job_id);
                self.notifier
                    .notify(
                        job,
                        NOTIFY_TITLE,
                        &format!("{} rip complete.", fix_job_title(job)),
                    )
                    .await;
                Ok(RipOutcome::Success)
            }
            Ok(RipOutcome::Failed(err)) => {
                // the dispatcher may already have recorded the failure
                if !job.status.is_terminal() {
                    self.store.apply(job, JobUpdate::failed(err.clone()))?;
                }
                error!("job {}: ❌ rip failed: {err}", job.job_id);
                self.notifier
                    .notify(
                        job,
                        NOTIFY_TITLE,
                        &format!("{} rip failed: {err}", fix_job_title(job)),
                    )
                    .await;
                Ok(RipOutcome::Failed(err))
            }
            Err(e) => {
                if !job.status.is_terminal() {
                    if let Err(persist) = self.store.apply(job, JobUpdate::failed(e.to_string())) {
                        error!("job {}: could not record failure: {persist}", job.job_id);
                    }
                }
                Err(e)
            }
        }
    }

    /// Pause so a human can submit a title correction through the UI
    ///
    /// The job and the configuration file are re-read on every tick; an
    /// override present at the first tick ends the wait without sleeping at
    /// all, and once the ceiling elapses the rip proceeds regardless.
    async fn wait_for_manual_override(&self, job: &mut Job) -> Result<(), RipError> {
        let mut ceiling = self.cfg.manual_wait_time;
        info!(
            "job {}: waiting up to {ceiling}s for a manual title override",
            job.job_id
        );
        self.store.apply(job, JobUpdate::status(JobStatus::Waiting))?;

        let tick = self.cfg.manual_wait_poll_secs.max(1);
        let mut waited = 0u64;
        loop {
            self.store.refresh(job)?;
            if let Some(manual) = job.title_manual.clone() {
                info!(
                    "job {}: manual override found, overriding auto identification values",
                    job.job_id
                );
                self.store.apply(
                    job,
                    JobUpdate {
                        title: Some(manual),
                        updated: Some(true),
                        hasnicetitle: Some(true),
                        ..Default::default()
                    },
                )?;
                break;
            }
            if waited >= ceiling {
                debug!("job {}: manual wait ceiling reached", job.job_id);
                break;
            }
            tokio::time::sleep(Duration::from_secs(tick)).await;
            waited += tick;
            // the ceiling follows config edits made while we wait
            if let Some(path) = self.config_path.as_deref() {
                if let Ok(fresh) = RipConfig::load_config(Some(path)) {
                    ceiling = fresh.manual_wait_time;
                }
            }
        }
        Ok(())
    }

    async fn notify_entry(&self, job: &Job) {
        let body = match job.disctype {
            DiscType::Dvd | DiscType::Bluray => format!(
                "Found disc: {}. Disc type is {}.",
                fix_job_title(job),
                job.disctype
            ),
            DiscType::Music => format!("Found music CD: {}. Ripping all tracks.", job.label),
            DiscType::Data => "Found data disc. Copying data.".to_string(),
            DiscType::Unknown => "Could not identify disc. Not ripping.".to_string(),
        };
        self.notifier.notify(job, NOTIFY_TITLE, &body).await;
    }
}
