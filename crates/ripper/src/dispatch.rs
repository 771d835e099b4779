use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::process::Command;

use crate::config::RipConfig;
use crate::error::RipError;
use crate::job::{DiscType, Job, Track, VideoType};
use crate::notify::{Notifier, NOTIFY_TITLE};
use crate::store::{JobStore, JobUpdate, StoreError};

/// Result of a rip attempt
///
/// A failed rip is an ordinary outcome (the job records it and the run
/// exits cleanly); only fatal conditions surface as `RipError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RipOutcome {
    Success,
    Failed(String),
}

/// Selects and runs the ripping strategy for a classified disc
pub struct RipDispatcher<'a> {
    cfg: &'a RipConfig,
    store: &'a JobStore,
    notifier: &'a Notifier,
}

impl<'a> RipDispatcher<'a> {
    pub fn new(cfg: &'a RipConfig, store: &'a JobStore, notifier: &'a Notifier) -> Self {
        Self {
            cfg,
            store,
            notifier,
        }
    }

    /// Run the rip strategy matching the disc classification
    pub async fn dispatch(
        &self,
        job: &mut Job,
        have_dupes: bool,
    ) -> Result<RipOutcome, RipError> {
        match job.disctype {
            DiscType::Music => Ok(self.rip_music(job).await),
            DiscType::Data => self.rip_data(job).await,
            DiscType::Dvd | DiscType::Bluray => self.rip_video(job, have_dupes).await,
            DiscType::Unknown => Ok(RipOutcome::Failed(
                "could not identify disc".to_string(),
            )),
        }
    }

    /// Rip a music CD with the configured external tool
    ///
    /// Success is the tool's exit code alone; per-track accounting is the
    /// tool's own business and lands in the job log.
    async fn rip_music(&self, job: &Job) -> RipOutcome {
        info!(
            "job {}: disc identified as music, ripping with {}",
            job.job_id,
            self.cfg.music_rip_bin.display()
        );

        let mut cmd = Command::new(&self.cfg.music_rip_bin);
        cmd.arg("-d").arg(&job.devpath);
        if let Some(tool_cfg) = &self.cfg.music_rip_config {
            if tool_cfg.is_file() {
                cmd.arg("-c").arg(tool_cfg);
            }
        }

        run_tool(&mut cmd, &job.logfile, "music rip").await
    }

    /// Block-copy a data disc into the library as an .iso image
    async fn rip_data(&self, job: &mut Job) -> Result<RipOutcome, RipError> {
        let label = if job.label.is_empty() {
            "data-disc".to_string()
        } else {
            job.label.clone()
        };

        // stage under the raw path, falling back to a time-suffixed name so
        // re-runs of the same disc label cannot collide
        let mut staging = self.cfg.raw_path.join(&label);
        let mut final_name = label.clone();
        if !make_dir(&staging)? {
            let suffix = Utc::now().timestamp_millis();
            staging = self.cfg.raw_path.join(format!("{label}_{suffix}"));
            final_name = format!("{label}_{suffix}");
            if !make_dir(&staging)? {
                return Err(RipError::Environment {
                    path: staging,
                    source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
                });
            }
        }

        let final_dir = self
            .cfg
            .completed_path
            .join(type_subfolder(job.video_type))
            .join(&final_name);
        fs::create_dir_all(&final_dir).map_err(|e| RipError::Environment {
            path: final_dir.clone(),
            source: e,
        })?;

        let part_file = staging.join(format!("{label}.part"));
        info!(
            "job {}: ripping data disc to {}",
            job.job_id,
            part_file.display()
        );

        let mut cmd = Command::new(&self.cfg.data_rip_bin);
        cmd.arg(format!("if={}", job.devpath))
            .arg(format!("of={}", part_file.display()));
        for arg in &self.cfg.data_rip_args {
            cmd.arg(arg);
        }

        let mut outcome = run_tool(&mut cmd, &job.logfile, "data rip").await;
        match &outcome {
            RipOutcome::Success => {
                let image = final_dir.join(format!("{label}.iso"));
                info!(
                    "job {}: moving data image from {} to {}",
                    job.job_id,
                    part_file.display(),
                    image.display()
                );
                if let Err(e) = fs::rename(&part_file, &image) {
                    outcome =
                        RipOutcome::Failed(format!("could not move data image into place: {e}"));
                }
            }
            RipOutcome::Failed(err) => {
                error!("job {}: {err}", job.job_id);
                if part_file.exists() {
                    if let Err(e) = fs::remove_file(&part_file) {
                        warn!(
                            "job {}: could not delete partial image {}: {e}",
                            job.job_id,
                            part_file.display()
                        );
                    }
                }
            }
        }

        if let RipOutcome::Failed(err) = &outcome {
            self.store.apply(job, JobUpdate::failed(err.clone()))?;
        }

        // the staging tree goes away whatever happened; a stuck directory is
        // logged, never fatal
        if staging.exists() {
            debug!(
                "job {}: removing staging directory {}",
                job.job_id,
                staging.display()
            );
            if let Err(e) = fs::remove_dir_all(&staging) {
                error!(
                    "job {}: could not remove staging directory {}: {e}",
                    job.job_id,
                    staging.display()
                );
            }
        }

        Ok(outcome)
    }

    /// Rip a video disc through the configured pipeline command
    async fn rip_video(&self, job: &mut Job, have_dupes: bool) -> Result<RipOutcome, RipError> {
        let mut dir_name = clean_for_filename(&fix_job_title(job));
        if dir_name.is_empty() {
            dir_name = job.job_id.clone();
        }
        let base = self
            .cfg
            .completed_path
            .join(type_subfolder(job.video_type))
            .join(dir_name);

        let out_dir = self.resolve_output_dir(job, &base, have_dupes).await?;
        info!(
            "job {}: ripping video disc to {}",
            job.job_id,
            out_dir.display()
        );

        let mut cmd = Command::new(&self.cfg.video_rip_bin);
        for arg in &self.cfg.video_rip_args {
            cmd.arg(arg);
        }
        cmd.arg(&job.devpath).arg(&out_dir);

        Ok(run_tool(&mut cmd, &job.logfile, "video rip").await)
    }

    /// Pick the real output directory for a video rip
    ///
    /// An existing directory is only fatal when it belongs to a known
    /// duplicate and duplicates are disabled; otherwise a time-suffixed
    /// alternate is used. A second creation failure is an unrecoverable
    /// environment problem.
    pub(crate) async fn resolve_output_dir(
        &self,
        job: &mut Job,
        base: &Path,
        have_dupes: bool,
    ) -> Result<PathBuf, RipError> {
        if make_dir(base)? {
            return Ok(base.to_path_buf());
        }

        info!(
            "job {}: output directory {} already exists",
            job.job_id,
            base.display()
        );
        debug!(
            "allow_duplicates: {}, have_dupes: {have_dupes}",
            self.cfg.allow_duplicates
        );

        if !self.cfg.allow_duplicates && have_dupes {
            info!("duplicate rips are disabled");
            self.notifier
                .notify(
                    job,
                    NOTIFY_TITLE,
                    &format!(
                        "Detected a duplicate disc for {}. Duplicate rips are disabled; \
                         you can re-enable them in the config file.",
                        fix_job_title(job)
                    ),
                )
                .await;
            self.eject(job).await;
            if let Err(e) = self.store.apply(job, JobUpdate::failed("duplicate disc")) {
                error!(
                    "job {}: could not record duplicate failure: {e}",
                    job.job_id
                );
            }
            return Err(RipError::DisallowedDuplicate {
                title: fix_job_title(job),
            });
        }

        let alternate = suffixed_path(base);
        match make_dir(&alternate) {
            Ok(true) => Ok(alternate),
            second_attempt => {
                let source = match second_attempt {
                    Err(RipError::Environment { source, .. }) => source,
                    _ => std::io::Error::from(std::io::ErrorKind::AlreadyExists),
                };
                let err = "couldn't create filesystem path, possible permission error";
                error!("job {}: {err}", job.job_id);
                self.notifier
                    .notify(
                        job,
                        NOTIFY_TITLE,
                        &format!(
                            "Encountered a fatal error processing {}: {err}",
                            fix_job_title(job)
                        ),
                    )
                    .await;
                if let Err(e) = self.store.apply(job, JobUpdate::failed(err)) {
                    error!("job {}: could not record failure: {e}", job.job_id);
                }
                Err(RipError::Environment {
                    path: alternate,
                    source,
                })
            }
        }
    }

    /// Pop the disc tray; best-effort
    pub(crate) async fn eject(&self, job: &Job) {
        match Command::new(&self.cfg.eject_bin)
            .arg(&job.devpath)
            .output()
            .await
        {
            Ok(output) if output.status.success() => debug!("ejected {}", job.devpath),
            Ok(output) => warn!(
                "eject of {} exited with code {:?}",
                job.devpath,
                output.status.code()
            ),
            Err(e) => warn!("could not run eject for {}: {e}", job.devpath),
        }
    }
}

/// Record one ripped title/stream candidate for a job
///
/// The ripped flag derives from the configured minimum length; short tracks
/// stay on record but do not count as ripped content.
#[allow(clippy::too_many_arguments)]
pub fn record_track(
    store: &JobStore,
    cfg: &RipConfig,
    job: &Job,
    track_number: i64,
    length: i64,
    aspect_ratio: &str,
    fps: &str,
    main_feature: bool,
    source: &str,
    filename: &str,
) -> Result<(), StoreError> {
    debug!(
        "track #{track_number:02} length: {length:>4} fps: {fps} aspect: {aspect_ratio} \
         mainfeature: {main_feature} source: {source}"
    );
    store.add_track(&Track::new(
        job,
        track_number,
        length,
        aspect_ratio,
        fps,
        main_feature,
        source,
        filename,
        cfg.min_length_secs,
    ))
}

/// Create a directory tree; Ok(false) when it already exists
fn make_dir(path: &Path) -> Result<bool, RipError> {
    if path.exists() {
        return Ok(false);
    }
    debug!("creating directory: {}", path.display());
    fs::create_dir_all(path).map_err(|e| RipError::Environment {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(true)
}

fn suffixed_path(base: &Path) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    name.push_str(&format!("_{}", Utc::now().timestamp_millis()));
    base.with_file_name(name)
}

/// Run an external tool, appending its output to the job log
async fn run_tool(cmd: &mut Command, logfile: &Path, what: &str) -> RipOutcome {
    debug!("sending command: {:?}", cmd.as_std());

    let output = match cmd.output().await {
        Ok(output) => output,
        Err(e) => return RipOutcome::Failed(format!("{what} failed to start: {e}")),
    };

    append_log(logfile, &output.stdout, &output.stderr);

    if output.status.success() {
        info!("{what} call successful");
        return RipOutcome::Success;
    }

    let code = output.status.code().unwrap_or(-1);
    let stderr_text = String::from_utf8_lossy(&output.stderr);
    let detail = stderr_text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();
    if detail.is_empty() {
        RipOutcome::Failed(format!("{what} failed with code: {code}"))
    } else {
        RipOutcome::Failed(format!("{what} failed with code: {code} ({detail})"))
    }
}

/// Append captured tool output to the job log file; best-effort
fn append_log(logfile: &Path, stdout: &[u8], stderr: &[u8]) {
    if let Some(parent) = logfile.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let result = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logfile)
        .and_then(|mut file| {
            file.write_all(stdout)?;
            file.write_all(stderr)?;
            Ok(())
        });
    if let Err(e) = result {
        warn!("could not append tool output to {}: {e}", logfile.display());
    }
}

/// Library sub-folder for a video category
pub fn type_subfolder(video_type: Option<VideoType>) -> &'static str {
    match video_type {
        Some(VideoType::Movie) => "movies",
        Some(VideoType::Series) => "tv",
        _ => "unidentified",
    }
}

/// Human-readable job title, with the year folded in when known
pub fn fix_job_title(job: &Job) -> String {
    let title = job
        .title
        .clone()
        .unwrap_or_else(|| job.label.clone());
    match &job.year {
        Some(year) if !year.is_empty() && year != "0000" => format!("{title} ({year})"),
        _ => title,
    }
}

/// Reduce a title to something safe for a directory or file name
pub fn clean_for_filename(name: &str) -> String {
    // bracketed release tags carry no title information
    let mut stripped = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let replaced = stripped
        .replace(" : ", " - ")
        .replace(':', "-")
        .replace('&', "and");

    let mut cleaned = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !cleaned.ends_with('-') {
                cleaned.push('-');
            }
        } else if c.is_alphanumeric() || matches!(c, '.' | '(' | ')' | '-' | '_') {
            cleaned.push(c);
        }
    }
    cleaned.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn test_cfg(dir: &Path) -> RipConfig {
        RipConfig {
            db_path: dir.join("jobs.db"),
            raw_path: dir.join("raw"),
            completed_path: dir.join("completed"),
            log_path: dir.join("logs"),
            db_wait_time: 3,
            manual_wait: false,
            music_rip_bin: PathBuf::from("true"),
            data_rip_bin: PathBuf::from("dd"),
            data_rip_args: Vec::new(),
            video_rip_bin: PathBuf::from("true"),
            eject_bin: PathBuf::from("true"),
            ..RipConfig::default_config()
        }
    }

    fn test_job(cfg: &RipConfig, disctype: DiscType) -> Job {
        let mut job = Job::new("/dev/sr0", "TEST_DISC", disctype, PathBuf::new());
        job.logfile = cfg.job_logfile(&job.label, &job.job_id);
        job
    }

    #[tokio::test]
    async fn music_rip_succeeds_on_zero_exit() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Music);
        store.add_job(&job).unwrap();

        let outcome = dispatcher.dispatch(&mut job, false).await.unwrap();
        assert_eq!(outcome, RipOutcome::Success);
    }

    #[tokio::test]
    async fn music_rip_fails_on_nonzero_exit() {
        let dir = tempdir().unwrap();
        let mut cfg = test_cfg(dir.path());
        cfg.music_rip_bin = PathBuf::from("false");
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Music);
        store.add_job(&job).unwrap();

        match dispatcher.dispatch(&mut job, false).await.unwrap() {
            RipOutcome::Failed(err) => assert!(err.contains("music rip failed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_tool_is_a_failed_outcome_not_a_fatal() {
        let dir = tempdir().unwrap();
        let mut cfg = test_cfg(dir.path());
        cfg.music_rip_bin = PathBuf::from("/no/such/tool");
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Music);
        store.add_job(&job).unwrap();

        match dispatcher.dispatch(&mut job, false).await.unwrap() {
            RipOutcome::Failed(err) => assert!(err.contains("failed to start")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_disc_fails_without_ripping() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Unknown);
        store.add_job(&job).unwrap();

        match dispatcher.dispatch(&mut job, false).await.unwrap() {
            RipOutcome::Failed(err) => assert!(err.contains("could not identify")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn data_rip_copies_device_image_into_library() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        // the "device" is just a readable block of bytes as far as dd cares
        let device = dir.path().join("fake-device");
        fs::write(&device, b"disc image contents").unwrap();

        let mut job = test_job(&cfg, DiscType::Data);
        job.devpath = device.display().to_string();
        store.add_job(&job).unwrap();

        let outcome = dispatcher.dispatch(&mut job, false).await.unwrap();
        assert_eq!(outcome, RipOutcome::Success);

        let image = cfg
            .completed_path
            .join("unidentified")
            .join("TEST_DISC")
            .join("TEST_DISC.iso");
        assert_eq!(fs::read(&image).unwrap(), b"disc image contents");
        // staging is gone after a successful rip too
        assert!(!cfg.raw_path.join("TEST_DISC").exists());
    }

    #[tokio::test]
    async fn data_rip_failure_cleans_up_and_records_the_error() {
        let dir = tempdir().unwrap();
        let mut cfg = test_cfg(dir.path());
        cfg.data_rip_bin = PathBuf::from("false");
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Data);
        store.add_job(&job).unwrap();

        match dispatcher.dispatch(&mut job, false).await.unwrap() {
            RipOutcome::Failed(err) => assert!(!err.is_empty()),
            other => panic!("expected failure, got {other:?}"),
        }

        let staging = cfg.raw_path.join("TEST_DISC");
        assert!(!staging.exists(), "staging directory should be removed");
        assert!(!staging.join("TEST_DISC.part").exists());

        let stored = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Fail);
        assert!(!stored.errors.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_rip_falls_back_to_suffixed_staging_dir() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        // a stale staging dir from an earlier run of the same label
        fs::create_dir_all(cfg.raw_path.join("TEST_DISC")).unwrap();

        let device = dir.path().join("fake-device");
        fs::write(&device, b"bytes").unwrap();

        let mut job = test_job(&cfg, DiscType::Data);
        job.devpath = device.display().to_string();
        store.add_job(&job).unwrap();

        let outcome = dispatcher.dispatch(&mut job, false).await.unwrap();
        assert_eq!(outcome, RipOutcome::Success);

        // the image landed under a suffixed name, not the stale one
        let type_dir = cfg.completed_path.join("unidentified");
        let entries: Vec<_> = fs::read_dir(&type_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("TEST_DISC_"));
    }

    #[tokio::test]
    async fn fresh_output_dir_is_used_as_is() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Dvd);
        store.add_job(&job).unwrap();

        let base = cfg.completed_path.join("movies").join("Alpha-(2001)");
        let resolved = dispatcher
            .resolve_output_dir(&mut job, &base, false)
            .await
            .unwrap();
        assert_eq!(resolved, base);
        assert!(base.is_dir());
    }

    #[tokio::test]
    async fn existing_output_dir_gets_a_suffixed_alternate() {
        let dir = tempdir().unwrap();
        let mut cfg = test_cfg(dir.path());
        cfg.allow_duplicates = true;
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Dvd);
        store.add_job(&job).unwrap();

        let base = cfg.completed_path.join("movies").join("Alpha-(2001)");
        fs::create_dir_all(&base).unwrap();

        let resolved = dispatcher
            .resolve_output_dir(&mut job, &base, true)
            .await
            .unwrap();
        assert_ne!(resolved, base);
        assert!(resolved
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Alpha-(2001)_"));
        assert!(resolved.is_dir());
    }

    #[tokio::test]
    async fn disallowed_duplicate_fails_the_job_and_aborts() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Dvd);
        job.title = Some("Alpha".to_string());
        store.add_job(&job).unwrap();

        let base = cfg.completed_path.join("movies").join("Alpha");
        fs::create_dir_all(&base).unwrap();

        let result = dispatcher.resolve_output_dir(&mut job, &base, true).await;
        assert!(matches!(result, Err(RipError::DisallowedDuplicate { .. })));

        let stored = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Fail);
    }

    #[tokio::test]
    async fn tool_output_lands_in_the_job_log() {
        let dir = tempdir().unwrap();
        let mut cfg = test_cfg(dir.path());
        cfg.music_rip_bin = PathBuf::from("echo");
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();
        let notifier = Notifier::from_config(&cfg);
        let dispatcher = RipDispatcher::new(&cfg, &store, &notifier);

        let mut job = test_job(&cfg, DiscType::Music);
        store.add_job(&job).unwrap();

        let outcome = dispatcher.dispatch(&mut job, false).await.unwrap();
        assert_eq!(outcome, RipOutcome::Success);

        let logged = fs::read_to_string(&job.logfile).unwrap();
        assert!(logged.contains("/dev/sr0"));
    }

    #[test]
    fn record_track_derives_the_ripped_flag() {
        let dir = tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let store = JobStore::open(&cfg.db_path, cfg.db_wait_time).unwrap();

        let mut job = test_job(&cfg, DiscType::Dvd);
        job.title = Some("Alpha".to_string());
        store.add_job(&job).unwrap();

        record_track(&store, &cfg, &job, 1, 5400, "16:9", "23.976", true, "scan", "t01.mkv")
            .unwrap();
        record_track(&store, &cfg, &job, 2, 42, "16:9", "23.976", false, "scan", "t02.mkv")
            .unwrap();

        let tracks = store.tracks_for_job(&job.job_id).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].ripped);
        assert!(!tracks[1].ripped);
    }

    #[test]
    fn job_title_includes_real_years_only() {
        let cfg = test_cfg(Path::new("/tmp"));
        let mut job = test_job(&cfg, DiscType::Dvd);
        assert_eq!(fix_job_title(&job), "TEST_DISC");

        job.title = Some("Alpha".to_string());
        job.year = Some("2001".to_string());
        assert_eq!(fix_job_title(&job), "Alpha (2001)");

        job.year = Some("0000".to_string());
        assert_eq!(fix_job_title(&job), "Alpha");

        job.year = Some(String::new());
        assert_eq!(fix_job_title(&job), "Alpha");
    }

    #[test]
    fn filenames_are_cleaned_of_hostile_characters() {
        assert_eq!(clean_for_filename("Alpha (2001)"), "Alpha-(2001)");
        assert_eq!(clean_for_filename("Alpha : Genesis"), "Alpha--Genesis");
        assert_eq!(clean_for_filename("Tom & Jerry"), "Tom-and-Jerry");
        assert_eq!(clean_for_filename("Movie [UHD REMUX]"), "Movie");
        assert_eq!(clean_for_filename("a/b\\c"), "abc");
    }

    #[test]
    fn type_subfolder_maps_categories() {
        assert_eq!(type_subfolder(Some(VideoType::Movie)), "movies");
        assert_eq!(type_subfolder(Some(VideoType::Series)), "tv");
        assert_eq!(type_subfolder(Some(VideoType::Unknown)), "unidentified");
        assert_eq!(type_subfolder(None), "unidentified");
    }

    proptest! {
        /// Cleaned names never contain path separators or other characters
        /// that are unsafe in a directory name.
        #[test]
        fn cleaned_names_are_path_safe(name in ".*") {
            let cleaned = clean_for_filename(&name);
            for c in cleaned.chars() {
                prop_assert!(
                    c.is_alphanumeric() || matches!(c, '.' | '(' | ')' | '-' | '_'),
                    "unexpected character {c:?} in {cleaned:?}"
                );
            }
            prop_assert!(!cleaned.starts_with('-'));
            prop_assert!(!cleaned.ends_with('-'));
        }
    }
}
