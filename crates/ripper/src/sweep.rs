use log::{debug, info, warn};

use crate::liveness::ProcessProbe;
use crate::store::{JobStore, JobUpdate, StoreError};

/// Fail jobs whose owning process died without reaching a terminal state
///
/// A crash or kill leaves the job stuck in a non-terminal status forever;
/// this pass compares each such job's recorded PID and identity token
/// against the live process table and fails the abandoned ones. Live jobs
/// always carry a matching token, so the sweep never touches them and is
/// safe to run while rips are in progress. Returns the number of jobs
/// corrected.
pub fn sweep(store: &JobStore, probe: &dyn ProcessProbe) -> Result<usize, StoreError> {
    let mut corrected = 0;

    for mut job in store.active_jobs()? {
        match probe.identity(job.pid) {
            Some(token) if token == job.pid_hash => {
                debug!(
                    "job {} with pid {} is currently running",
                    job.job_id, job.pid
                );
            }
            outcome => {
                let why = if outcome.is_none() {
                    "owning process is gone"
                } else {
                    // same PID, different process: the PID was recycled
                    "pid was reused by another process"
                };
                warn!(
                    "job {} with pid {} has been abandoned ({why}), updating job status to fail",
                    job.job_id, job.pid
                );
                store.apply(&mut job, JobUpdate::failed(format!("abandoned: {why}")))?;
                corrected += 1;
            }
        }
    }

    if corrected > 0 {
        info!("reconciled {corrected} abandoned job(s)");
    }
    Ok(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DiscType, Job, JobStatus};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct FakeProbe {
        processes: HashMap<u32, i64>,
    }

    impl FakeProbe {
        fn new(entries: &[(u32, i64)]) -> Self {
            Self {
                processes: entries.iter().copied().collect(),
            }
        }
    }

    impl ProcessProbe for FakeProbe {
        fn identity(&self, pid: u32) -> Option<i64> {
            self.processes.get(&pid).copied()
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> JobStore {
        JobStore::open(&dir.path().join("jobs.db"), 3).unwrap()
    }

    fn job_with_pid(pid: u32, pid_hash: i64) -> Job {
        let mut job = Job::new("/dev/sr0", "DISC", DiscType::Dvd, PathBuf::from("/tmp/t.log"));
        job.pid = pid;
        job.pid_hash = pid_hash;
        job
    }

    #[test]
    fn dead_process_fails_the_job() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.add_job(&job_with_pid(4242, 777)).unwrap();

        let corrected = sweep(&store, &FakeProbe::new(&[])).unwrap();
        assert_eq!(corrected, 1);

        let jobs = store.active_jobs().unwrap();
        assert!(jobs.is_empty(), "abandoned job should now be terminal");
    }

    #[test]
    fn recycled_pid_fails_the_job() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let job = job_with_pid(4242, 777);
        store.add_job(&job).unwrap();

        // pid 4242 exists but belongs to a different process now
        let corrected = sweep(&store, &FakeProbe::new(&[(4242, 555)])).unwrap();
        assert_eq!(corrected, 1);

        let failed = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Fail);
        assert!(failed.errors.unwrap().contains("reused"));
    }

    #[test]
    fn live_job_is_left_alone() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let job = job_with_pid(4242, 777);
        store.add_job(&job).unwrap();

        let corrected = sweep(&store, &FakeProbe::new(&[(4242, 777)])).unwrap();
        assert_eq!(corrected, 0);

        let untouched = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Identifying);
    }

    #[test]
    fn terminal_jobs_are_never_inspected() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut done = job_with_pid(4242, 777);
        done.status = JobStatus::Success;
        store.add_job(&done).unwrap();

        let corrected = sweep(&store, &FakeProbe::new(&[])).unwrap();
        assert_eq!(corrected, 0);

        let untouched = store.get_job(&done.job_id).unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Success);
    }

    #[test]
    fn sweep_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.add_job(&job_with_pid(4242, 777)).unwrap();

        let probe = FakeProbe::new(&[]);
        assert_eq!(sweep(&store, &probe).unwrap(), 1);
        assert_eq!(sweep(&store, &probe).unwrap(), 0);
    }
}
