use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use sysinfo::{Pid, System};

/// Process-table lookup used to decide whether a job's owner is still alive
///
/// Injected where needed so reconciliation can be tested without real PIDs.
pub trait ProcessProbe {
    /// Identity token for a live process, None when the PID is gone
    ///
    /// The token folds in the process start time and name so a PID that was
    /// recycled by an unrelated process yields a different value.
    fn identity(&self, pid: u32) -> Option<i64>;
}

/// Probe backed by the OS process table
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn identity(&self, pid: u32) -> Option<i64> {
        let system = System::new_all();
        let process = system.process(Pid::from_u32(pid))?;

        let mut hasher = DefaultHasher::new();
        pid.hash(&mut hasher);
        process.start_time().hash(&mut hasher);
        process.name().hash(&mut hasher);
        Some(hasher.finish() as i64)
    }
}
