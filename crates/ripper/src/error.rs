use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Fatal and control-flow failures that end the current rip run
///
/// None of these terminate the process directly; the binary maps them to
/// exit codes. Ordinary tool failures are not represented here - they mark
/// the job failed and the run still exits cleanly.
#[derive(Debug, Error)]
pub enum RipError {
    /// Another rip started on the same device within the duplicate window,
    /// almost certainly a double-fired hardware event
    #[error("a rip job is already running on {device}")]
    DuplicateRun { device: String },

    /// The disc is a known duplicate and duplicate rips are disabled
    #[error("duplicate disc \"{title}\" and duplicate rips are disabled")]
    DisallowedDuplicate { title: String },

    /// Directory creation failed twice, likely a permissions problem
    #[error("could not create directory {path}: {source}")]
    Environment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RipError {
    /// Process exit code the supervisor should use for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            RipError::DuplicateRun { .. } | RipError::DisallowedDuplicate { .. } => 1,
            RipError::Environment { .. } => 2,
            RipError::Store(_) => 3,
        }
    }
}
