pub mod config;
pub mod dedupe;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod liveness;
pub mod notify;
pub mod store;
pub mod sweep;

pub use config::RipConfig;
pub use dispatch::{RipDispatcher, RipOutcome};
pub use error::RipError;
pub use job::{DiscType, Job, JobStatus, Track, VideoType};
pub use lifecycle::JobLifecycle;
pub use liveness::{ProcessProbe, SystemProbe};
pub use notify::Notifier;
pub use store::{JobStore, JobUpdate, StoreError};
