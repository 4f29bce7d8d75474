pub mod channel;
pub mod controller;
pub mod executor;
pub mod job;
pub mod types;

pub use channel::{ChannelError, ProgressPublisher, ProgressSubscriber, progress_channel};
pub use controller::{CancelOutcome, JobController, StartedJob};
pub use executor::{BatchExecutor, ExecuteError, Outcome, RecordError};
pub use job::{BatchJob, CancelFlag};
pub use types::{
    EventKind, EventPayload, JobSnapshot, JobState, JobSummary, Operation, ProgressEvent, Record,
};
