pub mod client;
pub mod error;
pub mod records;
pub mod renderer;
pub mod session;
pub mod sse;

pub use client::{ConsoleClient, EventStream};
pub use error::ConsoleError;
pub use records::{load_records, parse_records};
pub use renderer::{CancelJob, ProgressRenderer, RenderPhase, Step, StepStatus};
pub use sse::{SseDecoder, SseFrame};
