//! Validation pipeline: one inbound upload event in, one verdict out.

pub mod orchestrator;
pub mod publisher;
pub mod state;

pub use orchestrator::{MessageOutcome, ValidationPipeline};
pub use publisher::ResultPublisher;
pub use state::{MessageRun, MessageState, StateTransition};
