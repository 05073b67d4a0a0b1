//! Worker: subscription intake and bounded per-message dispatch.

pub mod dispatcher;

pub use dispatcher::{Worker, WorkerSummary};
