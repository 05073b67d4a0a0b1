//! Message bus abstraction.
//!
//! The worker consumes raw messages from a [`Subscription`] and publishes
//! verdicts to a [`Topic`]. Transports are pluggable:
//! - `memory`: in-process queue and recording topic
//! - `stdio`: JSON lines on stdin/stdout

pub mod memory;
pub mod stdio;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::BusError;

pub use memory::{MemoryQueue, MemoryTopic};
pub use stdio::{StdinSubscription, StdoutTopic};

/// Stream of raw message bodies, in delivery order.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Source of inbound messages.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Subscription name, for logging.
    fn name(&self) -> &str;

    /// Start delivery. The stream ends when the transport closes.
    async fn subscribe(&self) -> Result<MessageStream, BusError>;
}

/// Destination for outbound messages.
///
/// Implementations must be safe to call from many worker tasks at once.
#[async_trait]
pub trait Topic: Send + Sync {
    /// Topic name, for logging.
    fn name(&self) -> &str;

    /// Hand one message to the transport.
    async fn publish(&self, message: serde_json::Value) -> Result<(), BusError>;
}
