//! In-process bus transport.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bus::{MessageStream, Subscription, Topic};
use crate::error::BusError;

/// An unbounded in-memory queue usable as a subscription.
///
/// Messages pushed before `subscribe()` are buffered. The stream ends once
/// the queue is closed and drained.
pub struct MemoryQueue {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Enqueue a raw message.
    pub fn push(&self, raw: impl Into<String>) -> Result<(), BusError> {
        let guard = self.tx.lock().map_err(|e| self.closed(e.to_string()))?;
        let tx = guard.as_ref().ok_or_else(|| self.closed("queue closed"))?;
        tx.send(raw.into()).map_err(|e| self.closed(e.to_string()))
    }

    /// Stop accepting messages; the subscription ends after draining.
    pub fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }

    fn closed(&self, reason: impl Into<String>) -> BusError {
        BusError::PublishFailed {
            topic: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Subscription for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<MessageStream, BusError> {
        let rx = self
            .rx
            .lock()
            .map_err(|e| BusError::SubscribeFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })?
            .take()
            .ok_or_else(|| BusError::SubscribeFailed {
                name: self.name.clone(),
                reason: "already subscribed".to_string(),
            })?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// A topic that records everything published to it.
pub struct MemoryTopic {
    name: String,
    published: Mutex<Vec<serde_json::Value>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages accepted so far, in publish order.
    pub fn published(&self) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Number of publish calls, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Topic for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: serde_json::Value) -> Result<(), BusError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::PublishFailed {
                topic: self.name.clone(),
                reason: "transport rejected message".to_string(),
            });
        }
        self.published
            .lock()
            .map_err(|e| BusError::PublishFailed {
                topic: self.name.clone(),
                reason: e.to_string(),
            })?
            .push(message);
        Ok(())
    }
}
