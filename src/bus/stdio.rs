//! Stdio bus transport: one JSON message per line.
//!
//! Used when the worker runs without a broker: upload events are piped in on
//! stdin and verdicts are written to stdout. Logs go to stderr.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_stream::wrappers::LinesStream;

use crate::bus::{MessageStream, Subscription, Topic};
use crate::error::BusError;

/// Reads raw messages from stdin, one per line.
pub struct StdinSubscription {
    name: String,
}

impl StdinSubscription {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Subscription for StdinSubscription {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<MessageStream, BusError> {
        let lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        let stream = lines
            .take_while(|line| {
                let keep = match line {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        false
                    }
                };
                futures::future::ready(keep)
            })
            .filter_map(|line| {
                let line = line.ok().map(|l| l.trim().to_string());
                futures::future::ready(line.filter(|l| !l.is_empty()))
            });
        Ok(Box::pin(stream))
    }
}

/// Writes published messages to stdout as single JSON lines.
pub struct StdoutTopic {
    name: String,
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl Topic for StdoutTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: serde_json::Value) -> Result<(), BusError> {
        let mut line = serde_json::to_string(&message).map_err(|e| BusError::PublishFailed {
            topic: self.name.clone(),
            reason: e.to_string(),
        })?;
        line.push('\n');

        // Hold the lock across write and flush so lines never interleave.
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
