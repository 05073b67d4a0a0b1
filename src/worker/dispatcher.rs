//! Intake loop.
//!
//! Messages are pulled off the subscription one at a time and each is
//! handed to its own task. Tasks wait on a semaphore for a processing slot,
//! so a slow validation never blocks intake, and at most
//! `max_concurrent_messages` messages are processed at once.
//!
//! Intake pauses while `BACKLOG_FACTOR * max_concurrent_messages` tasks are
//! in flight, so unacknowledged messages stay on the subscription instead of
//! piling up in memory.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::bus::Subscription;
use crate::error::Result;
use crate::pipeline::{MessageOutcome, MessageState, ValidationPipeline};

/// In-flight tasks allowed per processing slot, running or waiting.
const BACKLOG_FACTOR: usize = 2;

/// Totals for one worker run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    /// Messages taken off the subscription.
    pub received: usize,
    /// Messages whose verdict was valid.
    pub valid: usize,
    /// Messages whose upload failed validation.
    pub invalid: usize,
    /// Messages that hit a pipeline-level fault.
    pub failed: usize,
    /// Verdicts the bus did not accept.
    pub unpublished: usize,
    /// Tasks that panicked.
    pub panicked: usize,
    /// Most tasks in flight at once.
    pub peak_in_flight: usize,
}

impl WorkerSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        match (outcome.state, outcome.verdict.is_valid) {
            (MessageState::Failed, _) => self.failed += 1,
            (_, true) => self.valid += 1,
            (_, false) => self.invalid += 1,
        }
        if !outcome.published {
            self.unpublished += 1;
        }
    }

    fn record_join(&mut self, joined: std::result::Result<MessageOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.record(&outcome),
            Err(e) => {
                error!("Message task panicked: {e}");
                self.panicked += 1;
            }
        }
    }

    /// Messages that finished, one way or another.
    pub fn finished(&self) -> usize {
        self.valid + self.invalid + self.failed + self.panicked
    }
}

pub struct Worker {
    subscription: Arc<dyn Subscription>,
    pipeline: Arc<ValidationPipeline>,
    max_concurrent: usize,
}

impl Worker {
    pub fn new(
        subscription: Arc<dyn Subscription>,
        pipeline: Arc<ValidationPipeline>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            subscription,
            pipeline,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Consume messages until the subscription ends or `shutdown` resolves,
    /// then wait for in-flight messages to finish.
    ///
    /// Only a failure to subscribe is an error.
    pub async fn run<F>(self, shutdown: F) -> Result<WorkerSummary>
    where
        F: Future<Output = ()>,
    {
        let mut stream = self.subscription.subscribe().await?;
        let slots = Arc::new(Semaphore::new(self.max_concurrent));
        let max_in_flight = self.max_concurrent * BACKLOG_FACTOR;
        let mut tasks: JoinSet<MessageOutcome> = JoinSet::new();
        let mut summary = WorkerSummary::default();

        info!(
            subscription = self.subscription.name(),
            max_concurrent = self.max_concurrent,
            max_in_flight,
            "Worker ready and listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping intake...");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    summary.record_join(joined);
                }
                msg = stream.next(), if tasks.len() < max_in_flight => {
                    let Some(raw) = msg else {
                        info!("Subscription ended, stopping intake...");
                        break;
                    };
                    summary.received += 1;
                    let pipeline = Arc::clone(&self.pipeline);
                    let slots = Arc::clone(&slots);
                    tasks.spawn(async move {
                        let _permit = slots.acquire_owned().await.ok();
                        pipeline.handle(&raw).await
                    });
                    summary.peak_in_flight = summary.peak_in_flight.max(tasks.len());
                    debug!(in_flight = tasks.len(), "Dispatched message");
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight messages");
        }
        while let Some(joined) = tasks.join_next().await {
            summary.record_join(joined);
        }

        info!(
            received = summary.received,
            valid = summary.valid,
            invalid = summary.invalid,
            failed = summary.failed,
            unpublished = summary.unpublished,
            panicked = summary.panicked,
            peak_in_flight = summary.peak_in_flight,
            "Worker stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::auth::{Authorizer, SimulatedPermissionProvider};
    use crate::bus::{MemoryQueue, MemoryTopic};
    use crate::config::WorkerConfig;
    use crate::error::ValidatorError;
    use crate::storage::LocalStorageClient;
    use crate::validator::{StructuralValidator, ValidationReport};

    /// Sleeps while tracking how many calls overlap.
    #[derive(Default)]
    struct SlowValidator {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StructuralValidator for SlowValidator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn validate(&self, _: &Path, _: usize) -> std::result::Result<ValidationReport, ValidatorError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(ValidationReport::valid())
        }
    }

    struct Fixture {
        _store: TempDir,
        _downloads: TempDir,
        queue: Arc<MemoryQueue>,
        topic: Arc<MemoryTopic>,
        validator: Arc<SlowValidator>,
        pipeline: Arc<ValidationPipeline>,
    }

    fn fixture() -> Fixture {
        let store = TempDir::new().unwrap();
        let uploads = store.path().join("osw").join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("valid.zip"), b"PK").unwrap();

        let downloads = TempDir::new().unwrap();
        let config = WorkerConfig {
            download_dir: downloads.path().to_path_buf(),
            ..WorkerConfig::default()
        };
        let queue = Arc::new(MemoryQueue::new("upload"));
        let topic = Arc::new(MemoryTopic::new("validation"));
        let validator = Arc::new(SlowValidator::default());
        let pipeline = Arc::new(ValidationPipeline::new(
            &config,
            Arc::new(LocalStorageClient::new(store.path())),
            Authorizer::new(Arc::new(SimulatedPermissionProvider), &config.auth),
            validator.clone(),
            topic.clone(),
        ));
        Fixture {
            _store: store,
            _downloads: downloads,
            queue,
            topic,
            validator,
            pipeline,
        }
    }

    fn upload(id: usize) -> String {
        json!({
            "messageId": format!("m-{id}"),
            "messageType": "osw-upload",
            "data": {
                "file_upload_path": "https://store/osw/uploads/valid.zip",
                "user_id": "u",
                "tdei_project_group_id": "pg"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn drains_queue_and_respects_ceiling() {
        let f = fixture();
        for i in 0..8 {
            f.queue.push(upload(i)).unwrap();
        }
        f.queue.close();

        let worker = Worker::new(f.queue.clone(), f.pipeline.clone(), 2);
        let summary = worker.run(std::future::pending()).await.unwrap();

        assert_eq!(summary.received, 8);
        assert_eq!(summary.valid, 8);
        assert_eq!(summary.finished(), 8);
        assert_eq!(f.topic.published().len(), 8);
        assert!(f.validator.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn intake_pauses_when_backlog_is_full() {
        let f = fixture();
        for i in 0..8 {
            f.queue.push(upload(i)).unwrap();
        }
        f.queue.close();

        let summary = Worker::new(f.queue.clone(), f.pipeline.clone(), 1)
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.received, 8);
        assert_eq!(summary.valid, 8);
        assert!(summary.peak_in_flight >= 1);
        assert!(summary.peak_in_flight <= BACKLOG_FACTOR);
        assert_eq!(f.validator.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_messages_count_as_failed() {
        let f = fixture();
        f.queue.push("not json").unwrap();
        f.queue.push(upload(1)).unwrap();
        f.queue.close();

        let summary = Worker::new(f.queue.clone(), f.pipeline.clone(), 4)
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.valid, 1);
        assert_eq!(f.topic.published().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_intake() {
        let f = fixture();
        f.queue.push(upload(1)).unwrap();

        let summary = Worker::new(f.queue.clone(), f.pipeline.clone(), 1)
            .run(std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(summary, WorkerSummary::default());
    }

    #[tokio::test]
    async fn second_subscribe_is_fatal() {
        let f = fixture();
        f.queue.close();
        Worker::new(f.queue.clone(), f.pipeline.clone(), 1)
            .run(std::future::pending())
            .await
            .unwrap();

        let again = Worker::new(f.queue.clone(), f.pipeline.clone(), 1)
            .run(std::future::pending())
            .await;
        assert!(again.is_err());
    }
}
