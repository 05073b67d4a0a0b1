//! Per-message orchestration.
//!
//! Flow for one raw message:
//! 1. Parse (malformed messages are answered from whatever identity survives)
//! 2. Locator checks: present, decodable, accepted extension
//! 3. Authorization, unless the message type carries the bypass marker
//! 4. Stage, validate, release the staging directory
//! 5. Publish exactly one verdict
//!
//! Every failure along the way becomes a failing verdict; nothing escapes.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::Authorizer;
use crate::bus::Topic;
use crate::config::WorkerConfig;
use crate::envelope::{InboundEnvelope, Verdict, parse, salvage};
use crate::error::PipelineError;
use crate::pipeline::publisher::ResultPublisher;
use crate::pipeline::state::{MessageRun, MessageState};
use crate::staging::StagingArea;
use crate::storage::{StorageClient, locator_file_name};
use crate::validator::{StructuralValidator, ValidationInvoker};

/// Result of handling one message.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub message_id: String,
    /// `Done`, or `Failed` for pipeline-level faults.
    pub state: MessageState,
    pub verdict: Verdict,
    /// Whether the bus accepted the verdict.
    pub published: bool,
    pub run: MessageRun,
}

/// Everything needed to take a message from intake to verdict.
///
/// Holds no per-message state; one instance serves all worker tasks.
pub struct ValidationPipeline {
    storage: Arc<dyn StorageClient>,
    authorizer: Authorizer,
    staging: StagingArea,
    invoker: ValidationInvoker,
    publisher: ResultPublisher,
    container_name: String,
    max_errors: usize,
}

impl ValidationPipeline {
    pub fn new(
        config: &WorkerConfig,
        storage: Arc<dyn StorageClient>,
        authorizer: Authorizer,
        validator: Arc<dyn StructuralValidator>,
        topic: Arc<dyn Topic>,
    ) -> Self {
        Self {
            storage,
            authorizer,
            staging: StagingArea::new(config.download_dir.clone()),
            invoker: ValidationInvoker::new(validator),
            publisher: ResultPublisher::new(topic),
            container_name: config.storage.container_name.clone(),
            max_errors: config.max_errors,
        }
    }

    /// Handle one raw message end to end. Always publishes one verdict.
    pub async fn handle(&self, raw: &str) -> MessageOutcome {
        let (envelope, mut run, verdict) = match parse(raw) {
            Ok(envelope) => {
                let mut run = MessageRun::new(&envelope.message_id);
                debug!(message_id = %envelope.message_id, run_id = %run.run_id, "Received message");
                let verdict = match self.process(&envelope, &mut run).await {
                    Ok(verdict) => verdict,
                    Err(e) => self.reject(&mut run, e),
                };
                (envelope, run, verdict)
            }
            Err(e) => {
                let envelope = salvage(raw);
                let mut run = MessageRun::new(&envelope.message_id);
                let verdict = self.reject(&mut run, PipelineError::MalformedMessage(e));
                (envelope, run, verdict)
            }
        };

        let published = self.publisher.publish(&verdict, &envelope).await;
        if run.state == MessageState::Publishing {
            advance(&mut run, MessageState::Done, None);
        }

        if verdict.is_valid {
            info!(
                message_id = %run.message_id,
                elapsed_ms = run.elapsed().as_millis() as u64,
                "Upload is valid"
            );
        } else {
            info!(
                message_id = %run.message_id,
                state = %run.state,
                elapsed_ms = run.elapsed().as_millis() as u64,
                "Upload rejected: {}",
                verdict.message
            );
        }

        MessageOutcome {
            message_id: run.message_id.clone(),
            state: run.state,
            verdict,
            published,
            run,
        }
    }

    /// Record a pipeline failure and turn it into a verdict.
    fn reject(&self, run: &mut MessageRun, error: PipelineError) -> Verdict {
        warn!(
            message_id = %run.message_id,
            from = %run.state,
            reason = error.label(),
            "Message failed: {}",
            error
        );
        let message = error.to_string();
        run.fail(message.clone());
        Verdict::failure(message)
    }

    async fn process(
        &self,
        envelope: &InboundEnvelope,
        run: &mut MessageRun,
    ) -> Result<Verdict, PipelineError> {
        if envelope.payload.success == Some(false) {
            warn!(
                message_id = %envelope.message_id,
                "Upstream reported a failed upload; validating anyway"
            );
        }

        let raw_locator = envelope
            .payload
            .file_upload_path
            .as_deref()
            .ok_or(PipelineError::MissingFilePath)?;
        let locator = urlencoding::decode(raw_locator)
            .map_err(|e| PipelineError::MalformedLocator(e.to_string()))?
            .into_owned();

        if !ValidationInvoker::accepts(locator_file_name(&locator)) {
            return Err(PipelineError::UnknownFormat);
        }

        if self.authorizer.should_bypass(envelope) {
            advance(run, MessageState::Downloading, Some("authorization bypassed"));
        } else {
            advance(run, MessageState::Authorizing, None);
            if !self.authorizer.authorize(envelope).await.is_allowed() {
                return Err(PipelineError::Unauthorized);
            }
            advance(run, MessageState::Downloading, None);
        }

        let handle = self
            .staging
            .stage(self.storage.as_ref(), &self.container_name, &locator)
            .await?;

        advance(run, MessageState::Validating, None);
        let verdict = self.invoker.invoke(handle.path(), self.max_errors).await;

        let dir = handle.dir().to_path_buf();
        if let Err(e) = handle.release().await {
            warn!(
                message_id = %envelope.message_id,
                dir = %dir.display(),
                error = %e,
                "Failed to release staging directory"
            );
        }

        advance(run, MessageState::Publishing, None);
        Ok(verdict)
    }
}

/// Apply a transition the pipeline's own sequencing guarantees is legal.
fn advance(run: &mut MessageRun, to: MessageState, reason: Option<&str>) {
    let from = run.state;
    match run.transition_to(to, reason.map(str::to_string)) {
        Ok(()) => debug!(message_id = %run.message_id, %from, %to, "State transition"),
        Err(e) => warn!(message_id = %run.message_id, error = %e, "Ignored state transition"),
    }
}
