//! Per-message state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a message is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Taken off the subscription.
    Received,
    /// Waiting on the permission backend.
    Authorizing,
    /// Staging the upload locally.
    Downloading,
    /// Structural validator running.
    Validating,
    /// Verdict being handed to the bus.
    Publishing,
    Done,
    /// Pipeline-level fault. A file that merely fails validation still ends in `Done`.
    Failed,
}

impl MessageState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: MessageState) -> bool {
        use MessageState::*;

        if target == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, target),
            (Received, Authorizing) |
            // Bypass marker skips authorization
            (Received, Downloading) |
            (Authorizing, Downloading) |
            (Downloading, Validating) |
            (Validating, Publishing) |
            (Publishing, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for MessageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Authorizing => "authorizing",
            Self::Downloading => "downloading",
            Self::Validating => "validating",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: MessageState,
    pub to: MessageState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Record of one message's trip through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRun {
    /// Local id for this run; bus message ids are not guaranteed unique.
    pub run_id: Uuid,
    pub message_id: String,
    pub state: MessageState,
    pub received_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Reason recorded when the run entered `Failed`.
    pub failure: Option<String>,
    pub transitions: Vec<StateTransition>,
}

impl MessageRun {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            message_id: message_id.into(),
            state: MessageState::Received,
            received_at: Utc::now(),
            finished_at: None,
            failure: None,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state.
    pub fn transition_to(
        &mut self,
        new_state: MessageState,
        reason: Option<String>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason: reason.clone(),
        });
        self.state = new_state;

        if new_state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        if new_state == MessageState::Failed {
            self.failure = reason;
        }

        Ok(())
    }

    /// Move to `Failed`. No-op if the run already finished.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let _ = self.transition_to(MessageState::Failed, Some(reason.into()));
    }

    /// Time from receipt to completion, or to now if still running.
    pub fn elapsed(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.received_at).to_std().unwrap_or(Duration::ZERO)
    }
}
