//! Typed envelope model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::STAGE_NAME;

// ── Inbound ─────────────────────────────────────────────────────────

/// An "upload completed" event as received from the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundEnvelope {
    /// Correlation id, echoed on the verdict.
    pub message_id: String,
    /// Routing tag; may carry the authorization bypass marker.
    pub message_type: String,
    /// Free-form description set by the producer.
    pub message: Option<String>,
    /// Producer timestamp, kept verbatim.
    pub published_date: Option<String>,
    pub payload: Payload,
}

impl InboundEnvelope {
    /// Whether the message type carries `marker`.
    pub fn has_marker(&self, marker: &str) -> bool {
        !marker.is_empty() && self.message_type.contains(marker)
    }
}

/// Domain payload of an upload event.
///
/// The typed fields are read-only views the pipeline works with. `data` is
/// the inbound object itself, echoed back unchanged apart from the fields
/// the verdict owns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// Percent-encoded locator of the uploaded file.
    pub file_upload_path: Option<String>,
    pub user_id: String,
    pub project_group_id: String,
    /// Upstream workflow status, if the producer set one.
    pub success: Option<bool>,
    /// Inbound `data` object with normalised keys.
    pub data: Map<String, Value>,
}

// ── Verdict ─────────────────────────────────────────────────────────

/// Human-readable part of a verdict.
///
/// The structural validator reports a list of defects; every other outcome
/// is described by a single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerdictMessage {
    Text(String),
    Errors(Vec<String>),
}

impl VerdictMessage {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Errors(errors) => errors.iter().all(|e| e.is_empty()),
        }
    }
}

impl std::fmt::Display for VerdictMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Errors(errors) => write!(f, "{}", errors.join("; ")),
        }
    }
}

/// Pass/fail result of validating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub is_valid: bool,
    pub message: VerdictMessage,
}

/// Message used when a validator says "invalid" without saying why.
const UNEXPLAINED_FAILURE: &str = "Validation failed without reported errors";

impl Verdict {
    /// A passing verdict with an empty message.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: VerdictMessage::Text(String::new()),
        }
    }

    /// A failing verdict carrying one description.
    pub fn failure(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            UNEXPLAINED_FAILURE.to_string()
        } else {
            reason
        };
        Self {
            is_valid: false,
            message: VerdictMessage::Text(reason),
        }
    }

    /// A failing verdict carrying the validator's defect list.
    pub fn defects(errors: Vec<String>) -> Self {
        let errors: Vec<String> = errors.into_iter().filter(|e| !e.trim().is_empty()).collect();
        if errors.is_empty() {
            return Self::failure(UNEXPLAINED_FAILURE);
        }
        Self {
            is_valid: false,
            message: VerdictMessage::Errors(errors),
        }
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// The verdict event published back onto the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEnvelope {
    pub message_id: String,
    pub message_type: String,
    pub published_date: DateTime<Utc>,
    /// Echo of the inbound payload.
    pub payload: Payload,
    /// Pipeline stage stamped on the verdict.
    pub stage: String,
    pub success: bool,
    pub message: VerdictMessage,
}

impl OutboundEnvelope {
    /// Answer `inbound` with `verdict`.
    pub fn from_verdict(inbound: &InboundEnvelope, verdict: &Verdict) -> Self {
        Self {
            message_id: inbound.message_id.clone(),
            message_type: inbound.message_type.clone(),
            published_date: Utc::now(),
            payload: inbound.payload.clone(),
            stage: STAGE_NAME.to_string(),
            success: verdict.is_valid,
            message: verdict.message.clone(),
        }
    }
}
