//! Raw JSON <-> typed envelope.
//!
//! Inbound wire shape:
//! `{ "messageId", "messageType", "message"?, "publishedDate"?, "data": { ... } }`
//!
//! Older producers serialised their payload objects straight from private
//! storage, so keys may arrive as `_user_id` instead of `user_id`, at any
//! depth. Keys are normalised with [`public_name`] on the way in and again on
//! the way out, so no underscore-prefixed key ever reaches the wire.
//!
//! The inbound `data` object is echoed verbatim; only `success`, `message`
//! and `stage` are written by the verdict.

use serde_json::{Map, Value, json};

use crate::envelope::model::{InboundEnvelope, OutboundEnvelope, Payload};
use crate::error::EnvelopeError;

const FILE_UPLOAD_PATH: &str = "file_upload_path";
const USER_ID: &str = "user_id";
const PROJECT_GROUP_ID: &str = "tdei_project_group_id";
const SUCCESS: &str = "success";
const MESSAGE: &str = "message";
const STAGE: &str = "stage";

/// Strip the private-storage prefix from a field name.
pub fn public_name(key: &str) -> &str {
    let stripped = key.trim_start_matches('_');
    if stripped.is_empty() { key } else { stripped }
}

/// Parse a raw bus message.
///
/// Fails only when the envelope itself is unusable (not JSON, not an object,
/// or no `data` object). Missing optional fields default to empty.
pub fn parse(raw: &str) -> Result<InboundEnvelope, EnvelopeError> {
    let value: Value = serde_json::from_str(raw)?;
    parse_value(value)
}

/// Parse an already-decoded bus message.
pub fn parse_value(value: Value) -> Result<InboundEnvelope, EnvelopeError> {
    let Value::Object(root) = value else {
        return Err(EnvelopeError::WrongShape {
            field: "message",
            expected: "object",
        });
    };
    let root = normalize_keys(root);

    let message_id = optional_string(&root, "messageId")?.unwrap_or_default();
    let message_type = optional_string(&root, "messageType")?.unwrap_or_default();
    let message = optional_string(&root, "message")?;
    let published_date = optional_string(&root, "publishedDate")?;

    let data = match root.get("data") {
        Some(Value::Object(data)) => data.clone(),
        Some(Value::Null) | None => return Err(EnvelopeError::MissingField("data")),
        Some(_) => {
            return Err(EnvelopeError::WrongShape {
                field: "data",
                expected: "object",
            });
        }
    };

    Ok(InboundEnvelope {
        message_id,
        message_type,
        message,
        published_date,
        payload: payload_from_wire(data),
    })
}

/// Best-effort envelope for a message that failed to parse.
///
/// Keeps whatever identity fields can be recovered so the failure verdict
/// can still be correlated upstream.
pub fn salvage(raw: &str) -> InboundEnvelope {
    let root = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(root)) => normalize_keys(root),
        _ => return InboundEnvelope::default(),
    };
    let text = |key: &str| root.get(key).and_then(Value::as_str).map(str::to_string);
    InboundEnvelope {
        message_id: text("messageId").unwrap_or_default(),
        message_type: text("messageType").unwrap_or_default(),
        message: text("message"),
        published_date: text("publishedDate"),
        payload: Payload::default(),
    }
}

/// Render an outbound envelope in wire form.
pub fn to_wire(envelope: &OutboundEnvelope) -> Value {
    let mut data = normalize_keys(envelope.payload.data.clone());
    data.insert(STAGE.to_string(), Value::String(envelope.stage.clone()));
    data.insert(SUCCESS.to_string(), Value::Bool(envelope.success));
    data.insert(MESSAGE.to_string(), json!(envelope.message));

    json!({
        "messageId": envelope.message_id,
        "messageType": envelope.message_type,
        "publishedDate": envelope.published_date.to_rfc3339(),
        "data": Value::Object(data),
    })
}

/// Rename `_key` to `key` at every depth; an explicit public key wins over
/// a private one.
fn normalize_keys(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let mut private = Vec::new();
    for (key, value) in map {
        let value = normalize_value(value);
        if public_name(&key) == key {
            out.insert(key, value);
        } else {
            private.push((public_name(&key).to_string(), value));
        }
    }
    for (key, value) in private {
        out.entry(key).or_insert(value);
    }
    out
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_keys(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

fn optional_string(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, EnvelopeError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(EnvelopeError::WrongShape {
            field,
            expected: "string",
        }),
    }
}

/// Read the typed views out of an already normalised `data` object.
fn payload_from_wire(data: Map<String, Value>) -> Payload {
    let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);

    let file_upload_path = text(FILE_UPLOAD_PATH).filter(|path| !path.trim().is_empty());
    let user_id = text(USER_ID).unwrap_or_default();
    let project_group_id = text(PROJECT_GROUP_ID).unwrap_or_default();
    let success = data.get(SUCCESS).and_then(Value::as_bool);

    Payload {
        file_upload_path,
        user_id,
        project_group_id,
        success,
        data,
    }
}
