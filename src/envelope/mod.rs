//! Message envelopes exchanged over the bus.
//!
//! - `model`: typed inbound/outbound envelopes and the verdict
//! - `wire`: conversion between raw JSON and the typed model

pub mod model;
pub mod wire;

pub use model::{InboundEnvelope, OutboundEnvelope, Payload, Verdict, VerdictMessage};
pub use wire::{parse, parse_value, public_name, salvage, to_wire};
