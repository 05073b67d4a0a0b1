//! Structural validation of staged uploads.
//!
//! The structural check itself is an external component behind
//! [`StructuralValidator`]; [`ValidationInvoker`] wraps it with the format
//! policy, the error bound and fault containment.

pub mod command;
pub mod invoker;

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ValidatorError;

pub use command::CommandValidator;
pub use invoker::{ACCEPTED_EXTENSION, ValidationInvoker};

/// Raw result of a structural check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// The opaque structural validator.
#[async_trait]
pub trait StructuralValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Check the file at `path`, reporting at most `max_errors` defects.
    async fn validate(&self, path: &Path, max_errors: usize)
    -> Result<ValidationReport, ValidatorError>;
}
