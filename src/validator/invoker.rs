//! Boundary between the pipeline and the structural validator.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};

use crate::envelope::Verdict;
use crate::error::{PipelineError, ValidatorError};
use crate::validator::{StructuralValidator, ValidationReport};

/// The only archive extension accepted for validation.
pub const ACCEPTED_EXTENSION: &str = ".zip";

pub struct ValidationInvoker {
    validator: Arc<dyn StructuralValidator>,
}

impl ValidationInvoker {
    pub fn new(validator: Arc<dyn StructuralValidator>) -> Self {
        Self { validator }
    }

    /// Whether `name` ends in the accepted extension, ignoring case.
    pub fn accepts(name: &str) -> bool {
        name.to_ascii_lowercase().ends_with(ACCEPTED_EXTENSION)
    }

    /// Validate the staged file at `path`.
    ///
    /// Never fails: validator errors and panics become failing verdicts.
    pub async fn invoke(&self, path: &Path, max_errors: usize) -> Verdict {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !Self::accepts(file_name) {
            return Verdict::failure(PipelineError::UnknownFormat.to_string());
        }

        let validator = Arc::clone(&self.validator);
        let owned = path.to_path_buf();
        let joined =
            tokio::spawn(async move { validator.validate(&owned, max_errors).await }).await;

        let report = match joined {
            Ok(result) => result,
            Err(e) => Err(ValidatorError::Panicked(e.to_string())),
        };

        match report {
            Ok(report) => {
                debug!(
                    validator = self.validator.name(),
                    is_valid = report.is_valid,
                    errors = report.errors.len(),
                    "Validator finished"
                );
                to_verdict(report, max_errors)
            }
            Err(e) => {
                error!(
                    validator = self.validator.name(),
                    path = %path.display(),
                    error = %e,
                    "Validator fault"
                );
                Verdict::failure(e.to_string())
            }
        }
    }
}

/// Map a report onto a verdict, keeping at most `max_errors` defects.
fn to_verdict(report: ValidationReport, max_errors: usize) -> Verdict {
    if report.is_valid {
        return Verdict::valid();
    }
    let mut errors = report.errors;
    errors.truncate(max_errors);
    Verdict::defects(errors)
}
