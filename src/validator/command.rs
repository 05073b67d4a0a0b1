//! Structural validator run as an external program.
//!
//! Invoked as `<program> [args..] --max-errors <N> <path>`; the program
//! prints a JSON report on stdout:
//!
//! ```json
//! {"is_valid": false, "errors": ["...", {"filename": "...", "error": "..."}]}
//! ```
//!
//! Error entries that are not strings are rendered as compact JSON.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::error::ValidatorError;
use crate::validator::{StructuralValidator, ValidationReport};

/// Longest stderr excerpt carried in an error.
const MAX_STDERR: usize = 2000;

#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
}

impl CommandValidator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a whitespace-separated command line.
    pub fn from_command_line(line: &str) -> Result<Self, ValidatorError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| ValidatorError::Spawn {
            program: String::new(),
            reason: "empty validator command".to_string(),
        })?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[derive(Debug, Deserialize)]
struct RawReport {
    is_valid: bool,
    #[serde(default)]
    errors: Vec<Value>,
}

/// Parse the program's stdout into a report.
fn parse_report(stdout: &str) -> Result<ValidationReport, ValidatorError> {
    let raw: RawReport = serde_json::from_str(stdout.trim())
        .map_err(|e| ValidatorError::Report(e.to_string()))?;
    let errors = raw
        .errors
        .into_iter()
        .map(|e| match e {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect();
    Ok(ValidationReport {
        is_valid: raw.is_valid,
        errors,
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl StructuralValidator for CommandValidator {
    fn name(&self) -> &str {
        &self.program
    }

    async fn validate(
        &self,
        path: &Path,
        max_errors: usize,
    ) -> Result<ValidationReport, ValidatorError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--max-errors")
            .arg(max_errors.to_string())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ValidatorError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        // A non-zero exit with a readable report is still a report.
        match parse_report(&stdout) {
            Ok(report) => Ok(report),
            Err(_) if !output.status.success() => Err(ValidatorError::Failed {
                status: output.status.to_string(),
                stderr: truncate(String::from_utf8_lossy(&output.stderr).trim(), MAX_STDERR),
            }),
            Err(e) => Err(e),
        }
    }
}
