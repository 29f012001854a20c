use serde::{Deserialize, Serialize};

use inboxforge_core::SchemaLayout;

use crate::errors::EvalError;

/// Version of the verification report contract.
pub const VERIFICATION_VERSION: &str = "0.1";

/// Options for store verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Fail when any violation is found.
    pub strict: bool,
    /// Limit the number of violations kept per check.
    pub max_examples: usize,
    /// Report a violation when the curated thread is absent.
    pub require_curated: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict: true,
            max_examples: 20,
            require_curated: false,
        }
    }
}

/// Structured violation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    /// Offending row, e.g. `messages:42`.
    pub subject: String,
    pub message: String,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub code: String,
    pub checked: u64,
    pub violations: u64,
    /// The check does not apply to this layout.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verification_version: String,
    pub layout: SchemaLayout,
    pub checks: Vec<CheckSummary>,
    /// At most `max_examples` entries per check; counts live in `checks`.
    pub violations: Vec<Violation>,
    pub duration_ms: u64,
}

impl VerificationReport {
    pub fn violation_count(&self) -> u64 {
        self.checks.iter().map(|check| check.violations).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.violation_count() == 0
    }

    pub fn check(&self, code: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|check| check.code == code)
    }

    pub fn to_json_pretty(&self) -> Result<String, EvalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
