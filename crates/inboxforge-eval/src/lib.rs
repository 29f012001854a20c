//! Consistency checks over a generated mail-archive store.

pub mod engine;
pub mod errors;
pub mod model;
pub mod report;

pub use engine::{StoreVerifier, verify_path, verify_store};
pub use errors::EvalError;
pub use model::{CheckSummary, VerificationReport, VerifyOptions, Violation};
pub use report::render_report;
