//! Deterministic synthetic mail-archive generator.
//!
//! The engine provisions a SQLite schema (external definition or embedded
//! fallback), populates accounts, contacts, conversations, messages, labels
//! and attachments from a single seeded RNG, injects one hand-authored
//! thread, then backfills conversation membership and the full-text index.

pub mod config;
pub mod content;
pub mod derived;
pub mod engine;
pub mod errors;
pub mod identity;
pub mod labels;
pub mod model;
pub mod narrative;
pub mod output;
pub mod population;
pub mod rng;
pub mod schema;
pub mod value;
pub mod writer;

pub use config::GenerationConfig;
pub use engine::{GenerationEngine, GenerationResult};
pub use errors::GenerationError;
pub use model::{GenerationReport, StoreCounts};
pub use schema::{SchemaOrigin, SchemaStatus, provision};
