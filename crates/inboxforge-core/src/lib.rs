//! Core contracts shared by the inboxforge crates.
//!
//! This crate defines the mail-archive vocabulary (label catalog, recipient
//! roles, well-known identifiers) and introspects the SQLite layout that the
//! generator writes into and the verifier reads from.

pub mod error;
pub mod layout;
pub mod model;

pub use error::{Error, Result};
pub use layout::{
    BodyStorage, FtsBacking, FtsBodyColumn, FtsColumns, MessageColumns, SchemaLayout,
    fts_row_count, table_exists,
};
pub use model::{
    AccountSpec, AttachmentType, CURATED_THREAD_ID, CURATED_THREAD_LEN, ConversationRole,
    IDENTIFIER_TYPE_EMAIL, LabelKind, LabelSpec, RecipientRole, SOURCE_TYPE_GMAIL, mailbox,
};

/// Version of the generated dataset contract.
pub const DATASET_VERSION: &str = "0.1";
