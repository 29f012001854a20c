use std::fmt;

use rusqlite::Connection;
use serde::Serialize;

use inboxforge_core::fts_row_count;

use crate::derived::DerivedSummary;
use crate::errors::GenerationError;
use crate::population::PopulationSummary;
use crate::schema::SchemaOrigin;

/// Row counts of a committed store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub sources: i64,
    pub participants: i64,
    pub participant_identifiers: i64,
    pub conversations: i64,
    pub conversation_participants: i64,
    pub messages: i64,
    pub message_recipients: i64,
    pub labels: i64,
    pub message_labels: i64,
    pub attachments: i64,
    pub fts_rows: i64,
}

impl StoreCounts {
    pub fn collect(conn: &Connection) -> Result<Self, GenerationError> {
        let count = |table: &str| -> Result<i64, GenerationError> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(Self {
            sources: count("sources")?,
            participants: count("participants")?,
            participant_identifiers: count("participant_identifiers")?,
            conversations: count("conversations")?,
            conversation_participants: count("conversation_participants")?,
            messages: count("messages")?,
            message_recipients: count("message_recipients")?,
            labels: count("labels")?,
            message_labels: count("message_labels")?,
            attachments: count("attachments")?,
            fts_rows: fts_row_count(conn)?,
        })
    }
}

/// Summary of one generation run, written next to the store as
/// `generation_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub dataset_version: String,
    pub seed: u64,
    pub target_messages: u32,
    pub schema_origin: SchemaOrigin,
    pub schema_location: String,
    pub warnings: Vec<String>,
    pub population: PopulationSummary,
    pub curated_messages: usize,
    pub derived: DerivedSummary,
    pub counts: StoreCounts,
    pub duration_ms: u64,
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(f, "run {} (seed {})", self.run_id, self.seed)?;
        writeln!(f, "schema: {:?} ({})", self.schema_origin, self.schema_location)?;
        writeln!(f, "  sources:            {}", c.sources)?;
        writeln!(f, "  participants:       {}", c.participants)?;
        writeln!(f, "  conversations:      {}", c.conversations)?;
        writeln!(f, "  messages:           {}", c.messages)?;
        writeln!(f, "  recipients:         {}", c.message_recipients)?;
        writeln!(f, "  labels:             {}", c.labels)?;
        writeln!(f, "  label assignments:  {}", c.message_labels)?;
        writeln!(f, "  attachments:        {}", c.attachments)?;
        writeln!(f, "  memberships:        {}", c.conversation_participants)?;
        writeln!(f, "  full-text rows:     {}", c.fts_rows)?;
        if self.curated_messages > 0 {
            writeln!(f, "  curated messages:   {}", self.curated_messages)?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        write!(f, "completed in {} ms", self.duration_ms)
    }
}
