//! Schema provisioning.
//!
//! Schema sources are tried in order and the first one that yields a
//! definition is applied verbatim. Whatever the winner, the shared
//! [`ensure_auxiliary`] step then adds the auxiliary tables, indexes and the
//! full-text table, so every path ends in the same post-condition.

use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use inboxforge_core::layout::FTS_TABLE;
use inboxforge_core::{BodyStorage, SchemaLayout};

use crate::config::SchemaSearch;
use crate::errors::GenerationError;

const FALLBACK_SQL: &str = include_str!("fallback.sql");
const AUXILIARY_SQL: &str = include_str!("auxiliary.sql");

const FTS_EXTERNAL_CONTENT_SQL: &str = "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    subject,
    body_text,
    content='messages',
    content_rowid='id'
);";

const FTS_STANDALONE_SQL: &str =
    "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(subject, body_text);";

/// Where the applied schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    External,
    Embedded,
}

/// A schema definition ready to be applied.
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    pub origin: SchemaOrigin,
    pub location: String,
    pub sql: String,
}

/// One candidate location of a schema definition.
pub trait SchemaSource {
    fn describe(&self) -> String;

    /// `Ok(None)` when the source is simply not present.
    fn load(&self) -> Result<Option<SchemaDefinition>, GenerationError>;
}

/// External schema file at a fixed path.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchemaSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<SchemaDefinition>, GenerationError> {
        match fs::read_to_string(&self.path) {
            Ok(sql) => Ok(Some(SchemaDefinition {
                origin: SchemaOrigin::External,
                location: self.describe(),
                sql,
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(GenerationError::Io(err)),
        }
    }
}

/// External schema file named by an environment variable.
#[derive(Debug, Clone)]
pub struct EnvFileSource {
    var: String,
}

impl EnvFileSource {
    pub fn new(var: &str) -> Self {
        Self {
            var: var.to_string(),
        }
    }
}

impl SchemaSource for EnvFileSource {
    fn describe(&self) -> String {
        format!("${}", self.var)
    }

    fn load(&self) -> Result<Option<SchemaDefinition>, GenerationError> {
        match std::env::var_os(&self.var) {
            Some(path) if !path.is_empty() => FileSource::new(path).load(),
            _ => Ok(None),
        }
    }
}

/// Schema compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSource {
    name: &'static str,
    sql: &'static str,
}

impl EmbeddedSource {
    pub const fn new(name: &'static str, sql: &'static str) -> Self {
        Self { name, sql }
    }

    pub const fn fallback() -> Self {
        Self::new("embedded fallback", FALLBACK_SQL)
    }
}

impl SchemaSource for EmbeddedSource {
    fn describe(&self) -> String {
        self.name.to_string()
    }

    fn load(&self) -> Result<Option<SchemaDefinition>, GenerationError> {
        Ok(Some(SchemaDefinition {
            origin: SchemaOrigin::Embedded,
            location: self.describe(),
            sql: self.sql.to_string(),
        }))
    }
}

/// Search order: configured paths, then the environment override, then the
/// embedded fallback.
pub fn sources_for(search: &SchemaSearch) -> Vec<Box<dyn SchemaSource>> {
    let mut sources: Vec<Box<dyn SchemaSource>> = search
        .paths
        .iter()
        .map(|path| Box::new(FileSource::new(path.clone())) as Box<dyn SchemaSource>)
        .collect();
    if let Some(var) = &search.env_var {
        sources.push(Box::new(EnvFileSource::new(var)));
    }
    sources.push(Box::new(EmbeddedSource::fallback()));
    sources
}

/// Outcome of provisioning.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaStatus {
    pub origin: SchemaOrigin,
    pub location: String,
    pub layout: SchemaLayout,
    pub warnings: Vec<String>,
}

pub fn provision(
    conn: &Connection,
    sources: &[Box<dyn SchemaSource>],
) -> Result<SchemaStatus, GenerationError> {
    let mut warnings = Vec::new();

    for source in sources {
        let definition = match source.load() {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                debug!(source = %source.describe(), "schema source not present");
                continue;
            }
            Err(err) => {
                warn!(source = %source.describe(), error = %err, "schema source unreadable");
                warnings.push(format!(
                    "skipped schema source {}: {err}",
                    source.describe()
                ));
                continue;
            }
        };

        if definition.origin == SchemaOrigin::Embedded {
            let message = "no external schema found; using embedded fallback schema";
            warn!(source = %definition.location, "{message}");
            warnings.push(message.to_string());
        }

        conn.execute_batch(&definition.sql).map_err(|err| {
            GenerationError::Schema(format!(
                "failed to apply schema from {}: {err}",
                definition.location
            ))
        })?;
        let layout = ensure_auxiliary(conn)?;

        info!(
            origin = ?definition.origin,
            location = %definition.location,
            body = ?layout.body,
            fts = ?layout.fts,
            "schema provisioned"
        );

        return Ok(SchemaStatus {
            origin: definition.origin,
            location: definition.location,
            layout,
            warnings,
        });
    }

    Err(GenerationError::Schema(
        "no schema source produced a definition".to_string(),
    ))
}

/// Create the auxiliary tables, indexes and the full-text table if absent,
/// and return the resulting layout.
pub fn ensure_auxiliary(conn: &Connection) -> Result<SchemaLayout, GenerationError> {
    conn.execute_batch(AUXILIARY_SQL).map_err(|err| {
        GenerationError::Schema(format!("failed to apply auxiliary schema: {err}"))
    })?;

    let layout = SchemaLayout::detect(conn)?;
    if layout.fts.is_some() {
        return Ok(layout);
    }

    // External content only works when the body sits on the messages row.
    let fts_sql = match layout.body {
        BodyStorage::Inline => FTS_EXTERNAL_CONTENT_SQL,
        BodyStorage::Separate => FTS_STANDALONE_SQL,
    };
    conn.execute_batch(fts_sql).map_err(|err| {
        GenerationError::Schema(format!("failed to create {FTS_TABLE}: {err}"))
    })?;
    Ok(SchemaLayout::detect(conn)?)
}
