use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tables every schema variant must define before generation starts.
pub const REQUIRED_TABLES: &[&str] = &[
    "sources",
    "participants",
    "conversations",
    "messages",
    "message_recipients",
    "labels",
    "message_labels",
    "attachments",
];

/// Name of the full-text index table.
pub const FTS_TABLE: &str = "messages_fts";

/// Where message bodies are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyStorage {
    /// `messages.body_text`.
    Inline,
    /// `message_bodies.body_text`, one row per message.
    Separate,
}

/// How the full-text table stores its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtsBacking {
    /// `content='messages'`: the index reads columns back from `messages`.
    ExternalContent,
    /// The index owns a copy of the indexed text.
    Standalone,
}

impl FtsBacking {
    /// Classify an FTS5 table from its `CREATE VIRTUAL TABLE` statement.
    pub fn from_sql(sql: &str) -> Result<Self> {
        let compact: String = sql
            .to_lowercase()
            .chars()
            .filter(|ch| !ch.is_whitespace() && !matches!(ch, '\'' | '"' | '`' | '[' | ']'))
            .collect();
        if !compact.contains("usingfts5") {
            return Err(Error::InvalidSchema(format!(
                "{FTS_TABLE} is not an fts5 table"
            )));
        }
        if compact.contains("content=messages,") || compact.contains("content=messages)") {
            return Ok(Self::ExternalContent);
        }
        if compact.contains("content=") {
            return Err(Error::Unsupported(format!(
                "{FTS_TABLE} uses a content table other than messages"
            )));
        }
        Ok(Self::Standalone)
    }
}

/// Column of the full-text table that holds the message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtsBodyColumn {
    #[default]
    BodyText,
    Body,
}

impl FtsBodyColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BodyText => "body_text",
            Self::Body => "body",
        }
    }
}

/// Columns of the full-text table that the index rebuild fills in. Any other
/// declared column is left NULL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtsColumns {
    pub body: FtsBodyColumn,
    /// A `message_id` column mirroring the rowid.
    pub message_id: bool,
}

impl FtsColumns {
    fn detect(
        declared: &BTreeSet<String>,
        backing: FtsBacking,
        message: &BTreeSet<String>,
    ) -> Result<Self> {
        if !declared.contains("subject") {
            return Err(Error::InvalidSchema(format!(
                "{FTS_TABLE} has no subject column"
            )));
        }
        let body = if declared.contains("body_text") {
            FtsBodyColumn::BodyText
        } else if declared.contains("body") {
            FtsBodyColumn::Body
        } else {
            return Err(Error::InvalidSchema(format!(
                "{FTS_TABLE} has neither a body_text nor a body column"
            )));
        };

        // An external-content index reads every column back from `messages`.
        if backing == FtsBacking::ExternalContent
            && let Some(column) = declared.iter().find(|column| !message.contains(*column))
        {
            return Err(Error::InvalidSchema(format!(
                "{FTS_TABLE} indexes '{column}', which messages does not have"
            )));
        }

        Ok(Self {
            body,
            message_id: declared.contains("message_id"),
        })
    }
}

/// Optional `messages` columns; absent columns are simply not written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageColumns {
    pub message_type: bool,
    pub is_from_me: bool,
    pub attachment_count: bool,
    pub reply_to_message_id: bool,
    pub thread_position: bool,
}

/// Shape of the provisioned schema, detected from the SQLite catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLayout {
    pub body: BodyStorage,
    pub message_columns: MessageColumns,
    pub conversation_title: bool,
    /// The sender is listed in `message_recipients` with role `from`.
    pub recipient_from_role: bool,
    pub fts: Option<FtsBacking>,
    /// Meaningful only when `fts` is set.
    pub fts_columns: FtsColumns,
}

impl SchemaLayout {
    pub fn detect(conn: &Connection) -> Result<Self> {
        for table in REQUIRED_TABLES {
            if !table_exists(conn, table)? {
                return Err(Error::InvalidSchema(format!("missing table '{table}'")));
            }
        }

        let message = table_columns(conn, "messages")?;
        let body = if message.contains("body_text") {
            BodyStorage::Inline
        } else if table_exists(conn, "message_bodies")? {
            BodyStorage::Separate
        } else {
            return Err(Error::InvalidSchema(
                "messages has no body_text column and message_bodies is missing".to_string(),
            ));
        };

        let message_columns = MessageColumns {
            message_type: message.contains("message_type"),
            is_from_me: message.contains("is_from_me"),
            attachment_count: message.contains("attachment_count"),
            reply_to_message_id: message.contains("reply_to_message_id"),
            thread_position: message.contains("thread_position"),
        };
        let conversation_title = table_columns(conn, "conversations")?.contains("title");

        // The split-body layout is the canonical one, which always lists the sender.
        let recipients_sql = table_sql(conn, "message_recipients")?.unwrap_or_default();
        let recipient_from_role = body == BodyStorage::Separate || declares_from_role(&recipients_sql);

        let fts = match table_sql(conn, FTS_TABLE)? {
            Some(sql) => Some(FtsBacking::from_sql(&sql)?),
            None => None,
        };
        let fts_columns = match fts {
            Some(backing) => {
                FtsColumns::detect(&table_columns(conn, FTS_TABLE)?, backing, &message)?
            }
            None => FtsColumns::default(),
        };
        if fts == Some(FtsBacking::ExternalContent) && body == BodyStorage::Separate {
            return Err(Error::InvalidSchema(format!(
                "{FTS_TABLE} reads body_text from messages, but bodies live in message_bodies"
            )));
        }

        Ok(Self {
            body,
            message_columns,
            conversation_title,
            recipient_from_role,
            fts,
            fts_columns,
        })
    }

    pub fn require_fts(&self) -> Result<FtsBacking> {
        self.fts
            .ok_or_else(|| Error::InvalidSchema(format!("missing table '{FTS_TABLE}'")))
    }
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

pub fn table_sql(conn: &Connection, name: &str) -> Result<Option<String>> {
    let sql = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = ?1",
            [name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(sql.flatten())
}

/// Number of documents held by the full-text index.
///
/// Reads the FTS5 `_docsize` shadow table when present: for an
/// external-content table, `SELECT COUNT(*) FROM messages_fts` would count
/// the content table instead of the index.
pub fn fts_row_count(conn: &Connection) -> Result<i64> {
    let docsize = format!("{FTS_TABLE}_docsize");
    let sql = if table_exists(conn, &docsize)? {
        format!("SELECT COUNT(*) FROM {docsize}")
    } else {
        format!("SELECT COUNT(*) FROM {FTS_TABLE}")
    };
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

fn declares_from_role(sql: &str) -> bool {
    sql.to_lowercase().contains("'from'")
}
