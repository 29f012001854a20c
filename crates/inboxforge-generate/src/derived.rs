use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use inboxforge_core::layout::fts_row_count;
use inboxforge_core::{BodyStorage, ConversationRole, FtsBacking, SchemaLayout};

use crate::errors::GenerationError;

/// A store whose primary rows are complete.
///
/// Only obtainable by sealing a [`MessageWriter`](crate::writer::MessageWriter),
/// so no message can be inserted after the full-text rebuild.
pub struct SealedStore<'c> {
    conn: &'c Connection,
    layout: SchemaLayout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DerivedSummary {
    /// Membership rows added by this pass.
    pub memberships_added: usize,
    pub fts_rows: i64,
}

impl<'c> SealedStore<'c> {
    pub(crate) fn new(conn: &'c Connection, layout: SchemaLayout) -> Self {
        Self { conn, layout }
    }

    /// Backfill conversation membership, then rebuild the full-text index.
    /// Both passes are insert-if-absent and can be repeated.
    pub fn build_derived(self) -> Result<DerivedSummary, GenerationError> {
        let memberships_added = backfill_memberships(self.conn)?;
        let fts_rows = rebuild_fulltext(self.conn, &self.layout)?;
        info!(memberships_added, fts_rows, "derived relations built");
        Ok(DerivedSummary {
            memberships_added,
            fts_rows,
        })
    }
}

fn backfill_memberships(conn: &Connection) -> Result<usize, GenerationError> {
    let added = conn.execute(
        "INSERT INTO conversation_participants (conversation_id, participant_id, role)
         SELECT DISTINCT pairs.conversation_id, pairs.participant_id, ?1
         FROM (
             SELECT m.conversation_id, m.sender_id AS participant_id
             FROM messages m
             WHERE m.sender_id IS NOT NULL
             UNION
             SELECT m.conversation_id, r.participant_id
             FROM message_recipients r
             JOIN messages m ON m.id = r.message_id
         ) AS pairs
         WHERE NOT EXISTS (
             SELECT 1 FROM conversation_participants cp
             WHERE cp.conversation_id = pairs.conversation_id
               AND cp.participant_id = pairs.participant_id
         )
         ORDER BY pairs.conversation_id, pairs.participant_id",
        [ConversationRole::Member.as_str()],
    )?;
    Ok(added)
}

fn rebuild_fulltext(conn: &Connection, layout: &SchemaLayout) -> Result<i64, GenerationError> {
    match layout.require_fts()? {
        FtsBacking::ExternalContent => {
            conn.execute("INSERT INTO messages_fts(messages_fts) VALUES ('rebuild')", [])?;
        }
        FtsBacking::Standalone => {
            let columns = layout.fts_columns;
            let (body, source) = match layout.body {
                BodyStorage::Inline => ("m.body_text", "messages m"),
                BodyStorage::Separate => (
                    "b.body_text",
                    "messages m LEFT JOIN message_bodies b ON b.message_id = m.id",
                ),
            };
            let mut targets = vec!["rowid", "subject", columns.body.as_str()];
            let mut values = vec!["m.id", "m.subject", body];
            if columns.message_id {
                targets.push("message_id");
                values.push("m.id");
            }
            conn.execute("DELETE FROM messages_fts", [])?;
            conn.execute(
                &format!(
                    "INSERT INTO messages_fts ({}) SELECT {} FROM {source} ORDER BY m.id",
                    targets.join(", "),
                    values.join(", ")
                ),
                [],
            )?;
        }
    }
    Ok(fts_row_count(conn)?)
}
