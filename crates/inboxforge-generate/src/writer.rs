use chrono::NaiveDateTime;
use rusqlite::{Connection, params};

use inboxforge_core::{BodyStorage, RecipientRole, SchemaLayout};

use crate::content::ContentAddress;
use crate::derived::SealedStore;
use crate::errors::GenerationError;
use crate::value::{GeneratedValue, RowInsert, format_timestamp};

/// Last opened conversation of an account, with its aggregates as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationCursor {
    pub id: i64,
    pub source_id: i64,
    pub message_count: i64,
    pub last_message_at: Option<NaiveDateTime>,
    pub last_message_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewConversation<'a> {
    pub source_id: i64,
    pub external_id: &'a str,
    pub title: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub source_id: i64,
    pub external_id: &'a str,
    pub sent_at: NaiveDateTime,
    pub sender_id: i64,
    pub is_from_me: bool,
    pub subject: &'a str,
    pub body: &'a str,
    pub snippet: &'a str,
    pub size_estimate: i64,
    pub attachment_count: u32,
    pub reply_to: Option<i64>,
    pub thread_position: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub size: i64,
    pub address: ContentAddress,
}

/// Writes conversations, messages and their dependent rows in the shape of
/// the detected layout. Conversation aggregates are updated in the same
/// call that inserts the message.
pub struct MessageWriter<'c> {
    conn: &'c Connection,
    layout: SchemaLayout,
}

impl<'c> MessageWriter<'c> {
    pub fn new(conn: &'c Connection, layout: SchemaLayout) -> Self {
        Self { conn, layout }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn open_conversation(
        &self,
        conversation: &NewConversation<'_>,
    ) -> Result<ConversationCursor, GenerationError> {
        let id = RowInsert::into_table("conversations")
            .set("source_id", GeneratedValue::Int(conversation.source_id))
            .set(
                "source_conversation_id",
                GeneratedValue::text(conversation.external_id),
            )
            .set("conversation_type", GeneratedValue::text("email_thread"))
            .set_if(
                self.layout.conversation_title,
                "title",
                conversation
                    .title
                    .map(GeneratedValue::text)
                    .unwrap_or(GeneratedValue::Null),
            )
            .set("message_count", GeneratedValue::Int(0))
            .execute(self.conn)?;

        Ok(ConversationCursor {
            id,
            source_id: conversation.source_id,
            message_count: 0,
            last_message_at: None,
            last_message_id: None,
        })
    }

    /// Insert a message (and its body) into `cursor`'s conversation and bump
    /// the conversation aggregates.
    pub fn append_message(
        &self,
        cursor: &mut ConversationCursor,
        message: &NewMessage<'_>,
    ) -> Result<i64, GenerationError> {
        if message.source_id != cursor.source_id {
            return Err(GenerationError::Integrity(format!(
                "message {} belongs to source {} but conversation {} to source {}",
                message.external_id, message.source_id, cursor.id, cursor.source_id
            )));
        }

        let columns = self.layout.message_columns;
        let inline_body = self.layout.body == BodyStorage::Inline;
        let message_id = RowInsert::into_table("messages")
            .set("conversation_id", GeneratedValue::Int(cursor.id))
            .set("source_id", GeneratedValue::Int(message.source_id))
            .set("source_message_id", GeneratedValue::text(message.external_id))
            .set_if(columns.message_type, "message_type", GeneratedValue::text("email"))
            .set("sent_at", GeneratedValue::Timestamp(message.sent_at))
            .set("sender_id", GeneratedValue::Int(message.sender_id))
            .set_if(
                columns.is_from_me,
                "is_from_me",
                GeneratedValue::Bool(message.is_from_me),
            )
            .set("subject", GeneratedValue::text(message.subject))
            .set_if(inline_body, "body_text", GeneratedValue::text(message.body))
            .set("snippet", GeneratedValue::text(message.snippet))
            .set("size_estimate", GeneratedValue::Int(message.size_estimate))
            .set(
                "has_attachments",
                GeneratedValue::Bool(message.attachment_count > 0),
            )
            .set_if(
                columns.attachment_count,
                "attachment_count",
                GeneratedValue::Int(i64::from(message.attachment_count)),
            )
            .set_if(
                columns.reply_to_message_id,
                "reply_to_message_id",
                GeneratedValue::opt_int(message.reply_to),
            )
            .set_if(
                columns.thread_position,
                "thread_position",
                GeneratedValue::opt_int(message.thread_position),
            )
            .execute(self.conn)?;

        if !inline_body {
            RowInsert::into_table("message_bodies")
                .set("message_id", GeneratedValue::Int(message_id))
                .set("body_text", GeneratedValue::text(message.body))
                .execute(self.conn)?;
        }

        let updated = self
            .conn
            .prepare_cached(
                "UPDATE conversations
                 SET message_count = message_count + 1,
                     last_message_at = COALESCE(MAX(last_message_at, ?2), ?2)
                 WHERE id = ?1",
            )?
            .execute(params![cursor.id, format_timestamp(&message.sent_at)])?;
        if updated != 1 {
            return Err(GenerationError::Integrity(format!(
                "conversation {} vanished while appending {}",
                cursor.id, message.external_id
            )));
        }

        cursor.message_count += 1;
        cursor.last_message_at = Some(match cursor.last_message_at {
            Some(last) if last > message.sent_at => last,
            _ => message.sent_at,
        });
        cursor.last_message_id = Some(message_id);
        Ok(message_id)
    }

    /// Record a participant on a message. `from` rows are only written when
    /// the layout lists senders among recipients; returns whether a row was
    /// written.
    pub fn add_recipient(
        &self,
        message_id: i64,
        participant_id: i64,
        role: RecipientRole,
    ) -> Result<bool, GenerationError> {
        if role == RecipientRole::From && !self.layout.recipient_from_role {
            return Ok(false);
        }
        RowInsert::into_table("message_recipients")
            .set("message_id", GeneratedValue::Int(message_id))
            .set("participant_id", GeneratedValue::Int(participant_id))
            .set("recipient_type", GeneratedValue::text(role.as_str()))
            .execute(self.conn)?;
        Ok(true)
    }

    pub fn apply_labels(&self, message_id: i64, label_ids: &[i64]) -> Result<(), GenerationError> {
        for label_id in label_ids {
            RowInsert::into_table("message_labels")
                .set("message_id", GeneratedValue::Int(message_id))
                .set("label_id", GeneratedValue::Int(*label_id))
                .execute(self.conn)?;
        }
        Ok(())
    }

    pub fn add_attachment(
        &self,
        message_id: i64,
        attachment: &NewAttachment<'_>,
    ) -> Result<i64, GenerationError> {
        Ok(RowInsert::into_table("attachments")
            .set("message_id", GeneratedValue::Int(message_id))
            .set("filename", GeneratedValue::text(attachment.filename))
            .set("mime_type", GeneratedValue::text(attachment.mime_type))
            .set("size", GeneratedValue::Int(attachment.size))
            .set(
                "content_hash",
                GeneratedValue::text(&attachment.address.content_hash),
            )
            .set(
                "storage_path",
                GeneratedValue::text(&attachment.address.storage_path),
            )
            .execute(self.conn)?)
    }

    /// End the population phase. Only derived relations can be built from
    /// the returned store.
    pub fn seal(self) -> SealedStore<'c> {
        SealedStore::new(self.conn, self.layout)
    }
}
