use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use inboxforge_core::{RecipientRole, SOURCE_TYPE_GMAIL};

use crate::config::GenerationConfig;
use crate::content::{content_address, synthesize_message, synthesize_username};
use crate::errors::GenerationError;
use crate::identity::IdentityResolver;
use crate::labels::{LabelIndex, LabelPlanner};
use crate::rng::RngContext;
use crate::value::{GeneratedValue, RowInsert};
use crate::writer::{ConversationCursor, MessageWriter, NewAttachment, NewConversation, NewMessage};

/// An archive account as created in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHandle {
    pub source_id: i64,
    pub participant_id: i64,
    pub address: String,
}

/// State threaded through population: created accounts, label ids, the
/// contact pool and the open conversation of each account.
#[derive(Debug)]
pub struct GenerationContext {
    pub accounts: Vec<AccountHandle>,
    pub labels: LabelIndex,
    pub contacts: Vec<i64>,
    pub identities: IdentityResolver,
    cursors: Vec<Option<ConversationCursor>>,
    threads_opened: u32,
}

impl GenerationContext {
    /// The first configured account; owner of the curated thread.
    pub fn primary_account(&self) -> Result<&AccountHandle, GenerationError> {
        self.accounts.first().ok_or_else(|| {
            GenerationError::InvalidConfig("at least one account is required".to_string())
        })
    }

    pub fn open_conversation(&self, account_index: usize) -> Option<&ConversationCursor> {
        self.cursors.get(account_index).and_then(Option::as_ref)
    }
}

/// Counts of what the random population phase wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    pub messages: u32,
    pub conversations: u32,
    pub recipients: u32,
    pub label_assignments: u32,
    pub attachments: u32,
}

struct AttachmentDraft {
    filename: String,
    mime_type: String,
    size: i64,
    nonce: u64,
}

pub struct PopulationEngine<'a> {
    config: &'a GenerationConfig,
    labels: LabelPlanner,
}

impl<'a> PopulationEngine<'a> {
    pub fn new(config: &'a GenerationConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            config,
            labels: LabelPlanner::new(config)?,
        })
    }

    /// Create the sources, their owner participants, the label catalog for
    /// each source and the contact pool.
    pub fn seed(
        &self,
        writer: &MessageWriter<'_>,
        rng: &mut RngContext,
    ) -> Result<GenerationContext, GenerationError> {
        let conn = writer.conn();
        let mut identities = IdentityResolver::new();
        let mut labels = LabelIndex::new();
        let mut accounts = Vec::with_capacity(self.config.accounts.len());

        for account in &self.config.accounts {
            let source_id = insert_source(conn, self.config, &account.address, &account.display_name)?;
            let participant_id =
                identities.resolve(conn, rng, &account.address, Some(&account.display_name))?;
            labels.create_for_source(conn, source_id, &self.config.labels)?;
            debug!(source_id, participant_id, address = %account.address, "account seeded");
            accounts.push(AccountHandle {
                source_id,
                participant_id,
                address: account.address.clone(),
            });
        }

        let contacts = self.seed_contacts(conn, rng, &mut identities)?;
        info!(
            accounts = accounts.len(),
            labels = self.config.labels.len() * accounts.len(),
            contacts = contacts.len(),
            "accounts and contacts seeded"
        );

        Ok(GenerationContext {
            cursors: vec![None; accounts.len()],
            accounts,
            labels,
            contacts,
            identities,
            threads_opened: 0,
        })
    }

    fn seed_contacts(
        &self,
        conn: &Connection,
        rng: &mut RngContext,
        identities: &mut IdentityResolver,
    ) -> Result<Vec<i64>, GenerationError> {
        let mut contacts = Vec::with_capacity(self.config.contact_pool_size as usize);
        for _ in 0..self.config.contact_pool_size {
            let domain = rng.pick(&self.config.contact_domains).ok_or_else(|| {
                GenerationError::InvalidConfig("contact_domains must not be empty".to_string())
            })?;
            let address = format!("{}@{domain}", synthesize_username(rng));
            // Colliding usernames resolve to the same participant.
            contacts.push(identities.resolve(conn, rng, &address, None)?);
        }
        Ok(contacts)
    }

    /// Generate `target_messages` random messages.
    pub fn populate(
        &self,
        ctx: &mut GenerationContext,
        writer: &MessageWriter<'_>,
        rng: &mut RngContext,
    ) -> Result<PopulationSummary, GenerationError> {
        let mut summary = PopulationSummary::default();
        for index in 0..self.config.target_messages {
            self.generate_message(index, ctx, writer, rng, &mut summary)?;
        }
        info!(
            messages = summary.messages,
            conversations = summary.conversations,
            attachments = summary.attachments,
            "population finished"
        );
        Ok(summary)
    }

    fn generate_message(
        &self,
        index: u32,
        ctx: &mut GenerationContext,
        writer: &MessageWriter<'_>,
        rng: &mut RngContext,
        summary: &mut PopulationSummary,
    ) -> Result<(), GenerationError> {
        let probabilities = &self.config.probabilities;
        let account_index = rng.index(ctx.accounts.len());
        let account = ctx.accounts.get(account_index).cloned().ok_or_else(|| {
            GenerationError::InvalidConfig("at least one account is required".to_string())
        })?;

        let sent_at = rng.timestamp(&self.config.date_range);
        let is_sent = rng.chance(probabilities.sent);
        let counterpart = *rng.pick(&ctx.contacts).ok_or_else(|| {
            GenerationError::InvalidConfig("contact pool is empty".to_string())
        })?;
        let (sender_id, recipient_id) = if is_sent {
            (account.participant_id, counterpart)
        } else {
            (counterpart, account.participant_id)
        };
        let is_from_me = ctx
            .accounts
            .iter()
            .any(|owner| owner.participant_id == sender_id);

        let content = synthesize_message(rng, self.config.snippet_chars);
        let attachment_count = if rng.chance(probabilities.attachment) {
            rng.between(1, 3) as u32
        } else {
            0
        };
        let size_estimate = if attachment_count > 0 {
            rng.between(50_000, 5_000_000)
        } else {
            rng.between(1_000, 500_000)
        };

        // The first message of an account always opens a conversation.
        let continues = ctx.open_conversation(account_index).is_some()
            && rng.chance(probabilities.continue_conversation);
        if !continues {
            ctx.threads_opened += 1;
            let external_id = format!("thread_{:05}", ctx.threads_opened);
            let cursor = writer.open_conversation(&NewConversation {
                source_id: account.source_id,
                external_id: &external_id,
                title: Some(&content.subject),
            })?;
            debug!(conversation_id = cursor.id, external_id = %external_id, "conversation opened");
            if let Some(slot) = ctx.cursors.get_mut(account_index) {
                *slot = Some(cursor);
            }
            summary.conversations += 1;
        }
        let cursor = ctx
            .cursors
            .get_mut(account_index)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                GenerationError::Integrity(format!(
                    "account {} has no open conversation",
                    account.address
                ))
            })?;

        let external_id = format!("msg_{index:06}");
        let message_id = writer.append_message(
            cursor,
            &NewMessage {
                source_id: account.source_id,
                external_id: &external_id,
                sent_at,
                sender_id,
                is_from_me,
                subject: &content.subject,
                body: &content.body,
                snippet: &content.snippet,
                size_estimate,
                attachment_count,
                reply_to: None,
                thread_position: None,
            },
        )?;
        summary.messages += 1;

        for (participant, role) in [(sender_id, RecipientRole::From), (recipient_id, RecipientRole::To)] {
            if writer.add_recipient(message_id, participant, role)? {
                summary.recipients += 1;
            }
        }
        if rng.chance(probabilities.cc)
            && let Some(cc) = rng.pick(&ctx.contacts).copied()
            && writer.add_recipient(message_id, cc, RecipientRole::Cc)?
        {
            summary.recipients += 1;
        }

        let label_ids = self
            .labels
            .plan(rng, is_sent)
            .iter()
            .map(|name| ctx.labels.id(account.source_id, name))
            .collect::<Result<Vec<_>, _>>()?;
        writer.apply_labels(message_id, &label_ids)?;
        summary.label_assignments += label_ids.len() as u32;

        for _ in 0..attachment_count {
            let draft = self.draft_attachment(rng)?;
            writer.add_attachment(
                message_id,
                &NewAttachment {
                    filename: &draft.filename,
                    mime_type: &draft.mime_type,
                    size: draft.size,
                    address: content_address(message_id, &draft.filename, draft.nonce),
                },
            )?;
            summary.attachments += 1;
        }
        Ok(())
    }

    fn draft_attachment(&self, rng: &mut RngContext) -> Result<AttachmentDraft, GenerationError> {
        let kind = rng.pick(&self.config.attachment_types).ok_or_else(|| {
            GenerationError::InvalidConfig("attachment_types must not be empty".to_string())
        })?;
        Ok(AttachmentDraft {
            filename: kind.filename.clone(),
            mime_type: kind.mime_type.clone(),
            size: rng.between(10_000, 2_000_000),
            nonce: rng.nonce(),
        })
    }
}

fn insert_source(
    conn: &Connection,
    config: &GenerationConfig,
    address: &str,
    display_name: &str,
) -> Result<i64, GenerationError> {
    Ok(RowInsert::into_table("sources")
        .set("source_type", GeneratedValue::text(SOURCE_TYPE_GMAIL))
        .set("identifier", GeneratedValue::text(address))
        .set("display_name", GeneratedValue::text(display_name))
        .set("sync_cursor", GeneratedValue::text(&config.sync_cursor))
        .set("last_sync_at", GeneratedValue::Timestamp(config.synced_at))
        .execute(conn)?)
}
