//! The hand-authored "offsite planning" thread.
//!
//! Every field is fixed, so the thread is identical across seeds and gives
//! thread views a stable fixture to render.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use inboxforge_core::{CURATED_THREAD_ID, CURATED_THREAD_LEN, RecipientRole, mailbox};

use crate::content::snippet_of;
use crate::errors::GenerationError;
use crate::population::GenerationContext;
use crate::rng::RngContext;
use crate::value::TIMESTAMP_FORMAT;
use crate::writer::{MessageWriter, NewConversation, NewMessage};

pub const CURATED_TITLE: &str = "Team offsite planning";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speaker {
    Owner,
    Priya,
    Marcus,
}

impl Speaker {
    fn contact(self) -> Option<(&'static str, &'static str)> {
        match self {
            Speaker::Owner => None,
            Speaker::Priya => Some(("priya.raman@company.io", "Priya Raman")),
            Speaker::Marcus => Some(("marcus.webb@university.edu", "Marcus Webb")),
        }
    }
}

struct CuratedMessage {
    from: Speaker,
    to: &'static [Speaker],
    cc: &'static [Speaker],
    sent_at: &'static str,
    subject: &'static str,
    body: &'static str,
}

const CURATED_MESSAGES: [CuratedMessage; CURATED_THREAD_LEN] = [
    CuratedMessage {
        from: Speaker::Priya,
        to: &[Speaker::Owner],
        cc: &[Speaker::Marcus],
        sent_at: "2024-06-03 09:12:00",
        subject: "Team offsite planning: dates and venue",
        body: "Hi,\n\nWe finally have budget approval for the summer offsite. \
               I am thinking the second week of August, two days, somewhere within \
               driving distance. Could you check which dates work for your team?\n\n\
               Marcus offered to look into venues near the lake.\n\nPriya",
    },
    CuratedMessage {
        from: Speaker::Owner,
        to: &[Speaker::Priya],
        cc: &[Speaker::Marcus],
        sent_at: "2024-06-03 10:47:00",
        subject: "Re: Team offsite planning: dates and venue",
        body: "Thanks Priya,\n\nAugust 13-14 works for everyone on my side. The 12th \
               clashes with the release freeze, so I would avoid starting on Monday.\n\n\
               Happy to own the agenda if Marcus takes the venue.",
    },
    CuratedMessage {
        from: Speaker::Marcus,
        to: &[Speaker::Owner, Speaker::Priya],
        cc: &[],
        sent_at: "2024-06-03 14:05:00",
        subject: "Re: Team offsite planning: dates and venue",
        body: "Hello both,\n\nI found two options: the Lakeside Lodge (fits 30, has a \
               meeting room with a projector) and the old mill conference center \
               (cheaper, but no catering on site). Both are free on the 13th and 14th.\n\n\
               Quotes attached in the shared folder.\n\nMarcus",
    },
    CuratedMessage {
        from: Speaker::Owner,
        to: &[Speaker::Marcus, Speaker::Priya],
        cc: &[],
        sent_at: "2024-06-04 08:31:00",
        subject: "Re: Team offsite planning: dates and venue",
        body: "Lakeside Lodge gets my vote. Catering on site saves us a lot of \
               logistics, and the price difference is small once we add a caterer \
               to the mill.\n\nDraft agenda: day one retro and roadmap, day two \
               workshops and a hike.",
    },
    CuratedMessage {
        from: Speaker::Priya,
        to: &[Speaker::Owner, Speaker::Marcus],
        cc: &[],
        sent_at: "2024-06-04 11:20:00",
        subject: "Re: Team offsite planning: dates and venue",
        body: "Agreed, Lakeside Lodge it is. Marcus, can you place the hold today? \
               I will send the calendar invite once it is confirmed.\n\nThe \
               agenda looks great. Let's keep the afternoon of day two free.\n\nPriya",
    },
    CuratedMessage {
        from: Speaker::Owner,
        to: &[Speaker::Priya, Speaker::Marcus],
        cc: &[],
        sent_at: "2024-06-05 16:02:00",
        subject: "Re: Team offsite planning: dates and venue",
        body: "Confirmed with the lodge this morning: August 13-14, 24 rooms, \
               breakfast and lunch included. I shared the final agenda and the \
               carpool sheet.\n\nSee you both there!",
    },
];

/// Ids of the injected conversation and its messages, in thread order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CuratedThread {
    pub conversation_id: i64,
    pub message_ids: Vec<i64>,
}

/// Insert the curated thread on the primary account.
///
/// Both external participants carry fixed display names, so identity
/// resolution never draws from `rng` here.
pub fn inject(
    ctx: &mut GenerationContext,
    writer: &MessageWriter<'_>,
    rng: &mut RngContext,
    snippet_chars: usize,
) -> Result<CuratedThread, GenerationError> {
    let owner = ctx.primary_account()?.clone();
    let conn = writer.conn();

    let mut participant = |speaker: Speaker, ctx: &mut GenerationContext| match speaker.contact() {
        None => Ok(owner.participant_id),
        Some((address, name)) => ctx.identities.resolve(conn, rng, address, Some(name)),
    };

    let inbox = ctx.labels.id(owner.source_id, mailbox::INBOX)?;
    let sent = ctx.labels.id(owner.source_id, mailbox::SENT)?;
    let important = ctx.labels.id(owner.source_id, mailbox::IMPORTANT)?;

    let mut cursor = writer.open_conversation(&NewConversation {
        source_id: owner.source_id,
        external_id: CURATED_THREAD_ID,
        title: Some(CURATED_TITLE),
    })?;

    let mut message_ids = Vec::with_capacity(CURATED_THREAD_LEN);
    for (position, curated) in CURATED_MESSAGES.iter().enumerate() {
        let sent_at = NaiveDateTime::parse_from_str(curated.sent_at, TIMESTAMP_FORMAT).map_err(|err| {
            GenerationError::Integrity(format!("curated timestamp '{}': {err}", curated.sent_at))
        })?;
        let sender_id = participant(curated.from, ctx)?;
        let is_from_me = curated.from == Speaker::Owner;
        let external_id = format!("{CURATED_THREAD_ID}_{position:02}");
        let snippet = snippet_of(curated.body, snippet_chars);
        let reply_to = cursor.last_message_id;

        let message_id = writer.append_message(
            &mut cursor,
            &NewMessage {
                source_id: owner.source_id,
                external_id: &external_id,
                sent_at,
                sender_id,
                is_from_me,
                subject: curated.subject,
                body: curated.body,
                snippet: &snippet,
                size_estimate: (curated.subject.len() + curated.body.len() + 2048) as i64,
                attachment_count: 0,
                reply_to,
                thread_position: Some(position as i64),
            },
        )?;

        writer.add_recipient(message_id, sender_id, RecipientRole::From)?;
        for speaker in curated.to {
            let id = participant(*speaker, ctx)?;
            writer.add_recipient(message_id, id, RecipientRole::To)?;
        }
        for speaker in curated.cc {
            let id = participant(*speaker, ctx)?;
            writer.add_recipient(message_id, id, RecipientRole::Cc)?;
        }

        let mailbox_label = if is_from_me { sent } else { inbox };
        writer.apply_labels(message_id, &[mailbox_label, important])?;
        message_ids.push(message_id);
    }

    info!(
        conversation_id = cursor.id,
        messages = message_ids.len(),
        "curated thread injected"
    );
    Ok(CuratedThread {
        conversation_id: cursor.id,
        message_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_strictly_increase() {
        let stamps: Vec<NaiveDateTime> = CURATED_MESSAGES
            .iter()
            .map(|m| NaiveDateTime::parse_from_str(m.sent_at, TIMESTAMP_FORMAT).expect("timestamp"))
            .collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn owner_alternates_with_contacts() {
        for pair in CURATED_MESSAGES.windows(2) {
            assert_ne!(pair[0].from == Speaker::Owner, pair[1].from == Speaker::Owner);
        }
        for message in &CURATED_MESSAGES {
            assert!(!message.to.contains(&message.from));
            assert!(!message.to.is_empty());
        }
    }

    #[test]
    fn bodies_do_not_name_the_owner() {
        let config = crate::config::GenerationConfig::default();
        for account in &config.accounts {
            let first_name = account
                .display_name
                .split_whitespace()
                .next()
                .expect("first name");
            assert!(CURATED_MESSAGES.iter().all(|m| !m.body.contains(first_name)));
        }
    }
}
