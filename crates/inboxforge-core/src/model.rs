use std::fmt;

use serde::{Deserialize, Serialize};

/// `source_type` written for every configured account.
pub const SOURCE_TYPE_GMAIL: &str = "gmail";

/// `identifier_type` of the address identifier owned by each participant.
pub const IDENTIFIER_TYPE_EMAIL: &str = "email";

/// External thread id of the hand-authored conversation.
pub const CURATED_THREAD_ID: &str = "curated_offsite_planning";

/// Number of messages in the hand-authored conversation.
pub const CURATED_THREAD_LEN: usize = 6;

/// Well-known label names of the mailbox catalog.
pub mod mailbox {
    pub const INBOX: &str = "INBOX";
    pub const SENT: &str = "SENT";
    pub const STARRED: &str = "STARRED";
    pub const IMPORTANT: &str = "IMPORTANT";
    pub const TRASH: &str = "TRASH";
    pub const DRAFT: &str = "DRAFT";
    pub const SPAM: &str = "SPAM";
    pub const CATEGORY_PERSONAL: &str = "CATEGORY_PERSONAL";
    pub const CATEGORY_SOCIAL: &str = "CATEGORY_SOCIAL";
    pub const CATEGORY_PROMOTIONS: &str = "CATEGORY_PROMOTIONS";
    pub const CATEGORY_UPDATES: &str = "CATEGORY_UPDATES";
    pub const CATEGORY_FORUMS: &str = "CATEGORY_FORUMS";

    /// Top-level mailbox states; exactly one applies to a generated message.
    pub const TOP_LEVEL: &[&str] = &[INBOX, SENT];
}

/// A configured mail account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub address: String,
    pub display_name: String,
}

impl AccountSpec {
    pub fn new(address: &str, display_name: &str) -> Self {
        Self {
            address: address.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// Kind of label in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    System,
    User,
}

impl LabelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

/// Catalog entry instantiated once per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    pub kind: LabelKind,
}

impl LabelSpec {
    pub fn system(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: LabelKind::System,
        }
    }

    pub fn user(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: LabelKind::User,
        }
    }
}

/// Attachment catalog entry: a file name and its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentType {
    pub filename: String,
    pub mime_type: String,
}

impl AttachmentType {
    pub fn new(filename: &str, mime_type: &str) -> Self {
        Self {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
        }
    }
}

/// Role of a participant on a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    From,
    To,
    Cc,
}

impl RecipientRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
            Self::Cc => "cc",
        }
    }
}

impl fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a participant within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRole {
    Member,
}

impl ConversationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_kind_serializes_snake_case() {
        let spec = LabelSpec::user("Travel");
        let json = serde_json::to_string(&spec).expect("serialize label");
        assert_eq!(json, r#"{"name":"Travel","kind":"user"}"#);
    }

    #[test]
    fn top_level_labels_are_inbox_and_sent() {
        assert_eq!(mailbox::TOP_LEVEL, &["INBOX", "SENT"]);
        assert_eq!(RecipientRole::Cc.to_string(), "cc");
    }
}
