use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use inboxforge_core::{AccountSpec, AttachmentType, LabelKind, LabelSpec, mailbox};

use crate::errors::GenerationError;

/// Environment variable naming an external schema file.
pub const SCHEMA_ENV_VAR: &str = "INBOXFORGE_SCHEMA";

/// Fixed generation parameters. `Default` holds the demo fixture constants;
/// a TOML file may override any subset of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Seed for the single RNG driving all content.
    pub seed: u64,
    /// Number of randomly populated messages (the curated thread is extra).
    pub target_messages: u32,
    /// Size of the pre-generated external contact pool.
    pub contact_pool_size: u32,
    /// Length of the snippet prefix, in characters.
    pub snippet_chars: usize,
    pub accounts: Vec<AccountSpec>,
    pub labels: Vec<LabelSpec>,
    /// Exactly one category label is drawn per received message.
    pub category_weights: Vec<CategoryWeight>,
    pub contact_domains: Vec<String>,
    pub attachment_types: Vec<AttachmentType>,
    pub date_range: DateRange,
    /// Bookkeeping value written to `sources.last_sync_at`.
    pub synced_at: NaiveDateTime,
    pub sync_cursor: String,
    pub probabilities: Probabilities,
    /// Inject the hand-authored conversation.
    pub curated_thread: bool,
    pub schema: SchemaSearch,
    /// Location of the generated SQLite store.
    pub output: PathBuf,
}

/// Weighted category label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWeight {
    pub label: String,
    pub weight: u32,
}

/// Inclusive range of synthesized `sent_at` dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Probability knobs of the population engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probabilities {
    /// Continue the account's most recent conversation instead of opening one.
    pub continue_conversation: f64,
    /// The account is the sender.
    pub sent: f64,
    pub starred: f64,
    pub important: f64,
    pub user_label: f64,
    /// Add a second contact as `cc`.
    pub cc: f64,
    /// Message carries 1-3 attachments.
    pub attachment: f64,
}

impl Default for Probabilities {
    fn default() -> Self {
        Self {
            continue_conversation: 0.7,
            sent: 0.25,
            starred: 0.15,
            important: 0.3,
            user_label: 0.2,
            cc: 0.15,
            attachment: 0.2,
        }
    }
}

impl Probabilities {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("continue_conversation", self.continue_conversation),
            ("sent", self.sent),
            ("starred", self.starred),
            ("important", self.important),
            ("user_label", self.user_label),
            ("cc", self.cc),
            ("attachment", self.attachment),
        ]
    }
}

/// Ordered search locations for an external schema definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSearch {
    pub paths: Vec<PathBuf>,
    pub env_var: Option<String>,
}

impl Default for SchemaSearch {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("../msgvault/internal/store/schema.sql")],
            env_var: Some(SCHEMA_ENV_VAR.to_string()),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            target_messages: 500,
            contact_pool_size: 80,
            snippet_chars: 100,
            accounts: vec![
                AccountSpec::new("alex.chen@gmail.com", "Alex Chen"),
                AccountSpec::new("jordan.miller@gmail.com", "Jordan Miller"),
            ],
            labels: default_labels(),
            category_weights: vec![
                CategoryWeight::new(mailbox::CATEGORY_PERSONAL, 40),
                CategoryWeight::new(mailbox::CATEGORY_SOCIAL, 15),
                CategoryWeight::new(mailbox::CATEGORY_PROMOTIONS, 20),
                CategoryWeight::new(mailbox::CATEGORY_UPDATES, 15),
                CategoryWeight::new(mailbox::CATEGORY_FORUMS, 10),
            ],
            contact_domains: [
                "gmail.com",
                "yahoo.com",
                "outlook.com",
                "hey.com",
                "company.io",
                "university.edu",
                "nonprofit.org",
                "amazon.com",
                "github.com",
                "stripe.com",
                "slack.com",
                "notion.so",
                "linear.app",
                "vercel.com",
                "fly.io",
            ]
            .iter()
            .map(|domain| domain.to_string())
            .collect(),
            attachment_types: default_attachment_types(),
            date_range: DateRange {
                start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
                end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            },
            synced_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap_or_default()
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default(),
            sync_cursor: "12345".to_string(),
            probabilities: Probabilities::default(),
            curated_thread: true,
            schema: SchemaSearch::default(),
            output: PathBuf::from("demo-data/msgvault.db"),
        }
    }
}

impl CategoryWeight {
    pub fn new(label: &str, weight: u32) -> Self {
        Self {
            label: label.to_string(),
            weight,
        }
    }
}

impl GenerationConfig {
    pub fn from_toml_path(path: &Path) -> Result<Self, GenerationError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, GenerationError> {
        Ok(toml::from_str(contents)?)
    }

    /// Names of user-defined labels, in catalog order.
    pub fn user_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|label| label.kind == LabelKind::User)
            .map(|label| label.name.as_str())
            .collect()
    }

    /// Directory of the derived columnar cache that sits beside the store.
    pub fn analytics_dir(&self) -> PathBuf {
        self.output
            .parent()
            .map(|parent| parent.join("analytics"))
            .unwrap_or_else(|| PathBuf::from("analytics"))
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.accounts.is_empty() {
            return invalid("at least one account is required");
        }
        for account in &self.accounts {
            if !account.address.contains('@') {
                return invalid(&format!(
                    "account address '{}' is not an email address",
                    account.address
                ));
            }
        }

        for required in [
            mailbox::INBOX,
            mailbox::SENT,
            mailbox::STARRED,
            mailbox::IMPORTANT,
        ] {
            if !self.has_label(required) {
                return invalid(&format!("label catalog is missing '{required}'"));
            }
        }
        for category in &self.category_weights {
            if !self.has_label(&category.label) {
                return invalid(&format!(
                    "category '{}' is not in the label catalog",
                    category.label
                ));
            }
        }
        if self.category_weights.iter().all(|c| c.weight == 0) {
            return invalid("category weights must not all be zero");
        }

        if self.contact_domains.is_empty() || self.contact_pool_size == 0 {
            return invalid("contact pool requires at least one domain and one contact");
        }
        if self.attachment_types.is_empty() {
            return invalid("attachment catalog must not be empty");
        }
        if self.date_range.start >= self.date_range.end {
            return invalid("date_range.start must precede date_range.end");
        }
        if self.snippet_chars == 0 {
            return invalid("snippet_chars must be positive");
        }
        for (name, value) in self.probabilities.named() {
            if !(0.0..=1.0).contains(&value) {
                return invalid(&format!("probability '{name}' must be within [0, 1]"));
            }
        }
        Ok(())
    }

    fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }
}

fn invalid(message: &str) -> Result<(), GenerationError> {
    Err(GenerationError::InvalidConfig(message.to_string()))
}

fn default_labels() -> Vec<LabelSpec> {
    let mut labels: Vec<LabelSpec> = [
        mailbox::INBOX,
        mailbox::SENT,
        mailbox::STARRED,
        mailbox::IMPORTANT,
        mailbox::TRASH,
        mailbox::DRAFT,
        mailbox::SPAM,
        mailbox::CATEGORY_PERSONAL,
        mailbox::CATEGORY_SOCIAL,
        mailbox::CATEGORY_PROMOTIONS,
        mailbox::CATEGORY_UPDATES,
        mailbox::CATEGORY_FORUMS,
    ]
    .iter()
    .map(|name| LabelSpec::system(name))
    .collect();
    labels.extend(
        ["Projects", "Receipts", "Travel", "Work"]
            .iter()
            .map(|name| LabelSpec::user(name)),
    );
    labels
}

fn default_attachment_types() -> Vec<AttachmentType> {
    [
        ("report.pdf", "application/pdf"),
        ("photo.jpg", "image/jpeg"),
        ("screenshot.png", "image/png"),
        (
            "spreadsheet.xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        (
            "document.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        ("archive.zip", "application/zip"),
        ("data.csv", "text/csv"),
        (
            "slides.pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ),
        ("invoice.pdf", "application/pdf"),
        ("image.heic", "image/heic"),
    ]
    .iter()
    .map(|(filename, mime)| AttachmentType::new(filename, mime))
    .collect()
}
