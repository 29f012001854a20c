use fake::Fake;
use fake::faker::internet::en::Username;
use fake::faker::lorem::en::{Paragraphs, Sentence};
use fake::faker::name::en::Name;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::rng::RngContext;

/// Synthesized text of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
    pub snippet: String,
}

/// Subject of 3-10 words and a body of 1-4 paragraphs.
pub fn synthesize_message(rng: &mut RngContext, snippet_chars: usize) -> MessageContent {
    let sentence: String = Sentence(3..11).fake_with_rng(rng.inner());
    let subject = sentence.trim_end_matches('.').to_string();
    let paragraphs: Vec<String> = Paragraphs(1..5).fake_with_rng(rng.inner());
    let body = paragraphs.join("\n\n");
    let snippet = snippet_of(&body, snippet_chars);
    MessageContent {
        subject,
        body,
        snippet,
    }
}

pub fn synthesize_name(rng: &mut RngContext) -> String {
    Name().fake_with_rng(rng.inner())
}

pub fn synthesize_username(rng: &mut RngContext) -> String {
    Username().fake_with_rng(rng.inner())
}

/// First `chars` characters of `body`.
pub fn snippet_of(body: &str, chars: usize) -> String {
    body.chars().take(chars).collect()
}

/// Content hash and the storage path derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentAddress {
    pub content_hash: String,
    pub storage_path: String,
}

/// Content address of an attachment, from its owning message, file name and
/// a random nonce.
pub fn content_address(message_id: i64, filename: &str, nonce: u64) -> ContentAddress {
    let mut hasher = Sha256::new();
    hasher.update(format!("{message_id}_{filename}_{nonce}").as_bytes());
    let content_hash = hex::encode(hasher.finalize());
    let storage_path = storage_path_for(&content_hash);
    ContentAddress {
        content_hash,
        storage_path,
    }
}

/// `<first two hex digits>/<hash>`.
pub fn storage_path_for(content_hash: &str) -> String {
    let prefix = content_hash.get(..2).unwrap_or(content_hash);
    format!("{prefix}/{content_hash}")
}
