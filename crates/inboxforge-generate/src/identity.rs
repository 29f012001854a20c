use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};

use inboxforge_core::IDENTIFIER_TYPE_EMAIL;

use crate::content::synthesize_name;
use crate::errors::GenerationError;
use crate::rng::RngContext;
use crate::value::{GeneratedValue, RowInsert};

/// Get-or-create participants keyed by address.
///
/// The store is the source of truth; the cache only saves repeated lookups
/// within a run. Existing rows are never modified.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: HashMap<String, i64>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Participant id for `address`, creating the participant (and its
    /// address identifier) on first reference. Without a `display_name`, a
    /// name is synthesized from the run RNG.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        rng: &mut RngContext,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<i64, GenerationError> {
        let key = normalize_address(address);
        if key.is_empty() {
            return Err(GenerationError::Integrity(
                "participant address must not be empty".to_string(),
            ));
        }
        if let Some(id) = self.cache.get(&key) {
            return Ok(*id);
        }

        let existing = conn
            .prepare_cached("SELECT id FROM participants WHERE email_address = ?1")?
            .query_row([&key], |row| row.get::<_, i64>(0))
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                let name = match display_name {
                    Some(name) => name.to_string(),
                    None => synthesize_name(rng),
                };
                RowInsert::into_table("participants")
                    .set("email_address", GeneratedValue::text(&key))
                    .set("display_name", GeneratedValue::Text(name))
                    .set("domain", GeneratedValue::Text(domain_of(&key)))
                    .execute(conn)?
            }
        };

        conn.prepare_cached(
            "INSERT OR IGNORE INTO participant_identifiers
                (participant_id, identifier_type, identifier_value, display_value, is_primary)
             VALUES (?1, ?2, ?3, ?4, 1)",
        )?
        .execute(params![id, IDENTIFIER_TYPE_EMAIL, key, address.trim()])?;

        self.cache.insert(key, id);
        Ok(id)
    }
}

/// Dedup key of an address.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Text after the last `@`, or empty when there is none.
pub fn domain_of(address: &str) -> String {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_uses_last_segment() {
        assert_eq!(domain_of("a@b@Example.com"), "example.com");
        assert_eq!(domain_of("no-at-sign"), "");
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_address("  Alex.Chen@Gmail.com "), "alex.chen@gmail.com");
    }
}
