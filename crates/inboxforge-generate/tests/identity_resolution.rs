use rusqlite::Connection;

use inboxforge_generate::identity::IdentityResolver;
use inboxforge_generate::rng::RngContext;
use inboxforge_generate::schema::{EmbeddedSource, SchemaSource};
use inboxforge_generate::{GenerationError, provision};

fn store() -> Connection {
    let conn = Connection::open_in_memory().expect("open");
    let sources: Vec<Box<dyn SchemaSource>> = vec![Box::new(EmbeddedSource::fallback())];
    provision(&conn, &sources).expect("provision");
    conn
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("count")
}

#[test]
fn repeated_addresses_resolve_to_one_participant() {
    let conn = store();
    let mut rng = RngContext::seeded(7).expect("rng");
    let mut resolver = IdentityResolver::new();

    let first = resolver
        .resolve(&conn, &mut rng, "Dana.Lee@Example.com", Some("Dana Lee"))
        .expect("first");
    let again = resolver
        .resolve(&conn, &mut rng, " dana.lee@example.com ", None)
        .expect("again");
    assert_eq!(first, again);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participants"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participant_identifiers"), 1);

    let (address, domain): (String, String) = conn
        .query_row(
            "SELECT email_address, domain FROM participants WHERE id = ?1",
            [first],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("participant");
    assert_eq!(address, "dana.lee@example.com");
    assert_eq!(domain, "example.com");
}

#[test]
fn existing_rows_are_reused_without_overwrite() {
    let conn = store();
    conn.execute(
        "INSERT INTO participants (email_address, display_name, domain)
         VALUES ('kim@example.org', 'Original Name', 'example.org')",
        [],
    )
    .expect("seed");
    let existing = conn.last_insert_rowid();

    let mut rng = RngContext::seeded(7).expect("rng");
    let mut resolver = IdentityResolver::new();
    let resolved = resolver
        .resolve(&conn, &mut rng, "kim@example.org", Some("Other Name"))
        .expect("resolve");
    assert_eq!(resolved, existing);

    let name: String = conn
        .query_row(
            "SELECT display_name FROM participants WHERE id = ?1",
            [existing],
            |row| row.get(0),
        )
        .expect("name");
    assert_eq!(name, "Original Name");
    // The identifier is backfilled for the pre-existing participant.
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM participant_identifiers WHERE is_primary = 1"),
        1
    );

    // A fresh resolver sees the same row through the store.
    let mut other = IdentityResolver::new();
    let again = other
        .resolve(&conn, &mut rng, "KIM@example.org", None)
        .expect("resolve again");
    assert_eq!(again, existing);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participant_identifiers"), 1);
}

#[test]
fn synthesized_names_follow_the_seed() {
    let names = |seed: u64| -> Vec<String> {
        let conn = store();
        let mut rng = RngContext::seeded(seed).expect("rng");
        let mut resolver = IdentityResolver::new();
        (0..5)
            .map(|i| {
                let id = resolver
                    .resolve(&conn, &mut rng, &format!("user{i}@example.net"), None)
                    .expect("resolve");
                conn.query_row(
                    "SELECT display_name FROM participants WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .expect("name")
            })
            .collect()
    };
    assert_eq!(names(11), names(11));
    assert!(names(11).iter().all(|name| !name.is_empty()));
}

#[test]
fn empty_address_is_rejected() {
    let conn = store();
    let mut rng = RngContext::seeded(1).expect("rng");
    let err = IdentityResolver::new()
        .resolve(&conn, &mut rng, "   ", None)
        .expect_err("must fail");
    assert!(matches!(err, GenerationError::Integrity(_)));
}
