use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;

use inboxforge_core::{BodyStorage, FtsBacking, FtsBodyColumn, table_exists};
use inboxforge_generate::schema::{
    EmbeddedSource, EnvFileSource, FileSource, SchemaSource, ensure_auxiliary,
};
use inboxforge_generate::{GenerationError, SchemaOrigin, provision};

const LEGACY_SCHEMA: &str = include_str!("fixtures/legacy_schema.sql");
const FALLBACK_SCHEMA: &str = include_str!("../src/schema/fallback.sql");

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("inboxforge_schema_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn boxed<S: SchemaSource + 'static>(source: S) -> Box<dyn SchemaSource> {
    Box::new(source)
}

#[test]
fn embedded_fallback_warns_and_is_complete() {
    let conn = Connection::open_in_memory().expect("open");
    let status = provision(&conn, &[boxed(EmbeddedSource::fallback())]).expect("provision");

    assert_eq!(status.origin, SchemaOrigin::Embedded);
    assert_eq!(status.warnings.len(), 1);
    assert_eq!(status.layout.body, BodyStorage::Separate);
    assert_eq!(status.layout.fts, Some(FtsBacking::Standalone));
    assert!(status.layout.recipient_from_role);
    assert!(status.layout.message_columns.thread_position);
    for table in ["participant_identifiers", "conversation_participants", "messages_fts"] {
        assert!(table_exists(&conn, table).expect("lookup"), "{table} missing");
    }
}

#[test]
fn missing_external_falls_through_to_embedded() {
    let dir = temp_dir();
    let sources = vec![
        boxed(FileSource::new(dir.join("absent.sql"))),
        boxed(EnvFileSource::new("INBOXFORGE_TEST_UNSET_SCHEMA_VAR")),
        boxed(EmbeddedSource::fallback()),
    ];
    let conn = Connection::open_in_memory().expect("open");
    let status = provision(&conn, &sources).expect("provision");
    assert_eq!(status.origin, SchemaOrigin::Embedded);
    assert_eq!(status.warnings.len(), 1);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unreadable_external_is_skipped_with_warning() {
    let dir = temp_dir();
    // A directory exists but cannot be read as a file.
    let sources = vec![boxed(FileSource::new(&dir)), boxed(EmbeddedSource::fallback())];
    let conn = Connection::open_in_memory().expect("open");
    let status = provision(&conn, &sources).expect("provision");
    assert_eq!(status.origin, SchemaOrigin::Embedded);
    assert_eq!(status.warnings.len(), 2);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn legacy_external_schema_is_augmented() {
    let dir = temp_dir();
    let path = dir.join("schema.sql");
    fs::write(&path, LEGACY_SCHEMA).expect("write schema");

    let conn = Connection::open_in_memory().expect("open");
    let status = provision(
        &conn,
        &[boxed(FileSource::new(&path)), boxed(EmbeddedSource::fallback())],
    )
    .expect("provision");

    assert_eq!(status.origin, SchemaOrigin::External);
    assert!(status.warnings.is_empty());
    assert_eq!(status.layout.body, BodyStorage::Inline);
    assert_eq!(status.layout.fts, Some(FtsBacking::ExternalContent));
    assert!(!status.layout.recipient_from_role);
    assert!(!status.layout.conversation_title);
    assert!(!status.layout.message_columns.is_from_me);
    assert!(table_exists(&conn, "participant_identifiers").expect("lookup"));
    assert!(table_exists(&conn, "conversation_participants").expect("lookup"));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn external_schema_with_auxiliary_tables_is_accepted() {
    let dir = temp_dir();
    let path = dir.join("schema.sql");
    let auxiliary = include_str!("../src/schema/auxiliary.sql");
    fs::write(&path, format!("{FALLBACK_SCHEMA}\n{auxiliary}")).expect("write schema");

    let conn = Connection::open_in_memory().expect("open");
    let status = provision(&conn, &[boxed(FileSource::new(&path))]).expect("provision");
    assert_eq!(status.origin, SchemaOrigin::External);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn external_full_text_table_keeps_its_own_columns() {
    let dir = temp_dir();
    let path = dir.join("schema.sql");
    fs::write(
        &path,
        format!(
            "{FALLBACK_SCHEMA}
             CREATE VIRTUAL TABLE messages_fts USING fts5(message_id UNINDEXED, subject, body, from_addr);"
        ),
    )
    .expect("write schema");

    let conn = Connection::open_in_memory().expect("open");
    let status = provision(&conn, &[boxed(FileSource::new(&path))]).expect("provision");
    assert_eq!(status.origin, SchemaOrigin::External);
    assert_eq!(status.layout.fts, Some(FtsBacking::Standalone));
    assert_eq!(status.layout.fts_columns.body, FtsBodyColumn::Body);
    assert!(status.layout.fts_columns.message_id);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn full_text_table_without_body_column_is_rejected() {
    let conn = Connection::open_in_memory().expect("open");
    let sql = format!(
        "{FALLBACK_SCHEMA}
         CREATE VIRTUAL TABLE messages_fts USING fts5(message_id UNINDEXED, subject, from_addr);"
    );
    let source = EmbeddedSource::new("no body", Box::leak(sql.into_boxed_str()));
    let err = provision(&conn, &[boxed(source)]).expect_err("must fail");
    assert!(matches!(err, GenerationError::Core(_)));
}

#[test]
fn malformed_embedded_schema_is_fatal() {
    let conn = Connection::open_in_memory().expect("open");
    let broken = EmbeddedSource::new("broken", "CREATE TABLE sources (id INTEGER PRIMARY KEY");
    let err = provision(&conn, &[boxed(broken)]).expect_err("must fail");
    assert!(matches!(err, GenerationError::Schema(_)));
}

#[test]
fn malformed_external_schema_is_fatal() {
    let dir = temp_dir();
    let path = dir.join("schema.sql");
    fs::write(&path, "CREATE TABLE nonsense (").expect("write schema");

    let conn = Connection::open_in_memory().expect("open");
    let err = provision(
        &conn,
        &[boxed(FileSource::new(&path)), boxed(EmbeddedSource::fallback())],
    )
    .expect_err("must fail");
    assert!(matches!(err, GenerationError::Schema(_)));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn external_content_index_over_split_bodies_is_rejected() {
    let conn = Connection::open_in_memory().expect("open");
    let sql = format!(
        "{FALLBACK_SCHEMA}
         CREATE VIRTUAL TABLE messages_fts USING fts5(
             subject, body_text, content='messages', content_rowid='id'
         );"
    );
    let source = EmbeddedSource::new("mismatched", Box::leak(sql.into_boxed_str()));
    let err = provision(&conn, &[boxed(source)]).expect_err("must fail");
    assert!(matches!(err, GenerationError::Core(_)));
}

#[test]
fn ensure_auxiliary_is_idempotent() {
    let conn = Connection::open_in_memory().expect("open");
    conn.execute_batch(LEGACY_SCHEMA).expect("schema");
    let first = ensure_auxiliary(&conn).expect("first pass");
    let second = ensure_auxiliary(&conn).expect("second pass");
    assert_eq!(first, second);

    let fts_tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'messages_fts'",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(fts_tables, 1);
}
