use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use inboxforge_core::{BodyStorage, CURATED_THREAD_ID, CURATED_THREAD_LEN};
use inboxforge_eval::{StoreVerifier, VerifyOptions};
use inboxforge_generate::config::SchemaSearch;
use inboxforge_generate::output::REPORT_FILE;
use inboxforge_generate::{GenerationConfig, GenerationEngine, GenerationError, SchemaOrigin};

const LEGACY_SCHEMA: &str = include_str!("fixtures/legacy_schema.sql");

fn temp_out_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("inboxforge_test_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn config(dir: &Path, messages: u32) -> GenerationConfig {
    GenerationConfig {
        target_messages: messages,
        output: dir.join("msgvault.db"),
        schema: SchemaSearch {
            paths: Vec::new(),
            env_var: None,
        },
        ..GenerationConfig::default()
    }
}

fn hash_file(path: &Path) -> String {
    let bytes = fs::read(path).expect("read file");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("count")
}

fn assert_clean(path: &Path, require_curated: bool) {
    let verifier = StoreVerifier::new(VerifyOptions {
        require_curated,
        ..VerifyOptions::default()
    });
    let report = verifier.verify_path(path).expect("verify");
    assert!(report.is_clean(), "violations: {:?}", report.violations);
}

#[test]
fn generates_consistent_store() {
    let dir = temp_out_dir();
    let result = GenerationEngine::new(config(&dir, 100))
        .expect("engine")
        .run()
        .expect("run");

    let report = &result.report;
    assert_eq!(report.schema_origin, SchemaOrigin::Embedded);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.population.messages, 100);
    assert_eq!(report.curated_messages, CURATED_THREAD_LEN);
    assert_eq!(report.counts.messages, 100 + CURATED_THREAD_LEN as i64);
    assert_eq!(report.counts.fts_rows, report.counts.messages);
    assert!(report.counts.conversations >= 1);
    assert!(report.counts.participants >= 2);
    assert_eq!(report.counts.sources, 2);

    let conn = Connection::open(&result.store_path).expect("open store");
    for address in ["alex.chen@gmail.com", "jordan.miller@gmail.com"] {
        let found = count(
            &conn,
            &format!("SELECT COUNT(*) FROM participants WHERE email_address = '{address}'"),
        );
        assert_eq!(found, 1, "{address} missing");
    }
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM message_recipients WHERE recipient_type = 'from'"),
        report.counts.messages
    );
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM messages m
             WHERE m.is_from_me != (m.sender_id IN (
                 SELECT p.id FROM participants p JOIN sources s ON s.identifier = p.email_address
             ))"
        ),
        0
    );
    drop(conn);

    assert_clean(&result.store_path, true);
    assert!(!dir.join("msgvault.db.partial").exists());

    let persisted: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.join(REPORT_FILE)).expect("report")).expect("json");
    assert_eq!(persisted["seed"], 42);
    assert_eq!(persisted["counts"]["messages"], 106);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn same_seed_produces_identical_store() {
    let first_dir = temp_out_dir();
    let second_dir = temp_out_dir();
    let third_dir = temp_out_dir();

    let first = GenerationEngine::new(config(&first_dir, 60))
        .expect("engine")
        .run()
        .expect("first run");
    let second = GenerationEngine::new(config(&second_dir, 60))
        .expect("engine")
        .run()
        .expect("second run");
    let other_seed = GenerationEngine::new(GenerationConfig {
        seed: 7,
        ..config(&third_dir, 60)
    })
    .expect("engine")
    .run()
    .expect("third run");

    assert_eq!(hash_file(&first.store_path), hash_file(&second.store_path));
    assert_ne!(hash_file(&first.store_path), hash_file(&other_seed.store_path));
    for dir in [first_dir, second_dir, third_dir] {
        let _ = fs::remove_dir_all(dir);
    }
}

#[test]
fn legacy_schema_is_filled_in_its_own_shape() {
    let dir = temp_out_dir();
    let schema_path = dir.join("schema.sql");
    fs::write(&schema_path, LEGACY_SCHEMA).expect("write schema");

    let mut config = config(&dir, 80);
    config.schema.paths = vec![schema_path.clone()];
    let result = GenerationEngine::new(config)
        .expect("engine")
        .run()
        .expect("run");

    assert_eq!(result.report.schema_origin, SchemaOrigin::External);
    assert_eq!(result.report.schema_location, schema_path.display().to_string());
    assert!(result.report.warnings.is_empty());
    assert_eq!(result.report.counts.fts_rows, result.report.counts.messages);

    let conn = Connection::open(&result.store_path).expect("open store");
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM message_recipients WHERE recipient_type = 'from'"),
        0
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM messages WHERE body_text IS NULL"),
        0
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'offsite'"),
        CURATED_THREAD_LEN as i64
    );
    drop(conn);

    let report = StoreVerifier::default()
        .verify_path(&result.store_path)
        .expect("verify");
    assert!(report.is_clean(), "violations: {:?}", report.violations);
    assert_eq!(report.layout.body, BodyStorage::Inline);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn external_full_text_columns_are_filled() {
    let dir = temp_out_dir();
    let fallback = include_str!("../src/schema/fallback.sql");
    let schema_path = dir.join("schema.sql");
    fs::write(
        &schema_path,
        format!(
            "{fallback}
             CREATE VIRTUAL TABLE messages_fts USING fts5(message_id UNINDEXED, subject, body, from_addr);"
        ),
    )
    .expect("write schema");

    let mut config = config(&dir, 40);
    config.schema.paths = vec![schema_path];
    let result = GenerationEngine::new(config)
        .expect("engine")
        .run()
        .expect("run");
    assert_eq!(result.report.schema_origin, SchemaOrigin::External);
    assert_eq!(result.report.counts.fts_rows, result.report.counts.messages);

    let conn = Connection::open(&result.store_path).expect("open store");
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM messages_fts WHERE message_id IS NOT rowid"),
        0
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'body:lodge'"),
        4
    );
    drop(conn);

    assert_clean(&result.store_path, true);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn curated_thread_is_fixed_and_linked() {
    let dir = temp_out_dir();
    let result = GenerationEngine::new(config(&dir, 20))
        .expect("engine")
        .run()
        .expect("run");

    let conn = Connection::open(&result.store_path).expect("open store");
    let mut stmt = conn
        .prepare(
            "SELECT m.id, m.reply_to_message_id, m.thread_position, m.sent_at, m.source_id
             FROM messages m JOIN conversations c ON c.id = m.conversation_id
             WHERE c.source_conversation_id = ?1
             ORDER BY m.thread_position",
        )
        .expect("prepare");
    let rows = stmt
        .query_map([CURATED_THREAD_ID], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows");

    assert_eq!(rows.len(), CURATED_THREAD_LEN);
    assert_eq!(rows[0].1, None);
    for (index, pair) in rows.windows(2).enumerate() {
        assert_eq!(pair[1].1, Some(pair[0].0));
        assert_eq!(pair[1].2, index as i64 + 1);
        assert!(pair[0].3 < pair[1].3);
    }
    // Owned by the primary account.
    assert!(rows.iter().all(|row| row.4 == 1));

    let important = count(
        &conn,
        &format!(
            "SELECT COUNT(*) FROM message_labels ml
             JOIN labels l ON l.id = ml.label_id
             JOIN messages m ON m.id = ml.message_id
             JOIN conversations c ON c.id = m.conversation_id
             WHERE l.name = 'IMPORTANT' AND c.source_conversation_id = '{CURATED_THREAD_ID}'"
        ),
    );
    assert_eq!(important, CURATED_THREAD_LEN as i64);
    drop(stmt);
    drop(conn);

    // Content does not depend on the seed.
    let other_dir = temp_out_dir();
    let other = GenerationEngine::new(GenerationConfig {
        seed: 99,
        ..config(&other_dir, 20)
    })
    .expect("engine")
    .run()
    .expect("run");
    let bodies = |path: &Path| -> Vec<String> {
        let conn = Connection::open(path).expect("open store");
        let mut stmt = conn
            .prepare(
                "SELECT b.body_text FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 JOIN message_bodies b ON b.message_id = m.id
                 WHERE c.source_conversation_id = ?1 ORDER BY m.thread_position",
            )
            .expect("prepare");
        stmt.query_map([CURATED_THREAD_ID], |row| row.get(0))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("rows")
    };
    assert_eq!(bodies(&result.store_path), bodies(&other.store_path));
    let _ = fs::remove_dir_all(dir);
    let _ = fs::remove_dir_all(other_dir);
}

#[test]
fn curated_thread_can_be_disabled() {
    let dir = temp_out_dir();
    let mut config = config(&dir, 30);
    config.curated_thread = false;
    let result = GenerationEngine::new(config)
        .expect("engine")
        .run()
        .expect("run");

    assert_eq!(result.report.curated_messages, 0);
    assert_eq!(result.report.counts.messages, 30);
    assert_eq!(result.report.counts.fts_rows, 30);
    assert_clean(&result.store_path, false);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn previous_outputs_are_replaced() {
    let dir = temp_out_dir();
    fs::write(dir.join("msgvault.db"), b"not a database").expect("stale store");
    fs::write(dir.join("msgvault.db-wal"), b"stale").expect("stale wal");
    fs::create_dir_all(dir.join("analytics").join("messages")).expect("stale analytics");

    let result = GenerationEngine::new(config(&dir, 10))
        .expect("engine")
        .run()
        .expect("run");

    assert!(!dir.join("analytics").exists());
    assert!(!dir.join("msgvault.db-wal").exists());
    assert_clean(&result.store_path, true);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn failed_run_leaves_no_store() {
    let dir = temp_out_dir();
    fs::write(dir.join("msgvault.db"), b"previous").expect("previous store");
    let schema_path = dir.join("broken.sql");
    fs::write(&schema_path, "CREATE TABLE sources (").expect("write schema");

    let mut config = config(&dir, 10);
    config.schema.paths = vec![schema_path];
    let err = GenerationEngine::new(config)
        .expect("engine")
        .run()
        .expect_err("must fail");

    assert!(matches!(err, GenerationError::Schema(_)));
    assert!(!dir.join("msgvault.db").exists());
    assert!(!dir.join("msgvault.db.partial").exists());
    assert!(!dir.join(REPORT_FILE).exists());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn invalid_config_is_rejected_before_touching_output() {
    let dir = temp_out_dir();
    fs::write(dir.join("msgvault.db"), b"previous").expect("previous store");
    let mut config = config(&dir, 10);
    config.accounts.clear();

    let err = GenerationEngine::new(config).expect_err("must fail");
    assert!(matches!(err, GenerationError::InvalidConfig(_)));
    assert!(dir.join("msgvault.db").exists());
    let _ = fs::remove_dir_all(dir);
}
