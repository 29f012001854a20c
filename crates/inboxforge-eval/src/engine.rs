use std::path::Path;
use std::time::Instant;

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use inboxforge_core::layout::FTS_TABLE;
use inboxforge_core::{
    BodyStorage, CURATED_THREAD_ID, CURATED_THREAD_LEN, IDENTIFIER_TYPE_EMAIL, SchemaLayout,
    mailbox, table_exists,
};

use crate::errors::EvalError;
use crate::model::{
    CheckSummary, VERIFICATION_VERSION, VerificationReport, VerifyOptions, Violation,
};

pub const FOREIGN_KEYS: &str = "foreign_keys";
pub const IDENTITY_UNIQUE: &str = "identity_unique";
pub const IDENTITY_IDENTIFIER: &str = "identity_identifier";
pub const CONVERSATION_AGGREGATES: &str = "conversation_aggregates";
pub const MESSAGE_SOURCE: &str = "message_source";
pub const LABEL_EXCLUSIVITY: &str = "label_exclusivity";
pub const LABEL_SOURCE: &str = "label_source";
pub const ATTACHMENT_CONSISTENCY: &str = "attachment_consistency";
pub const ATTACHMENT_ADDRESS: &str = "attachment_address";
pub const BODY_PRESENCE: &str = "body_presence";
pub const SENDER_RECORDED: &str = "sender_recorded";
pub const RECIPIENTS_PRESENT: &str = "recipients_present";
pub const CONVERSATION_MEMBERSHIP: &str = "conversation_membership";
pub const FTS_COMPLETENESS: &str = "fts_completeness";
pub const CURATED_THREAD: &str = "curated_thread";

/// A check expressed as two queries: the number of rows examined, and one
/// `(subject, message)` row per violation.
struct SqlCheck {
    code: &'static str,
    checked: String,
    violations: String,
}

impl SqlCheck {
    fn new(code: &'static str, checked: impl Into<String>, violations: impl Into<String>) -> Self {
        Self {
            code,
            checked: checked.into(),
            violations: violations.into(),
        }
    }
}

/// Verifies the consistency properties of a generated store.
#[derive(Debug, Clone, Default)]
pub struct StoreVerifier {
    options: VerifyOptions,
}

impl StoreVerifier {
    pub fn new(options: VerifyOptions) -> Self {
        Self { options }
    }

    pub fn verify(&self, conn: &Connection) -> Result<VerificationReport, EvalError> {
        let start = Instant::now();
        let layout = SchemaLayout::detect(conn)?;
        layout.require_fts()?;

        let mut run = CheckRun::new(self.options.max_examples);
        check_foreign_keys(conn, &mut run)?;
        for check in sql_checks(conn, &layout)? {
            run.sql(conn, &check)?;
        }
        for code in skipped_checks(conn, &layout)? {
            run.skip(code);
        }
        self.check_curated_thread(conn, &layout, &mut run)?;

        let report = run.finish(layout, start.elapsed().as_millis() as u64);
        let violations = report.violation_count();
        if violations == 0 {
            info!(checks = report.checks.len(), "store verified");
        } else {
            warn!(checks = report.checks.len(), violations, "store has violations");
        }
        Ok(report)
    }

    pub fn verify_path(&self, path: &Path) -> Result<VerificationReport, EvalError> {
        let conn = open_read_only(path)?;
        self.verify(&conn)
    }

    /// In strict mode, turn a report with violations into an error.
    pub fn enforce(&self, report: &VerificationReport) -> Result<(), EvalError> {
        let violations = report.violation_count();
        if self.options.strict && violations > 0 {
            return Err(EvalError::Violations(violations));
        }
        Ok(())
    }

    fn check_curated_thread(
        &self,
        conn: &Connection,
        layout: &SchemaLayout,
        run: &mut CheckRun,
    ) -> Result<(), EvalError> {
        let conversation_id = conn
            .query_row(
                "SELECT id FROM conversations WHERE source_conversation_id = ?1",
                [CURATED_THREAD_ID],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        let Some(conversation_id) = conversation_id else {
            if self.options.require_curated {
                run.record(
                    CURATED_THREAD,
                    1,
                    vec![(
                        format!("conversations:{CURATED_THREAD_ID}"),
                        "curated thread is missing".to_string(),
                    )],
                );
            } else {
                run.skip(CURATED_THREAD);
            }
            return Ok(());
        };

        let columns = layout.message_columns;
        let position = if columns.thread_position { "thread_position" } else { "NULL" };
        let reply_to = if columns.reply_to_message_id { "reply_to_message_id" } else { "NULL" };
        let order = if columns.thread_position { "thread_position, id" } else { "sent_at, id" };
        let sql = format!(
            "SELECT id, sent_at, {reply_to}, {position} FROM messages
             WHERE conversation_id = ?1 ORDER BY {order}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map([conversation_id], |row| {
                Ok(ThreadMessage {
                    id: row.get(0)?,
                    sent_at: row.get(1)?,
                    reply_to: row.get(2)?,
                    position: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let found = curated_thread_violations(conversation_id, &messages, layout);
        run.record(CURATED_THREAD, messages.len() as u64, found);
        Ok(())
    }
}

/// Verify with default options.
pub fn verify_store(conn: &Connection) -> Result<VerificationReport, EvalError> {
    StoreVerifier::default().verify(conn)
}

/// Verify the store at `path`, opened read-only.
pub fn verify_path(path: &Path) -> Result<VerificationReport, EvalError> {
    StoreVerifier::default().verify_path(path)
}

fn open_read_only(path: &Path) -> Result<Connection, EvalError> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(EvalError::InvalidStore(format!(
            "'{}' is not a file",
            path.display()
        )));
    }
    debug!(path = %path.display(), "opening store read-only");
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

struct CheckRun {
    max_examples: usize,
    checks: Vec<CheckSummary>,
    violations: Vec<Violation>,
}

impl CheckRun {
    fn new(max_examples: usize) -> Self {
        Self {
            max_examples,
            checks: Vec::new(),
            violations: Vec::new(),
        }
    }

    fn sql(&mut self, conn: &Connection, check: &SqlCheck) -> Result<(), EvalError> {
        let checked: i64 = conn.query_row(&check.checked, [], |row| row.get(0))?;
        let mut stmt = conn.prepare(&check.violations)?;
        let found = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        self.record(check.code, checked.max(0) as u64, found);
        Ok(())
    }

    fn record(&mut self, code: &str, checked: u64, found: Vec<(String, String)>) {
        debug!(check = code, checked, violations = found.len(), "check finished");
        self.checks.push(CheckSummary {
            code: code.to_string(),
            checked,
            violations: found.len() as u64,
            skipped: false,
        });
        self.violations.extend(
            found
                .into_iter()
                .take(self.max_examples)
                .map(|(subject, message)| Violation {
                    code: code.to_string(),
                    subject,
                    message,
                }),
        );
    }

    fn skip(&mut self, code: &str) {
        self.checks.push(CheckSummary {
            code: code.to_string(),
            checked: 0,
            violations: 0,
            skipped: true,
        });
    }

    fn finish(self, layout: SchemaLayout, duration_ms: u64) -> VerificationReport {
        VerificationReport {
            verification_version: VERIFICATION_VERSION.to_string(),
            layout,
            checks: self.checks,
            violations: self.violations,
            duration_ms,
        }
    }
}

fn check_foreign_keys(conn: &Connection, run: &mut CheckRun) -> Result<(), EvalError> {
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let found = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            let subject = match rowid {
                Some(rowid) => format!("{table}:{rowid}"),
                None => table,
            };
            Ok((subject, format!("references a missing row in {parent}")))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    run.record(FOREIGN_KEYS, tables.max(0) as u64, found);
    Ok(())
}

const COUNT_MESSAGES: &str = "SELECT COUNT(*) FROM messages";
const COUNT_ADDRESSED: &str = "SELECT COUNT(*) FROM participants WHERE email_address IS NOT NULL";

/// Sender and recipient pairs per conversation.
const CONVERSATION_PAIRS: &str = "SELECT m.conversation_id, m.sender_id AS participant_id
     FROM messages m WHERE m.sender_id IS NOT NULL
     UNION
     SELECT m.conversation_id, r.participant_id
     FROM message_recipients r JOIN messages m ON m.id = r.message_id";

fn sql_checks(conn: &Connection, layout: &SchemaLayout) -> Result<Vec<SqlCheck>, EvalError> {
    let top_level = mailbox::TOP_LEVEL
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut checks = vec![
        SqlCheck::new(
            IDENTITY_UNIQUE,
            COUNT_ADDRESSED,
            "SELECT 'participants:' || lower(email_address),
                    COUNT(*) || ' participants share this address'
             FROM participants WHERE email_address IS NOT NULL
             GROUP BY lower(email_address) HAVING COUNT(*) > 1",
        ),
        SqlCheck::new(
            CONVERSATION_AGGREGATES,
            "SELECT COUNT(*) FROM conversations",
            "SELECT 'conversations:' || c.id,
                    'message_count ' || COALESCE(c.message_count, 'NULL') || ' vs ' || COUNT(m.id)
                    || ' messages, last_message_at ' || COALESCE(c.last_message_at, 'NULL')
                    || ' vs ' || COALESCE(MAX(m.sent_at), 'NULL')
             FROM conversations c LEFT JOIN messages m ON m.conversation_id = c.id
             GROUP BY c.id
             HAVING c.message_count IS NOT COUNT(m.id) OR c.last_message_at IS NOT MAX(m.sent_at)",
        ),
        SqlCheck::new(
            MESSAGE_SOURCE,
            COUNT_MESSAGES,
            "SELECT 'messages:' || m.id,
                    'source ' || m.source_id || ' differs from conversation source ' || c.source_id
             FROM messages m JOIN conversations c ON c.id = m.conversation_id
             WHERE m.source_id != c.source_id",
        ),
        SqlCheck::new(
            LABEL_EXCLUSIVITY,
            format!(
                "SELECT COUNT(*) FROM messages m JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.source_conversation_id != '{CURATED_THREAD_ID}'"
            ),
            format!(
                "SELECT 'messages:' || m.id, COUNT(l.id) || ' mailbox labels applied'
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 LEFT JOIN message_labels ml ON ml.message_id = m.id
                 LEFT JOIN labels l ON l.id = ml.label_id AND l.name IN ({top_level})
                 WHERE c.source_conversation_id != '{CURATED_THREAD_ID}'
                 GROUP BY m.id HAVING COUNT(l.id) != 1"
            ),
        ),
        SqlCheck::new(
            LABEL_SOURCE,
            "SELECT COUNT(*) FROM message_labels",
            "SELECT 'message_labels:' || ml.message_id || '/' || ml.label_id,
                    'label of source ' || l.source_id || ' on a message of source ' || m.source_id
             FROM message_labels ml
             JOIN messages m ON m.id = ml.message_id
             JOIN labels l ON l.id = ml.label_id
             WHERE l.source_id != m.source_id",
        ),
        attachment_consistency(layout),
        SqlCheck::new(
            ATTACHMENT_ADDRESS,
            "SELECT COUNT(*) FROM attachments",
            "SELECT 'attachments:' || id,
                    'storage_path ' || COALESCE(storage_path, 'NULL') || ' does not match its hash'
             FROM attachments
             WHERE content_hash IS NULL OR length(content_hash) != 64
                OR storage_path IS NOT substr(content_hash, 1, 2) || '/' || content_hash",
        ),
        body_presence(layout),
        SqlCheck::new(
            RECIPIENTS_PRESENT,
            COUNT_MESSAGES,
            "SELECT 'messages:' || m.id, 'no to or cc recipient'
             FROM messages m
             WHERE NOT EXISTS (
                 SELECT 1 FROM message_recipients r
                 WHERE r.message_id = m.id AND r.recipient_type IN ('to', 'cc')
             )",
        ),
        fts_completeness(conn)?,
    ];

    if layout.recipient_from_role {
        checks.push(SqlCheck::new(
            SENDER_RECORDED,
            COUNT_MESSAGES,
            "SELECT 'messages:' || m.id,
                    COUNT(r.participant_id) || ' from rows, sender ' || COALESCE(m.sender_id, 'NULL')
             FROM messages m
             LEFT JOIN message_recipients r
                 ON r.message_id = m.id AND r.recipient_type = 'from'
             GROUP BY m.id
             HAVING COUNT(r.participant_id) != 1 OR MAX(r.participant_id) IS NOT m.sender_id",
        ));
    }
    if table_exists(conn, "participant_identifiers")? {
        checks.push(SqlCheck::new(
            IDENTITY_IDENTIFIER,
            COUNT_ADDRESSED,
            format!(
                "SELECT 'participants:' || p.id, 'no {IDENTIFIER_TYPE_EMAIL} identifier for ' || p.email_address
                 FROM participants p
                 WHERE p.email_address IS NOT NULL AND NOT EXISTS (
                     SELECT 1 FROM participant_identifiers i
                     WHERE i.participant_id = p.id
                       AND i.identifier_type = '{IDENTIFIER_TYPE_EMAIL}'
                       AND i.identifier_value = lower(trim(p.email_address))
                 )"
            ),
        ));
    }
    if table_exists(conn, "conversation_participants")? {
        checks.push(SqlCheck::new(
            CONVERSATION_MEMBERSHIP,
            "SELECT COUNT(*) FROM conversation_participants",
            format!(
                "SELECT 'conversations:' || pairs.conversation_id,
                        'participant ' || pairs.participant_id || ' is not a member'
                 FROM ({CONVERSATION_PAIRS}) AS pairs
                 WHERE NOT EXISTS (
                     SELECT 1 FROM conversation_participants cp
                     WHERE cp.conversation_id = pairs.conversation_id
                       AND cp.participant_id = pairs.participant_id
                 )"
            ),
        ));
    }
    Ok(checks)
}

/// Checks that do not apply to this store.
fn skipped_checks(conn: &Connection, layout: &SchemaLayout) -> Result<Vec<&'static str>, EvalError> {
    let mut skipped = Vec::new();
    if !layout.recipient_from_role {
        skipped.push(SENDER_RECORDED);
    }
    if !table_exists(conn, "participant_identifiers")? {
        skipped.push(IDENTITY_IDENTIFIER);
    }
    if !table_exists(conn, "conversation_participants")? {
        skipped.push(CONVERSATION_MEMBERSHIP);
    }
    Ok(skipped)
}

fn attachment_consistency(layout: &SchemaLayout) -> SqlCheck {
    let (count_text, count_mismatch) = if layout.message_columns.attachment_count {
        (
            "' attachment_count=' || COALESCE(m.attachment_count, 'NULL')",
            " OR m.attachment_count IS NOT COUNT(a.id)",
        )
    } else {
        ("''", "")
    };
    SqlCheck::new(
        ATTACHMENT_CONSISTENCY,
        COUNT_MESSAGES,
        format!(
            "SELECT 'messages:' || m.id,
                    'has_attachments=' || COALESCE(m.has_attachments, 'NULL') || {count_text}
                    || ' with ' || COUNT(a.id) || ' attachment rows'
             FROM messages m LEFT JOIN attachments a ON a.message_id = m.id
             GROUP BY m.id
             HAVING (COALESCE(m.has_attachments, 0) != 0) != (COUNT(a.id) > 0){count_mismatch}"
        ),
    )
}

fn body_presence(layout: &SchemaLayout) -> SqlCheck {
    let violations = match layout.body {
        BodyStorage::Inline => {
            "SELECT 'messages:' || id, 'body_text is NULL' FROM messages WHERE body_text IS NULL"
        }
        BodyStorage::Separate => {
            "SELECT 'messages:' || m.id, 'no body row'
             FROM messages m LEFT JOIN message_bodies b ON b.message_id = m.id
             WHERE b.message_id IS NULL OR b.body_text IS NULL"
        }
    };
    SqlCheck::new(BODY_PRESENCE, COUNT_MESSAGES, violations)
}

/// One index entry per message: nothing missing, nothing stale, no duplicates.
fn fts_completeness(conn: &Connection) -> Result<SqlCheck, EvalError> {
    // The docsize shadow table lists indexed documents even when the index
    // reads its content back from `messages`.
    let docsize = format!("{FTS_TABLE}_docsize");
    let entries = if table_exists(conn, &docsize)? {
        format!("SELECT id AS doc FROM {docsize}")
    } else {
        format!("SELECT rowid AS doc FROM {FTS_TABLE}")
    };
    Ok(SqlCheck::new(
        FTS_COMPLETENESS,
        COUNT_MESSAGES,
        format!(
            "SELECT 'messages:' || m.id, 'missing from the full-text index'
             FROM messages m WHERE m.id NOT IN (SELECT doc FROM ({entries}))
             UNION ALL
             SELECT '{FTS_TABLE}:' || e.doc, 'index entry without a message'
             FROM ({entries}) AS e WHERE e.doc NOT IN (SELECT id FROM messages)
             UNION ALL
             SELECT '{FTS_TABLE}:' || e.doc, COUNT(*) || ' index entries'
             FROM ({entries}) AS e GROUP BY e.doc HAVING COUNT(*) > 1"
        ),
    ))
}

struct ThreadMessage {
    id: i64,
    sent_at: String,
    reply_to: Option<i64>,
    position: Option<i64>,
}

fn curated_thread_violations(
    conversation_id: i64,
    messages: &[ThreadMessage],
    layout: &SchemaLayout,
) -> Vec<(String, String)> {
    let mut found = Vec::new();
    if messages.len() != CURATED_THREAD_LEN {
        found.push((
            format!("conversations:{conversation_id}"),
            format!(
                "expected {CURATED_THREAD_LEN} messages, found {}",
                messages.len()
            ),
        ));
    }

    let mut previous: Option<&ThreadMessage> = None;
    for (index, message) in messages.iter().enumerate() {
        let subject = format!("messages:{}", message.id);
        if let Some(previous) = previous
            && message.sent_at < previous.sent_at
        {
            found.push((
                subject.clone(),
                format!("sent {} before its predecessor", message.sent_at),
            ));
        }
        if layout.message_columns.reply_to_message_id {
            let expected = previous.map(|previous| previous.id);
            if message.reply_to != expected {
                found.push((
                    subject.clone(),
                    format!("replies to {:?}, expected {:?}", message.reply_to, expected),
                ));
            }
        }
        if layout.message_columns.thread_position && message.position != Some(index as i64) {
            found.push((
                subject,
                format!("thread_position {:?}, expected {index}", message.position),
            ));
        }
        previous = Some(message);
    }
    found
}
