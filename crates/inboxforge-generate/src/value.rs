use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, params_from_iter};

/// Storage format of every timestamp column; sorts lexicographically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Generated value for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl GeneratedValue {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    pub fn opt_int(value: Option<i64>) -> Self {
        value.map(Self::Int).unwrap_or(Self::Null)
    }
}

impl ToSql for GeneratedValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            GeneratedValue::Null => ToSqlOutput::Owned(Value::Null),
            GeneratedValue::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            GeneratedValue::Int(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            GeneratedValue::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            GeneratedValue::Timestamp(value) => {
                ToSqlOutput::Owned(Value::Text(format_timestamp(value)))
            }
        })
    }
}

/// A single-row INSERT whose column list follows the detected layout.
#[derive(Debug, Clone)]
pub struct RowInsert {
    table: &'static str,
    columns: Vec<&'static str>,
    values: Vec<GeneratedValue>,
}

impl RowInsert {
    pub fn into_table(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: GeneratedValue) -> Self {
        self.columns.push(column);
        self.values.push(value);
        self
    }

    /// Set `column` only when the active schema defines it.
    pub fn set_if(self, present: bool, column: &'static str, value: GeneratedValue) -> Self {
        if present { self.set(column, value) } else { self }
    }

    pub fn sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// Execute and return the new rowid.
    pub fn execute(&self, conn: &Connection) -> rusqlite::Result<i64> {
        let mut stmt = conn.prepare_cached(&self.sql())?;
        stmt.execute(params_from_iter(self.values.iter()))?;
        Ok(conn.last_insert_rowid())
    }
}
