use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;

/// Aggregate view of the history table used to ground SQL generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total_commands: i64,
    pub unique_commands: i64,
    /// Fraction of rows with exit code 0, in `0.0..=1.0`.
    pub success_rate: f64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub top_commands: Vec<(String, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub exit_code: i32,
    pub cwd: String,
    pub hostname: String,
    pub username: String,
    pub shell: String,
    pub duration_ms: i64,
    pub git_branch: Option<String>,
    pub hash: Option<String>,
    pub session_id: String,
}

/// Raw output of a single statement: column names plus one cell vector per row.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query did not finish before its deadline")]
    DeadlineExceeded,
    #[error("{0}")]
    Sql(String),
}

/// Read-only access to the history store.
pub trait HistoryStore {
    fn collect_stats(&self, top_n: usize) -> anyhow::Result<StatsSnapshot>;

    fn query(&self, sql: &str, deadline: Instant) -> Result<QueryRows, QueryError>;
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("missing column `{0}`")]
    MissingColumn(&'static str),
    #[error("column `{column}` has unexpected type {found}")]
    WrongType { column: &'static str, found: &'static str },
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Integer(_) => "INTEGER",
        Value::Real(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Blob(_) => "BLOB",
    }
}

struct RowView<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    fn required(&self, name: &'static str) -> Result<&'a Value, DecodeError> {
        self.get(name).ok_or(DecodeError::MissingColumn(name))
    }

    fn int(&self, name: &'static str) -> Result<Option<i64>, DecodeError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(Value::Real(f)) => Ok(Some(*f as i64)),
            Some(other) => Err(DecodeError::WrongType {
                column: name,
                found: type_name(other),
            }),
        }
    }

    fn text(&self, name: &'static str) -> Result<Option<String>, DecodeError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(Value::Integer(i)) => Ok(Some(i.to_string())),
            Some(other) => Err(DecodeError::WrongType {
                column: name,
                found: type_name(other),
            }),
        }
    }
}

fn decode_timestamp(value: &Value) -> Result<DateTime<Utc>, DecodeError> {
    match value {
        Value::Integer(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| DecodeError::Timestamp(secs.to_string())),
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| DecodeError::Timestamp(s.clone())),
        other => Err(DecodeError::WrongType {
            column: "timestamp",
            found: type_name(other),
        }),
    }
}

impl HistoryRecord {
    /// Decode one result row by column name. `id`, `timestamp` and
    /// `command` are required; everything else falls back to an empty value.
    pub fn from_row(columns: &[String], values: &[Value]) -> Result<Self, DecodeError> {
        let row = RowView { columns, values };

        let id = match row.required("id")? {
            Value::Integer(i) => *i,
            other => {
                return Err(DecodeError::WrongType {
                    column: "id",
                    found: type_name(other),
                })
            }
        };
        let timestamp = decode_timestamp(row.required("timestamp")?)?;
        let command = match row.required("command")? {
            Value::Text(s) => s.clone(),
            other => {
                return Err(DecodeError::WrongType {
                    column: "command",
                    found: type_name(other),
                })
            }
        };

        Ok(Self {
            id,
            timestamp,
            command,
            exit_code: row.int("exit_code")?.unwrap_or(0) as i32,
            cwd: row.text("cwd")?.unwrap_or_default(),
            hostname: row.text("hostname")?.unwrap_or_default(),
            username: row.text("username")?.unwrap_or_default(),
            shell: row.text("shell")?.unwrap_or_default(),
            duration_ms: row.int("duration_ms")?.unwrap_or(0),
            git_branch: row.text("git_branch")?,
            hash: row.text("hash")?,
            session_id: row.text("session_id")?.unwrap_or_default(),
        })
    }
}
