use std::path::Path;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection};

use crate::ask::store::{HistoryStore, QueryError, QueryRows, StatsSnapshot};

const SCHEMA_VERSION: i32 = 1;

/// VM instructions between deadline checks while a query runs.
const PROGRESS_OPS: i32 = 1000;

pub fn init_db(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
",
    )?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS history (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp       INTEGER NOT NULL,
            command         TEXT NOT NULL,
            exit_code       INTEGER NOT NULL DEFAULT 0,
            cwd             TEXT NOT NULL DEFAULT '',
            hostname        TEXT NOT NULL DEFAULT '',
            username        TEXT NOT NULL DEFAULT '',
            shell           TEXT NOT NULL DEFAULT '',
            duration_ms     INTEGER NOT NULL DEFAULT 0,
            git_branch      TEXT,
            hash            TEXT,
            session_id      TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp);
        CREATE INDEX IF NOT EXISTS idx_history_command ON history(command);

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES ('schema_version', ?)",
        params![SCHEMA_VERSION],
    )?;

    Ok(())
}

/// A command to append to the history table.
#[derive(Debug, Clone, Default)]
pub struct NewCommand {
    /// Unix seconds.
    pub timestamp: i64,
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

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(config: &crate::config::Config) -> anyhow::Result<Self> {
        let dir = crate::config::Config::histq_dir();
        std::fs::create_dir_all(&dir)?;
        Self::open_at(&crate::config::Config::db_path(), config.db.busy_timeout_ms)
    }

    pub fn open_at(path: &Path, busy_timeout_ms: u64) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn, busy_timeout_ms)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn, 10000)?;
        Ok(Self { conn })
    }

    pub fn record(&self, cmd: &NewCommand) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO history \
             (timestamp, command, exit_code, cwd, hostname, username, shell, \
              duration_ms, git_branch, hash, session_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                cmd.timestamp,
                cmd.command,
                cmd.exit_code,
                cmd.cwd,
                cmd.hostname,
                cmd.username,
                cmd.shell,
                cmd.duration_ms,
                cmd.git_branch,
                cmd.hash,
                cmd.session_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn command_count(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
    }

    fn read_only_rows(&self, sql: &str) -> Result<QueryRows, QueryError> {
        let mut stmt = self.conn.prepare(sql).map_err(query_error)?;
        if !stmt.readonly() {
            return Err(QueryError::Sql("statement is not read-only".into()));
        }
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt.query([]).map_err(query_error)?;
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i).map_err(query_error)?);
            }
            out.push(values);
        }
        Ok(QueryRows { columns, rows: out })
    }
}

fn query_error(e: rusqlite::Error) -> QueryError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::OperationInterrupted =>
        {
            QueryError::DeadlineExceeded
        }
        _ => QueryError::Sql(e.to_string()),
    }
}

fn epoch_to_utc(secs: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

impl HistoryStore for Db {
    fn collect_stats(&self, top_n: usize) -> anyhow::Result<StatsSnapshot> {
        let (total_commands, unique_commands, success_rate, earliest, latest) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT command), \
                    COALESCE(AVG(CASE WHEN exit_code = 0 THEN 1.0 ELSE 0.0 END), 0.0), \
                    MIN(timestamp), MAX(timestamp) \
             FROM history",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            },
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT command, COUNT(*) AS n FROM history \
             GROUP BY command ORDER BY n DESC, MAX(timestamp) DESC LIMIT ?",
        )?;
        let top_commands = stmt
            .query_map(params![top_n as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StatsSnapshot {
            total_commands,
            unique_commands,
            success_rate,
            earliest: epoch_to_utc(earliest),
            latest: epoch_to_utc(latest),
            top_commands,
        })
    }

    fn query(&self, sql: &str, deadline: Instant) -> Result<QueryRows, QueryError> {
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        let result = self.read_only_rows(sql);
        self.conn.progress_handler(0, None::<fn() -> bool>);
        result
    }
}
