use std::time::{Duration, Instant};

use super::error::AskError;
use super::store::{HistoryRecord, HistoryStore, QueryError};
use super::validate::ValidatedSql;

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub records: Vec<HistoryRecord>,
    pub total_rows: usize,
    pub skipped_rows: usize,
}

/// Run `sql` with a hard deadline and decode every row that fits the
/// history record shape. Rows that do not decode are counted and dropped.
pub fn execute_query(
    store: &dyn HistoryStore,
    sql: &ValidatedSql,
    timeout: Duration,
) -> Result<Execution, AskError> {
    let deadline = Instant::now() + timeout;
    let raw = store.query(sql.as_str(), deadline).map_err(|e| match e {
        QueryError::DeadlineExceeded => AskError::Timeout(timeout),
        QueryError::Sql(msg) => AskError::Execution(msg),
    })?;

    let total_rows = raw.rows.len();
    let mut records = Vec::with_capacity(total_rows);
    let mut first_error = None;
    for values in &raw.rows {
        match HistoryRecord::from_row(&raw.columns, values) {
            Ok(rec) => records.push(rec),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    let skipped_rows = total_rows - records.len();

    tracing::debug!(total_rows, skipped_rows, "query executed");
    if let Some(err) = first_error {
        if skipped_rows == total_rows {
            tracing::warn!(
                total_rows,
                columns = ?raw.columns,
                "no rows matched the history record shape: {err}"
            );
        } else {
            tracing::debug!("skipped {skipped_rows} undecodable rows: {err}");
        }
    }

    Ok(Execution {
        records,
        total_rows,
        skipped_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ask::store::{QueryRows, StatsSnapshot};
    use crate::ask::validate::validate;
    use rusqlite::types::Value;

    enum CannedStore {
        Rows(QueryRows),
        Deadline,
        Failing(&'static str),
    }

    impl HistoryStore for CannedStore {
        fn collect_stats(&self, _top_n: usize) -> anyhow::Result<StatsSnapshot> {
            Ok(StatsSnapshot::default())
        }

        fn query(&self, _sql: &str, _deadline: Instant) -> Result<QueryRows, QueryError> {
            match self {
                CannedStore::Rows(rows) => Ok(rows.clone()),
                CannedStore::Deadline => Err(QueryError::DeadlineExceeded),
                CannedStore::Failing(msg) => Err(QueryError::Sql(msg.to_string())),
            }
        }
    }

    fn sql() -> ValidatedSql {
        validate("SELECT * FROM history").unwrap()
    }

    fn row(id: i64, cmd: &str) -> Vec<Value> {
        vec![
            Value::Integer(id),
            Value::Integer(1_700_000_000),
            Value::Text(cmd.into()),
        ]
    }

    #[test]
    fn decodes_rows_and_skips_bad_ones() {
        let store = CannedStore::Rows(QueryRows {
            columns: vec!["id".into(), "timestamp".into(), "command".into()],
            rows: vec![
                row(1, "ls"),
                vec![Value::Text("x".into()), Value::Integer(0), Value::Text("pwd".into())],
                row(3, "git log"),
            ],
        });
        let exec = execute_query(&store, &sql(), Duration::from_secs(1)).unwrap();
        assert_eq!(exec.total_rows, 3);
        assert_eq!(exec.skipped_rows, 1);
        let ids: Vec<i64> = exec.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn all_rows_skipped_is_not_an_error() {
        let store = CannedStore::Rows(QueryRows {
            columns: vec!["command".into(), "n".into()],
            rows: vec![
                vec![Value::Text("ls".into()), Value::Integer(4)],
                vec![Value::Text("cd".into()), Value::Integer(2)],
            ],
        });
        let exec = execute_query(&store, &sql(), Duration::from_secs(1)).unwrap();
        assert!(exec.records.is_empty());
        assert_eq!(exec.skipped_rows, 2);
    }

    #[test]
    fn deadline_maps_to_timeout() {
        let store = CannedStore::Deadline;
        let err = execute_query(&store, &sql(), Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, AskError::Timeout(d) if d == Duration::from_millis(250)));
    }

    #[test]
    fn sql_error_text_is_surfaced() {
        let store = CannedStore::Failing("no such column: foo");
        let err = execute_query(&store, &sql(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(&err, AskError::Execution(m) if m.contains("no such column: foo")));
    }
}
