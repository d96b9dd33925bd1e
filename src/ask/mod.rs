//! Natural-language questions over the shell history.
//!
//! The pipeline runs strictly in order: snapshot the store, generate and
//! validate SQL (retrying with feedback), execute it under a deadline, then
//! turn the rows into a plain-text answer, chunking when they are too large
//! for a single prompt.

pub mod answer;
pub mod chunk;
pub mod error;
pub mod execute;
pub mod generate;
pub mod snapshot;
pub mod store;
pub mod validate;

use std::time::Duration;

pub use error::{AskError, Stage};
pub use store::{HistoryRecord, HistoryStore, QueryError, QueryRows, StatsSnapshot};
pub use validate::{validate, SqlRejection, ValidatedSql};

use crate::config::AskConfig;
use crate::provider::Completer;

pub const NO_DATA_MESSAGE: &str = "No matching commands found in your history.";

#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: String,
    pub sql: ValidatedSql,
    pub attempts: u32,
    pub total_rows: usize,
    pub skipped_rows: usize,
}

impl AskOutcome {
    /// Set when the query returned rows but none of them looked like a
    /// history record, so the answer says nothing matched.
    pub fn warning(&self) -> Option<String> {
        if self.total_rows > 0 && self.skipped_rows == self.total_rows {
            Some(format!(
                "the query returned {} rows but none had the id, timestamp and command columns; \
                 they were left out of the answer",
                self.total_rows
            ))
        } else {
            None
        }
    }
}

pub async fn ask(
    question: &str,
    config: &AskConfig,
    store: &dyn HistoryStore,
    completer: &dyn Completer,
) -> Result<AskOutcome, AskError> {
    if !config.enabled {
        return Err(AskError::Disabled);
    }
    let question = question.trim();
    if question.is_empty() {
        return Err(AskError::EmptyQuestion);
    }

    let snapshot = snapshot::build_snapshot(store, config.top_commands)?;
    let ctx = generate::PromptContext {
        snapshot: &snapshot,
        question,
        now: chrono::Local::now(),
    };
    let generated =
        generate::generate_sql(completer, &ctx, config.effective_max_retries()).await?;

    let timeout = Duration::from_secs(config.execution_timeout_seconds.max(1));
    let execution = execute::execute_query(store, &generated.sql, timeout)?;

    let answer = if execution.records.is_empty() {
        NO_DATA_MESSAGE.to_string()
    } else {
        answer::answer_from_records(
            completer,
            question,
            &execution.records,
            config.effective_max_tokens_per_chunk(),
        )
        .await?
    };

    Ok(AskOutcome {
        answer,
        sql: generated.sql,
        attempts: generated.attempts,
        total_rows: execution.total_rows,
        skipped_rows: execution.skipped_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::provider::testing::ScriptedCompleter;

    fn seeded_db() -> Db {
        let db = Db::open_in_memory().expect("in-memory db");
        for (i, cmd) in ["git status", "cargo build", "git push", "ls"].iter().enumerate() {
            db.record(&crate::db::NewCommand {
                timestamp: 1_700_000_000 + i as i64 * 60,
                command: cmd.to_string(),
                cwd: "/home/me/project".into(),
                exit_code: 0,
                ..Default::default()
            })
            .unwrap();
        }
        db
    }

    fn config() -> AskConfig {
        AskConfig::default()
    }

    #[tokio::test]
    async fn disabled_refuses_before_any_call() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new(Vec::<&str>::new());
        let cfg = AskConfig {
            enabled: false,
            ..config()
        };
        let err = ask("anything", &cfg, &db, &completer).await.unwrap_err();
        assert!(matches!(err, AskError::Disabled));
        assert!(completer.prompts().is_empty());
    }

    #[tokio::test]
    async fn blank_question_rejected() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new(Vec::<&str>::new());
        let err = ask("   ", &config(), &db, &completer).await.unwrap_err();
        assert!(matches!(err, AskError::EmptyQuestion));
    }

    #[tokio::test]
    async fn end_to_end_with_retry() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new([
            "SELECT * FROM commands",
            "```sql\nSELECT * FROM history WHERE command LIKE 'git%' ORDER BY timestamp DESC\n```",
            "You ran git push and git status.",
        ]);
        let out = ask("which git commands did I run?", &config(), &db, &completer)
            .await
            .unwrap();
        assert_eq!(out.answer, "You ran git push and git status.");
        assert_eq!(out.attempts, 2);
        assert_eq!(out.total_rows, 2);
        assert_eq!(out.skipped_rows, 0);

        let prompts = completer.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("Total commands: 4"));
        assert!(prompts[2].contains("git push"));
        assert!(!prompts[2].contains("cargo build"));
    }

    #[tokio::test]
    async fn empty_result_short_circuits() {
        let db = seeded_db();
        let completer =
            ScriptedCompleter::new(["SELECT * FROM history WHERE command = 'nothing-like-this'"]);
        let out = ask("did I run it?", &config(), &db, &completer).await.unwrap();
        assert_eq!(out.answer, NO_DATA_MESSAGE);
        assert!(out.warning().is_none());
        assert_eq!(completer.prompts().len(), 1);
    }

    #[tokio::test]
    async fn aggregate_query_rows_are_skipped_not_fatal() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new([
            "SELECT command, COUNT(*) AS n FROM history GROUP BY command",
        ]);
        let out = ask("counts?", &config(), &db, &completer).await.unwrap();
        assert_eq!(out.total_rows, 4);
        assert_eq!(out.skipped_rows, 4);
        assert_eq!(out.answer, NO_DATA_MESSAGE);
        let warning = out.warning().expect("all rows skipped is reported");
        assert!(warning.contains("4 rows"), "{warning}");
    }

    #[tokio::test]
    async fn matching_rows_carry_no_warning() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new([
            "SELECT * FROM history WHERE command = 'ls'",
            "You ran ls once.",
        ]);
        let out = ask("did I run ls?", &config(), &db, &completer).await.unwrap();
        assert_eq!(out.total_rows, 1);
        assert!(out.warning().is_none());
    }

    #[tokio::test]
    async fn unknown_column_is_fatal_execution_error() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new(["SELECT * FROM history WHERE nope = 1"]);
        let err = ask("q", &config(), &db, &completer).await.unwrap_err();
        match err {
            AskError::Execution(msg) => assert!(msg.contains("nope"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(completer.prompts().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_stop_the_pipeline() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new(["nope", "nope", "nope", "unused"]);
        let cfg = AskConfig {
            max_retries: 3,
            ..config()
        };
        let err = ask("q", &cfg, &db, &completer).await.unwrap_err();
        assert!(matches!(err, AskError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(completer.prompts().len(), 3);
    }

    #[tokio::test]
    async fn large_results_go_through_chunking() {
        let db = seeded_db();
        let completer = ScriptedCompleter::new([
            "SELECT * FROM history ORDER BY id",
            "first two",
            "last two",
            "combined",
        ]);
        // each row: (len(cmd) + 16 + 30) / 4 ~= 13-14 tokens; budget 30 -> 2 per chunk
        let cfg = AskConfig {
            max_tokens_per_chunk: 30,
            ..config()
        };
        let out = ask("summarize", &cfg, &db, &completer).await.unwrap();
        assert_eq!(out.answer, "combined");
        let prompts = completer.prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[1].contains("git status") && prompts[1].contains("cargo build"));
        assert!(prompts[2].contains("git push") && prompts[2].contains("] /home/me/project: ls"));
    }
}
