use chrono::{DateTime, Local};

use super::error::{AskError, Stage};
use super::snapshot::render_snapshot;
use super::store::StatsSnapshot;
use super::validate::{validate, SqlRejection, ValidatedSql, HISTORY_TABLE};
use crate::provider::Completer;

pub const SCHEMA_DESCRIPTION: &str = "\
CREATE TABLE history (
    id          INTEGER PRIMARY KEY,
    timestamp   INTEGER NOT NULL, -- unix epoch seconds when the command started
    command     TEXT NOT NULL,    -- full command line as typed
    exit_code   INTEGER NOT NULL, -- 0 means success
    cwd         TEXT NOT NULL,    -- working directory
    hostname    TEXT NOT NULL,
    username    TEXT NOT NULL,
    shell       TEXT NOT NULL,    -- zsh, bash, fish, ...
    duration_ms INTEGER NOT NULL,
    git_branch  TEXT,             -- NULL outside a git repository
    hash        TEXT,             -- content fingerprint, may be NULL
    session_id  TEXT NOT NULL
);";

/// One candidate query and the attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlArtifact {
    pub sql: String,
    pub attempt: u32,
    pub rejection: Option<SqlRejection>,
}

/// Progress of SQL generation. Each model response moves an `Attempting`
/// state to `Success`, `Exhausted`, or the next `Attempting`.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationState {
    Attempting {
        attempt: u32,
        previous: Option<SqlArtifact>,
    },
    Success {
        sql: ValidatedSql,
        attempt: u32,
    },
    Exhausted {
        attempts: u32,
        last: SqlArtifact,
    },
}

#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub sql: ValidatedSql,
    pub attempts: u32,
}

pub struct PromptContext<'a> {
    pub snapshot: &'a StatsSnapshot,
    pub question: &'a str,
    pub now: DateTime<Local>,
}

impl GenerationState {
    pub fn start() -> Self {
        GenerationState::Attempting {
            attempt: 1,
            previous: None,
        }
    }

    /// Prompt for the current attempt, or `None` once the state is terminal.
    pub fn prompt(&self, ctx: &PromptContext<'_>) -> Option<String> {
        match self {
            GenerationState::Attempting { previous: None, .. } => Some(build_sql_prompt(ctx)),
            GenerationState::Attempting {
                previous: Some(prev),
                ..
            } => Some(build_correction_prompt(ctx, prev)),
            _ => None,
        }
    }

    /// Apply the cleaned model response for the current attempt.
    pub fn advance(self, candidate: String, max_retries: u32) -> Self {
        let GenerationState::Attempting { attempt, .. } = self else {
            return self;
        };
        match validate(&candidate) {
            Ok(sql) => GenerationState::Success { sql, attempt },
            Err(rejection) => {
                let artifact = SqlArtifact {
                    sql: candidate,
                    attempt,
                    rejection: Some(rejection),
                };
                if attempt >= max_retries {
                    GenerationState::Exhausted {
                        attempts: attempt,
                        last: artifact,
                    }
                } else {
                    GenerationState::Attempting {
                        attempt: attempt + 1,
                        previous: Some(artifact),
                    }
                }
            }
        }
    }
}

pub fn build_sql_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        "You translate questions about a user's shell command history into one SQLite query.\n\n\
         Schema:\n{SCHEMA_DESCRIPTION}\n\n\
         History overview:\n{}\n\
         Current date and time: {}\n\n\
         Rules:\n\
         - Reply with the SQL query only. No explanation, no markdown.\n\
         - Write exactly one SELECT statement that reads from the {HISTORY_TABLE} table.\n\
         - Select whole rows (SELECT *) so every column is available.\n\
         - Compare dates with datetime(timestamp, 'unixepoch', 'localtime').\n\
         - Order by timestamp DESC unless the question implies another order, \
           and add LIMIT 1000 or less.\n\n\
         Question: {}",
        render_snapshot(ctx.snapshot),
        ctx.now.format("%Y-%m-%d %H:%M:%S %:z (%A)"),
        ctx.question,
    )
}

pub fn build_correction_prompt(ctx: &PromptContext<'_>, previous: &SqlArtifact) -> String {
    let reason = previous
        .rejection
        .as_ref()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown problem".into());
    format!(
        "Your previous SQL query was rejected.\n\n\
         Previous query:\n{}\n\n\
         Problem: {reason}\n\n\
         Schema:\n{SCHEMA_DESCRIPTION}\n\n\
         Current date and time: {}\n\n\
         Write a corrected query: exactly one read-only SELECT statement on the \
         {HISTORY_TABLE} table that answers the question below. \
         Reply with the SQL only, no explanation and no markdown.\n\n\
         Question: {}",
        previous.sql,
        ctx.now.format("%Y-%m-%d %H:%M:%S %:z"),
        ctx.question,
    )
}

/// Pull the query out of a model reply: prefer the first fenced block,
/// drop a language tag, stray backticks and surrounding whitespace.
pub fn clean_sql_response(raw: &str) -> String {
    let body = match raw.find("```") {
        Some(open) => {
            let after = &raw[open + 3..];
            let after = match after.find('\n') {
                Some(nl) if !after[..nl].trim().contains(' ') => &after[nl + 1..],
                _ => after.strip_prefix("sql").unwrap_or(after),
            };
            match after.find("```") {
                Some(close) => &after[..close],
                None => after,
            }
        }
        None => raw,
    };
    body.trim().trim_matches('`').trim().to_string()
}

pub async fn generate_sql(
    completer: &dyn Completer,
    ctx: &PromptContext<'_>,
    max_retries: u32,
) -> Result<GeneratedSql, AskError> {
    let mut state = GenerationState::start();

    loop {
        match state {
            GenerationState::Attempting { ref previous, .. } => {
                if let Some(prev) = previous {
                    tracing::info!(
                        attempt = prev.attempt,
                        reason = %prev.rejection.as_ref().map(|r| r.to_string()).unwrap_or_default(),
                        "generated SQL rejected, retrying"
                    );
                }
                let prompt = match previous {
                    None => build_sql_prompt(ctx),
                    Some(prev) => build_correction_prompt(ctx, prev),
                };
                let raw = completer
                    .complete(&prompt)
                    .await
                    .map_err(AskError::provider(Stage::GenerateSql))?;
                state = state.advance(clean_sql_response(&raw), max_retries);
            }
            GenerationState::Success { sql, attempt } => {
                tracing::debug!(attempt, %sql, "generated SQL accepted");
                return Ok(GeneratedSql {
                    sql,
                    attempts: attempt,
                });
            }
            GenerationState::Exhausted { attempts, last } => {
                return Err(AskError::RetriesExhausted {
                    attempts,
                    last_reason: last
                        .rejection
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "unknown problem".into()),
                });
            }
        }
    }
}
