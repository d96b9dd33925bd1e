use std::time::Duration;

/// Pipeline stage that talked to the language model when a provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GenerateSql,
    Format,
    Summarize,
    Synthesize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::GenerateSql => write!(f, "SQL generation"),
            Stage::Format => write!(f, "answer formatting"),
            Stage::Summarize => write!(f, "chunk summarization"),
            Stage::Synthesize => write!(f, "answer synthesis"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("history questions are disabled (set ask.enabled = true in the config)")]
    Disabled,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("failed to collect history statistics: {0:#}")]
    Snapshot(anyhow::Error),

    #[error("language model request failed during {stage}: {cause:#}")]
    Provider { stage: Stage, cause: anyhow::Error },

    #[error("no valid SQL after {attempts} attempts (last problem: {last_reason})")]
    RetriesExhausted { attempts: u32, last_reason: String },

    #[error("query failed: {0}")]
    Execution(String),

    #[error("query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl AskError {
    pub(crate) fn provider(stage: Stage) -> impl FnOnce(anyhow::Error) -> AskError {
        move |cause| AskError::Provider { stage, cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_single_line_and_name_the_stage() {
        let err = AskError::Provider {
            stage: Stage::Summarize,
            cause: anyhow::anyhow!("API error (401): bad key"),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk summarization"));
        assert!(msg.contains("401"));
        assert!(!msg.contains('\n'));
    }

    #[test]
    fn exhausted_names_attempt_count() {
        let err = AskError::RetriesExhausted {
            attempts: 3,
            last_reason: "query must start with SELECT".into(),
        };
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn timeout_reports_seconds() {
        assert_eq!(
            AskError::Timeout(Duration::from_secs(5)).to_string(),
            "query timed out after 5s"
        );
    }
}
