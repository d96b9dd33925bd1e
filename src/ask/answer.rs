use std::fmt::Write;

use super::chunk::{chunk_records, estimate_tokens};
use super::error::{AskError, Stage};
use super::store::HistoryRecord;
use crate::provider::Completer;

const PLAIN_TEXT_RULE: &str =
    "The answer is shown in a plain-text terminal: do not use markdown, \
     bullet symbols, headings, tables or code fences.";

fn render_records(records: &[HistoryRecord]) -> String {
    let mut out = String::new();
    for r in records {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.cwd,
            r.command
        );
    }
    out
}

pub fn build_format_prompt(question: &str, records: &[HistoryRecord]) -> String {
    format!(
        "Answer the user's question about their shell history using the matching \
         commands below.\n\n\
         Question: {question}\n\n\
         Matching commands ({} total, format: [time] directory: command):\n{}\n\
         Answer concisely and directly. {PLAIN_TEXT_RULE}",
        records.len(),
        render_records(records),
    )
}

pub fn build_chunk_summary_prompt(question: &str, index: usize, total: usize, chunk: &[HistoryRecord]) -> String {
    format!(
        "This is part {index} of {total} of a list of shell commands retrieved to \
         answer the question: {question}\n\n\
         Commands (format: [time] directory: command):\n{}\n\
         Summarize what these commands show in 2-3 sentences, keeping concrete \
         details (names, counts, dates) that help answer the question. {PLAIN_TEXT_RULE}",
        render_records(chunk),
    )
}

pub fn build_synthesis_prompt(question: &str, summaries: &[String]) -> String {
    let mut parts = String::new();
    for (i, s) in summaries.iter().enumerate() {
        let _ = writeln!(parts, "Part {}: {}", i + 1, s.trim());
    }
    format!(
        "The user asked about their shell history: {question}\n\n\
         The matching commands were too many to show at once, so they were \
         summarized in {} ordered parts:\n{parts}\n\
         Combine these summaries into one coherent answer to the question. \
         {PLAIN_TEXT_RULE}",
        summaries.len(),
    )
}

/// Turn the query results into the final answer. Small result sets are
/// answered in one call; larger ones are summarized chunk by chunk and
/// then synthesized.
pub async fn answer_from_records(
    completer: &dyn Completer,
    question: &str,
    records: &[HistoryRecord],
    max_tokens_per_chunk: usize,
) -> Result<String, AskError> {
    let estimated = estimate_tokens(records);
    if estimated < max_tokens_per_chunk {
        tracing::debug!(estimated, "formatting results in a single request");
        let prompt = build_format_prompt(question, records);
        return completer
            .complete(&prompt)
            .await
            .map_err(AskError::provider(Stage::Format));
    }

    let chunks = chunk_records(records, max_tokens_per_chunk);
    tracing::debug!(estimated, chunks = chunks.len(), "summarizing results in chunks");

    let mut summaries = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let prompt = build_chunk_summary_prompt(question, i + 1, chunks.len(), chunk);
        let summary = completer
            .complete(&prompt)
            .await
            .map_err(AskError::provider(Stage::Summarize))?;
        summaries.push(summary);
    }

    let prompt = build_synthesis_prompt(question, &summaries);
    completer
        .complete(&prompt)
        .await
        .map_err(AskError::provider(Stage::Synthesize))
}
