use std::fmt::Write;

use super::error::AskError;
use super::store::{HistoryStore, StatsSnapshot};

pub fn build_snapshot(store: &dyn HistoryStore, top_n: usize) -> Result<StatsSnapshot, AskError> {
    let snapshot = store.collect_stats(top_n).map_err(AskError::Snapshot)?;
    tracing::debug!(
        total = snapshot.total_commands,
        unique = snapshot.unique_commands,
        top = snapshot.top_commands.len(),
        "history snapshot built"
    );
    Ok(snapshot)
}

/// Plain-text rendering embedded in the SQL generation prompt.
pub fn render_snapshot(snapshot: &StatsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total commands: {}", snapshot.total_commands);
    let _ = writeln!(out, "Unique commands: {}", snapshot.unique_commands);
    let _ = writeln!(out, "Success rate: {:.1}%", snapshot.success_rate * 100.0);
    match (snapshot.earliest, snapshot.latest) {
        (Some(first), Some(last)) => {
            let _ = writeln!(
                out,
                "Date range: {} to {}",
                first.format("%Y-%m-%d %H:%M:%S"),
                last.format("%Y-%m-%d %H:%M:%S")
            );
        }
        _ => {
            let _ = writeln!(out, "Date range: (no history recorded)");
        }
    }
    if !snapshot.top_commands.is_empty() {
        let _ = writeln!(out, "Most frequent commands:");
        for (i, (cmd, count)) in snapshot.top_commands.iter().enumerate() {
            let _ = writeln!(out, "  {}. {cmd} ({count})", i + 1);
        }
    }
    out
}
