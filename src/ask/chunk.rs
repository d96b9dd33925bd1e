use super::store::HistoryRecord;

/// Per-record allowance for timestamp, separators and prompt framing.
pub const RECORD_OVERHEAD_CHARS: usize = 30;
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token cost of one record as it appears in a prompt. Not tied to
/// any real tokenizer.
pub fn estimate_record_tokens(record: &HistoryRecord) -> usize {
    (record.command.len() + record.cwd.len() + RECORD_OVERHEAD_CHARS) / CHARS_PER_TOKEN
}

pub fn estimate_tokens(records: &[HistoryRecord]) -> usize {
    records.iter().map(estimate_record_tokens).sum()
}

/// Greedy, order-preserving split of `items` into slices whose summed cost
/// stays within `budget`. An item that alone exceeds the budget gets its own
/// slice. The returned slices concatenate back to `items` exactly.
pub fn chunk_by_cost<T>(items: &[T], budget: usize, cost: impl Fn(&T) -> usize) -> Vec<&[T]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut running = 0usize;

    for (i, item) in items.iter().enumerate() {
        let c = cost(item);
        if running + c > budget && i > start {
            chunks.push(&items[start..i]);
            start = i;
            running = c;
        } else {
            running += c;
        }
    }
    if start < items.len() {
        chunks.push(&items[start..]);
    }
    chunks
}

pub fn chunk_records(records: &[HistoryRecord], max_tokens_per_chunk: usize) -> Vec<&[HistoryRecord]> {
    chunk_by_cost(records, max_tokens_per_chunk, estimate_record_tokens)
}
