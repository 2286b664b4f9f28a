use crate::store::CounterMap;

pub const DEFAULT_TOP: usize = 5;

/// Orders a tally by count descending, breaking ties by name so the output is stable, and keeps
/// the first `n` entries.
pub fn top_n(tally: &CounterMap, n: usize) -> Vec<(String, i64)> {
    let mut ranked: Vec<(String, i64)> = tally
        .iter()
        .map(|(name, count)| (name.clone(), *count))
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}
