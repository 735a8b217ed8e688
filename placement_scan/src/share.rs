use crate::error::{ReportError, Result};
use crate::grouping::AggregateRow;
use crate::record::Counter;

/// An aggregate row after ranking by volume.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    /// Position after the descending sort, starting at 0.
    pub index: usize,
    pub row: AggregateRow,
    pub volume: u64,
    /// Whole-percent share of total volume, truncated.
    pub share: u64,
    /// Running sum of the truncated `share` values.
    pub cumulative_share: u64,
}

/// Sorts `rows` by `volume` descending and adds share / cumulative share.
///
/// Ties keep their incoming order. Fails with [`ReportError::EmptyInput`]
/// when there are no rows or the total volume is zero.
pub fn add_share_columns(mut rows: Vec<AggregateRow>, volume: Counter) -> Result<Vec<RankedRow>> {
    if rows.is_empty() {
        return Err(ReportError::EmptyInput(format!(
            "no rows to rank by {volume}"
        )));
    }
    let total: u64 = rows.iter().map(|r| r.volume(volume)).sum();
    if total == 0 {
        return Err(ReportError::EmptyInput(format!(
            "total {volume} is zero across {} rows",
            rows.len()
        )));
    }

    rows.sort_by(|a, b| b.volume(volume).cmp(&a.volume(volume)));

    let mut cumulative = 0u64;
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let v = row.volume(volume);
            let share = share_of(v, total);
            cumulative += share;
            RankedRow {
                index,
                row,
                volume: v,
                share,
                cumulative_share: cumulative,
            }
        })
        .collect())
}

/// `part / total * 100`, truncated toward zero. Integer arithmetic so exact
/// percentages stay exact.
fn share_of(part: u64, total: u64) -> u64 {
    (u128::from(part) * 100 / u128::from(total)) as u64
}
