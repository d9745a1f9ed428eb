//! Cut every group to the shortest group's extent

use super::group::GroupKey;
use super::{present, prepare, stats};
use crate::table::HistoryTable;
use crate::Result;
use arrow::array::BooleanArray;

/// Keep rows with `column <= m`, where `m` is the smallest per-group
/// maximum of `column`.
///
/// Aligns runs of different lengths to the shortest one. Repeated
/// application is a no-op when every group covers a contiguous range up to
/// its maximum, as a step counter does; on arbitrary values a second pass
/// may cut further. Groups whose
/// values are all null do not contribute to `m`; rows with a null value
/// are kept.
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column or group key and
/// `InvalidInput` if `column` is not numeric.
pub fn truncate(
    table: &HistoryTable,
    column: &str,
    groupby: impl Into<GroupKey>,
) -> Result<HistoryTable> {
    let groupby = groupby.into();
    let (values, grouping) = prepare(table, column, &groupby)?;

    let Some(limit) = grouping
        .rows
        .iter()
        .filter_map(|rows| stats::max(&present(&values, rows)))
        .min_by(f64::total_cmp)
    else {
        return Ok(table.clone());
    };

    let keep: Vec<bool> = values.iter().map(|v| v.map_or(true, |v| v <= limit)).collect();
    if keep.iter().all(|&k| k) {
        return Ok(table.clone());
    }
    tracing::debug!(column, limit, "truncated groups");
    table.filter(&BooleanArray::from(keep))
}
