//! Group-wise quantile filtering

use super::group::GroupKey;
use super::{present, prepare, stats};
use crate::table::HistoryTable;
use crate::{Error, Result};
use arrow::array::BooleanArray;

/// Keep rows whose `column` value lies within its group's
/// `[lower_quantile, upper_quantile]` range (inclusive).
///
/// Bounds are computed per group with linear interpolation, so a one-row
/// group bounds itself and always survives. Rows with a null value are kept.
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column or group key, and
/// `InvalidInput` unless `0 <= lower_quantile <= upper_quantile <= 1` or if
/// `column` is not numeric.
pub fn remove_outliers(
    table: &HistoryTable,
    column: &str,
    lower_quantile: f64,
    upper_quantile: f64,
    groupby: impl Into<GroupKey>,
) -> Result<HistoryTable> {
    let groupby = groupby.into();
    let (values, grouping) = prepare(table, column, &groupby)?;

    if !(0.0..=1.0).contains(&lower_quantile)
        || !(0.0..=1.0).contains(&upper_quantile)
        || lower_quantile > upper_quantile
    {
        return Err(Error::InvalidInput(format!(
            "Quantile bounds must satisfy 0 <= lower <= upper <= 1, got [{lower_quantile}, {upper_quantile}]"
        )));
    }

    let mut keep = vec![true; table.num_rows()];
    for rows in &grouping.rows {
        let sorted = stats::sorted(&present(&values, rows));
        let (Some(lo), Some(hi)) = (
            stats::quantile(&sorted, lower_quantile),
            stats::quantile(&sorted, upper_quantile),
        ) else {
            continue;
        };
        for &row in rows {
            if let Some(v) = values[row] {
                keep[row] = lo <= v && v <= hi;
            }
        }
    }

    if keep.iter().all(|&k| k) {
        return Ok(table.clone());
    }
    let removed = keep.iter().filter(|&&k| !k).count();
    tracing::debug!(column, removed, "removed outliers");
    table.filter(&BooleanArray::from(keep))
}
