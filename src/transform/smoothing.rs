//! Exponentially weighted moving average

use super::group::GroupKey;
use super::prepare;
use crate::table::HistoryTable;
use crate::{Error, Result};
use arrow::array::Float64Array;
use std::sync::Arc;

/// Replace `column` with its exponential moving average within each group,
/// in row order.
///
/// Uses adjusted weights, `y_t = Σ (1-α)^i x_{t-i} / Σ (1-α)^i`, so the
/// first value of a group is passed through unchanged. A null value keeps
/// its slot in the decay but contributes nothing and stays null in the
/// output. `alpha = 1` returns the column unchanged (as `Float64`).
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column or group key, and
/// `InvalidInput` unless `0 < alpha <= 1` or if `column` is not numeric.
pub fn exponential_moving_average(
    table: &HistoryTable,
    column: &str,
    alpha: f64,
    groupby: impl Into<GroupKey>,
) -> Result<HistoryTable> {
    let groupby = groupby.into();
    let (values, grouping) = prepare(table, column, &groupby)?;

    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(Error::InvalidInput(format!(
            "alpha must be in (0, 1], got {alpha}"
        )));
    }
    let decay = 1.0 - alpha;

    let mut out: Vec<Option<f64>> = vec![None; table.num_rows()];
    for rows in &grouping.rows {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for &row in rows {
            numerator *= decay;
            denominator *= decay;
            if let Some(v) = values[row] {
                numerator += v;
                denominator += 1.0;
                out[row] = Some(numerator / denominator);
            }
        }
    }

    table.with_column(column, Arc::new(Float64Array::from(out)))
}
