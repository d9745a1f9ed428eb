//! Collapse repeated observations at the same step

use super::group::GroupKey;
use super::{present, prepare, Aggregation};
use crate::table::{HistoryTable, STEP};
use crate::Result;
use arrow::array::Float64Array;
use std::sync::Arc;

/// Replace `column` on every row with the aggregate of `column` over all
/// rows sharing the same `(groupby, _step)` pair.
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column, group key or `_step`
/// column, and `InvalidInput` if `column` is not numeric.
pub fn align_column(
    table: &HistoryTable,
    column: &str,
    groupby: impl Into<GroupKey>,
    aggregation: Aggregation,
) -> Result<HistoryTable> {
    align_column_on(table, column, groupby, STEP, aggregation)
}

/// [`align_column`] keyed on an arbitrary step column.
///
/// # Errors
///
/// See [`align_column`].
pub fn align_column_on(
    table: &HistoryTable,
    column: &str,
    groupby: impl Into<GroupKey>,
    step_column: &str,
    aggregation: Aggregation,
) -> Result<HistoryTable> {
    let key = groupby.into().with_column(step_column);
    let (values, grouping) = prepare(table, column, &key)?;

    let mut out: Vec<Option<f64>> = vec![None; table.num_rows()];
    for rows in &grouping.rows {
        let aggregate = aggregation.apply(&present(&values, rows));
        for &row in rows {
            out[row] = aggregate;
        }
    }

    tracing::debug!(column, ?aggregation, groups = grouping.len(), "aligned column");
    table.with_column(column, Arc::new(Float64Array::from(out)))
}
