//! Stride sampling within groups

use super::group::GroupKey;
use super::prepare;
use crate::table::HistoryTable;
use crate::{Error, Result};
use std::cmp::Ordering;

/// Sort by `(groupby, column)` and keep every `n`-th row of each group,
/// starting with the first.
///
/// Groups are ordered by key (null keys first); within a group, null
/// `column` values sort last and ties keep table order. `n = 1` only sorts.
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column or group key, and
/// `InvalidInput` for `n = 0` or a non-numeric column.
pub fn downsample(
    table: &HistoryTable,
    n: usize,
    column: &str,
    groupby: impl Into<GroupKey>,
) -> Result<HistoryTable> {
    let groupby = groupby.into();
    let (values, grouping) = prepare(table, column, &groupby)?;

    if n == 0 {
        return Err(Error::InvalidInput("downsample stride must be at least 1".to_string()));
    }

    let mut order: Vec<usize> = (0..table.num_rows()).collect();
    order.sort_by(|&a, &b| {
        let (ga, gb) = (grouping.group_of_row[a], grouping.group_of_row[b]);
        grouping.keys[ga]
            .cmp(&grouping.keys[gb])
            .then_with(|| match (values[a], values[b]) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });

    let mut seen = vec![0usize; grouping.len()];
    let indices: Vec<usize> = order
        .into_iter()
        .filter(|&row| {
            let count = &mut seen[grouping.group_of_row[row]];
            let keep = *count % n == 0;
            *count += 1;
            keep
        })
        .collect();

    tracing::debug!(column, n, kept = indices.len(), "downsampled");
    table.take(&indices)
}
