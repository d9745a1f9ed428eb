//! Per-group point estimates

use super::group::GroupKey;
use super::{present, prepare, stats};
use crate::table::HistoryTable;
use crate::Result;
use arrow::array::{ArrayRef, Float64Array, UInt64Array};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Name of the non-null value count column in [`summarize`] output.
pub const COUNT: &str = "count";
/// Name of the mean column in [`summarize`] output.
pub const MEAN: &str = "mean";
/// Name of the sample standard deviation column in [`summarize`] output.
pub const STD: &str = "std";
/// Name of the minimum column in [`summarize`] output.
pub const MIN: &str = "min";
/// Name of the maximum column in [`summarize`] output.
pub const MAX: &str = "max";

/// One row per group: the group key columns followed by `count`, `mean`,
/// `std`, `min` and `max` of `column`.
///
/// Groups are sorted by key (null keys first). `std` is the sample standard
/// deviation and is `0.0` for a single value; statistics of a group with no
/// non-null values are null.
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column or group key and
/// `InvalidInput` if `column` is not numeric.
pub fn summarize(
    table: &HistoryTable,
    column: &str,
    groupby: impl Into<GroupKey>,
) -> Result<RecordBatch> {
    let groupby = groupby.into();
    let (values, grouping) = prepare(table, column, &groupby)?;

    let mut order: Vec<usize> = (0..grouping.len()).collect();
    order.sort_by(|&a, &b| grouping.keys[a].cmp(&grouping.keys[b]));

    let first_rows = UInt64Array::from_iter_values(
        order.iter().map(|&g| grouping.rows[g][0] as u64),
    );

    let schema = table.schema();
    let mut fields = Vec::with_capacity(groupby.columns().len() + 5);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
    for name in groupby.columns() {
        let index = table.column_index(name)?;
        fields.push(schema.field(index).clone());
        columns.push(compute::take(table.column(name)?, &first_rows, None)?);
    }

    let mut counts = Vec::with_capacity(order.len());
    let (mut means, mut stds, mut mins, mut maxs) = (
        Vec::with_capacity(order.len()),
        Vec::with_capacity(order.len()),
        Vec::with_capacity(order.len()),
        Vec::with_capacity(order.len()),
    );
    for &g in &order {
        let group = present(&values, &grouping.rows[g]);
        counts.push(group.len() as u64);
        means.push(stats::mean(&group));
        stds.push(stats::std_dev(&group));
        mins.push(stats::min(&group));
        maxs.push(stats::max(&group));
    }

    fields.push(Field::new(COUNT, DataType::UInt64, false));
    columns.push(Arc::new(UInt64Array::from(counts)));
    for (name, data) in [(MEAN, means), (STD, stds), (MIN, mins), (MAX, maxs)] {
        fields.push(Field::new(name, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(data)));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::table_from;
    use arrow::array::{Array, StringArray};

    #[test]
    fn test_one_row_per_group() {
        let table = table_from(&[
            ("b", &[Some(1.0), Some(3.0)]),
            ("a", &[Some(4.0), None]),
        ]);
        let summary = summarize(&table, "value", "run_id").unwrap();
        assert_eq!(summary.num_rows(), 2);

        let ids = summary
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "a");
        assert_eq!(ids.value(1), "b");

        let column = |name: &str| {
            summary
                .column_by_name(name)
                .unwrap()
                .as_any()
                .downcast_ref::<Float64Array>()
                .unwrap()
                .clone()
        };
        assert_eq!(column(MEAN).value(0), 4.0);
        assert_eq!(column(STD).value(0), 0.0);
        assert_eq!(column(MEAN).value(1), 2.0);
        assert!((column(STD).value(1) - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(column(MIN).value(1), 1.0);
        assert_eq!(column(MAX).value(1), 3.0);

        let counts = summary
            .column_by_name(COUNT)
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(counts.values().to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_all_null_group() {
        let table = table_from(&[("a", &[None])]);
        let summary = summarize(&table, "value", "run_id").unwrap();
        assert!(summary.column_by_name(MEAN).unwrap().is_null(0));
    }

    #[test]
    fn test_empty_table() {
        let table = table_from(&[]);
        let summary = summarize(&table, "value", "run_id").unwrap();
        assert_eq!(summary.num_rows(), 0);
        assert_eq!(summary.num_columns(), 6);
    }
}
