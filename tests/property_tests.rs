//! Property-based tests for the transform pipeline
//!
//! - Test mathematical invariants of each transform
//! - Test that filtering transforms never invent or reorder rows
//! - Run with ProptestConfig::with_cases(100)

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use fanda::transform::{
    align_column, downsample, exponential_moving_average, normalize, remove_outliers, truncate,
    Aggregation, DEFAULT_EPSILON,
};
use fanda::HistoryTable;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// One row: run index, step, value (possibly missing)
type Row = (u8, i64, Option<f64>);

fn arb_row() -> impl Strategy<Value = Row> {
    (
        0u8..4,
        0i64..20,
        prop_oneof![4 => (-1000.0f64..1000.0).prop_map(Some), 1 => Just(None)],
    )
}

/// History table with up to 4 runs, repeated steps and missing values
fn arb_table() -> impl Strategy<Value = HistoryTable> {
    proptest::collection::vec(arb_row(), 0..60).prop_map(|rows| {
        let schema = Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("_step", DataType::Int64, true),
            Field::new("value", DataType::Float64, true),
        ]));
        let ids: Vec<String> = rows.iter().map(|(run, _, _)| format!("run-{run}")).collect();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|(_, step, _)| *step))),
            Arc::new(Float64Array::from(
                rows.iter().map(|(_, _, value)| *value).collect::<Vec<_>>(),
            )),
        ];
        HistoryTable::try_new(RecordBatch::try_new(schema, columns).unwrap()).unwrap()
    })
}

/// Step-counter table: run `i` logs steps `0..=k_i`
fn arb_step_table() -> impl Strategy<Value = HistoryTable> {
    proptest::collection::vec(0i64..30, 1..6).prop_map(|lengths| {
        let schema = Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("_step", DataType::Int64, true),
        ]));
        let mut ids = Vec::new();
        let mut steps = Vec::new();
        for (run, last) in lengths.iter().enumerate() {
            for step in 0..=*last {
                ids.push(format!("run-{run}"));
                steps.push(step);
            }
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(Int64Array::from(steps)),
        ];
        HistoryTable::try_new(RecordBatch::try_new(schema, columns).unwrap()).unwrap()
    })
}

/// Rows from `arb_table` with occasional infinite values mixed in
fn arb_table_with_infinities() -> impl Strategy<Value = HistoryTable> {
    (arb_table(), proptest::collection::vec(any::<bool>(), 0..60)).prop_map(|(table, signs)| {
        let values: Vec<Option<f64>> = table
            .float_values("value")
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, v)| match signs.get(i).copied() {
                Some(true) if i % 3 == 0 => Some(f64::INFINITY),
                Some(false) if i % 3 == 0 => Some(f64::NEG_INFINITY),
                _ => v,
            })
            .collect();
        table
            .with_column("value", Arc::new(Float64Array::from(values)))
            .unwrap()
    })
}

fn group_values(table: &HistoryTable) -> Vec<(String, Option<f64>)> {
    table
        .run_ids()
        .unwrap()
        .into_iter()
        .zip(table.float_values("value").unwrap())
        .collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: normalized values lie in [0, 1]; constant groups map to 0
    #[test]
    fn prop_normalize_in_unit_interval(table in arb_table()) {
        let out = normalize(&table, "value", "run_id", DEFAULT_EPSILON).unwrap();
        let before = group_values(&table);
        let after = out.float_values("value").unwrap();

        for (i, value) in after.iter().enumerate() {
            match value {
                Some(v) => {
                    prop_assert!((0.0..=1.0).contains(v), "value {} out of range", v);
                    let run = &before[i].0;
                    let constant = before
                        .iter()
                        .filter(|(r, v)| r == run && v.is_some())
                        .map(|(_, v)| v.unwrap())
                        .all(|v| v == before[i].1.unwrap());
                    if constant {
                        prop_assert_eq!(*v, 0.0);
                    }
                }
                None => prop_assert!(before[i].1.is_none()),
            }
        }
    }

    /// Property: truncate on step counters is idempotent and cuts every run
    /// to the shortest one
    #[test]
    fn prop_truncate_idempotent(table in arb_step_table()) {
        let once = truncate(&table, "_step", "run_id").unwrap();
        let twice = truncate(&once, "_step", "run_id").unwrap();
        prop_assert_eq!(&once, &twice);

        let ids = table.run_ids().unwrap();
        let mut runs = ids.clone();
        runs.dedup();
        let shortest = runs
            .iter()
            .map(|run| ids.iter().filter(|id| *id == run).count())
            .min()
            .unwrap();
        prop_assert_eq!(once.num_rows(), shortest * runs.len());
    }

    /// Property: the full quantile range removes nothing
    #[test]
    fn prop_remove_outliers_full_range_is_identity(table in arb_table()) {
        let out = remove_outliers(&table, "value", 0.0, 1.0, "run_id").unwrap();
        prop_assert_eq!(out, table);
    }

    /// Property: infinite values never make the full range drop rows
    #[test]
    fn prop_remove_outliers_full_range_with_infinities(table in arb_table_with_infinities()) {
        let out = remove_outliers(&table, "value", 0.0, 1.0, "run_id").unwrap();
        prop_assert_eq!(out, table);
    }

    /// Property: remove_outliers keeps a subsequence of the input rows
    #[test]
    fn prop_remove_outliers_keeps_subsequence(
        table in arb_table(),
        lower in 0.0f64..0.5,
        upper in 0.5f64..=1.0,
    ) {
        let out = remove_outliers(&table, "value", lower, upper, "run_id").unwrap();
        let input = group_values(&table);
        let mut rest = input.iter();
        for row in group_values(&out) {
            prop_assert!(rest.any(|r| *r == row), "row {:?} not in input order", row);
        }
    }

    /// Property: aligned values agree within each (run, step) pair
    #[test]
    fn prop_align_consistent_within_step(table in arb_table()) {
        let out = align_column(&table, "value", "run_id", Aggregation::Mean).unwrap();
        let ids = out.run_ids().unwrap();
        let steps = out.float_values("_step").unwrap();
        let values = out.float_values("value").unwrap();

        for i in 0..out.num_rows() {
            for j in (i + 1)..out.num_rows() {
                if ids[i] == ids[j] && steps[i] == steps[j] {
                    prop_assert_eq!(values[i], values[j]);
                }
            }
        }
    }

    /// Property: EMA keeps nulls and stays within each group's range
    #[test]
    fn prop_ema_bounded_by_group_range(table in arb_table(), alpha in 0.01f64..=1.0) {
        let out = exponential_moving_average(&table, "value", alpha, "run_id").unwrap();
        let before = group_values(&table);
        let after = out.float_values("value").unwrap();

        for (i, value) in after.iter().enumerate() {
            prop_assert_eq!(value.is_some(), before[i].1.is_some());
            if let Some(v) = value {
                let run = &before[i].0;
                let group: Vec<f64> = before
                    .iter()
                    .filter(|(r, _)| r == run)
                    .filter_map(|(_, v)| *v)
                    .collect();
                let min = group.iter().copied().fold(f64::INFINITY, f64::min);
                let max = group.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(*v >= min - 1e-9 && *v <= max + 1e-9);
            }
        }
    }

    /// Property: downsample keeps ceil(len / n) rows per group
    #[test]
    fn prop_downsample_row_count(table in arb_table(), n in 1usize..6) {
        let out = downsample(&table, n, "_step", "run_id").unwrap();
        let ids = table.run_ids().unwrap();
        let mut runs = ids.clone();
        runs.sort();
        runs.dedup();
        let expected: usize = runs
            .iter()
            .map(|run| ids.iter().filter(|id| *id == run).count().div_ceil(n))
            .sum();
        prop_assert_eq!(out.num_rows(), expected);
    }
}
