//! Group-wise min-max scaling

use super::group::GroupKey;
use super::{present, prepare, stats};
use crate::table::HistoryTable;
use crate::{Error, Result};
use arrow::array::Float64Array;
use std::sync::Arc;

/// Default denominator guard for [`normalize`].
pub const DEFAULT_EPSILON: f64 = f64::EPSILON;

/// Rescale `column` within each group to `(v - min) / (max - min + epsilon)`.
///
/// A constant group maps to `0.0`, as does any value whose denominator is
/// zero. The output column is `Float64`; nulls stay null.
///
/// # Errors
///
/// Returns `ColumnNotFound` for a missing column or group key, and
/// `InvalidInput` for a negative or non-finite `epsilon` or a non-numeric
/// column.
pub fn normalize(
    table: &HistoryTable,
    column: &str,
    groupby: impl Into<GroupKey>,
    epsilon: f64,
) -> Result<HistoryTable> {
    let groupby = groupby.into();
    let (values, grouping) = prepare(table, column, &groupby)?;

    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(Error::InvalidInput(format!(
            "epsilon must be finite and non-negative, got {epsilon}"
        )));
    }

    let mut out: Vec<Option<f64>> = vec![None; table.num_rows()];
    for rows in &grouping.rows {
        let group = present(&values, rows);
        let (Some(min), Some(max)) = (stats::min(&group), stats::max(&group)) else {
            continue;
        };
        let denominator = max - min + epsilon;
        for &row in rows {
            out[row] = values[row].map(|v| {
                let scaled = (v - min) / denominator;
                if scaled.is_finite() {
                    scaled
                } else {
                    0.0
                }
            });
        }
    }

    table.with_column(column, Arc::new(Float64Array::from(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::table_from;

    #[test]
    fn test_scales_each_group_to_unit_range() {
        let table = table_from(&[
            ("a", &[Some(0.0), Some(5.0), Some(10.0)]),
            ("b", &[Some(100.0), Some(300.0)]),
        ]);
        let out = normalize(&table, "value", "run_id", 0.0).unwrap();
        assert_eq!(
            out.float_values("value").unwrap(),
            vec![Some(0.0), Some(0.5), Some(1.0), Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn test_constant_group_is_zero() {
        let table = table_from(&[("a", &[Some(3.0), Some(3.0)])]);
        for epsilon in [0.0, DEFAULT_EPSILON] {
            let out = normalize(&table, "value", "run_id", epsilon).unwrap();
            assert_eq!(out.float_values("value").unwrap(), vec![Some(0.0), Some(0.0)]);
        }
    }

    #[test]
    fn test_nulls_stay_null() {
        let table = table_from(&[("a", &[Some(1.0), None, Some(3.0)])]);
        let out = normalize(&table, "value", "run_id", DEFAULT_EPSILON).unwrap();
        let values = out.float_values("value").unwrap();
        assert!(values[1].is_none());
        assert!(values[2].unwrap() <= 1.0);
    }

    #[test]
    fn test_input_is_untouched() {
        let table = table_from(&[("a", &[Some(1.0), Some(3.0)])]);
        let before = table.clone();
        let _ = normalize(&table, "value", "run_id", DEFAULT_EPSILON).unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_rejects_bad_epsilon() {
        let table = table_from(&[("a", &[Some(1.0)])]);
        assert!(matches!(
            normalize(&table, "value", "run_id", -1.0),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            normalize(&table, "value", "run_id", f64::INFINITY),
            Err(Error::InvalidInput(_))
        ));
    }
}
