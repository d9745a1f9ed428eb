//! Scalar statistics over the non-null values of a group

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Linear-interpolation quantile of ascending `sorted` values.
///
/// `pos = q * (n - 1)`; a single value is its own quantile for every `q`.
/// Exact positions return the stored value, so infinities never turn
/// into NaN at `q = 0` or `q = 1`.
#[allow(clippy::float_cmp)]
pub(crate) fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    #[allow(clippy::cast_precision_loss)]
    let pos = q.clamp(0.0, 1.0) * last as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(last);
    #[allow(clippy::cast_precision_loss)]
    let frac = pos - lo as f64;
    let (a, b) = (sorted[lo], sorted[hi]);
    if frac == 0.0 || a == b {
        return Some(a);
    }
    // Weighted form keeps a single infinite endpoint infinite
    let value = a.mul_add(1.0 - frac, b * frac);
    if value.is_nan() {
        return Some(if frac < 0.5 { a } else { b });
    }
    Some(value)
}

/// Ascending copy of `values`.
pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (ddof = 1); zero for a single value.
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    #[allow(clippy::cast_precision_loss)]
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

pub(crate) fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().min_by(f64::total_cmp)
}

pub(crate) fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().max_by(f64::total_cmp)
}

/// Aggregate used by `align_column` to collapse rows sharing a
/// `(group, step)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean
    #[default]
    Mean,
    /// Median (0.5 quantile, interpolated)
    Median,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Sum of values
    Sum,
    /// First non-null value in row order
    First,
    /// Last non-null value in row order
    Last,
}

impl Aggregation {
    /// Aggregate the non-null values of one group (in row order).
    ///
    /// Returns `None` for an empty group.
    #[must_use]
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        match self {
            Self::Mean => mean(values),
            Self::Median => quantile(&sorted(values), 0.5),
            Self::Min => min(values),
            Self::Max => max(values),
            Self::Sum => (!values.is_empty()).then(|| values.iter().sum()),
            Self::First => values.first().copied(),
            Self::Last => values.last().copied(),
        }
    }
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "avg" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(Error::InvalidInput(format!("Unknown aggregation: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        let q = quantile(&values, 0.5).unwrap();
        assert!((q - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_single_point() {
        assert_eq!(quantile(&[7.0], 0.01), Some(7.0));
        assert_eq!(quantile(&[7.0], 0.99), Some(7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_quantile_with_infinities() {
        let values = [f64::NEG_INFINITY, 1.0, f64::INFINITY];
        assert_eq!(quantile(&values, 0.0), Some(f64::NEG_INFINITY));
        assert_eq!(quantile(&values, 1.0), Some(f64::INFINITY));
        assert_eq!(quantile(&values, 0.25), Some(f64::NEG_INFINITY));
        assert_eq!(quantile(&values, 0.75), Some(f64::INFINITY));
        let both = [f64::NEG_INFINITY, f64::INFINITY];
        assert!(quantile(&both, 0.5).is_some_and(|q| !q.is_nan()));
    }

    #[test]
    fn test_std_dev() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.138_089_935).abs() < 1e-6);
        assert_eq!(std_dev(&[3.0]), Some(0.0));
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn test_aggregations() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(Aggregation::Mean.apply(&values), Some(2.0));
        assert_eq!(Aggregation::Median.apply(&values), Some(2.0));
        assert_eq!(Aggregation::Min.apply(&values), Some(1.0));
        assert_eq!(Aggregation::Max.apply(&values), Some(3.0));
        assert_eq!(Aggregation::Sum.apply(&values), Some(6.0));
        assert_eq!(Aggregation::First.apply(&values), Some(3.0));
        assert_eq!(Aggregation::Last.apply(&values), Some(2.0));
        assert_eq!(Aggregation::Sum.apply(&[]), None);
    }

    #[test]
    fn test_aggregation_from_str() {
        assert_eq!("Mean".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!("median".parse::<Aggregation>().unwrap(), Aggregation::Median);
        assert!("mode".parse::<Aggregation>().is_err());
    }
}
