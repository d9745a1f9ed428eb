//! Ordered transform steps

use super::{
    align_column_on, downsample, exponential_moving_average, normalize, remove_outliers,
    truncate, Aggregation, GroupKey, DEFAULT_EPSILON,
};
use crate::table::{HistoryTable, STEP};
use crate::Result;
use serde::{Deserialize, Serialize};

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_step_column() -> String {
    STEP.to_string()
}

/// One transform with its parameters.
///
/// Serializes with an `op` tag, so a pipeline can be stored as JSON:
/// `{"op": "truncate", "column": "_step", "groupby": "run_id"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// [`remove_outliers`](super::remove_outliers)
    RemoveOutliers {
        /// Value column
        column: String,
        /// Lower quantile bound
        lower_quantile: f64,
        /// Upper quantile bound
        upper_quantile: f64,
        /// Group key
        #[serde(default)]
        groupby: GroupKey,
    },
    /// [`normalize`](super::normalize)
    Normalize {
        /// Value column
        column: String,
        /// Group key
        #[serde(default)]
        groupby: GroupKey,
        /// Denominator guard
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    /// [`truncate`](super::truncate)
    Truncate {
        /// Value column
        column: String,
        /// Group key
        #[serde(default)]
        groupby: GroupKey,
    },
    /// [`exponential_moving_average`](super::exponential_moving_average)
    ExponentialMovingAverage {
        /// Value column
        column: String,
        /// Smoothing factor in `(0, 1]`
        alpha: f64,
        /// Group key
        #[serde(default)]
        groupby: GroupKey,
    },
    /// [`downsample`](super::downsample)
    Downsample {
        /// Stride
        n: usize,
        /// Sort column
        column: String,
        /// Group key
        #[serde(default)]
        groupby: GroupKey,
    },
    /// [`align_column_on`](super::align_column_on)
    AlignColumn {
        /// Value column
        column: String,
        /// Group key
        #[serde(default)]
        groupby: GroupKey,
        /// Aggregate applied per `(group, step)`
        #[serde(default)]
        aggregation: Aggregation,
        /// Step column
        #[serde(default = "default_step_column")]
        step_column: String,
    },
}

impl Transform {
    /// Short operation name, as used in the serialized `op` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RemoveOutliers { .. } => "remove_outliers",
            Self::Normalize { .. } => "normalize",
            Self::Truncate { .. } => "truncate",
            Self::ExponentialMovingAverage { .. } => "exponential_moving_average",
            Self::Downsample { .. } => "downsample",
            Self::AlignColumn { .. } => "align_column",
        }
    }

    /// Apply this step to `table`.
    ///
    /// # Errors
    ///
    /// Returns the underlying transform's error.
    pub fn apply(&self, table: &HistoryTable) -> Result<HistoryTable> {
        match self {
            Self::RemoveOutliers {
                column,
                lower_quantile,
                upper_quantile,
                groupby,
            } => remove_outliers(table, column, *lower_quantile, *upper_quantile, groupby),
            Self::Normalize {
                column,
                groupby,
                epsilon,
            } => normalize(table, column, groupby, *epsilon),
            Self::Truncate { column, groupby } => truncate(table, column, groupby),
            Self::ExponentialMovingAverage {
                column,
                alpha,
                groupby,
            } => exponential_moving_average(table, column, *alpha, groupby),
            Self::Downsample { n, column, groupby } => downsample(table, *n, column, groupby),
            Self::AlignColumn {
                column,
                groupby,
                aggregation,
                step_column,
            } => align_column_on(table, column, groupby, step_column, *aggregation),
        }
    }
}

/// Transforms applied in order, each to the previous step's output.
///
/// ```rust
/// use fanda::transform::Pipeline;
///
/// let pipeline = Pipeline::new()
///     .truncate("_step", "run_id")
///     .remove_outliers("loss", 0.01, 0.99, "run_id")
///     .exponential_moving_average("loss", 0.3, "run_id");
/// assert_eq!(pipeline.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    steps: Vec<Transform>,
}

impl Pipeline {
    /// Create an empty pipeline (the identity).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    #[must_use]
    pub fn then(mut self, step: Transform) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a [`Transform::RemoveOutliers`] step.
    #[must_use]
    pub fn remove_outliers(
        self,
        column: &str,
        lower_quantile: f64,
        upper_quantile: f64,
        groupby: impl Into<GroupKey>,
    ) -> Self {
        self.then(Transform::RemoveOutliers {
            column: column.to_string(),
            lower_quantile,
            upper_quantile,
            groupby: groupby.into(),
        })
    }

    /// Append a [`Transform::Normalize`] step.
    #[must_use]
    pub fn normalize(self, column: &str, groupby: impl Into<GroupKey>, epsilon: f64) -> Self {
        self.then(Transform::Normalize {
            column: column.to_string(),
            groupby: groupby.into(),
            epsilon,
        })
    }

    /// Append a [`Transform::Truncate`] step.
    #[must_use]
    pub fn truncate(self, column: &str, groupby: impl Into<GroupKey>) -> Self {
        self.then(Transform::Truncate {
            column: column.to_string(),
            groupby: groupby.into(),
        })
    }

    /// Append a [`Transform::ExponentialMovingAverage`] step.
    #[must_use]
    pub fn exponential_moving_average(
        self,
        column: &str,
        alpha: f64,
        groupby: impl Into<GroupKey>,
    ) -> Self {
        self.then(Transform::ExponentialMovingAverage {
            column: column.to_string(),
            alpha,
            groupby: groupby.into(),
        })
    }

    /// Append a [`Transform::Downsample`] step.
    #[must_use]
    pub fn downsample(self, n: usize, column: &str, groupby: impl Into<GroupKey>) -> Self {
        self.then(Transform::Downsample {
            n,
            column: column.to_string(),
            groupby: groupby.into(),
        })
    }

    /// Append a [`Transform::AlignColumn`] step keyed on `_step`.
    #[must_use]
    pub fn align_column(
        self,
        column: &str,
        groupby: impl Into<GroupKey>,
        aggregation: Aggregation,
    ) -> Self {
        self.then(Transform::AlignColumn {
            column: column.to_string(),
            groupby: groupby.into(),
            aggregation,
            step_column: STEP.to_string(),
        })
    }

    /// Steps in application order.
    #[must_use]
    pub fn steps(&self) -> &[Transform] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Thread `table` through every step.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; the failing step is logged.
    pub fn apply(&self, table: &HistoryTable) -> Result<HistoryTable> {
        let mut current = table.clone();
        for (index, step) in self.steps.iter().enumerate() {
            current = step.apply(&current).map_err(|e| {
                tracing::warn!(step = index, op = step.name(), error = %e, "transform failed");
                e
            })?;
            tracing::debug!(
                step = index,
                op = step.name(),
                rows = current.num_rows(),
                "applied transform"
            );
        }
        Ok(current)
    }
}

impl FromIterator<Transform> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Transform>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
