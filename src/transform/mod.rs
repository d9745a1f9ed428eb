//! Transform pipeline
//!
//! Pure, group-wise `HistoryTable -> HistoryTable` operations. Every
//! transform resolves its group key once, leaves the input untouched
//! (unchanged columns are shared, not copied) and returns an empty table
//! for an empty input.
//!
//! ## Operations
//!
//! - [`remove_outliers`]: per-group quantile filter
//! - [`normalize`]: per-group min-max scaling
//! - [`truncate`]: cut every group to the shortest group's extent
//! - [`exponential_moving_average`]: per-group smoothing
//! - [`downsample`]: per-group stride sampling
//! - [`align_column`]: aggregate repeated `(group, step)` observations
//! - [`summarize`]: per-group point estimates
//!
//! ## Composition
//!
//! Either chain calls through [`TableTransforms`]:
//!
//! ```rust
//! use fanda::table::TableBuilder;
//! use fanda::transform::{TableTransforms, DEFAULT_EPSILON};
//! use serde_json::json;
//!
//! let records = (0..10)
//!     .map(|step| {
//!         let record = json!({"_step": step, "loss": 1.0 / f64::from(step + 1)});
//!         record.as_object().unwrap().clone()
//!     })
//!     .collect();
//! let table = TableBuilder::new().push_series("run-a", records).build().unwrap();
//!
//! let out = table
//!     .remove_outliers("loss", 0.0, 0.9, "run_id")
//!     .and_then(|t| t.normalize("loss", "run_id", DEFAULT_EPSILON))
//!     .unwrap();
//! assert_eq!(out.num_rows(), 9);
//! ```
//!
//! or describe the steps up front with a [`Pipeline`].

mod align;
mod downsample;
mod group;
mod normalize;
mod outliers;
mod pipeline;
mod smoothing;
mod stats;
mod summarize;
mod truncate;

pub use align::{align_column, align_column_on};
pub use downsample::downsample;
pub use group::GroupKey;
pub use normalize::{normalize, DEFAULT_EPSILON};
pub use outliers::remove_outliers;
pub use pipeline::{Pipeline, Transform};
pub use smoothing::exponential_moving_average;
pub use stats::Aggregation;
pub use summarize::{summarize, COUNT, MAX, MEAN, MIN, STD};
pub use truncate::truncate;

use crate::table::HistoryTable;
use crate::Result;
use arrow::record_batch::RecordBatch;
use group::Grouping;

/// Resolve `column` and `groupby` against `table`.
///
/// Missing names are reported before type problems, value column first.
fn prepare(
    table: &HistoryTable,
    column: &str,
    groupby: &GroupKey,
) -> Result<(Vec<Option<f64>>, Grouping)> {
    table.column_index(column)?;
    Grouping::validate(table, groupby)?;
    let values = table.float_values(column)?;
    let grouping = Grouping::new(table, groupby)?;
    Ok((values, grouping))
}

/// Non-null values at `rows`, in row order.
fn present(values: &[Option<f64>], rows: &[usize]) -> Vec<f64> {
    rows.iter().filter_map(|&row| values[row]).collect()
}

/// Fluent transform chaining on [`HistoryTable`].
///
/// Each method delegates to the free function of the same name.
pub trait TableTransforms {
    /// See [`remove_outliers`].
    ///
    /// # Errors
    ///
    /// See [`remove_outliers`].
    fn remove_outliers(
        &self,
        column: &str,
        lower_quantile: f64,
        upper_quantile: f64,
        groupby: impl Into<GroupKey>,
    ) -> Result<HistoryTable>;

    /// See [`normalize`].
    ///
    /// # Errors
    ///
    /// See [`normalize`].
    fn normalize(
        &self,
        column: &str,
        groupby: impl Into<GroupKey>,
        epsilon: f64,
    ) -> Result<HistoryTable>;

    /// See [`truncate`].
    ///
    /// # Errors
    ///
    /// See [`truncate`].
    fn truncate(&self, column: &str, groupby: impl Into<GroupKey>) -> Result<HistoryTable>;

    /// See [`exponential_moving_average`].
    ///
    /// # Errors
    ///
    /// See [`exponential_moving_average`].
    fn exponential_moving_average(
        &self,
        column: &str,
        alpha: f64,
        groupby: impl Into<GroupKey>,
    ) -> Result<HistoryTable>;

    /// See [`downsample`].
    ///
    /// # Errors
    ///
    /// See [`downsample`].
    fn downsample(
        &self,
        n: usize,
        column: &str,
        groupby: impl Into<GroupKey>,
    ) -> Result<HistoryTable>;

    /// See [`align_column`].
    ///
    /// # Errors
    ///
    /// See [`align_column`].
    fn align_column(
        &self,
        column: &str,
        groupby: impl Into<GroupKey>,
        aggregation: Aggregation,
    ) -> Result<HistoryTable>;

    /// See [`summarize`].
    ///
    /// # Errors
    ///
    /// See [`summarize`].
    fn summarize(&self, column: &str, groupby: impl Into<GroupKey>) -> Result<RecordBatch>;

    /// Run every step of `pipeline` in order.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    fn apply(&self, pipeline: &Pipeline) -> Result<HistoryTable>;
}

impl TableTransforms for HistoryTable {
    fn remove_outliers(
        &self,
        column: &str,
        lower_quantile: f64,
        upper_quantile: f64,
        groupby: impl Into<GroupKey>,
    ) -> Result<HistoryTable> {
        remove_outliers(self, column, lower_quantile, upper_quantile, groupby)
    }

    fn normalize(
        &self,
        column: &str,
        groupby: impl Into<GroupKey>,
        epsilon: f64,
    ) -> Result<HistoryTable> {
        normalize(self, column, groupby, epsilon)
    }

    fn truncate(&self, column: &str, groupby: impl Into<GroupKey>) -> Result<HistoryTable> {
        truncate(self, column, groupby)
    }

    fn exponential_moving_average(
        &self,
        column: &str,
        alpha: f64,
        groupby: impl Into<GroupKey>,
    ) -> Result<HistoryTable> {
        exponential_moving_average(self, column, alpha, groupby)
    }

    fn downsample(
        &self,
        n: usize,
        column: &str,
        groupby: impl Into<GroupKey>,
    ) -> Result<HistoryTable> {
        downsample(self, n, column, groupby)
    }

    fn align_column(
        &self,
        column: &str,
        groupby: impl Into<GroupKey>,
        aggregation: Aggregation,
    ) -> Result<HistoryTable> {
        align_column(self, column, groupby, aggregation)
    }

    fn summarize(&self, column: &str, groupby: impl Into<GroupKey>) -> Result<RecordBatch> {
        summarize(self, column, groupby)
    }

    fn apply(&self, pipeline: &Pipeline) -> Result<HistoryTable> {
        pipeline.apply(self)
    }
}
