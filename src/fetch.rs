//! History fetcher
//!
//! Pulls every run matching a project/filter from a [`RunRegistry`],
//! retrieves each run's step series, and assembles one tidy
//! [`HistoryTable`] with each run's flattened config joined on `run_id`.
//!
//! ## Failure policy
//!
//! - Listing the runs fails → the whole fetch fails
//! - One run's history fails → logged, recorded in the [`FetchReport`], skipped
//! - A run with an empty series → skipped
//! - No run yields any rows → [`Error::NoData`]
//!
//! Per-run retrieval is concurrent (bounded by `FetchConfig::concurrency`)
//! but results are consumed in listing order, so output is deterministic.

use crate::config::FetchConfig;
use crate::registry::{HistoryRequest, RunDescriptor, RunRegistry};
use crate::table::{HistoryTable, Record, TableBuilder, STEP};
use crate::{Error, Result};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Registry entity.
    pub entity: String,
    /// Registry project.
    pub project: String,
    /// Metric keys to retrieve (`None` = all).
    pub keys: Option<Vec<String>>,
    /// Registry-specific run filter.
    pub filters: Option<Value>,
    /// Points per run; `None` uses `FetchConfig::samples`.
    pub samples: Option<usize>,
}

impl FetchRequest {
    /// Fetch every run of `entity/project`.
    #[must_use]
    pub fn new(entity: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            project: project.into(),
            keys: None,
            filters: None,
            samples: None,
        }
    }

    /// Restrict the metric keys retrieved per run.
    #[must_use]
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict which runs are retrieved.
    #[must_use]
    pub fn filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Bound the number of points retrieved per run.
    #[must_use]
    pub const fn samples(mut self, samples: usize) -> Self {
        self.samples = Some(samples);
        self
    }
}

/// What happened to the matched runs during a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Runs the filter matched.
    pub runs_matched: usize,
    /// Runs that contributed at least one row.
    pub runs_with_data: usize,
    /// Runs skipped because their series was empty.
    pub skipped_empty: Vec<String>,
    /// Runs skipped because retrieval failed: `(run_id, error)`.
    pub failed: Vec<(String, String)>,
    /// Rows in the assembled table.
    pub rows: usize,
}

/// Fetches run histories into a [`HistoryTable`].
#[derive(Debug)]
pub struct HistoryFetcher<R> {
    registry: R,
    config: FetchConfig,
}

impl<R: RunRegistry> HistoryFetcher<R> {
    /// Create a fetcher with default configuration.
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self::with_config(registry, FetchConfig::default())
    }

    /// Create a fetcher with explicit configuration.
    #[must_use]
    pub const fn with_config(registry: R, config: FetchConfig) -> Self {
        Self { registry, config }
    }

    /// Underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Fetch configuration.
    #[must_use]
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch the history table of `entity/project`.
    ///
    /// # Errors
    ///
    /// Returns `NoData` if no matched run has any rows, `InvalidInput` if
    /// `samples` is zero, or the registry error if listing runs fails.
    pub async fn fetch(
        &self,
        entity: &str,
        project: &str,
        keys: Option<Vec<String>>,
        filters: Option<Value>,
        samples: usize,
    ) -> Result<HistoryTable> {
        let request = FetchRequest {
            entity: entity.to_string(),
            project: project.to_string(),
            keys,
            filters,
            samples: Some(samples),
        };
        self.fetch_with(&request).await
    }

    /// Fetch using a prepared request.
    ///
    /// # Errors
    ///
    /// See [`HistoryFetcher::fetch`].
    pub async fn fetch_with(&self, request: &FetchRequest) -> Result<HistoryTable> {
        self.fetch_with_report(request).await.map(|(table, _)| table)
    }

    /// Fetch, also returning which runs were skipped and why.
    ///
    /// # Errors
    ///
    /// See [`HistoryFetcher::fetch`].
    pub async fn fetch_with_report(
        &self,
        request: &FetchRequest,
    ) -> Result<(HistoryTable, FetchReport)> {
        let samples = request.samples.unwrap_or(self.config.samples);
        if samples == 0 {
            return Err(Error::InvalidInput("samples must be at least 1".to_string()));
        }
        let history_request = HistoryRequest {
            samples,
            keys: request.keys.clone(),
        };

        let runs = self
            .registry
            .runs(&request.entity, &request.project, request.filters.as_ref())
            .await?;
        tracing::debug!(
            entity = %request.entity,
            project = %request.project,
            runs = runs.len(),
            "matched runs"
        );

        let results: Vec<(&RunDescriptor, Result<Vec<Record>>)> = stream::iter(runs.iter())
            .map(|run| {
                let history_request = &history_request;
                async move { (run, self.registry.history(run, history_request).await) }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = FetchReport {
            runs_matched: runs.len(),
            ..FetchReport::default()
        };
        let mut builder = TableBuilder::new();

        for (run, result) in results {
            match result {
                Ok(records) if records.is_empty() => {
                    tracing::debug!(run_id = %run.id, "skipping run with empty history");
                    report.skipped_empty.push(run.id.clone());
                }
                Ok(records) => {
                    tracing::debug!(run_id = %run.id, rows = records.len(), "retrieved history");
                    report.runs_with_data += 1;
                    builder.push_series(run.id.clone(), order_by_step(records));
                }
                Err(e) => {
                    tracing::warn!(run_id = %run.id, error = %e, "skipping run: history retrieval failed");
                    report.failed.push((run.id.clone(), e.to_string()));
                }
            }
        }

        if report.runs_with_data == 0 {
            return Err(Error::NoData {
                entity: request.entity.clone(),
                project: request.project.clone(),
                runs_matched: runs.len(),
            });
        }

        for run in &runs {
            builder.push_config(run.id.clone(), Some(&run.name), run.group.as_deref(), &run.config);
        }
        let table = builder.build()?;
        report.rows = table.num_rows();

        tracing::info!(
            entity = %request.entity,
            project = %request.project,
            runs = report.runs_with_data,
            rows = report.rows,
            skipped_empty = report.skipped_empty.len(),
            failed = report.failed.len(),
            "fetched history"
        );
        Ok((table, report))
    }
}

/// Give every record a `_step` (its position when missing) and stably
/// order records by it.
fn order_by_step(mut records: Vec<Record>) -> Vec<Record> {
    for (position, record) in records.iter_mut().enumerate() {
        if !record.get(STEP).is_some_and(Value::is_number) {
            record.insert(STEP.to_string(), Value::from(position));
        }
    }

    records.sort_by(|a, b| {
        let a = a.get(STEP).and_then(Value::as_f64).unwrap_or_default();
        let b = b.get(STEP).and_then(Value::as_f64).unwrap_or_default();
        a.total_cmp(&b)
    });
    records
}
