//! Run registry interface
//!
//! The fetcher depends only on this surface: list the runs matching a
//! project and filter, then pull one run's logged step series. Two
//! implementations ship with the crate:
//!
//! - [`MemoryRunRegistry`]: in-process, for tests and offline analysis
//! - [`WandbRegistry`]: the W&B public GraphQL API over HTTPS
//!
//! # Example
//!
//! ```rust
//! use fanda::registry::{HistoryRequest, MemoryRunRegistry, RunDescriptor, RunRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> fanda::Result<()> {
//! let registry = MemoryRunRegistry::new();
//! registry.add_run(
//!     RunDescriptor::new("me", "demo", "run-1").with_config(json!({"lr": 0.1})),
//!     vec![json!({"_step": 0, "loss": 1.0}).as_object().unwrap().clone()],
//! );
//!
//! let runs = registry.runs("me", "demo", None).await?;
//! let history = registry.history(&runs[0], &HistoryRequest::new(500)).await?;
//! assert_eq!(history.len(), 1);
//! # Ok(())
//! # }
//! ```

mod memory;
mod wandb;

pub use memory::MemoryRunRegistry;
pub use wandb::WandbRegistry;

use crate::table::Record;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// Descriptor of one run as listed by a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// Registry entity (user or team).
    pub entity: String,
    /// Registry project.
    pub project: String,
    /// Unique run identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional group label.
    pub group: Option<String>,
    /// Nested configuration (flattened by the table builder).
    pub config: Map<String, Value>,
    /// Creation time, when the registry reports it.
    pub created_at: Option<DateTime<Utc>>,
}

impl RunDescriptor {
    /// Descriptor with the id doubling as the name and an empty config.
    #[must_use]
    pub fn new(entity: impl Into<String>, project: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            entity: entity.into(),
            project: project.into(),
            name: id.clone(),
            id,
            group: None,
            config: Map::new(),
            created_at: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the group label.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the configuration. Non-object values are ignored.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config = map;
        }
        self
    }
}

/// Per-run history retrieval parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Upper bound on returned points; the registry may subsample.
    pub samples: usize,
    /// Restrict to these metric keys (`_step` is always included).
    pub keys: Option<Vec<String>>,
}

impl HistoryRequest {
    /// Request up to `samples` points of every key.
    #[must_use]
    pub const fn new(samples: usize) -> Self {
        Self { samples, keys: None }
    }

    /// Restrict to the given metric keys.
    #[must_use]
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

/// Remote run registry.
///
/// Implementations must be shareable across the concurrent per-run
/// retrievals the fetcher issues.
pub trait RunRegistry: Send + Sync {
    /// List the runs in `entity/project` matching `filters`.
    ///
    /// The filter language is implementation-defined; `None` matches all runs.
    fn runs(
        &self,
        entity: &str,
        project: &str,
        filters: Option<&Value>,
    ) -> impl Future<Output = Result<Vec<RunDescriptor>>> + Send;

    /// Retrieve one run's logged step series.
    fn history(
        &self,
        run: &RunDescriptor,
        request: &HistoryRequest,
    ) -> impl Future<Output = Result<Vec<Record>>> + Send;
}

/// Evenly spaced, deterministic subsample of at most `samples` indices
/// out of `len`, always keeping the first and last point.
#[must_use]
pub fn sample_indices(len: usize, samples: usize) -> Vec<usize> {
    if samples == 0 || len == 0 {
        return Vec::new();
    }
    if len <= samples {
        return (0..len).collect();
    }
    if samples == 1 {
        return vec![0];
    }

    let span = len - 1;
    let steps = samples - 1;
    (0..samples).map(|i| i * span / steps).collect()
}
