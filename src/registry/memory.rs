//! In-memory run registry.
//!
//! Runs are kept in insertion order, which is the order `runs()` lists
//! them. Useful for tests, for offline analysis of exported runs, and for
//! injecting per-run failures.

use super::{sample_indices, HistoryRequest, RunDescriptor, RunRegistry};
use crate::table::{Record, STEP};
use crate::{Error, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredRun {
    descriptor: RunDescriptor,
    history: Vec<Record>,
    failure: Option<String>,
}

/// In-memory registry.
///
/// Filters are JSON objects of `path → expected value`, all of which must
/// match. Paths are descriptor fields (`id`, `name`, `group`) or dotted
/// config paths (`config.optimizer.lr`).
#[derive(Debug, Default)]
pub struct MemoryRunRegistry {
    runs: RwLock<Vec<StoredRun>>,
    history_calls: AtomicUsize,
}

impl MemoryRunRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run and its full logged history.
    pub fn add_run(&self, descriptor: RunDescriptor, history: Vec<Record>) {
        self.push(StoredRun {
            descriptor,
            history,
            failure: None,
        });
    }

    /// Register a run whose history retrieval always fails with `message`.
    pub fn add_failing_run(&self, descriptor: RunDescriptor, message: impl Into<String>) {
        self.push(StoredRun {
            descriptor,
            history: Vec::new(),
            failure: Some(message.into()),
        });
    }

    fn push(&self, run: StoredRun) {
        match self.runs.write() {
            Ok(mut runs) => runs.push(run),
            Err(poisoned) => poisoned.into_inner().push(run),
        }
    }

    /// Number of registered runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.read().map_or(0, |runs| runs.len())
    }

    /// True if no run is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `history()` calls served so far.
    #[must_use]
    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::Relaxed)
    }
}

fn matches_filters(run: &RunDescriptor, filters: Option<&Value>) -> Result<bool> {
    let Some(filters) = filters else {
        return Ok(true);
    };
    let conditions = filters.as_object().ok_or_else(|| {
        Error::InvalidInput(format!("Filters must be a JSON object, got {filters}"))
    })?;

    Ok(conditions
        .iter()
        .all(|(path, expected)| lookup(run, path).as_ref() == Some(expected)))
}

fn lookup(run: &RunDescriptor, path: &str) -> Option<Value> {
    match path {
        "id" => Some(Value::String(run.id.clone())),
        "name" | "display_name" => Some(Value::String(run.name.clone())),
        "group" => run.group.clone().map(Value::String),
        _ => {
            let rest = path.strip_prefix("config.")?;
            let mut parts = rest.split('.');
            let mut current = run.config.get(parts.next()?)?;
            for part in parts {
                current = current.get(part)?;
            }
            Some(current.clone())
        }
    }
}

fn restrict_keys(record: &Record, keys: &[String]) -> Option<Record> {
    let mut out = Record::new();
    for key in keys {
        if let Some(value) = record.get(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    if out.is_empty() {
        return None;
    }
    if let Some(step) = record.get(STEP) {
        out.insert(STEP.to_string(), step.clone());
    }
    Some(out)
}

impl RunRegistry for MemoryRunRegistry {
    async fn runs(
        &self,
        entity: &str,
        project: &str,
        filters: Option<&Value>,
    ) -> Result<Vec<RunDescriptor>> {
        let runs = self
            .runs
            .read()
            .map_err(|_| Error::Registry("run list lock poisoned".to_string()))?;

        let mut matched = Vec::new();
        for run in runs.iter() {
            let descriptor = &run.descriptor;
            if descriptor.entity == entity
                && descriptor.project == project
                && matches_filters(descriptor, filters)?
            {
                matched.push(descriptor.clone());
            }
        }
        Ok(matched)
    }

    async fn history(&self, run: &RunDescriptor, request: &HistoryRequest) -> Result<Vec<Record>> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);

        let stored = {
            let runs = self
                .runs
                .read()
                .map_err(|_| Error::Registry("run list lock poisoned".to_string()))?;
            runs.iter()
                .find(|r| {
                    r.descriptor.id == run.id
                        && r.descriptor.entity == run.entity
                        && r.descriptor.project == run.project
                })
                .cloned()
                .ok_or_else(|| Error::Registry(format!("run {} not found", run.id)))?
        };

        if let Some(message) = stored.failure {
            return Err(Error::Registry(format!("run {}: {message}", run.id)));
        }

        let records: Vec<Record> = match &request.keys {
            Some(keys) => stored
                .history
                .iter()
                .filter_map(|r| restrict_keys(r, keys))
                .collect(),
            None => stored.history,
        };

        Ok(sample_indices(records.len(), request.samples)
            .into_iter()
            .map(|i| records[i].clone())
            .collect())
    }
}
