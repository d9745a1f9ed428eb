//! Assembly of per-run series and configs into one tidy table

use super::json::infer_column;
use super::{flatten_config, HistoryTable, CONFIG_PREFIX, GROUP, RUN_ID, RUN_NAME, STEP};
use crate::Result;
use arrow::array::{ArrayRef, StringArray};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One logged history record: metric name → scalar.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone)]
struct RunConfig {
    run_id: String,
    run_name: Option<Value>,
    group: Option<Value>,
    flat: BTreeMap<String, Value>,
}

/// Builds a [`HistoryTable`] from per-run step series and configs.
///
/// Series are concatenated in push order (union of columns, sorted
/// lexicographically). Configs are flattened and left-joined on `run_id`:
/// every row of a run carries that run's config, and runs without a pushed
/// config get nulls.
///
/// ```rust
/// use fanda::table::TableBuilder;
/// use serde_json::json;
///
/// # fn main() -> fanda::Result<()> {
/// let mut builder = TableBuilder::new();
/// builder.push_series("run-a", vec![
///     json!({"_step": 0, "loss": 1.0}).as_object().unwrap().clone(),
///     json!({"_step": 1, "loss": 0.5}).as_object().unwrap().clone(),
/// ]);
/// builder.push_config("run-a", Some("baseline"), None, json!({"lr": 0.1}).as_object().unwrap());
///
/// let table = builder.build()?;
/// assert_eq!(table.num_rows(), 2);
/// assert_eq!(table.column_names(), ["_step", "loss", "run_id", "run_name", "group", "lr"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
    series: Vec<(String, Vec<Record>)>,
    configs: Vec<RunConfig>,
}

impl TableBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one run's step series.
    pub fn push_series(&mut self, run_id: impl Into<String>, records: Vec<Record>) -> &mut Self {
        self.series.push((run_id.into(), records));
        self
    }

    /// Register one run's static configuration.
    ///
    /// Only the first config pushed for a given `run_id` is joined.
    pub fn push_config(
        &mut self,
        run_id: impl Into<String>,
        run_name: Option<&str>,
        group: Option<&str>,
        config: &Map<String, Value>,
    ) -> &mut Self {
        self.configs.push(RunConfig {
            run_id: run_id.into(),
            run_name: run_name.map(|s| Value::String(s.to_string())),
            group: group.map(|s| Value::String(s.to_string())),
            flat: flatten_config(config).into_iter().collect(),
        });
        self
    }

    /// Number of series rows pushed so far.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.series.iter().map(|(_, records)| records.len()).sum()
    }

    /// Assemble the table.
    ///
    /// # Errors
    ///
    /// Returns an Arrow error if a column cannot be built.
    pub fn build(&self) -> Result<HistoryTable> {
        let rows: Vec<(&str, &Record)> = self
            .series
            .iter()
            .flat_map(|(run_id, records)| records.iter().map(move |r| (run_id.as_str(), r)))
            .collect();

        let mut series_names: BTreeSet<&str> = rows
            .iter()
            .flat_map(|(_, record)| record.keys().map(String::as_str))
            .collect();
        series_names.insert(RUN_ID);

        let mut fields = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for &name in &series_names {
            if name == RUN_ID {
                let ids = StringArray::from_iter_values(rows.iter().map(|(id, _)| *id));
                fields.push(Field::new(RUN_ID, DataType::Utf8, false));
                columns.push(Arc::new(ids));
                continue;
            }

            let values: Vec<Option<&Value>> = rows.iter().map(|(_, r)| r.get(name)).collect();
            let (mut data_type, mut array) = infer_column(&values);
            if name == STEP && data_type != DataType::Int64 && data_type.is_numeric() {
                array = compute::cast(&array, &DataType::Int64)?;
                data_type = DataType::Int64;
            }
            fields.push(Field::new(name, data_type, true));
            columns.push(array);
        }

        if !self.configs.is_empty() {
            self.join_configs(&rows, &series_names, &mut fields, &mut columns);
        }

        let schema = Arc::new(Schema::new(fields));
        let batch = if rows.is_empty() {
            RecordBatch::new_empty(schema)
        } else {
            RecordBatch::try_new(schema, columns)?
        };
        HistoryTable::try_new(batch)
    }

    fn join_configs(
        &self,
        rows: &[(&str, &Record)],
        series_names: &BTreeSet<&str>,
        fields: &mut Vec<Field>,
        columns: &mut Vec<ArrayRef>,
    ) {
        let mut by_run: FxHashMap<&str, &RunConfig> = FxHashMap::default();
        for config in &self.configs {
            by_run.entry(config.run_id.as_str()).or_insert(config);
        }
        let joined: Vec<Option<&RunConfig>> =
            rows.iter().map(|(id, _)| by_run.get(id).copied()).collect();

        let flat_keys: BTreeSet<&str> = self
            .configs
            .iter()
            .flat_map(|c| c.flat.keys().map(String::as_str))
            .collect();

        let mut taken: FxHashSet<String> = series_names.iter().map(|s| (*s).to_string()).collect();

        let run_names: Vec<Option<&Value>> = joined
            .iter()
            .map(|c| c.and_then(|c| c.run_name.as_ref()))
            .collect();
        let groups: Vec<Option<&Value>> = joined
            .iter()
            .map(|c| c.and_then(|c| c.group.as_ref()))
            .collect();

        for (key, values) in [(RUN_NAME, run_names), (GROUP, groups)] {
            let name = unique_name(&taken, key.to_string());
            taken.insert(name.clone());
            let (data_type, array) = infer_column(&values);
            fields.push(Field::new(name, data_type, true));
            columns.push(array);
        }

        for key in flat_keys {
            let name = if key == RUN_NAME || key == GROUP {
                unique_name(&taken, format!("{CONFIG_PREFIX}{key}"))
            } else {
                unique_name(&taken, key.to_string())
            };
            taken.insert(name.clone());
            let values: Vec<Option<&Value>> = joined
                .iter()
                .map(|c| c.and_then(|c| c.flat.get(key)))
                .collect();
            let (data_type, array) = infer_column(&values);
            fields.push(Field::new(name, data_type, true));
            columns.push(array);
        }
    }
}

/// Prefix `name` with `config.` until it clashes with no existing column.
fn unique_name(taken: &FxHashSet<String>, mut name: String) -> String {
    while taken.contains(&name) {
        name.insert_str(0, CONFIG_PREFIX);
    }
    name
}
