//! Group keys and row partitioning

use crate::table::{HistoryTable, RUN_ID};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute;
use arrow::datatypes::DataType;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Columns partitioning rows into independent groups.
///
/// Either one column name or an ordered list (composite key). Converts
/// from `&str`, `String`, `Vec<&str>`, `Vec<String>` and string arrays.
///
/// ```rust
/// use fanda::transform::GroupKey;
///
/// assert_eq!(GroupKey::default().columns(), ["run_id"]);
/// assert_eq!(GroupKey::from(["algorithm", "env"]).columns(), ["algorithm", "env"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupKey {
    /// Single grouping column
    Column(String),
    /// Composite key, compared column by column
    Columns(Vec<String>),
}

impl GroupKey {
    /// Grouping columns in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Column(column) => std::slice::from_ref(column),
            Self::Columns(columns) => columns,
        }
    }

    /// This key extended with one more column (skipped if already present).
    #[must_use]
    pub fn with_column(&self, column: &str) -> Self {
        let mut columns = self.columns().to_vec();
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
        Self::Columns(columns)
    }
}

impl Default for GroupKey {
    fn default() -> Self {
        Self::Column(RUN_ID.to_string())
    }
}

impl From<&str> for GroupKey {
    fn from(column: &str) -> Self {
        Self::Column(column.to_string())
    }
}

impl From<String> for GroupKey {
    fn from(column: String) -> Self {
        Self::Column(column)
    }
}

impl From<&String> for GroupKey {
    fn from(column: &String) -> Self {
        Self::Column(column.clone())
    }
}

impl From<Vec<String>> for GroupKey {
    fn from(columns: Vec<String>) -> Self {
        Self::Columns(columns)
    }
}

impl From<Vec<&str>> for GroupKey {
    fn from(columns: Vec<&str>) -> Self {
        Self::Columns(columns.into_iter().map(ToString::to_string).collect())
    }
}

impl From<&[&str]> for GroupKey {
    fn from(columns: &[&str]) -> Self {
        Self::Columns(columns.iter().map(ToString::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for GroupKey {
    fn from(columns: [&str; N]) -> Self {
        Self::Columns(columns.iter().map(ToString::to_string).collect())
    }
}

impl From<&GroupKey> for GroupKey {
    fn from(key: &GroupKey) -> Self {
        key.clone()
    }
}

/// Float usable as a hash/ordering key. NaN never reaches here (it is
/// mapped to `KeyValue::Null`) and `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatKey(f64);

impl FloatKey {
    fn new(value: f64) -> Self {
        Self(if value == 0.0 { 0.0 } else { value })
    }
}

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One column's value within a group key. Nulls form their own group and
/// sort first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(String),
}

fn key_values(name: &str, array: &ArrayRef) -> Result<Vec<KeyValue>> {
    let downcast_err = || Error::Other(format!("Failed to downcast group column {name}"));

    match array.data_type() {
        DataType::Boolean => {
            let array = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(downcast_err)?;
            Ok(array
                .iter()
                .map(|v| v.map_or(KeyValue::Null, KeyValue::Bool))
                .collect())
        }
        dt if dt.is_integer() => {
            let cast = compute::cast(array, &DataType::Int64)?;
            let array = cast
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(downcast_err)?;
            Ok(array
                .iter()
                .map(|v| v.map_or(KeyValue::Null, KeyValue::Int))
                .collect())
        }
        dt if dt.is_floating() => {
            let cast = compute::cast(array, &DataType::Float64)?;
            let array = cast
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(downcast_err)?;
            Ok(array
                .iter()
                .map(|v| match v {
                    Some(x) if !x.is_nan() => KeyValue::Float(FloatKey::new(x)),
                    _ => KeyValue::Null,
                })
                .collect())
        }
        dt if compute::can_cast_types(dt, &DataType::Utf8) => {
            let cast = compute::cast(array, &DataType::Utf8)?;
            let array = cast
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(downcast_err)?;
            Ok(array
                .iter()
                .map(|v| v.map_or(KeyValue::Null, |s| KeyValue::Str(s.to_string())))
                .collect())
        }
        dt => Err(Error::InvalidInput(format!(
            "Cannot group by column {name} of type {dt:?}"
        ))),
    }
}

/// Rows partitioned by a group key.
///
/// Groups are numbered in order of first appearance; each group's row list
/// is in table order.
#[derive(Debug, Clone)]
pub(crate) struct Grouping {
    /// Group id of every row.
    pub group_of_row: Vec<usize>,
    /// Key of every group.
    pub keys: Vec<Vec<KeyValue>>,
    /// Row indices of every group.
    pub rows: Vec<Vec<usize>>,
}

impl Grouping {
    /// Check that every key column exists.
    pub fn validate(table: &HistoryTable, key: &GroupKey) -> Result<()> {
        if key.columns().is_empty() {
            return Err(Error::InvalidInput("Group key has no columns".to_string()));
        }
        for column in key.columns() {
            table.column_index(column)?;
        }
        Ok(())
    }

    /// Partition the table's rows.
    pub fn new(table: &HistoryTable, key: &GroupKey) -> Result<Self> {
        Self::validate(table, key)?;

        let columns = key
            .columns()
            .iter()
            .map(|name| key_values(name, table.column(name)?))
            .collect::<Result<Vec<_>>>()?;

        let mut index: FxHashMap<Vec<KeyValue>, usize> = FxHashMap::default();
        let mut grouping = Self {
            group_of_row: Vec::with_capacity(table.num_rows()),
            keys: Vec::new(),
            rows: Vec::new(),
        };

        for row in 0..table.num_rows() {
            let row_key: Vec<KeyValue> = columns.iter().map(|c| c[row].clone()).collect();
            let group = match index.get(&row_key) {
                Some(&group) => group,
                None => {
                    let group = grouping.keys.len();
                    index.insert(row_key.clone(), group);
                    grouping.keys.push(row_key);
                    grouping.rows.push(Vec::new());
                    group
                }
            };
            grouping.group_of_row.push(group);
            grouping.rows[group].push(row);
        }

        Ok(grouping)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableBuilder;
    use serde_json::json;

    fn table() -> HistoryTable {
        let mut builder = TableBuilder::new();
        for (run, algo) in [("a", "ppo"), ("b", "dqn"), ("c", "ppo")] {
            builder.push_series(
                run,
                vec![json!({"_step": 0, "algo": algo}).as_object().unwrap().clone()],
            );
        }
        builder.push_series("d", vec![json!({"_step": 1}).as_object().unwrap().clone()]);
        builder.build().unwrap()
    }

    #[test]
    fn test_group_by_single_column() {
        let grouping = Grouping::new(&table(), &GroupKey::from("algo")).unwrap();
        assert_eq!(grouping.len(), 3);
        assert_eq!(grouping.group_of_row, vec![0, 1, 0, 2]);
        assert_eq!(grouping.keys[2], vec![KeyValue::Null]);
    }

    #[test]
    fn test_group_by_composite_key() {
        let grouping = Grouping::new(&table(), &GroupKey::from(["algo", "_step"])).unwrap();
        assert_eq!(grouping.len(), 3);
        assert_eq!(grouping.rows[0], vec![0, 2]);
    }

    #[test]
    fn test_missing_group_column() {
        let err = Grouping::new(&table(), &GroupKey::from("seed")).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { ref column, .. } if column == "seed"));
    }

    #[test]
    fn test_empty_group_key_rejected() {
        let err = Grouping::new(&table(), &GroupKey::Columns(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_group_key_serde_untagged() {
        let single: GroupKey = serde_json::from_value(json!("run_id")).unwrap();
        assert_eq!(single, GroupKey::default());
        let many: GroupKey = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(many.columns(), ["a", "b"]);
    }

    #[test]
    fn test_with_column_deduplicates() {
        let key = GroupKey::from("run_id").with_column("_step").with_column("run_id");
        assert_eq!(key.columns(), ["run_id", "_step"]);
    }

    #[test]
    fn test_key_value_ordering() {
        let mut keys = vec![
            KeyValue::Str("b".into()),
            KeyValue::Null,
            KeyValue::Int(3),
            KeyValue::Int(-1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                KeyValue::Null,
                KeyValue::Int(-1),
                KeyValue::Int(3),
                KeyValue::Str("b".into())
            ]
        );
    }
}
