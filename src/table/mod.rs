//! History table (tidy Arrow representation of run histories)
//!
//! One row per (run, step) pair. Columns are the union of every metric any
//! run logged, plus `run_id`, plus the run's flattened configuration
//! broadcast onto each of its rows. Absent values are Arrow nulls.
//!
//! ## Copy-on-write
//!
//! A `HistoryTable` wraps a single `RecordBatch` whose columns are
//! reference-counted `ArrayRef`s. Transforms build a new table and share
//! every column they do not touch, so a caller holding the input never
//! observes a change.

mod builder;
mod flatten;
mod json;

pub use builder::{Record, TableBuilder};
pub use flatten::flatten_config;

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, UInt64Array};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Run identifier column, present and non-null on every row.
pub const RUN_ID: &str = "run_id";

/// Human-readable run name (config side).
pub const RUN_NAME: &str = "run_name";

/// Optional run group label (config side).
pub const GROUP: &str = "group";

/// Implicit step counter of a run's logged series.
pub const STEP: &str = "_step";

/// Prefix applied to config columns whose name collides with a series column.
pub const CONFIG_PREFIX: &str = "config.";

/// Tidy table of run histories.
#[derive(Debug, Clone)]
pub struct HistoryTable {
    batch: RecordBatch,
}

impl HistoryTable {
    /// Wrap a record batch, checking the `run_id` invariant.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` if `run_id` is missing and `InvalidInput`
    /// if it is not a string column or contains nulls.
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let index = schema
            .index_of(RUN_ID)
            .map_err(|_| Error::column_not_found(RUN_ID, &schema))?;
        let column = batch.column(index);

        if column.data_type() != &DataType::Utf8 {
            return Err(Error::InvalidInput(format!(
                "{RUN_ID} must be Utf8, got {:?}",
                column.data_type()
            )));
        }
        if column.null_count() > 0 {
            return Err(Error::InvalidInput(format!(
                "{RUN_ID} contains {} null value(s)",
                column.null_count()
            )));
        }

        Ok(Self { batch })
    }

    /// Table with the given schema and no rows.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            batch: RecordBatch::new_empty(self.batch.schema()),
        }
    }

    /// Underlying record batch.
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the table, returning the record batch.
    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Table schema.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// True if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Column names in schema order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// True if a column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    /// Index of a column.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` naming the column and listing the available ones.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        let schema = self.batch.schema();
        schema
            .index_of(name)
            .map_err(|_| Error::column_not_found(name, &schema))
    }

    /// Column by name.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` if absent.
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        let index = self.column_index(name)?;
        Ok(self.batch.column(index))
    }

    /// Numeric column as `f64`, with nulls and NaN mapped to `None`.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` if absent and `InvalidInput` if the column
    /// is not numeric.
    pub fn float_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self.column(name)?;
        if !column.data_type().is_numeric() {
            return Err(Error::InvalidInput(format!(
                "Column {name} is {:?}, expected a numeric column",
                column.data_type()
            )));
        }

        let cast = compute::cast(column, &DataType::Float64)?;
        let array = cast
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| Error::Other("Failed to downcast to Float64Array".to_string()))?;

        Ok(array
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    /// Run id of every row.
    ///
    /// # Errors
    ///
    /// Returns an error only if the table was built around the invariant.
    pub fn run_ids(&self) -> Result<Vec<String>> {
        let column = self.column(RUN_ID)?;
        let array = column
            .as_any()
            .downcast_ref::<arrow::array::StringArray>()
            .ok_or_else(|| Error::Other("Failed to downcast run_id to StringArray".to_string()))?;
        Ok(array.iter().map(|v| v.unwrap_or_default().to_string()).collect())
    }

    /// Replace (or append) a column, sharing all other columns.
    ///
    /// The replacement field is nullable and takes the array's data type.
    ///
    /// # Errors
    ///
    /// Returns error if the array length differs from the row count.
    pub fn with_column(&self, name: &str, array: ArrayRef) -> Result<Self> {
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();
        let field = Field::new(name, array.data_type().clone(), true);

        if let Ok(index) = schema.index_of(name) {
            fields[index] = field;
            columns[index] = array;
        } else {
            fields.push(field);
            columns.push(array);
        }

        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        Self::try_new(RecordBatch::try_new(schema, columns)?)
    }

    /// Rows at the given indices, in that order.
    ///
    /// # Errors
    ///
    /// Returns error if an index is out of bounds.
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        let indices = UInt64Array::from_iter_values(indices.iter().map(|&i| i as u64));
        let batch = compute::take_record_batch(&self.batch, &indices)?;
        Ok(Self { batch })
    }

    /// Rows where `mask` is true.
    ///
    /// # Errors
    ///
    /// Returns error if the mask length differs from the row count.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Self> {
        let batch = compute::filter_record_batch(&self.batch, mask)?;
        Ok(Self { batch })
    }

    /// Concatenate tables sharing one schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty slice and a storage error on
    /// schema mismatch.
    pub fn concat(tables: &[Self]) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| Error::InvalidInput("No tables to concatenate".to_string()))?;
        let schema = first.schema();
        for table in &tables[1..] {
            if !same_fields(&table.schema(), &schema) {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    schema,
                    table.schema()
                )));
            }
        }

        let batch = compute::concat_batches(&schema, tables.iter().map(|t| &t.batch))?;
        Ok(Self { batch })
    }
}

/// Equal when field names, types, nullability and column contents match.
/// Schema-level metadata is ignored.
impl PartialEq for HistoryTable {
    fn eq(&self, other: &Self) -> bool {
        same_fields(&self.schema(), &other.schema())
            && self.num_rows() == other.num_rows()
            && self
                .batch
                .columns()
                .iter()
                .zip(other.batch.columns())
                .all(|(a, b)| a.to_data() == b.to_data())
    }
}

fn same_fields(a: &Schema, b: &Schema) -> bool {
    a.fields().len() == b.fields().len()
        && a.fields().iter().zip(b.fields().iter()).all(|(x, y)| {
            x.name() == y.name()
                && x.data_type() == y.data_type()
                && x.is_nullable() == y.is_nullable()
        })
}
