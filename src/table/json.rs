//! JSON value → Arrow column inference

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use serde_json::Value;
use std::sync::Arc;

/// Widest value kind seen in a column so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Empty,
    Bool,
    Int,
    Float,
    Text,
}

fn kind_of(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Empty,
        Value::Bool(_) => Kind::Bool,
        Value::Number(n) if n.is_i64() => Kind::Int,
        Value::Number(_) => Kind::Float,
        _ => Kind::Text,
    }
}

fn widen(acc: Kind, next: Kind) -> Kind {
    match (acc, next) {
        (a, Kind::Empty) => a,
        (Kind::Empty, b) => b,
        (a, b) if a == b => a,
        (Kind::Int | Kind::Float, Kind::Int | Kind::Float) => Kind::Float,
        _ => Kind::Text,
    }
}

/// Build one Arrow column from per-row JSON values (`None` = absent).
///
/// Booleans stay `Boolean`, integers `Int64`, integers mixed with floats
/// widen to `Float64`; every other mix is `Utf8` with non-string values
/// rendered as compact JSON. An all-absent column is an all-null `Float64`.
pub(crate) fn infer_column(values: &[Option<&Value>]) -> (DataType, ArrayRef) {
    let kind = values
        .iter()
        .flatten()
        .map(|v| kind_of(v))
        .fold(Kind::Empty, widen);

    match kind {
        Kind::Bool => {
            let array: BooleanArray = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
            (DataType::Boolean, Arc::new(array))
        }
        Kind::Int => {
            let array: Int64Array = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            (DataType::Int64, Arc::new(array))
        }
        Kind::Float => {
            let array: Float64Array = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
            (DataType::Float64, Arc::new(array))
        }
        Kind::Text => {
            let array: StringArray = values
                .iter()
                .map(|v| match v {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                })
                .collect();
            (DataType::Utf8, Arc::new(array))
        }
        Kind::Empty => {
            let array = Float64Array::from(vec![None; values.len()]);
            (DataType::Float64, Arc::new(array))
        }
    }
}
