//! Native structures: array-of-arrays and array-of-maps.
//!
//! Structured input is consumed as-is; text or byte input is read as JSON
//! first. Objects contribute their keys as discovered columns in first-seen
//! order.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput};
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeShape {
    /// `[["a", "b"], ...]`
    #[default]
    Rows,
    /// `[{"x": "a", "y": "b"}, ...]`
    Maps,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeOptions {
    /// Shape written by encode; decode accepts either.
    #[serde(default)]
    pub shape: NativeShape,
}

impl NativeOptions {
    pub fn maps() -> Self {
        Self {
            shape: NativeShape::Maps,
        }
    }
}

pub struct NativeCodec;

fn native_options(options: &FormatOptions) -> BridgeResult<&NativeOptions> {
    match options {
        FormatOptions::Native(opts) => Ok(opts),
        other => Err(other.mismatch("native")),
    }
}

fn scalar(value: &Value, record: usize) -> BridgeResult<Cell> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => {
            return Err(BridgeError::parse(record, "nested value inside a record"));
        }
    })
}

fn decode_value(value: Value) -> BridgeResult<Decoded> {
    let Value::Array(items) = value else {
        return Err(BridgeError::parse(0, "top-level value must be an array"));
    };

    let mut records = Vec::with_capacity(items.len());
    let mut keys: Vec<String> = Vec::new();
    let mut shape = None;

    for (idx, item) in items.iter().enumerate() {
        let this = match item {
            Value::Array(_) => NativeShape::Rows,
            Value::Object(_) => NativeShape::Maps,
            _ => return Err(BridgeError::parse(idx, "record must be an array or an object")),
        };
        if *shape.get_or_insert(this) != this {
            return Err(BridgeError::parse(idx, "arrays and objects mixed in one input"));
        }

        match item {
            Value::Array(fields) => {
                let record = fields
                    .iter()
                    .map(|v| scalar(v, idx))
                    .collect::<BridgeResult<Vec<_>>>()?;
                records.push(record);
            }
            Value::Object(map) => {
                let mut record = vec![None; keys.len()];
                for (key, v) in map {
                    let pos = match keys.iter().position(|k| k == key) {
                        Some(pos) => pos,
                        None => {
                            keys.push(key.clone());
                            record.push(None);
                            keys.len() - 1
                        }
                    };
                    record[pos] = scalar(v, idx)?;
                }
                records.push(record);
            }
            _ => {}
        }
    }

    let decoded = Decoded::new(records);
    Ok(match shape {
        Some(NativeShape::Maps) => decoded.with_columns(keys),
        _ => decoded,
    })
}

fn cell_value(cell: &Cell) -> Value {
    cell.as_ref().map_or(Value::Null, |v| Value::String(v.clone()))
}

impl NativeCodec {
    /// Rows as a JSON value in the configured shape.
    pub fn to_value(columns: &[String], rows: &[Row], shape: NativeShape) -> Value {
        let items = rows.iter().map(|row| match shape {
            NativeShape::Rows => Value::Array(row.cells().iter().map(cell_value).collect()),
            NativeShape::Maps => Value::Object(
                columns
                    .iter()
                    .zip(row.cells())
                    .map(|(column, cell)| (column.clone(), cell_value(cell)))
                    .collect::<Map<String, Value>>(),
            ),
        });
        Value::Array(items.collect())
    }
}

impl Codec for NativeCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        native_options(options).map(|_| ())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        native_options(options)?;
        let value = match input {
            RawInput::Structured(value) => value,
            RawInput::Files(_) => {
                return Err(BridgeError::Configuration(
                    "native format cannot decode a file set".to_string(),
                ));
            }
            other => serde_json::from_str(&other.into_text()?)?,
        };
        decode_value(value)
    }

    fn encode(
        &self,
        columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let opts = native_options(options)?;
        let value = Self::to_value(columns, rows, opts.shape);
        let mut bytes = serde_json::to_vec_pretty(&value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
