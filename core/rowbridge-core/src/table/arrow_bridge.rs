//! Arrow interchange: rows ↔ `RecordBatch`.
//!
//! Rows carry untyped text, so every outgoing column is nullable `Utf8`.
//! Incoming batches of any type are rendered through Arrow's display
//! formatter; nulls become absent cells.

use crate::error::BridgeResult;
use crate::table::{Cell, Row};
use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use std::sync::Arc;

/// Schema with one nullable UTF-8 field per column.
pub fn utf8_schema(columns: &[String]) -> Arc<Schema> {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

/// Convert rows into a single batch.
pub fn to_record_batch(columns: &[String], rows: &[Row]) -> BridgeResult<RecordBatch> {
    let schema = utf8_schema(columns);
    let arrays: Vec<ArrayRef> = (0..columns.len())
        .map(|idx| {
            let values: Vec<Option<&str>> = rows.iter().map(|row| row.get(idx)).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    // Explicit row count keeps zero-column tables representable.
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}

/// Convert batches (sharing one schema) into column names and cell records.
pub fn from_record_batches(
    schema: &Schema,
    batches: &[RecordBatch],
) -> BridgeResult<(Vec<String>, Vec<Vec<Cell>>)> {
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let options = FormatOptions::default();
    let mut records = Vec::new();

    for batch in batches {
        let formatters = batch
            .columns()
            .iter()
            .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()?;

        for row_idx in 0..batch.num_rows() {
            let record = batch
                .columns()
                .iter()
                .zip(&formatters)
                .map(|(array, formatter)| {
                    if array.is_null(row_idx) {
                        None
                    } else {
                        Some(formatter.value(row_idx).to_string())
                    }
                })
                .collect();
            records.push(record);
        }
    }

    Ok((columns, records))
}
