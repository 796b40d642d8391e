//! Parquet interchange.
//!
//! Decode renders every column as text through Arrow; encode writes one
//! row group of nullable UTF-8 columns.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput};
use crate::table::Row;
use crate::table::arrow_bridge::{from_record_batches, to_record_batch};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

pub struct ParquetCodec;

fn check_options(options: &FormatOptions) -> BridgeResult<()> {
    match options {
        FormatOptions::Parquet => Ok(()),
        other => Err(other.mismatch("parquet")),
    }
}

impl Codec for ParquetCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        check_options(options)
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        check_options(options)?;
        let bytes = Bytes::from(input.into_bytes()?);
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;

        let (columns, records) = from_record_batches(&schema, &batches)?;
        Ok(Decoded::new(records).with_columns(columns))
    }

    fn encode(
        &self,
        columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        check_options(options)?;
        if columns.is_empty() {
            return Err(BridgeError::Schema(
                "parquet output needs at least one column".to_string(),
            ));
        }
        let batch = to_record_batch(columns, rows)?;
        let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)?;
        writer.write(&batch)?;
        Ok(writer.into_inner()?)
    }
}
