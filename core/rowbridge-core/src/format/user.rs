//! User-defined codecs.
//!
//! The engine splits the input on the record separator and hands each raw
//! record to a caller-supplied extraction function. Encoding is available
//! only when a compose function is supplied as well.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput, ensure_single_record, split_records};
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Extract = Arc<dyn Fn(&str) -> Vec<Cell> + Send + Sync>;
type Compose = Arc<dyn Fn(&[Cell]) -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOptions {
    pub record_separator: String,
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            record_separator: "\n".to_string(),
        }
    }
}

/// Codec built from caller-supplied functions; register it under
/// `FormatTag::Custom(name)`.
#[derive(Clone)]
pub struct UserCodec {
    extract: Extract,
    compose: Option<Compose>,
}

impl UserCodec {
    pub fn new<F>(extract: F) -> Self
    where
        F: Fn(&str) -> Vec<Cell> + Send + Sync + 'static,
    {
        Self {
            extract: Arc::new(extract),
            compose: None,
        }
    }

    /// Inverse of the extraction function: one row to one raw record.
    pub fn with_compose<F>(mut self, compose: F) -> Self
    where
        F: Fn(&[Cell]) -> String + Send + Sync + 'static,
    {
        self.compose = Some(Arc::new(compose));
        self
    }
}

fn user_options(options: &FormatOptions) -> BridgeResult<&UserOptions> {
    match options {
        FormatOptions::User(opts) => Ok(opts),
        other => Err(other.mismatch("user-defined")),
    }
}

impl Codec for UserCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        if user_options(options)?.record_separator.is_empty() {
            return Err(BridgeError::Configuration(
                "record separator must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        let opts = user_options(options)?;
        let text = input.into_text()?;
        let records = split_records(&text, &opts.record_separator)
            .map(|(_, record)| (self.extract)(record))
            .collect();
        Ok(Decoded::new(records))
    }

    fn encode(
        &self,
        _columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let opts = user_options(options)?;
        let compose = self.compose.as_ref().ok_or_else(|| {
            BridgeError::Configuration("user-defined format has no compose function".to_string())
        })?;

        let mut out = String::new();
        for (idx, row) in rows.iter().enumerate() {
            let record = compose(row.cells());
            ensure_single_record(&record, &opts.record_separator, idx)?;
            out.push_str(&record);
            out.push_str(&opts.record_separator);
        }
        Ok(out.into_bytes())
    }

    fn can_encode(&self) -> bool {
        self.compose.is_some()
    }

    fn supports_header(&self) -> bool {
        true
    }
}
