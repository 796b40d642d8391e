//! Column-name resolution.
//!
//! Precedence, highest first:
//!
//! 1. explicit names
//! 2. the first decoded record, when the header flag (`"first_line"`) is set
//! 3. names discovered by the codec (markup mappings, object keys, ...)
//! 4. synthesized `col1`, `col2`, ...
//!
//! With both explicit names and the header flag, the explicit names win and
//! the header record is still consumed.

use crate::error::{BridgeError, BridgeResult};
use crate::schema::naming::validate_identifier;
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sentinel that marks the first record as the header.
pub const FIRST_LINE: &str = "first_line";

/// Prefix of synthesized column names.
pub const DEFAULT_COLUMN_PREFIX: &str = "col";

/// How a table's column names are obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Explicit names, in column order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    /// The first record is a header: consumed on decode, written on encode.
    #[serde(default)]
    pub header: bool,
}

impl ColumnSpec {
    /// No names at all: use discovered or synthesized names.
    pub fn synthesized() -> Self {
        Self::default()
    }

    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
            header: false,
        }
    }

    pub fn first_line() -> Self {
        Self {
            names: None,
            header: true,
        }
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Parse the classic string form: `"first_line"` or `"a,b,c"`.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() {
            Self::synthesized()
        } else if spec == FIRST_LINE {
            Self::first_line()
        } else {
            Self::explicit(spec.split(',').map(|s| s.trim().to_string()))
        }
    }

    /// Check explicit names: valid identifiers, unique.
    pub fn validate(&self) -> BridgeResult<()> {
        if let Some(names) = &self.names {
            for name in names {
                validate_identifier(name)?;
            }
            ensure_unique(names)?;
        }
        Ok(())
    }
}

fn ensure_unique(names: &[String]) -> BridgeResult<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(BridgeError::Schema(format!("duplicate column '{name}'")));
        }
    }
    Ok(())
}

fn synthesized_name(position: usize) -> String {
    format!("{DEFAULT_COLUMN_PREFIX}{}", position + 1)
}

/// Resolve the final column list and turn decoded records into rows of
/// exactly that width.
///
/// Short records are padded with absent cells. A record wider than the
/// resolved columns is a schema error naming its position in decode order.
pub fn resolve_columns(
    spec: &ColumnSpec,
    mut records: Vec<Vec<Cell>>,
    discovered: Option<Vec<String>>,
) -> BridgeResult<(Vec<String>, Vec<Row>)> {
    spec.validate()?;

    let header = if spec.header && !records.is_empty() {
        Some(records.remove(0))
    } else {
        None
    };
    let first_data_record = usize::from(header.is_some());

    let columns = match (&spec.names, header, discovered) {
        (Some(names), _, _) => names.clone(),
        (None, Some(header), _) => {
            let names: Vec<String> = header
                .into_iter()
                .enumerate()
                .map(|(pos, cell)| match cell.map(|c| c.trim().to_string()) {
                    Some(name) if !name.is_empty() => name,
                    _ => synthesized_name(pos),
                })
                .collect();
            ensure_unique(&names)?;
            names
        }
        (None, None, Some(discovered)) => {
            ensure_unique(&discovered)?;
            discovered
        }
        (None, None, None) => {
            let width = records.iter().map(Vec::len).max().unwrap_or(0);
            (0..width).map(synthesized_name).collect()
        }
    };

    let width = columns.len();
    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        if record.len() > width {
            return Err(BridgeError::Schema(format!(
                "record {} has {} fields but only {} columns are defined",
                idx + first_data_record,
                record.len(),
                width
            )));
        }
        let mut row = Row::new(record);
        row.pad_to(width);
        rows.push(row);
    }

    Ok((columns, rows))
}
