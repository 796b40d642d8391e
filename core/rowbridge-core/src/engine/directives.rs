//! Directive values: the requests a [`Session`](super::Session) executes.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{FormatOptions, FormatTag, RawInput, TextDecoder, ValueFilter};
use crate::persist::PersistenceMode;
use crate::schema::ColumnSpec;
use crate::table::{Row, RowRef, TableProvider};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Where an import or conversion reads from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Local path (relative to the session root) or remote URL.
    Location(String),
    /// Data handed over directly by the caller.
    Inline(RawInput),
}

impl Source {
    pub fn location(location: impl Into<String>) -> Self {
        Source::Location(location.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Source::Inline(RawInput::Text(text.into()))
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Source::Inline(RawInput::Structured(value))
    }
}

// ════════════════════════════════════════════
// Import
// ════════════════════════════════════════════

/// Create and populate a table from external data.
#[derive(Debug, Clone)]
pub struct ImportDirective {
    /// Explicit name; a default `tableN` name is assigned when omitted.
    pub table: Option<String>,
    pub columns: ColumnSpec,
    pub format: FormatTag,
    pub source: Source,
    pub options: Option<FormatOptions>,
    /// Session default when omitted.
    pub persistence: Option<PersistenceMode>,
    pub text_decoder: Option<TextDecoder>,
    pub value_filter: Option<ValueFilter>,
}

impl ImportDirective {
    pub fn new(format: FormatTag, source: Source) -> Self {
        Self {
            table: None,
            columns: ColumnSpec::default(),
            format,
            source,
            options: None,
            persistence: None,
            text_decoder: None,
            value_filter: None,
        }
    }

    pub fn named(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_columns(mut self, columns: ColumnSpec) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_persistence(mut self, mode: PersistenceMode) -> Self {
        self.persistence = Some(mode);
        self
    }

    pub fn with_text_decoder(mut self, decoder: TextDecoder) -> Self {
        self.text_decoder = Some(decoder);
        self
    }

    pub fn with_value_filter(mut self, filter: ValueFilter) -> Self {
        self.value_filter = Some(filter);
        self
    }

    pub fn effective_options(&self) -> FormatOptions {
        self.options
            .clone()
            .unwrap_or_else(|| FormatOptions::default_for(&self.format))
    }

    pub(crate) fn has_hooks(&self) -> bool {
        self.text_decoder.is_some() || self.value_filter.is_some()
    }
}

// ════════════════════════════════════════════
// Row query
// ════════════════════════════════════════════

/// Row filter evaluated during an export query.
pub type RowFilter = Arc<dyn Fn(&RowRef<'_>) -> bool + Send + Sync>;

/// Row-producing query over one table: optional projection, optional filter.
#[derive(Clone)]
pub struct RowQuery {
    pub table: String,
    pub projection: Option<Vec<String>>,
    pub filter: Option<RowFilter>,
}

impl RowQuery {
    /// Every column of every row.
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: None,
            filter: None,
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RowRef<'_>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Evaluate against `provider`, returning the result columns and rows.
    pub fn run(&self, provider: &dyn TableProvider) -> BridgeResult<(Vec<String>, Vec<Row>)> {
        let scan = provider.scan()?;
        let available = scan.columns();

        let indices: Vec<usize> = match &self.projection {
            None => (0..available.len()).collect(),
            Some(names) => {
                let mut seen = HashSet::with_capacity(names.len());
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    if !seen.insert(name.as_str()) {
                        return Err(BridgeError::Schema(format!(
                            "column '{name}' selected twice"
                        )));
                    }
                    let idx = available.iter().position(|c| c == name).ok_or_else(|| {
                        BridgeError::Schema(format!(
                            "table '{}' has no column '{name}'",
                            self.table
                        ))
                    })?;
                    indices.push(idx);
                }
                indices
            }
        };

        let columns = indices.iter().map(|&i| available[i].clone()).collect();
        let rows = scan
            .iter()
            .filter(|row| self.filter.as_ref().is_none_or(|keep| keep(row)))
            .map(|row| {
                let cells = row.row().cells();
                indices.iter().map(|&i| cells[i].clone()).collect::<Row>()
            })
            .collect();
        Ok((columns, rows))
    }
}

impl fmt::Debug for RowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowQuery")
            .field("table", &self.table)
            .field("projection", &self.projection)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ════════════════════════════════════════════
// Export / convert
// ════════════════════════════════════════════

/// Overwrite `target` in full with the encoded result of `query`.
#[derive(Debug, Clone)]
pub struct ExportDirective {
    pub query: RowQuery,
    pub target: String,
    pub format: FormatTag,
    pub options: Option<FormatOptions>,
    /// Write the column names as a first record, where the format allows.
    pub header: bool,
}

impl ExportDirective {
    pub fn new(query: RowQuery, format: FormatTag, target: impl Into<String>) -> Self {
        Self {
            query,
            target: target.into(),
            format,
            options: None,
            header: false,
        }
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn effective_options(&self) -> FormatOptions {
        self.options
            .clone()
            .unwrap_or_else(|| FormatOptions::default_for(&self.format))
    }
}

/// Decode a source in one format and write it in another, without creating
/// a table.
#[derive(Debug, Clone)]
pub struct ConvertDirective {
    pub input: ImportDirective,
    pub target: String,
    pub format: FormatTag,
    pub options: Option<FormatOptions>,
    pub header: bool,
}

impl ConvertDirective {
    pub fn new(input: ImportDirective, format: FormatTag, target: impl Into<String>) -> Self {
        Self {
            input,
            target: target.into(),
            format,
            options: None,
            header: false,
        }
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn effective_options(&self) -> FormatOptions {
        self.options
            .clone()
            .unwrap_or_else(|| FormatOptions::default_for(&self.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::table::{MemoryTable, Table};

    fn people() -> MemoryTable {
        let table = Table::with_rows(
            "people",
            vec!["id".into(), "name".into(), "city".into()],
            vec![
                Row::from_strs(&["1", "ann", "Oslo"]),
                Row::from_strs(&["2", "bob", "Rome"]),
                Row::from_strs(&["3", "cid", "Oslo"]),
            ],
        )
        .unwrap();
        MemoryTable::new(table, PersistenceMode::Transient)
    }

    #[test]
    fn test_query_projection_and_filter() {
        let query = RowQuery::all("people")
            .select(["name", "id"])
            .filter(|row| row.get("city") == Some("Oslo"));
        let (columns, rows) = query.run(&people()).unwrap();
        assert_eq!(columns, vec!["name", "id"]);
        assert_eq!(
            rows,
            vec![Row::from_strs(&["ann", "1"]), Row::from_strs(&["cid", "3"])]
        );
    }

    #[test]
    fn test_query_unknown_column() {
        let err = RowQuery::all("people").select(["zip"]).run(&people()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let err = RowQuery::all("people")
            .select(["id", "id"])
            .run(&people())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }
}
