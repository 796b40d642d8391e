//! Table Store: in-memory ordered relation (columns + rows).
//!
//! A [`Table`] is the uniform shape every format decodes into. Cells carry no
//! scalar type beyond presence: a cell is either a string or absent.
//!
//! # Invariant
//!
//! Every row's cell count equals the table's column count. Absent values are
//! explicit `None` cells, never omitted. Each mutation validates the whole
//! change before committing, so a failed statement leaves the table as it
//! was.

pub mod arrow_bridge;
pub mod provider;

pub use provider::{MemoryTable, TableProvider};

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A single cell: present text or the absent marker.
pub type Cell = Option<String>;

/// Row predicate supplied by the external query engine.
pub type Predicate<'p> = &'p dyn Fn(&RowRef<'_>) -> bool;

// ════════════════════════════════════════════
// Row
// ════════════════════════════════════════════

/// Ordered cell values aligned positionally to a table's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row(Vec<Cell>);

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self(cells)
    }

    /// A row of `width` absent cells.
    pub fn absent(width: usize) -> Self {
        Self(vec![None; width])
    }

    /// Build a row from present string values.
    pub fn from_strs(values: &[&str]) -> Self {
        Self(values.iter().map(|v| Some((*v).to_string())).collect())
    }

    /// Build a row from `(column, value)` pairs; unnamed columns stay absent.
    pub fn from_named(columns: &[String], pairs: &[(&str, Cell)]) -> BridgeResult<Self> {
        let mut row = Self::absent(columns.len());
        for (name, value) in pairs {
            let idx = columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| BridgeError::Schema(format!("unknown column '{name}'")))?;
            row.0[idx] = value.clone();
        }
        Ok(row)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Present value at `idx`; `None` when absent or out of range.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|c| c.as_deref())
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    pub fn set(&mut self, idx: usize, value: Cell) {
        self.0[idx] = value;
    }

    /// Extend with absent cells up to `width`.
    pub fn pad_to(&mut self, width: usize) {
        if self.0.len() < width {
            self.0.resize(width, None);
        }
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.0
    }
}

impl From<Vec<Cell>> for Row {
    fn from(cells: Vec<Cell>) -> Self {
        Self(cells)
    }
}

impl FromIterator<Cell> for Row {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Borrowed view of a row with name-based access, handed to predicates.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl<'a> RowRef<'a> {
    pub fn new(columns: &'a [String], row: &'a Row) -> Self {
        Self { columns, row }
    }

    /// Present value of `column`; `None` when absent or unknown.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.row.get(idx)
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }
}

/// `SET column = value` for update statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: String,
    pub value: Cell,
}

impl Assignment {
    pub fn set(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: Some(value.into()),
        }
    }

    /// Assign the absent marker.
    pub fn clear(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: None,
        }
    }
}

// ════════════════════════════════════════════
// RowScan
// ════════════════════════════════════════════

/// Restartable snapshot of a table's rows.
///
/// Each call to [`RowScan::iter`] starts an independent traversal over the
/// same snapshot; later mutations of the table are not observed.
#[derive(Debug, Clone)]
pub struct RowScan {
    columns: Arc<[String]>,
    rows: Arc<Vec<Row>>,
}

impl RowScan {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> + '_ {
        self.rows.iter().map(|row| RowRef::new(&self.columns, row))
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        Arc::try_unwrap(self.rows).unwrap_or_else(|shared| (*shared).clone())
    }
}

// ════════════════════════════════════════════
// Table
// ════════════════════════════════════════════

/// Named, ordered relation of columns and rows.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Arc<[String]>,
    rows: Arc<Vec<Row>>,
}

impl Table {
    /// Create an empty table. Column names must be unique (case-sensitive).
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> BridgeResult<Self> {
        let name = name.into();
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(BridgeError::Schema(format!(
                    "duplicate column '{column}' in table '{name}'"
                )));
            }
        }
        Ok(Self {
            name,
            columns: columns.into(),
            rows: Arc::new(Vec::new()),
        })
    }

    /// Create a table and bulk-load `rows` in one validated step.
    pub fn with_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Row>,
    ) -> BridgeResult<Self> {
        let mut table = Self::new(name, columns)?;
        table.append_rows(rows)?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn scan(&self) -> RowScan {
        RowScan {
            columns: Arc::clone(&self.columns),
            rows: Arc::clone(&self.rows),
        }
    }

    fn check_width(&self, row: &Row, position: usize) -> BridgeResult<()> {
        if row.len() != self.columns.len() {
            return Err(BridgeError::Schema(format!(
                "row {position} of table '{}' has {} cells, expected {}",
                self.name,
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    /// Bulk append used by import. All rows are validated before any is
    /// committed.
    pub fn append_rows(&mut self, rows: Vec<Row>) -> BridgeResult<usize> {
        let base = self.rows.len();
        for (offset, row) in rows.iter().enumerate() {
            self.check_width(row, base + offset)?;
        }
        let count = rows.len();
        Arc::make_mut(&mut self.rows).extend(rows);
        Ok(count)
    }

    pub fn insert_row(&mut self, row: Row) -> BridgeResult<()> {
        self.check_width(&row, self.rows.len())?;
        Arc::make_mut(&mut self.rows).push(row);
        Ok(())
    }

    fn resolve_assignments(&self, assignments: &[Assignment]) -> BridgeResult<Vec<(usize, Cell)>> {
        assignments
            .iter()
            .map(|a| {
                self.column_index(&a.column)
                    .map(|idx| (idx, a.value.clone()))
                    .ok_or_else(|| {
                        BridgeError::Schema(format!(
                            "unknown column '{}' in table '{}'",
                            a.column, self.name
                        ))
                    })
            })
            .collect()
    }

    /// Apply `assignments` to every row matching `predicate`; returns the
    /// number of rows changed.
    pub fn update_where(
        &mut self,
        predicate: Predicate<'_>,
        assignments: &[Assignment],
    ) -> BridgeResult<usize> {
        let resolved = self.resolve_assignments(assignments)?;
        let matches: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| predicate(&RowRef::new(&self.columns, row)))
            .map(|(idx, _)| idx)
            .collect();
        if matches.is_empty() {
            return Ok(0);
        }

        let rows = Arc::make_mut(&mut self.rows);
        for &idx in &matches {
            for (col, value) in &resolved {
                rows[idx].set(*col, value.clone());
            }
        }
        Ok(matches.len())
    }

    /// Remove every row matching `predicate`; returns the number removed.
    pub fn delete_where(&mut self, predicate: Predicate<'_>) -> BridgeResult<usize> {
        let keep: Vec<bool> = self
            .rows
            .iter()
            .map(|row| !predicate(&RowRef::new(&self.columns, row)))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return Ok(0);
        }

        let mut flags = keep.into_iter();
        Arc::make_mut(&mut self.rows).retain(|_| flags.next().unwrap_or(true));
        Ok(removed)
    }
}
