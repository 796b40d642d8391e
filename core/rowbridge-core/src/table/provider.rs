//! Table-provider capability: the seam to the external query engine.
//!
//! The query engine never parses formats itself: it introspects the column
//! list, scans rows, and sends predicate-based mutations through this trait.
//! Whether the rows live only in memory or are synchronized with a file is
//! the implementation's concern.

use crate::error::BridgeResult;
use crate::persist::PersistenceMode;
use crate::table::{Assignment, Predicate, Row, RowScan, Table, arrow_bridge};
use arrow::record_batch::RecordBatch;
use parking_lot::RwLock;

/// Capability an external query engine consumes to read and mutate a table.
///
/// # Contract
///
/// - `scan`: restartable snapshot; the engine's sole read path.
/// - `insert_row`: the row must have exactly one cell per column.
/// - `update_where` / `delete_where`: return the number of affected rows.
/// - Every mutation is all-or-nothing.
pub trait TableProvider: Send + Sync {
    /// Table name.
    fn name(&self) -> &str;

    /// Durability strategy backing this table.
    fn persistence(&self) -> PersistenceMode;

    /// Ordered column list.
    fn columns(&self) -> BridgeResult<Vec<String>>;

    /// Snapshot of the current rows.
    fn scan(&self) -> BridgeResult<RowScan>;

    /// Insert one row.
    fn insert_row(&self, row: Row) -> BridgeResult<()>;

    /// Apply assignments to matching rows.
    fn update_where(
        &self,
        predicate: Predicate<'_>,
        assignments: &[Assignment],
    ) -> BridgeResult<usize>;

    /// Delete matching rows.
    fn delete_where(&self, predicate: Predicate<'_>) -> BridgeResult<usize>;

    /// Number of rows currently visible.
    fn row_count(&self) -> BridgeResult<usize> {
        Ok(self.scan()?.len())
    }

    /// Current rows as an Arrow batch (every column nullable UTF-8), for
    /// Arrow-native query engines.
    fn record_batch(&self) -> BridgeResult<RecordBatch> {
        let scan = self.scan()?;
        arrow_bridge::to_record_batch(scan.columns(), scan.rows())
    }
}

/// Transient or batch table: the in-memory [`Table`] is the whole state.
pub struct MemoryTable {
    name: String,
    table: RwLock<Table>,
    mode: RwLock<PersistenceMode>,
}

impl MemoryTable {
    pub fn new(table: Table, mode: PersistenceMode) -> Self {
        Self {
            name: table.name().to_string(),
            table: RwLock::new(table),
            mode: RwLock::new(mode),
        }
    }

    /// Bulk append used by import.
    pub fn append_rows(&self, rows: Vec<Row>) -> BridgeResult<usize> {
        self.table.write().append_rows(rows)
    }

    /// Record that the table's content now has a backing export.
    pub(crate) fn mark_exported(&self) {
        let mut mode = self.mode.write();
        if *mode == PersistenceMode::Transient {
            *mode = PersistenceMode::Batch;
        }
    }

    /// Clone of the current table value.
    pub fn snapshot(&self) -> Table {
        self.table.read().clone()
    }
}

impl TableProvider for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn persistence(&self) -> PersistenceMode {
        *self.mode.read()
    }

    fn columns(&self) -> BridgeResult<Vec<String>> {
        Ok(self.table.read().columns().to_vec())
    }

    fn scan(&self) -> BridgeResult<RowScan> {
        Ok(self.table.read().scan())
    }

    fn insert_row(&self, row: Row) -> BridgeResult<()> {
        self.table.write().insert_row(row)
    }

    fn update_where(
        &self,
        predicate: Predicate<'_>,
        assignments: &[Assignment],
    ) -> BridgeResult<usize> {
        self.table.write().update_where(predicate, assignments)
    }

    fn delete_where(&self, predicate: Predicate<'_>) -> BridgeResult<usize> {
        self.table.write().delete_where(predicate)
    }

    fn row_count(&self) -> BridgeResult<usize> {
        Ok(self.table.read().row_count())
    }
}
