//! Catalog Manager: table name → (format, location, options) bindings.
//!
//! Every binding is served by one [`BoundTable`], so all statements against a
//! bound name share that binding's lock. Registering, removing and listing
//! bindings never touches the backing files.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{CodecRegistry, FormatOptions, FormatTag};
use crate::persist::{BoundTable, StorageContext, check_header, writer};
use crate::schema::{ColumnSpec, validate_identifier};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// One continuous-mode binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub table: String,
    pub format: FormatTag,
    /// Local path (relative to the session root) or remote URL.
    pub location: String,
    /// Format options; the format's defaults when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FormatOptions>,
    #[serde(default)]
    pub columns: ColumnSpec,
}

impl CatalogEntry {
    pub fn new(table: impl Into<String>, format: FormatTag, location: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            format,
            location: location.into(),
            options: None,
            columns: ColumnSpec::default(),
        }
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_columns(mut self, columns: ColumnSpec) -> Self {
        self.columns = columns;
        self
    }

    /// Options in effect: explicit ones, or the format's defaults.
    pub fn effective_options(&self) -> FormatOptions {
        self.options
            .clone()
            .unwrap_or_else(|| FormatOptions::default_for(&self.format))
    }
}

/// Registered continuous bindings of one session.
pub struct Catalog {
    bindings: DashMap<String, Arc<BoundTable>>,
    /// Serializes bind/unbind so a multi-entry registration is atomic.
    directive_lock: Mutex<()>,
    storage: StorageContext,
    registry: Arc<RwLock<CodecRegistry>>,
}

impl Catalog {
    pub fn new(storage: StorageContext, registry: Arc<RwLock<CodecRegistry>>) -> Self {
        Self {
            bindings: DashMap::new(),
            directive_lock: Mutex::new(()),
            storage,
            registry,
        }
    }

    fn check_entry(&self, entry: &CatalogEntry) -> BridgeResult<()> {
        validate_identifier(&entry.table)?;
        entry.columns.validate()?;
        let codec = self.registry.read().get(&entry.format)?;
        codec.validate(&entry.effective_options())?;
        check_header(codec.as_ref(), &entry.format, &entry.columns)?;
        self.storage.resolve(&entry.location)?;
        Ok(())
    }

    /// Register several bindings at once: every entry is validated before any
    /// is applied. Re-registering an identical entry is a no-op; a different
    /// entry for a bound name, or a name `taken` by another table, is a
    /// catalog error. Returns the newly bound names in input order.
    #[instrument(skip_all, fields(count = entries.len()))]
    pub fn bind_all(
        &self,
        entries: Vec<CatalogEntry>,
        taken: impl Fn(&str) -> bool,
    ) -> BridgeResult<Vec<String>> {
        let _guard = self.directive_lock.lock();

        let mut pending: Vec<CatalogEntry> = Vec::with_capacity(entries.len());
        let mut in_batch: HashMap<String, CatalogEntry> = HashMap::new();

        for entry in entries {
            self.check_entry(&entry)?;
            if taken(&entry.table) {
                return Err(BridgeError::Catalog(format!(
                    "'{}' is already an in-memory table",
                    entry.table
                )));
            }
            if let Some(existing) = self.bindings.get(&entry.table) {
                if existing.entry() == &entry {
                    continue;
                }
                return Err(BridgeError::Catalog(format!(
                    "'{}' is already bound to '{}'",
                    entry.table,
                    existing.entry().location
                )));
            }
            match in_batch.get(&entry.table) {
                Some(earlier) if earlier == &entry => continue,
                Some(_) => {
                    return Err(BridgeError::Catalog(format!(
                        "conflicting bindings for '{}' in one directive",
                        entry.table
                    )));
                }
                None => {
                    in_batch.insert(entry.table.clone(), entry.clone());
                    pending.push(entry);
                }
            }
        }

        let mut bound = Vec::with_capacity(pending.len());
        for entry in pending {
            info!(table = %entry.table, format = %entry.format, location = %entry.location, "bind");
            let name = entry.table.clone();
            let table = BoundTable::new(entry, self.storage.clone(), Arc::clone(&self.registry));
            self.bindings.insert(name.clone(), Arc::new(table));
            bound.push(name);
        }
        Ok(bound)
    }

    /// Run `f` with bind/unbind held off. Callers use it to claim a name
    /// outside the catalog without racing a concurrent bind.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.directive_lock.lock();
        f()
    }

    /// Remove a binding. The backing file is left alone.
    #[instrument(skip(self))]
    pub fn unbind(&self, table: &str) -> BridgeResult<CatalogEntry> {
        let _guard = self.directive_lock.lock();
        let (_, bound) = self
            .bindings
            .remove(table)
            .ok_or_else(|| BridgeError::Catalog(format!("no binding for '{table}'")))?;
        info!(table, "unbind");
        Ok(bound.entry().clone())
    }

    pub fn get(&self, table: &str) -> Option<Arc<BoundTable>> {
        self.bindings.get(table).map(|b| Arc::clone(b.value()))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.bindings.contains_key(table)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound table names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    /// All entries, sorted by table name.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> =
            self.bindings.iter().map(|b| b.entry().clone()).collect();
        entries.sort_by(|a, b| a.table.cmp(&b.table));
        entries
    }

    /// Write every binding to `path` as JSON.
    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        let json = serde_json::to_vec_pretty(&self.entries())
            .map_err(|err| BridgeError::Catalog(format!("cannot serialize catalog: {err}")))?;
        writer::write_staged(path, &json)
    }

    /// Entries saved by [`save`](Self::save); bind them with
    /// [`bind_all`](Self::bind_all).
    pub fn load(path: &Path) -> BridgeResult<Vec<CatalogEntry>> {
        let location = path.display().to_string();
        let bytes = writer::read_local(path)?.ok_or_else(|| {
            BridgeError::storage(&location, "catalog file does not exist")
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|err| BridgeError::Catalog(format!("invalid catalog file '{location}': {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::persist::HttpFetcher;
    use tempfile::tempdir;

    fn catalog(root: &Path) -> Catalog {
        let storage = StorageContext::new(root.to_path_buf(), Arc::new(HttpFetcher::new()));
        Catalog::new(storage, Arc::new(RwLock::new(CodecRegistry::new())))
    }

    fn entry(table: &str, location: &str) -> CatalogEntry {
        CatalogEntry::new(table, FormatTag::Csv, location)
    }

    #[test]
    fn test_bind_all_is_atomic() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        let err = catalog
            .bind_all(
                vec![entry("good", "a.csv"), entry("bad-name", "b.csv")],
                |_| false,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Naming);
        assert!(catalog.is_empty());

        let bound = catalog
            .bind_all(vec![entry("a", "a.csv"), entry("b", "b.csv")], |_| false)
            .unwrap();
        assert_eq!(bound, vec!["a", "b"]);
    }

    #[test]
    fn test_identical_rebind_is_noop_conflict_is_error() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog.bind_all(vec![entry("t", "t.csv")], |_| false).unwrap();

        let again = catalog.bind_all(vec![entry("t", "t.csv")], |_| false).unwrap();
        assert!(again.is_empty());

        let err = catalog
            .bind_all(vec![entry("t", "other.csv")], |_| false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Catalog);

        let err = catalog
            .bind_all(vec![entry("mem", "m.csv")], |name| name == "mem")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Catalog);
    }

    #[test]
    fn test_unbind_keeps_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("t.csv"), "x\n").unwrap();
        let catalog = catalog(dir.path());
        catalog.bind_all(vec![entry("t", "t.csv")], |_| false).unwrap();

        let removed = catalog.unbind("t").unwrap();
        assert_eq!(removed.location, "t.csv");
        assert!(dir.path().join("t.csv").exists());

        let err = catalog.unbind("t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Catalog);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        let pipe = CatalogEntry::new("p", FormatTag::Pipe, "p.txt")
            .with_columns(ColumnSpec::explicit(["a", "b"]));
        catalog
            .bind_all(vec![pipe.clone(), entry("c", "c.csv")], |_| false)
            .unwrap();

        let path = dir.path().join("catalog.json");
        catalog.save(&path).unwrap();
        let entries = Catalog::load(&path).unwrap();
        assert_eq!(entries, vec![entry("c", "c.csv"), pipe]);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        let err = catalog
            .bind_all(
                vec![CatalogEntry::new("t", FormatTag::Custom("nope".into()), "t")],
                |_| false,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
