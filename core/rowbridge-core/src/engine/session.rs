//! Session: the context object every directive runs in.
//!
//! A session owns the default-name counter, the in-memory tables, the
//! catalog, the codec registry and the storage context. Nothing here is
//! process-global: two sessions never share names or bindings.

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::SessionConfig;
use crate::engine::directives::{ConvertDirective, ExportDirective, ImportDirective, Source};
use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, CodecRegistry, Decoded, FormatOptions, FormatTag};
use crate::persist::{
    Fetch, HttpFetcher, PersistenceMode, StorageContext, check_header, encode_rows,
};
use crate::schema::{TableNamer, resolve_columns, validate_identifier};
use crate::table::{MemoryTable, Row, Table, TableProvider};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Session {
    default_persistence: PersistenceMode,
    namer: Mutex<TableNamer>,
    tables: DashMap<String, Arc<MemoryTable>>,
    catalog: Catalog,
    registry: Arc<RwLock<CodecRegistry>>,
    storage: StorageContext,
}

impl Session {
    /// Session with the bundled HTTP(S) transport.
    pub fn new(config: SessionConfig) -> BridgeResult<Self> {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()))
    }

    /// Session whose remote locations go through `fetcher`.
    pub fn with_fetcher(config: SessionConfig, fetcher: Arc<dyn Fetch>) -> BridgeResult<Self> {
        config.validate()?;
        let registry = Arc::new(RwLock::new(CodecRegistry::new()));
        let storage = StorageContext::new(config.root_dir.clone(), fetcher);
        let catalog = Catalog::new(storage.clone(), Arc::clone(&registry));
        info!(root = %config.root_dir.display(), default = %config.default_persistence, "session opened");
        Ok(Self {
            default_persistence: config.default_persistence,
            namer: Mutex::new(TableNamer::new()),
            tables: DashMap::new(),
            catalog,
            registry,
            storage,
        })
    }

    // ════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════

    /// Change the base of relative locations. Bound tables resolve their
    /// location per statement, so they follow the change.
    pub fn set_root_dir(&self, root: impl Into<PathBuf>) {
        let root = root.into();
        info!(root = %root.display(), "root directory changed");
        self.storage.set_root(root);
    }

    pub fn root_dir(&self) -> PathBuf {
        self.storage.root()
    }

    /// Install or replace the codec for `tag` (user-defined formats).
    pub fn register_codec(&self, tag: FormatTag, codec: Arc<dyn Codec>) {
        debug!(format = %tag, "register codec");
        self.registry.write().register(tag, codec);
    }

    fn codec(&self, tag: &FormatTag) -> BridgeResult<Arc<dyn Codec>> {
        self.registry.read().get(tag)
    }

    fn is_taken(&self, name: &str) -> bool {
        self.tables.contains_key(name) || self.catalog.contains(name)
    }

    // ════════════════════════════════════════════
    // Import / export / convert
    // ════════════════════════════════════════════

    /// Create and populate a table; returns its name.
    ///
    /// Nothing in the session changes unless the whole directive succeeds.
    #[instrument(skip_all, fields(format = %directive.format, table = ?directive.table))]
    pub fn import(&self, directive: ImportDirective) -> BridgeResult<String> {
        if let Some(name) = &directive.table {
            validate_identifier(name)?;
        }
        directive.columns.validate()?;
        let mode = directive.persistence.unwrap_or(self.default_persistence);
        if mode == PersistenceMode::Continuous {
            return self.import_continuous(directive);
        }

        let decoded = self.decode_source(&directive)?;
        let (names, rows) = resolve_columns(&directive.columns, decoded.records, decoded.columns)?;

        let name = match &directive.table {
            Some(name) => {
                let table = Table::with_rows(name.as_str(), names, rows)?;
                self.insert_table(table, mode)?;
                name.clone()
            }
            None => {
                let mut namer = self.namer.lock();
                let (name, counter) = namer.peek(|n| self.is_taken(n));
                let table = Table::with_rows(name.as_str(), names, rows)?;
                self.insert_table(table, mode)?;
                namer.commit(counter);
                name
            }
        };
        info!(table = %name, mode = %mode, "imported");
        Ok(name)
    }

    /// Read the directive's source, apply its hooks, and decode.
    fn decode_source(&self, directive: &ImportDirective) -> BridgeResult<Decoded> {
        let codec = self.codec(&directive.format)?;
        let options = directive.effective_options();
        codec.validate(&options)?;
        check_header(codec.as_ref(), &directive.format, &directive.columns)?;

        let mut input = match &directive.source {
            Source::Inline(raw) => raw.clone(),
            Source::Location(location) => {
                let resolved = self.storage.resolve(location)?;
                let shown = resolved.to_string();
                self.storage
                    .read(&resolved)
                    .map_err(|err| err.into_storage(&shown))?
                    .ok_or_else(|| BridgeError::storage(&shown, "no such file"))?
            }
        };
        if let Some(decoder) = &directive.text_decoder {
            input = input.with_text_decoder(decoder);
        }
        let mut decoded = codec.decode(input, &options)?;
        if let Some(filter) = &directive.value_filter {
            decoded = decoded.map_values(filter);
        }
        debug!(records = decoded.records.len(), "decoded");
        Ok(decoded)
    }

    /// Name checks against the catalog run under its directive lock, so a
    /// concurrent bind cannot claim the same name.
    fn insert_table(&self, table: Table, mode: PersistenceMode) -> BridgeResult<()> {
        let name = table.name().to_string();
        self.catalog.exclusive(|| {
            if self.catalog.contains(&name) {
                return Err(BridgeError::naming(name, "already bound in the catalog"));
            }
            match self.tables.entry(name) {
                Entry::Occupied(occupied) => Err(BridgeError::naming(
                    occupied.key().clone(),
                    "a table with this name already exists",
                )),
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(MemoryTable::new(table, mode)));
                    Ok(())
                }
            }
        })
    }

    /// Continuous import: bind the source location, then read it once so a
    /// broken source fails the directive.
    fn import_continuous(&self, directive: ImportDirective) -> BridgeResult<String> {
        if directive.has_hooks() {
            return Err(BridgeError::Configuration(
                "decode hooks are not supported in continuous mode".to_string(),
            ));
        }
        let Source::Location(location) = &directive.source else {
            return Err(BridgeError::Configuration(
                "continuous mode needs a location, not inline data".to_string(),
            ));
        };

        let entry_for = |name: &str| {
            let mut entry = CatalogEntry::new(name, directive.format.clone(), location.as_str())
                .with_columns(directive.columns.clone());
            entry.options = directive.options.clone();
            entry
        };

        let (name, newly_bound) = match &directive.table {
            Some(name) => {
                let bound = self.bind(vec![entry_for(name)])?;
                (name.clone(), !bound.is_empty())
            }
            None => {
                let mut namer = self.namer.lock();
                let (name, counter) = namer.peek(|n| self.is_taken(n));
                self.bind(vec![entry_for(&name)])?;
                namer.commit(counter);
                (name, true)
            }
        };

        let bound = self
            .catalog
            .get(&name)
            .ok_or_else(|| BridgeError::Catalog(format!("binding for '{name}' vanished")))?;
        if let Err(err) = bound.load() {
            if newly_bound {
                warn!(table = %name, error = %err, "initial read failed, removing binding");
                if let Err(unbind_err) = self.catalog.unbind(&name) {
                    warn!(table = %name, error = %unbind_err, "could not remove binding");
                }
            }
            return Err(err);
        }
        info!(table = %name, location = %location, "imported as continuous binding");
        Ok(name)
    }

    /// Overwrite the target with the query result; returns the row count.
    /// The target is never read first.
    #[instrument(skip_all, fields(table = %directive.query.table, format = %directive.format))]
    pub fn export(&self, directive: ExportDirective) -> BridgeResult<usize> {
        let provider = self.table(&directive.query.table)?;
        let (columns, rows) = directive.query.run(provider.as_ref())?;
        let options = directive.effective_options();
        self.write_target(
            &directive.target,
            &directive.format,
            &options,
            &columns,
            &rows,
            directive.header,
        )?;

        if let Some(table) = self.tables.get(&directive.query.table) {
            table.mark_exported();
        }
        info!(target = %directive.target, rows = rows.len(), "exported");
        Ok(rows.len())
    }

    /// Decode a source and write it in another format; returns the row count.
    #[instrument(skip_all, fields(from = %directive.input.format, to = %directive.format))]
    pub fn convert(&self, directive: ConvertDirective) -> BridgeResult<usize> {
        directive.input.columns.validate()?;
        let decoded = self.decode_source(&directive.input)?;
        let (columns, rows) =
            resolve_columns(&directive.input.columns, decoded.records, decoded.columns)?;
        let options = directive.effective_options();
        self.write_target(
            &directive.target,
            &directive.format,
            &options,
            &columns,
            &rows,
            directive.header,
        )?;
        info!(target = %directive.target, rows = rows.len(), "converted");
        Ok(rows.len())
    }

    fn write_target(
        &self,
        target: &str,
        format: &FormatTag,
        options: &FormatOptions,
        columns: &[String],
        rows: &[Row],
        header: bool,
    ) -> BridgeResult<()> {
        let codec = self.codec(format)?;
        let location = self.storage.resolve(target)?;
        if !self.storage.writable(&location) {
            return Err(BridgeError::Configuration(format!(
                "location '{location}' is read-only"
            )));
        }
        let bytes = encode_rows(codec.as_ref(), format, options, columns, rows, header)?;
        self.storage.write(&location, &bytes)
    }

    // ════════════════════════════════════════════
    // Catalog
    // ════════════════════════════════════════════

    /// Register continuous bindings; all or none. Returns the newly bound
    /// names.
    pub fn bind(&self, entries: Vec<CatalogEntry>) -> BridgeResult<Vec<String>> {
        self.catalog
            .bind_all(entries, |name| self.tables.contains_key(name))
    }

    /// Remove a binding; its file is kept.
    pub fn unbind(&self, table: &str) -> BridgeResult<CatalogEntry> {
        self.catalog.unbind(table)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn session_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.storage.root().join(path)
        }
    }

    /// Save all bindings as JSON; relative paths resolve against the root.
    pub fn save_catalog(&self, path: impl AsRef<Path>) -> BridgeResult<()> {
        self.catalog.save(&self.session_path(path.as_ref()))
    }

    /// Bind every entry of a saved catalog.
    pub fn load_catalog(&self, path: impl AsRef<Path>) -> BridgeResult<Vec<String>> {
        let entries = Catalog::load(&self.session_path(path.as_ref()))?;
        self.bind(entries)
    }

    // ════════════════════════════════════════════
    // Tables
    // ════════════════════════════════════════════

    /// Create an empty transient table.
    pub fn create_table(&self, name: &str, columns: &[&str]) -> BridgeResult<()> {
        validate_identifier(name)?;
        for column in columns {
            validate_identifier(column)?;
        }
        let table = Table::new(name, columns.iter().map(|c| c.to_string()).collect())?;
        self.insert_table(table, PersistenceMode::Transient)?;
        debug!(table = name, "created");
        Ok(())
    }

    /// Drop a table. For a bound table only the binding goes; the file stays.
    pub fn drop_table(&self, name: &str) -> BridgeResult<()> {
        if self.tables.remove(name).is_some() {
            debug!(table = name, "dropped");
            return Ok(());
        }
        if self.catalog.contains(name) {
            self.catalog.unbind(name)?;
            return Ok(());
        }
        Err(BridgeError::Catalog(format!("no table named '{name}'")))
    }

    /// Provider for `name`, in memory or bound.
    pub fn table(&self, name: &str) -> BridgeResult<Arc<dyn TableProvider>> {
        if let Some(table) = self.tables.get(name) {
            let provider: Arc<dyn TableProvider> = Arc::clone(table.value()) as _;
            return Ok(provider);
        }
        if let Some(bound) = self.catalog.get(name) {
            return Ok(bound as Arc<dyn TableProvider>);
        }
        Err(BridgeError::Catalog(format!("no table named '{name}'")))
    }

    /// All table names, in memory and bound, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.extend(self.catalog.names());
        names.sort();
        names
    }

    /// Bulk append to an in-memory table.
    pub fn append_rows(&self, name: &str, rows: Vec<Row>) -> BridgeResult<usize> {
        let table = self
            .tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| BridgeError::Catalog(format!("no in-memory table named '{name}'")))?;
        table.append_rows(rows)
    }
}
