//! Continuous persistence: a table whose backing location is the source of
//! truth.
//!
//! Every statement re-reads the location: a scan decodes the current file,
//! a mutation decodes, applies the change and writes the whole file back
//! before returning. External edits made between statements are therefore
//! always visible.
//!
//! A decoded copy (the *mirror*) is kept together with the SHA-256 digest of
//! the raw content it came from; it is reused only while the digest still
//! matches, and dropped after every write.

use crate::catalog::CatalogEntry;
use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, CodecRegistry, FormatOptions, RawInput};
use crate::persist::{Location, PersistenceMode, StorageContext, decode_table, encode_rows};
use crate::table::{Assignment, Predicate, Row, RowScan, Table, TableProvider};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument};

struct Mirror {
    digest: [u8; 32],
    table: Table,
}

/// Content digest of raw input, independent of how it will be decoded.
fn digest(input: &RawInput) -> [u8; 32] {
    let mut hasher = Sha256::new();
    match input {
        RawInput::Text(text) => hasher.update(text.as_bytes()),
        RawInput::Bytes(bytes) => hasher.update(bytes),
        RawInput::Files(files) => {
            for file in files {
                hasher.update((file.name.len() as u64).to_le_bytes());
                hasher.update(file.name.as_bytes());
                hasher.update((file.bytes.len() as u64).to_le_bytes());
                hasher.update(&file.bytes);
            }
        }
        RawInput::Structured(value) => hasher.update(value.to_string().as_bytes()),
    }
    hasher.finalize().into()
}

/// Catalog-bound table in continuous mode.
///
/// All statements against one binding are serialized by its lock, so
/// concurrent inserts from several threads each land in the file.
pub struct BoundTable {
    entry: CatalogEntry,
    options: FormatOptions,
    storage: StorageContext,
    registry: Arc<RwLock<CodecRegistry>>,
    mirror: Mutex<Option<Mirror>>,
}

impl BoundTable {
    pub fn new(
        entry: CatalogEntry,
        storage: StorageContext,
        registry: Arc<RwLock<CodecRegistry>>,
    ) -> Self {
        let options = entry.effective_options();
        Self {
            entry,
            options,
            storage,
            registry,
            mirror: Mutex::new(None),
        }
    }

    pub fn entry(&self) -> &CatalogEntry {
        &self.entry
    }

    fn codec(&self) -> BridgeResult<Arc<dyn Codec>> {
        self.registry.read().get(&self.entry.format)
    }

    /// Current content of the backing location as a table.
    #[instrument(skip(self), fields(table = %self.entry.table))]
    pub fn load(&self) -> BridgeResult<Table> {
        let mut mirror = self.mirror.lock();
        let location = self.storage.resolve(&self.entry.location)?;
        let codec = self.codec()?;
        self.refresh(&mut mirror, codec.as_ref(), &location)
    }

    fn refresh(
        &self,
        mirror: &mut Option<Mirror>,
        codec: &dyn Codec,
        location: &Location,
    ) -> BridgeResult<Table> {
        let shown = location.to_string();
        let input = self
            .storage
            .read(location)
            .map_err(|err| err.into_storage(&shown))?;
        let digest = input.as_ref().map(digest).unwrap_or_default();

        if let Some(cached) = mirror.as_ref()
            && cached.digest == digest
        {
            debug!(location = %shown, "mirror hit");
            return Ok(cached.table.clone());
        }

        let table = decode_table(
            codec,
            &self.options,
            input,
            &self.entry.columns,
            &self.entry.table,
        )
        .map_err(|err| err.into_storage(&shown))?;
        *mirror = Some(Mirror {
            digest,
            table: table.clone(),
        });
        Ok(table)
    }

    /// Read, apply `op`, and replace the backing content in full. Nothing is
    /// written when `op` fails; an encode or write failure leaves the prior
    /// content in place.
    fn mutate<R>(&self, op: impl FnOnce(&mut Table) -> BridgeResult<R>) -> BridgeResult<R> {
        let mut mirror = self.mirror.lock();
        let location = self.storage.resolve(&self.entry.location)?;
        let codec = self.codec()?;

        if !codec.can_encode() {
            return Err(BridgeError::Configuration(format!(
                "'{}' is bound to read-only format '{}'",
                self.entry.table, self.entry.format
            )));
        }
        if !self.storage.writable(&location) {
            return Err(BridgeError::Configuration(format!(
                "'{}' is bound to read-only location '{location}'",
                self.entry.table
            )));
        }

        let mut table = self.refresh(&mut mirror, codec.as_ref(), &location)?;
        let result = op(&mut table)?;

        let shown = location.to_string();
        let bytes = encode_rows(
            codec.as_ref(),
            &self.entry.format,
            &self.options,
            table.columns(),
            table.rows(),
            self.entry.columns.header,
        )
        .map_err(|err| err.into_storage(&shown))?;
        self.storage
            .write(&location, &bytes)
            .map_err(|err| err.into_storage(&shown))?;
        *mirror = None;

        info!(
            table = %self.entry.table,
            location = %shown,
            rows = table.row_count(),
            bytes = bytes.len(),
            "rewrote backing file"
        );
        Ok(result)
    }
}

impl TableProvider for BoundTable {
    fn name(&self) -> &str {
        &self.entry.table
    }

    fn persistence(&self) -> PersistenceMode {
        PersistenceMode::Continuous
    }

    fn columns(&self) -> BridgeResult<Vec<String>> {
        Ok(self.load()?.columns().to_vec())
    }

    fn scan(&self) -> BridgeResult<RowScan> {
        Ok(self.load()?.scan())
    }

    fn insert_row(&self, row: Row) -> BridgeResult<()> {
        self.mutate(|table| table.insert_row(row))
    }

    fn update_where(
        &self,
        predicate: Predicate<'_>,
        assignments: &[Assignment],
    ) -> BridgeResult<usize> {
        self.mutate(|table| table.update_where(predicate, assignments))
    }

    fn delete_where(&self, predicate: Predicate<'_>) -> BridgeResult<usize> {
        self.mutate(|table| table.delete_where(predicate))
    }
}
