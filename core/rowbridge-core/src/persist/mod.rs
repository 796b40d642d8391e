//! Persistence Strategy Selector: transient, batch-export and continuous
//! durability for tables.
//!
//! - [`PersistenceMode`]: which strategy backs a table.
//! - [`Location`]: where a backing file lives (local path or remote URL).
//! - [`StorageContext`]: resolves locations against the session root and
//!   reads/writes them through the local filesystem or a [`Fetch`]er.
//! - [`BoundTable`]: continuous-mode provider; every statement goes through
//!   the backing location.

pub mod continuous;
pub mod fetch;
pub mod location;
pub mod writer;

pub use continuous::BoundTable;
pub use fetch::{Fetch, HttpFetcher};
pub use location::Location;

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, FormatTag, RawInput};
use crate::schema::{ColumnSpec, resolve_columns};
use crate::table::{Row, Table};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// 테이블 영속성 전략
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// 백업 파일 없음: 메모리 테이블이 유일한 상태
    #[default]
    Transient,
    /// 메모리에서 자유롭게 변경, export 지시로 전체 덮어쓰기
    Batch,
    /// 카탈로그 바인딩: 모든 변경 문장이 즉시 파일에 반영됨
    Continuous,
}

impl PersistenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceMode::Transient => "transient",
            PersistenceMode::Batch => "batch",
            PersistenceMode::Continuous => "continuous",
        }
    }
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersistenceMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transient" => Ok(PersistenceMode::Transient),
            "batch" => Ok(PersistenceMode::Batch),
            "continuous" => Ok(PersistenceMode::Continuous),
            other => Err(BridgeError::Configuration(format!(
                "unknown persistence mode '{other}'"
            ))),
        }
    }
}

// ════════════════════════════════════════════
// Storage context
// ════════════════════════════════════════════

/// Shared location resolution and I/O for one session.
///
/// The root directory is read at every resolution, so changing it affects
/// only resolutions made afterwards.
#[derive(Clone)]
pub struct StorageContext {
    root: Arc<RwLock<PathBuf>>,
    fetcher: Arc<dyn Fetch>,
}

impl StorageContext {
    pub fn new(root: PathBuf, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            root: Arc::new(RwLock::new(root)),
            fetcher,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.root.read().clone()
    }

    pub fn set_root(&self, root: PathBuf) {
        *self.root.write() = root;
    }

    pub fn resolve(&self, location: &str) -> BridgeResult<Location> {
        let root = self.root.read();
        Location::resolve(location, &root)
    }

    /// Raw content at `location`. `None` when a local file does not exist;
    /// a local directory is read as a file set.
    pub fn read(&self, location: &Location) -> BridgeResult<Option<RawInput>> {
        match location {
            Location::Local(path) if path.is_dir() => {
                let files = writer::read_dir_files(path)?;
                debug!(path = %path.display(), files = files.len(), "read directory");
                Ok(Some(RawInput::Files(files)))
            }
            Location::Local(path) => Ok(writer::read_local(path)?.map(RawInput::Bytes)),
            Location::Remote(url) => {
                let bytes = self.fetcher.fetch(url)?;
                debug!(url = %location, bytes = bytes.len(), "fetched remote content");
                Ok(Some(RawInput::Bytes(bytes)))
            }
        }
    }

    /// Whether `location` can be written at all.
    pub fn writable(&self, location: &Location) -> bool {
        match location {
            Location::Local(_) => true,
            Location::Remote(url) => self.fetcher.supports_write(url),
        }
    }

    /// Replace the content at `location` in full. Local writes are staged
    /// and renamed into place.
    pub fn write(&self, location: &Location, bytes: &[u8]) -> BridgeResult<()> {
        match location {
            Location::Local(path) => writer::write_staged(path, bytes),
            Location::Remote(url) => {
                if !self.fetcher.supports_write(url) {
                    return Err(BridgeError::Configuration(format!(
                        "remote location '{location}' is read-only"
                    )));
                }
                self.fetcher.store(url, bytes)
            }
        }
    }
}

/// Decode `input` into a table called `name`. A missing input (`None`)
/// yields an empty table shaped by explicit or format-known columns.
pub fn decode_table(
    codec: &dyn Codec,
    options: &FormatOptions,
    input: Option<RawInput>,
    columns: &ColumnSpec,
    name: &str,
) -> BridgeResult<Table> {
    codec.validate(options)?;
    let decoded = match input {
        Some(input) => codec.decode(input, options)?,
        None => Decoded {
            records: Vec::new(),
            columns: codec.known_columns(options),
        },
    };
    let (names, rows) = resolve_columns(columns, decoded.records, decoded.columns)?;
    Table::with_rows(name, names, rows)
}

/// A header record can only be consumed from formats that write one back.
pub fn check_header(
    codec: &dyn Codec,
    tag: &FormatTag,
    columns: &ColumnSpec,
) -> BridgeResult<()> {
    if columns.header && !codec.supports_header() {
        return Err(BridgeError::Configuration(format!(
            "format '{tag}' has no header record"
        )));
    }
    Ok(())
}

/// Encode `rows`, writing the column names as a header record first when
/// `header` is set and the format can carry one.
pub fn encode_rows(
    codec: &dyn Codec,
    tag: &FormatTag,
    options: &FormatOptions,
    columns: &[String],
    rows: &[Row],
    header: bool,
) -> BridgeResult<Vec<u8>> {
    if !codec.can_encode() {
        return Err(BridgeError::Configuration(format!(
            "format '{tag}' cannot be encoded"
        )));
    }
    codec.validate(options)?;
    if header && codec.supports_header() {
        let mut with_header = Vec::with_capacity(rows.len() + 1);
        with_header.push(columns.iter().map(|c| Some(c.clone())).collect::<Row>());
        with_header.extend_from_slice(rows);
        codec.encode(columns, &with_header, options)
    } else {
        codec.encode(columns, rows, options)
    }
}
