//! Schema Resolver: table/column naming and identifier validation.
//!
//! - [`naming`]: identifier rules and the session-scoped default-name counter
//! - [`columns`]: column-name resolution for freshly decoded records

pub mod columns;
pub mod naming;

pub use columns::{ColumnSpec, resolve_columns};
pub use naming::{TableNamer, validate_identifier};
