//! Directive Engine: import, export, convert and catalog directives run
//! against a [`Session`].

pub mod directives;
pub mod session;

pub use directives::{
    ConvertDirective, ExportDirective, ImportDirective, RowFilter, RowQuery, Source,
};
pub use session::Session;
