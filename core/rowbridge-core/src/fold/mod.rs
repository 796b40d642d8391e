//! Hierarchical Fold Engine: flattens nested-tag trees into rows.
//!
//! A [`FoldSpec`] names the record path (ancestor chain down to the repeating
//! element), the record-level field mappings and the ancestor fold rules that
//! broadcast context values onto every descendant row. It is compiled once
//! into a [`CompiledFold`], which resolves every rule to an index before any
//! document is walked.
//!
//! ```text
//! <root>
//!   <office type="branch" location="Portland">     fold: office  -> branch   (attr 0)
//!     <employee id="7">                             fold: office^ -> location (attr 1)
//!       <name>Ann</name>                            field: name   -> Name
//!     </employee>
//!   </office>
//! </root>
//! ```

mod compiled;

pub use compiled::CompiledFold;

use serde::{Deserialize, Serialize};

/// Default separator joining repeated tags mapped onto one column.
pub const DEFAULT_SEPARATOR: &str = " ";

/// Marker character counting extra attribute captures on one ancestor.
pub const OCCURRENCE_MARKER: char = '^';

/// Where a record-level value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Text of descendant elements with this name, in document order.
    Tag(String),
    /// Attribute on the record element itself.
    Attribute(String),
}

impl FieldSource {
    pub fn name(&self) -> &str {
        match self {
            FieldSource::Tag(name) | FieldSource::Attribute(name) => name,
        }
    }
}

/// Multiplicity policy for a repeated source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTargets {
    /// All occurrences joined with the spec's separator.
    Single(String),
    /// Occurrence `i` goes to column `i`; extra occurrences are dropped.
    Positional(Vec<String>),
}

impl FieldTargets {
    pub fn columns(&self) -> &[String] {
        match self {
            FieldTargets::Single(column) => std::slice::from_ref(column),
            FieldTargets::Positional(columns) => columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: FieldSource,
    pub targets: FieldTargets,
}

/// What a fold rule captures from its ancestor element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldCapture {
    /// The n-th attribute of the ancestor, in document order.
    Attribute { occurrence: usize },
    /// Text of the first direct child with this tag.
    ChildText { tag: String },
}

/// Broadcast rule: a value on an ancestor copied onto every descendant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldRule {
    /// Element names from the document root down to the ancestor.
    pub path: Vec<String>,
    pub column: String,
    pub capture: FoldCapture,
    /// Attribute name written back on encode; defaults to the column name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
}

impl FoldRule {
    pub fn attribute(path: Vec<String>, occurrence: usize, column: impl Into<String>) -> Self {
        Self {
            path,
            column: column.into(),
            capture: FoldCapture::Attribute { occurrence },
            attribute_name: None,
        }
    }

    pub fn child_text(path: Vec<String>, tag: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            path,
            column: column.into(),
            capture: FoldCapture::ChildText { tag: tag.into() },
            attribute_name: None,
        }
    }

    pub fn named(mut self, attribute_name: impl Into<String>) -> Self {
        self.attribute_name = Some(attribute_name.into());
        self
    }
}

/// Full flattening configuration for one markup source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    /// Root-to-record element names, e.g. `["root", "middle", "leaf"]`.
    pub record_path: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
    #[serde(default)]
    pub folds: Vec<FoldRule>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

impl Default for FoldSpec {
    fn default() -> Self {
        Self {
            record_path: Vec::new(),
            fields: Vec::new(),
            folds: Vec::new(),
            separator: default_separator(),
        }
    }
}

impl FoldSpec {
    /// `record_path` is whitespace-separated: `"root middle leaf"`.
    pub fn new(record_path: &str) -> Self {
        Self {
            record_path: record_path.split_whitespace().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn field(mut self, tag: &str, column: &str) -> Self {
        self.fields.push(FieldMapping {
            source: FieldSource::Tag(tag.to_string()),
            targets: FieldTargets::Single(column.to_string()),
        });
        self
    }

    pub fn field_list(mut self, tag: &str, columns: &[&str]) -> Self {
        self.fields.push(FieldMapping {
            source: FieldSource::Tag(tag.to_string()),
            targets: FieldTargets::Positional(columns.iter().map(|c| c.to_string()).collect()),
        });
        self
    }

    /// Map an attribute of the record element.
    pub fn attribute(mut self, attribute: &str, column: &str) -> Self {
        self.fields.push(FieldMapping {
            source: FieldSource::Attribute(attribute.to_string()),
            targets: FieldTargets::Single(column.to_string()),
        });
        self
    }

    pub fn fold(mut self, rule: FoldRule) -> Self {
        self.folds.push(rule);
        self
    }

    /// Add an attribute fold from the caret form: `office` captures the
    /// first attribute of the `office` ancestor, `office^` the second,
    /// `office^^` the third.
    pub fn with_marker(self, marker: &str, column: &str) -> Self {
        let name = marker.trim_end_matches(OCCURRENCE_MARKER);
        let occurrence = marker.len() - name.len();
        let path = self.ancestor_path(name);
        self.fold(FoldRule::attribute(path, occurrence, column))
    }

    /// Add a fold capturing the text of `tag`, a direct child of `ancestor`.
    pub fn fold_child(self, ancestor: &str, tag: &str, column: &str) -> Self {
        let path = self.ancestor_path(ancestor);
        self.fold(FoldRule::child_text(path, tag, column))
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Path prefix ending at the first ancestor called `name`. An unknown
    /// name yields a one-element path, which compilation rejects unless it
    /// is the document root.
    fn ancestor_path(&self, name: &str) -> Vec<String> {
        let ancestors = self.record_path.len().saturating_sub(1);
        match self.record_path[..ancestors].iter().position(|n| n == name) {
            Some(level) => self.record_path[..=level].to_vec(),
            None => vec![name.to_string()],
        }
    }
}
