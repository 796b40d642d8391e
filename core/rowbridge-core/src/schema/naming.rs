//! Identifier validation and default table naming.

use crate::error::{BridgeError, BridgeResult};
use sqlparser::keywords::{
    ALL_KEYWORDS, ALL_KEYWORDS_INDEX, Keyword, RESERVED_FOR_COLUMN_ALIAS, RESERVED_FOR_TABLE_ALIAS,
};

/// Identifiers must be strictly shorter than this.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Prefix of synthesized table names (`table1`, `table2`, ...).
pub const DEFAULT_TABLE_PREFIX: &str = "table";

/// Statement words the query engine can never accept as a bare identifier,
/// on top of sqlparser's alias-reserved lists.
const RESERVED_STATEMENT_WORDS: &[Keyword] = &[
    Keyword::ALL,
    Keyword::AND,
    Keyword::AS,
    Keyword::BY,
    Keyword::CREATE,
    Keyword::DELETE,
    Keyword::DISTINCT,
    Keyword::DROP,
    Keyword::IN,
    Keyword::INSERT,
    Keyword::IS,
    Keyword::LIKE,
    Keyword::NOT,
    Keyword::NULL,
    Keyword::OR,
    Keyword::SET,
    Keyword::TABLE,
    Keyword::UPDATE,
    Keyword::VALUES,
];

fn reserved_keyword(name: &str) -> Option<Keyword> {
    let upper = name.to_ascii_uppercase();
    let keyword = ALL_KEYWORDS
        .binary_search(&upper.as_str())
        .map(|idx| ALL_KEYWORDS_INDEX[idx])
        .ok()?;
    let reserved = RESERVED_FOR_TABLE_ALIAS.contains(&keyword)
        || RESERVED_FOR_COLUMN_ALIAS.contains(&keyword)
        || RESERVED_STATEMENT_WORDS.contains(&keyword);
    reserved.then_some(keyword)
}

/// Validate an explicit table or column name.
///
/// Rules: starts with an ASCII letter, contains only ASCII alphanumerics and
/// `_`, shorter than [`MAX_IDENTIFIER_LEN`], not a reserved word of the query
/// language. Names are case-sensitive; the reserved-word check is not.
pub fn validate_identifier(name: &str) -> BridgeResult<()> {
    let Some(first) = name.chars().next() else {
        return Err(BridgeError::naming(name, "is empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(BridgeError::naming(name, "must start with a letter"));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(BridgeError::naming(
            name,
            format!("contains an illegal character '{bad}'"),
        ));
    }
    if name.len() >= MAX_IDENTIFIER_LEN {
        return Err(BridgeError::naming(
            name,
            format!("must be shorter than {MAX_IDENTIFIER_LEN} characters"),
        ));
    }
    if let Some(keyword) = reserved_keyword(name) {
        return Err(BridgeError::naming(
            name,
            format!("is a reserved keyword ({keyword:?})"),
        ));
    }
    Ok(())
}

/// Session-scoped counter for synthesized table names.
///
/// A name is only consumed once the directive that asked for it commits, so a
/// failed import does not leave a gap in the sequence.
#[derive(Debug, Clone)]
pub struct TableNamer {
    next: u64,
}

impl TableNamer {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Next free default name, skipping names already `taken`.
    pub fn peek(&self, taken: impl Fn(&str) -> bool) -> (String, u64) {
        let mut n = self.next;
        loop {
            let name = format!("{DEFAULT_TABLE_PREFIX}{n}");
            if !taken(&name) {
                return (name, n);
            }
            n += 1;
        }
    }

    /// Mark the name produced by [`peek`](Self::peek) as used.
    pub fn commit(&mut self, used: u64) {
        self.next = self.next.max(used + 1);
    }
}

impl Default for TableNamer {
    fn default() -> Self {
        Self::new()
    }
}
