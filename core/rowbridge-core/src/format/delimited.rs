//! Delimited text: CSV and its pipe/tab/colon relatives.
//!
//! Quoting follows the classic rule: a field containing the separator or the
//! quote character is wrapped in quotes and embedded quotes are doubled.
//! Records are single-line; a quoted field cannot span record separators.
//!
//! An empty unquoted field decodes as absent. A present empty value encodes
//! as `""` so it survives a round trip.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput, ensure_single_record, split_records};
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};

/// Column names of the passwd(5) layout.
pub const PASSWD_COLUMNS: [&str; 7] = ["username", "passwd", "uid", "gid", "gcos", "home", "shell"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimitedOptions {
    pub separator: String,
    #[serde(default = "default_record_separator")]
    pub record_separator: String,
    /// `None` disables quoting entirely.
    #[serde(default)]
    pub quote: Option<char>,
    /// Trim surrounding whitespace from unquoted fields.
    #[serde(default)]
    pub trim: bool,
}

fn default_record_separator() -> String {
    "\n".to_string()
}

impl DelimitedOptions {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            record_separator: default_record_separator(),
            quote: Some('"'),
            trim: false,
        }
    }

    pub fn csv() -> Self {
        Self::new(",")
    }

    pub fn pipe() -> Self {
        Self::new("|")
    }

    pub fn tab() -> Self {
        Self::new("\t")
    }

    pub fn passwd() -> Self {
        Self {
            quote: None,
            ..Self::new(":")
        }
    }

    pub fn with_record_separator(mut self, separator: impl Into<String>) -> Self {
        self.record_separator = separator.into();
        self
    }

    pub fn with_quote(mut self, quote: Option<char>) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self::csv()
    }
}

/// Codec for every delimited tag; passwd additionally names its columns.
pub struct DelimitedCodec {
    columns: Option<Vec<String>>,
}

impl DelimitedCodec {
    pub fn new() -> Self {
        Self { columns: None }
    }

    pub fn passwd() -> Self {
        Self {
            columns: Some(PASSWD_COLUMNS.iter().map(|c| c.to_string()).collect()),
        }
    }

    fn options<'o>(&self, options: &'o FormatOptions) -> BridgeResult<&'o DelimitedOptions> {
        match options {
            FormatOptions::Delimited(opts) => Ok(opts),
            other => Err(other.mismatch("delimited")),
        }
    }
}

impl Default for DelimitedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for DelimitedCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        let opts = self.options(options)?;
        if opts.separator.is_empty() || opts.record_separator.is_empty() {
            return Err(BridgeError::Configuration(
                "field and record separators must be non-empty".to_string(),
            ));
        }
        if opts.separator.contains(&opts.record_separator)
            || opts.record_separator.contains(&opts.separator)
        {
            return Err(BridgeError::Configuration(
                "field and record separators overlap".to_string(),
            ));
        }
        if let Some(q) = opts.quote
            && opts.separator.contains(q)
        {
            return Err(BridgeError::Configuration(format!(
                "quote character '{q}' appears in the field separator"
            )));
        }
        Ok(())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        let opts = self.options(options)?;
        let text = input.into_text()?;
        let records = split_records(&text, &opts.record_separator)
            .map(|(idx, line)| split_fields(line, opts, idx))
            .collect::<BridgeResult<Vec<_>>>()?;

        let decoded = Decoded::new(records);
        Ok(match &self.columns {
            Some(columns) => decoded.with_columns(columns.clone()),
            None => decoded,
        })
    }

    fn encode(
        &self,
        _columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let opts = self.options(options)?;
        let mut out = String::new();
        for (idx, row) in rows.iter().enumerate() {
            for (pos, cell) in row.cells().iter().enumerate() {
                if pos > 0 {
                    out.push_str(&opts.separator);
                }
                if let Some(value) = cell {
                    ensure_single_record(value, &opts.record_separator, idx)?;
                    push_field(&mut out, value, opts, idx)?;
                }
            }
            out.push_str(&opts.record_separator);
        }
        Ok(out.into_bytes())
    }

    fn supports_header(&self) -> bool {
        true
    }

    fn known_columns(&self, _options: &FormatOptions) -> Option<Vec<String>> {
        self.columns.clone()
    }
}

fn unquoted_cell(raw: &str, opts: &DelimitedOptions, record: usize) -> BridgeResult<Cell> {
    if let Some(q) = opts.quote
        && raw.contains(q)
    {
        return Err(BridgeError::parse(
            record,
            format!("quote character in unquoted field '{raw}'"),
        ));
    }
    let value = if opts.trim { raw.trim() } else { raw };
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// Parse a quoted field starting at `rest[0] == quote`; returns the unescaped
/// value and the text after the closing quote.
fn take_quoted(rest: &str, quote: char) -> Option<(String, &str)> {
    let body = &rest[quote.len_utf8()..];
    let mut value = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == quote {
            if let Some(&(_, next)) = chars.peek()
                && next == quote
            {
                value.push(quote);
                chars.next();
                continue;
            }
            return Some((value, &body[idx + c.len_utf8()..]));
        }
        value.push(c);
    }
    None
}

fn split_fields(line: &str, opts: &DelimitedOptions, record: usize) -> BridgeResult<Vec<Cell>> {
    let sep = opts.separator.as_str();
    let mut fields = Vec::new();
    let mut rest = line;

    loop {
        let lead = if opts.trim { rest.trim_start() } else { rest };
        match opts.quote {
            Some(q) if lead.starts_with(q) => {
                let (value, after) = take_quoted(lead, q)
                    .ok_or_else(|| BridgeError::parse(record, "unterminated quoted field"))?;
                fields.push(Some(value));
                let after = if opts.trim { after.trim_start() } else { after };
                if after.is_empty() {
                    break;
                }
                rest = after.strip_prefix(sep).ok_or_else(|| {
                    BridgeError::parse(record, "unexpected text after closing quote")
                })?;
            }
            _ => match rest.find(sep) {
                Some(pos) => {
                    fields.push(unquoted_cell(&rest[..pos], opts, record)?);
                    rest = &rest[pos + sep.len()..];
                }
                None => {
                    fields.push(unquoted_cell(rest, opts, record)?);
                    break;
                }
            },
        }
    }

    Ok(fields)
}

fn push_field(out: &mut String, value: &str, opts: &DelimitedOptions, row: usize) -> BridgeResult<()> {
    let Some(q) = opts.quote else {
        if value.contains(&opts.separator) {
            return Err(BridgeError::Schema(format!(
                "row {row}: value contains the separator and quoting is disabled"
            )));
        }
        out.push_str(value);
        return Ok(());
    };

    let needs_quotes = value.is_empty()
        || value.contains(&opts.separator)
        || value.contains(q)
        || (opts.trim && value.trim() != value);
    if needs_quotes {
        out.push(q);
        for c in value.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
    } else {
        out.push_str(value);
    }
    Ok(())
}
