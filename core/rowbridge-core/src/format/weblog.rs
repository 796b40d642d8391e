//! Web server access logs (Common and Combined Log Format).
//!
//! ```text
//! host ident authuser [date] "request" status bytes ["referer" "agent"]
//! ```
//!
//! `-` decodes as absent and absent encodes as `-`.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput, split_records};
use crate::table::{Cell, Row};

pub const WEBLOG_COLUMNS: [&str; 9] = [
    "remotehost",
    "usr",
    "authuser",
    "date",
    "request",
    "status",
    "bytes",
    "referer",
    "client",
];

const DATE_FIELD: usize = 3;
const QUOTED_FIELDS: [usize; 3] = [4, 7, 8];

pub struct WeblogCodec;

fn check_options(options: &FormatOptions) -> BridgeResult<()> {
    match options {
        FormatOptions::Weblog => Ok(()),
        other => Err(other.mismatch("weblog")),
    }
}

/// Split one log line into its tokens: bare words, `[bracketed]` dates and
/// `"quoted"` strings with backslash escapes.
fn tokenize(line: &str, record: usize) -> BridgeResult<Vec<Cell>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == ' ' {
            chars.next();
            continue;
        }
        let token = match c {
            '[' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => value.push(c),
                        None => return Err(BridgeError::parse(record, "unterminated '['")),
                    }
                }
                value
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => return Err(BridgeError::parse(record, "dangling escape")),
                        },
                        Some('"') => break,
                        Some(c) => value.push(c),
                        None => return Err(BridgeError::parse(record, "unterminated quote")),
                    }
                }
                value
            }
            _ => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ' ' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value
            }
        };
        tokens.push((token != "-").then_some(token));
    }

    Ok(tokens)
}

fn quote(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

impl Codec for WeblogCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        check_options(options)
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        check_options(options)?;
        let text = input.into_text()?;
        let mut records = Vec::new();

        for (idx, line) in split_records(&text, "\n") {
            if line.trim().is_empty() {
                continue;
            }
            let tokens = tokenize(line, idx)?;
            if tokens.len() != 7 && tokens.len() != 9 {
                return Err(BridgeError::parse(
                    idx,
                    format!("expected 7 or 9 log fields, found {}", tokens.len()),
                ));
            }
            records.push(tokens);
        }

        let columns = WEBLOG_COLUMNS.iter().map(|c| c.to_string()).collect();
        Ok(Decoded::new(records).with_columns(columns))
    }

    fn encode(
        &self,
        _columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        check_options(options)?;
        let mut out = String::new();

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != WEBLOG_COLUMNS.len() {
                return Err(BridgeError::Schema(format!(
                    "row {idx} has {} cells, weblog lines have {}",
                    row.len(),
                    WEBLOG_COLUMNS.len()
                )));
            }
            let combined = row.get(7).is_some() || row.get(8).is_some();
            let width = if combined { 9 } else { 7 };

            for pos in 0..width {
                if pos > 0 {
                    out.push(' ');
                }
                match (row.get(pos), pos) {
                    (Some(v), DATE_FIELD) => {
                        out.push('[');
                        out.push_str(v);
                        out.push(']');
                    }
                    (Some(v), p) if QUOTED_FIELDS.contains(&p) => quote(&mut out, v),
                    (Some(v), _) => {
                        if v.contains(' ') || v.contains('\n') {
                            return Err(BridgeError::Schema(format!(
                                "row {idx}: '{}' cannot contain whitespace",
                                WEBLOG_COLUMNS[pos]
                            )));
                        }
                        out.push_str(v);
                    }
                    (None, p) if QUOTED_FIELDS.contains(&p) => out.push_str("\"-\""),
                    (None, _) => out.push('-'),
                }
            }
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn known_columns(&self, _options: &FormatOptions) -> Option<Vec<String>> {
        Some(WEBLOG_COLUMNS.iter().map(|c| c.to_string()).collect())
    }
}
