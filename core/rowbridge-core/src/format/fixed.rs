//! Fixed-width records.
//!
//! Each physical line is sliced into fields of the declared character widths.
//! Decode tolerates short lines (missing fields are absent) and strips the
//! space padding on the right. Encode truncates or space-pads every value to
//! its exact width.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput, ensure_single_record, split_records};
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedOptions {
    /// Field widths in characters, in column order.
    pub widths: Vec<usize>,
    #[serde(default = "default_record_separator")]
    pub record_separator: String,
}

fn default_record_separator() -> String {
    "\n".to_string()
}

impl FixedOptions {
    pub fn new(widths: Vec<usize>) -> Self {
        Self {
            widths,
            record_separator: default_record_separator(),
        }
    }

    /// Parse a width pattern: `"A2 A10 A5"`, `"2,10,5"` or `"2 10 5"`.
    pub fn from_pattern(pattern: &str) -> BridgeResult<Self> {
        let widths = pattern
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| {
                let digits = token.trim_start_matches(['A', 'a']);
                match digits.parse::<usize>() {
                    Ok(width) if width > 0 => Ok(width),
                    _ => Err(BridgeError::Configuration(format!(
                        "invalid width '{token}' in pattern '{pattern}'"
                    ))),
                }
            })
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(Self::new(widths))
    }

    fn line_width(&self) -> usize {
        self.widths.iter().sum()
    }
}

pub struct FixedCodec;

fn fixed_options(options: &FormatOptions) -> BridgeResult<&FixedOptions> {
    match options {
        FormatOptions::Fixed(opts) => Ok(opts),
        other => Err(other.mismatch("fixed-width")),
    }
}

impl Codec for FixedCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        let opts = fixed_options(options)?;
        if opts.widths.is_empty() {
            return Err(BridgeError::Configuration(
                "fixed-width format requires a width pattern".to_string(),
            ));
        }
        if opts.widths.contains(&0) {
            return Err(BridgeError::Configuration(
                "fixed-width fields must be at least one character".to_string(),
            ));
        }
        if opts.record_separator.is_empty() {
            return Err(BridgeError::Configuration(
                "record separator must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        let opts = fixed_options(options)?;
        let text = input.into_text()?;
        let total = opts.line_width();

        let mut records = Vec::new();
        for (idx, line) in split_records(&text, &opts.record_separator) {
            let chars: Vec<char> = line.chars().collect();
            if chars.len() > total {
                return Err(BridgeError::parse(
                    idx,
                    format!("line is {} characters, pattern covers {total}", chars.len()),
                ));
            }

            let mut start = 0;
            let record: Vec<Cell> = opts
                .widths
                .iter()
                .map(|&width| {
                    let end = (start + width).min(chars.len());
                    let field: String = chars[start.min(end)..end].iter().collect();
                    start += width;
                    let value = field.trim_end_matches(' ');
                    (!value.is_empty()).then(|| value.to_string())
                })
                .collect();
            records.push(record);
        }
        Ok(Decoded::new(records))
    }

    fn encode(
        &self,
        _columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let opts = fixed_options(options)?;
        let mut out = String::with_capacity(rows.len() * (opts.line_width() + 1));

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != opts.widths.len() {
                return Err(BridgeError::Schema(format!(
                    "row {idx} has {} cells but the width pattern has {} fields",
                    row.len(),
                    opts.widths.len()
                )));
            }
            for (cell, &width) in row.cells().iter().zip(&opts.widths) {
                let value = cell.as_deref().unwrap_or("");
                ensure_single_record(value, &opts.record_separator, idx)?;
                let mut count = 0;
                for c in value.chars().take(width) {
                    out.push(c);
                    count += 1;
                }
                out.extend(std::iter::repeat_n(' ', width - count));
            }
            out.push_str(&opts.record_separator);
        }
        Ok(out.into_bytes())
    }

    fn supports_header(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn opts(widths: &[usize]) -> FormatOptions {
        FormatOptions::Fixed(FixedOptions::new(widths.to_vec()))
    }

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    #[test]
    fn test_pattern_forms() {
        assert_eq!(FixedOptions::from_pattern("A2 A10 A5").unwrap().widths, vec![2, 10, 5]);
        assert_eq!(FixedOptions::from_pattern("3,4").unwrap().widths, vec![3, 4]);
        let err = FixedOptions::from_pattern("A2 Ax").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_decode_slices_and_tolerates_short_lines() {
        let decoded = FixedCodec
            .decode(RawInput::Text("abcde  fg\nxy\n".into()), &opts(&[3, 4, 2]))
            .unwrap();
        assert_eq!(decoded.records[0], vec![s("abc"), s("de"), s("fg")]);
        assert_eq!(decoded.records[1], vec![s("xy"), None, None]);
    }

    #[test]
    fn test_decode_long_line_is_parse_error() {
        let err = FixedCodec
            .decode(RawInput::Text("ok\ntoolong\n".into()), &opts(&[2]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Parse { record: 1, .. }));
    }

    #[test]
    fn test_encode_pads_and_truncates() {
        let bytes = FixedCodec
            .encode(
                &[],
                &[Row::new(vec![s("abcdef"), None, s("z")])],
                &opts(&[3, 2, 2]),
            )
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "abc  z \n");
    }

    #[test]
    fn test_encode_width_mismatch_is_schema_error() {
        let err = FixedCodec
            .encode(&[], &[Row::new(vec![s("a")])], &opts(&[1, 1]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(FixedCodec.validate(&opts(&[])).is_err());
    }

    proptest! {
        #[test]
        fn prop_fixed_round_trip(lines in prop::collection::vec("[a-z0-9 ]{0,9}", 0..10)) {
            // canonical input: every line padded to the full width
            let text: String = lines.iter().map(|l| format!("{l:<9}\n")).collect();
            let options = opts(&[4, 3, 2]);
            let decoded = FixedCodec.decode(RawInput::Text(text.clone()), &options).unwrap();
            let rows: Vec<Row> = decoded.records.into_iter().map(Row::new).collect();
            let bytes = FixedCodec.encode(&[], &rows, &options).unwrap();
            prop_assert_eq!(String::from_utf8(bytes).unwrap(), text);
        }
    }
}
