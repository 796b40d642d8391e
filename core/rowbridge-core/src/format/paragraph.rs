//! Paragraph records: one field per line, records separated by blank lines.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput};
use crate::table::{Cell, Row};

pub struct ParagraphCodec;

fn check_options(options: &FormatOptions) -> BridgeResult<()> {
    match options {
        FormatOptions::Paragraph => Ok(()),
        other => Err(other.mismatch("paragraph")),
    }
}

impl Codec for ParagraphCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        check_options(options)
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        check_options(options)?;
        let text = input.into_text()?;
        let mut records = Vec::new();
        let mut current: Vec<Cell> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    records.push(std::mem::take(&mut current));
                }
            } else {
                current.push(Some(line.to_string()));
            }
        }
        if !current.is_empty() {
            records.push(current);
        }
        Ok(Decoded::new(records))
    }

    /// Trailing absent cells are omitted (decode pads them back). An absent
    /// cell followed by a present one, or a row with no present cell at all,
    /// cannot be written.
    fn encode(
        &self,
        _columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        check_options(options)?;
        let mut out = String::new();

        for (idx, row) in rows.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            let cells = row.cells();
            let used = cells
                .iter()
                .rposition(Option::is_some)
                .map(|p| p + 1)
                .ok_or_else(|| {
                    BridgeError::Schema(format!(
                        "row {idx}: paragraph format cannot hold a row without values"
                    ))
                })?;
            for cell in &cells[..used] {
                let value = cell.as_deref().ok_or_else(|| {
                    BridgeError::Schema(format!(
                        "row {idx}: paragraph format cannot hold an absent value before a present one"
                    ))
                })?;
                if value.contains('\n') || value.trim().is_empty() {
                    return Err(BridgeError::Schema(format!(
                        "row {idx}: value '{value}' would break paragraph framing"
                    )));
                }
                out.push_str(value);
                out.push('\n');
            }
        }
        Ok(out.into_bytes())
    }

    fn supports_header(&self) -> bool {
        true
    }
}
