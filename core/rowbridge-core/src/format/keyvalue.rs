//! Key/value lines (`key = value`), as found in ini-style files.
//!
//! Sections, comments and blank lines are skipped; every assignment yields a
//! two-field record that the caller's column mapping names.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, RawInput, ensure_single_record, split_records};
use crate::table::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueOptions {
    pub assign: char,
    pub comment_prefixes: Vec<char>,
}

impl Default for KeyValueOptions {
    fn default() -> Self {
        Self {
            assign: '=',
            comment_prefixes: vec![';', '#'],
        }
    }
}

pub struct KeyValueCodec;

/// A key must decode back as the same key: no assignment character, and no
/// leading comment prefix or section bracket.
fn check_key(key: &str, opts: &KeyValueOptions, idx: usize) -> BridgeResult<()> {
    let trimmed = key.trim();
    if trimmed.is_empty()
        || trimmed != key
        || key.contains(opts.assign)
        || key.starts_with(opts.comment_prefixes.as_slice())
        || key.starts_with('[')
    {
        return Err(BridgeError::Schema(format!(
            "row {idx}: key '{key}' cannot be written as a key/value line"
        )));
    }
    Ok(())
}

fn kv_options(options: &FormatOptions) -> BridgeResult<&KeyValueOptions> {
    match options {
        FormatOptions::KeyValue(opts) => Ok(opts),
        other => Err(other.mismatch("key/value")),
    }
}

impl Codec for KeyValueCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        let opts = kv_options(options)?;
        if opts.comment_prefixes.contains(&opts.assign) {
            return Err(BridgeError::Configuration(format!(
                "assignment character '{}' is also a comment prefix",
                opts.assign
            )));
        }
        Ok(())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        let opts = kv_options(options)?;
        let text = input.into_text()?;
        let mut records = Vec::new();

        for (idx, raw) in split_records(&text, "\n") {
            let line = raw.trim();
            let skip = line.is_empty()
                || line.starts_with(opts.comment_prefixes.as_slice())
                || (line.starts_with('[') && line.ends_with(']'));
            if skip {
                continue;
            }
            let (key, value) = line.split_once(opts.assign).ok_or_else(|| {
                BridgeError::parse(idx, format!("missing '{}' in '{line}'", opts.assign))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(BridgeError::parse(idx, "assignment without a key"));
            }
            let value = value.trim();
            records.push(vec![
                Some(key.to_string()),
                (!value.is_empty()).then(|| value.to_string()),
            ]);
        }
        Ok(Decoded::new(records))
    }

    fn encode(
        &self,
        columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let opts = kv_options(options)?;
        if columns.len() != 2 {
            return Err(BridgeError::Schema(format!(
                "key/value format needs exactly 2 columns, table has {}",
                columns.len()
            )));
        }

        let mut out = String::new();
        for (idx, row) in rows.iter().enumerate() {
            let key = row
                .get(0)
                .ok_or_else(|| BridgeError::Schema(format!("row {idx} has no key")))?;
            let value = row.get(1).unwrap_or("");
            ensure_single_record(key, "\n", idx)?;
            ensure_single_record(value, "\n", idx)?;
            check_key(key, opts, idx)?;
            let line = format!("{key} {} {value}", opts.assign);
            out.push_str(line.trim_end());
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn options() -> FormatOptions {
        FormatOptions::KeyValue(KeyValueOptions::default())
    }

    #[test]
    fn test_decode_ignores_sections_and_comments() {
        let text = "; settings\n[main]\nhost = example.org\nport=8080\n\n[extra]\n# note\nempty =\n";
        let decoded = KeyValueCodec
            .decode(RawInput::Text(text.into()), &options())
            .unwrap();
        assert_eq!(decoded.records.len(), 3);
        assert_eq!(
            decoded.records[0],
            vec![Some("host".into()), Some("example.org".into())]
        );
        assert_eq!(decoded.records[2], vec![Some("empty".into()), None]);
    }

    #[test]
    fn test_line_without_assignment() {
        let err = KeyValueCodec
            .decode(RawInput::Text("a=1\njunk\n".into()), &options())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Parse { record: 1, .. }));
    }

    #[test]
    fn test_encode_requires_two_columns() {
        let columns = vec!["k".to_string(), "v".to_string()];
        let bytes = KeyValueCodec
            .encode(
                &columns,
                &[Row::from_strs(&["a", "1"]), Row::new(vec![Some("b".into()), None])],
                &options(),
            )
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a = 1\nb =\n");

        let err = KeyValueCodec
            .encode(&columns[..1], &[], &options())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_encode_rejects_keys_that_do_not_read_back() {
        let columns = vec!["k".to_string(), "v".to_string()];
        for key in ["a=b", "; note", "#x", "[main]", " padded", ""] {
            let err = KeyValueCodec
                .encode(&columns, &[Row::from_strs(&[key, "1"])], &options())
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Schema, "key {key:?}");
        }
    }
}
