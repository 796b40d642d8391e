//! Format Codec Registry: per-format decode/encode strategies.
//!
//! Every external encoding is reached through the [`Codec`] trait; the
//! [`CodecRegistry`] maps a [`FormatTag`] to its implementation. Options are a
//! tagged union ([`FormatOptions`]) validated by the codec before dispatch.
//!
//! | Tag                         | Module         | Encode |
//! |-----------------------------|----------------|--------|
//! | `Csv`, `Pipe`, `Tab`, `Passwd` | [`delimited`] | yes    |
//! | `Fixed`                     | [`fixed`]      | yes    |
//! | `Ini`                       | [`keyvalue`]   | yes    |
//! | `Paragraph`                 | [`paragraph`]  | yes    |
//! | `Weblog`                    | [`weblog`]     | yes    |
//! | `Xml`                       | [`markup`]     | yes    |
//! | `Mp3`                       | [`id3`]        | no     |
//! | `Array`                     | [`native`]     | yes    |
//! | `Parquet`                   | [`columnar`]   | yes    |
//! | `Custom(name)`              | [`user`]       | optional |

pub mod columnar;
pub mod delimited;
pub mod fixed;
pub mod id3;
pub mod keyvalue;
pub mod markup;
pub mod native;
pub mod paragraph;
pub mod user;
pub mod weblog;

pub use delimited::DelimitedOptions;
pub use fixed::FixedOptions;
pub use id3::Id3Options;
pub use keyvalue::KeyValueOptions;
pub use native::{NativeOptions, NativeShape};
pub use user::{UserCodec, UserOptions};

use crate::error::{BridgeError, BridgeResult};
use crate::fold::FoldSpec;
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ════════════════════════════════════════════
// Format tags and options
// ════════════════════════════════════════════

/// Identifies a format codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FormatTag {
    Csv,
    Pipe,
    Tab,
    Passwd,
    Fixed,
    Ini,
    Paragraph,
    Weblog,
    Xml,
    Mp3,
    Array,
    Parquet,
    /// User-registered codec.
    Custom(String),
}

impl FormatTag {
    pub fn as_str(&self) -> &str {
        match self {
            FormatTag::Csv => "CSV",
            FormatTag::Pipe => "Pipe",
            FormatTag::Tab => "Tab",
            FormatTag::Passwd => "Passwd",
            FormatTag::Fixed => "Fixed",
            FormatTag::Ini => "Ini",
            FormatTag::Paragraph => "Paragraph",
            FormatTag::Weblog => "Weblog",
            FormatTag::Xml => "XML",
            FormatTag::Mp3 => "Mp3",
            FormatTag::Array => "ARRAY",
            FormatTag::Parquet => "Parquet",
            FormatTag::Custom(name) => name,
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = std::convert::Infallible;

    /// Known names match case-insensitively; anything else is `Custom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "csv" => FormatTag::Csv,
            "pipe" => FormatTag::Pipe,
            "tab" | "tsv" => FormatTag::Tab,
            "passwd" => FormatTag::Passwd,
            "fixed" => FormatTag::Fixed,
            "ini" => FormatTag::Ini,
            "paragraph" => FormatTag::Paragraph,
            "weblog" => FormatTag::Weblog,
            "xml" => FormatTag::Xml,
            "mp3" => FormatTag::Mp3,
            "array" => FormatTag::Array,
            "parquet" => FormatTag::Parquet,
            _ => FormatTag::Custom(s.to_string()),
        })
    }
}

impl From<String> for FormatTag {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(tag) => tag,
            Err(never) => match never {},
        }
    }
}

impl From<FormatTag> for String {
    fn from(tag: FormatTag) -> Self {
        tag.as_str().to_string()
    }
}

/// Format-specific option bag, one variant per option family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatOptions {
    Delimited(DelimitedOptions),
    Fixed(FixedOptions),
    KeyValue(KeyValueOptions),
    Paragraph,
    Weblog,
    Markup(FoldSpec),
    BinaryMetadata(Id3Options),
    Native(NativeOptions),
    Parquet,
    User(UserOptions),
}

impl FormatOptions {
    /// Default options for a tag. Formats that cannot run without
    /// configuration (`Fixed`, `Xml`) get an empty pattern that fails
    /// validation until filled in.
    pub fn default_for(tag: &FormatTag) -> Self {
        match tag {
            FormatTag::Csv => FormatOptions::Delimited(DelimitedOptions::csv()),
            FormatTag::Pipe => FormatOptions::Delimited(DelimitedOptions::pipe()),
            FormatTag::Tab => FormatOptions::Delimited(DelimitedOptions::tab()),
            FormatTag::Passwd => FormatOptions::Delimited(DelimitedOptions::passwd()),
            FormatTag::Fixed => FormatOptions::Fixed(FixedOptions::default()),
            FormatTag::Ini => FormatOptions::KeyValue(KeyValueOptions::default()),
            FormatTag::Paragraph => FormatOptions::Paragraph,
            FormatTag::Weblog => FormatOptions::Weblog,
            FormatTag::Xml => FormatOptions::Markup(FoldSpec::default()),
            FormatTag::Mp3 => FormatOptions::BinaryMetadata(Id3Options::default()),
            FormatTag::Array => FormatOptions::Native(NativeOptions::default()),
            FormatTag::Parquet => FormatOptions::Parquet,
            FormatTag::Custom(_) => FormatOptions::User(UserOptions::default()),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            FormatOptions::Delimited(_) => "delimited",
            FormatOptions::Fixed(_) => "fixed",
            FormatOptions::KeyValue(_) => "key_value",
            FormatOptions::Paragraph => "paragraph",
            FormatOptions::Weblog => "weblog",
            FormatOptions::Markup(_) => "markup",
            FormatOptions::BinaryMetadata(_) => "binary_metadata",
            FormatOptions::Native(_) => "native",
            FormatOptions::Parquet => "parquet",
            FormatOptions::User(_) => "user",
        }
    }

    /// Error for a codec handed the wrong option family.
    pub(crate) fn mismatch(&self, expected: &str) -> BridgeError {
        BridgeError::Configuration(format!(
            "{expected} codec cannot use {} options",
            self.variant_name()
        ))
    }
}

// ════════════════════════════════════════════
// Raw input / decode output
// ════════════════════════════════════════════

/// One file handed to a multi-file codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Undecoded content.
#[derive(Debug, Clone)]
pub enum RawInput {
    Text(String),
    Bytes(Vec<u8>),
    Files(Vec<NamedBlob>),
    /// Already-structured data; no text parsing is performed.
    Structured(serde_json::Value),
}

impl RawInput {
    /// Text content. Bytes must be valid UTF-8 unless a [`TextDecoder`] was
    /// applied beforehand.
    pub fn into_text(self) -> BridgeResult<String> {
        match self {
            RawInput::Text(text) => Ok(text),
            RawInput::Bytes(bytes) => String::from_utf8(bytes).map_err(|err| {
                let valid = err.utf8_error().valid_up_to();
                let record = err.as_bytes()[..valid].iter().filter(|b| **b == b'\n').count();
                BridgeError::parse(record, "invalid UTF-8 (supply a text decoder)")
            }),
            RawInput::Files(_) => Err(BridgeError::Configuration(
                "text format cannot decode a file set".to_string(),
            )),
            RawInput::Structured(_) => Err(BridgeError::Configuration(
                "text format cannot decode structured input".to_string(),
            )),
        }
    }

    pub fn into_bytes(self) -> BridgeResult<Vec<u8>> {
        match self {
            RawInput::Text(text) => Ok(text.into_bytes()),
            RawInput::Bytes(bytes) => Ok(bytes),
            RawInput::Files(mut files) if files.len() == 1 => Ok(files.remove(0).bytes),
            RawInput::Files(_) => Err(BridgeError::Configuration(
                "format expects a single file".to_string(),
            )),
            RawInput::Structured(_) => Err(BridgeError::Configuration(
                "binary format cannot decode structured input".to_string(),
            )),
        }
    }

    /// Convert raw bytes to text through `decoder`; other inputs pass through.
    pub fn with_text_decoder(self, decoder: &TextDecoder) -> Self {
        match self {
            RawInput::Bytes(bytes) => RawInput::Text(decoder.apply(&bytes)),
            other => other,
        }
    }
}

/// Output of a decode: field-value records plus optional discovered names.
///
/// Records may differ in width; the schema resolver aligns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub records: Vec<Vec<Cell>>,
    pub columns: Option<Vec<String>>,
}

impl Decoded {
    pub fn new(records: Vec<Vec<Cell>>) -> Self {
        Self {
            records,
            columns: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Run `filter` over every present value.
    pub fn map_values(mut self, filter: &ValueFilter) -> Self {
        for record in &mut self.records {
            for cell in record.iter_mut() {
                if let Some(value) = cell.take() {
                    *cell = Some(filter.apply(value));
                }
            }
        }
        self
    }
}

// ════════════════════════════════════════════
// Decode hooks
// ════════════════════════════════════════════

/// Explicit bytes → text conversion, for non-UTF-8 sources.
#[derive(Clone)]
pub struct TextDecoder(Arc<dyn Fn(&[u8]) -> String + Send + Sync>);

impl TextDecoder {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[u8]) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    /// ISO-8859-1: every byte is its own code point.
    pub fn latin1() -> Self {
        Self::new(|bytes| bytes.iter().map(|&b| b as char).collect())
    }

    pub fn apply(&self, bytes: &[u8]) -> String {
        (self.0)(bytes)
    }
}

impl fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TextDecoder(..)")
    }
}

/// Post-processing applied to every decoded value.
#[derive(Clone)]
pub struct ValueFilter(Arc<dyn Fn(String) -> String + Send + Sync>);

impl ValueFilter {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    pub fn apply(&self, value: String) -> String {
        (self.0)(value)
    }
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueFilter(..)")
    }
}

// ════════════════════════════════════════════
// Codec trait and registry
// ════════════════════════════════════════════

/// Decode/encode strategy for one format.
pub trait Codec: Send + Sync {
    /// Check that `options` is the right family and internally consistent.
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()>;

    /// Raw content → records.
    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded>;

    /// Rows → raw content, replacing whatever the target held.
    fn encode(&self, columns: &[String], rows: &[Row], options: &FormatOptions)
    -> BridgeResult<Vec<u8>>;

    /// Whether [`encode`](Self::encode) is implemented at all.
    fn can_encode(&self) -> bool {
        true
    }

    /// Whether a header record can be carried as the first record.
    fn supports_header(&self) -> bool {
        false
    }

    /// Columns the format always produces, known without any input. Used
    /// to shape a table whose backing file does not exist yet.
    fn known_columns(&self, _options: &FormatOptions) -> Option<Vec<String>> {
        None
    }
}

/// Codecs keyed by format tag.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<FormatTag, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Registry with every built-in codec.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let delimited = Arc::new(delimited::DelimitedCodec::new());
        for tag in [FormatTag::Csv, FormatTag::Pipe, FormatTag::Tab] {
            registry.register(tag, delimited.clone());
        }
        registry.register(FormatTag::Passwd, Arc::new(delimited::DelimitedCodec::passwd()));
        registry.register(FormatTag::Fixed, Arc::new(fixed::FixedCodec));
        registry.register(FormatTag::Ini, Arc::new(keyvalue::KeyValueCodec));
        registry.register(FormatTag::Paragraph, Arc::new(paragraph::ParagraphCodec));
        registry.register(FormatTag::Weblog, Arc::new(weblog::WeblogCodec));
        registry.register(FormatTag::Xml, Arc::new(markup::MarkupCodec));
        registry.register(FormatTag::Mp3, Arc::new(id3::Id3Codec));
        registry.register(FormatTag::Array, Arc::new(native::NativeCodec));
        registry.register(FormatTag::Parquet, Arc::new(columnar::ParquetCodec));
        registry
    }

    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Install or replace the codec for `tag`.
    pub fn register(&mut self, tag: FormatTag, codec: Arc<dyn Codec>) {
        self.codecs.insert(tag, codec);
    }

    pub fn contains(&self, tag: &FormatTag) -> bool {
        self.codecs.contains_key(tag)
    }

    pub fn get(&self, tag: &FormatTag) -> BridgeResult<Arc<dyn Codec>> {
        self.codecs
            .get(tag)
            .cloned()
            .ok_or_else(|| BridgeError::Configuration(format!("unsupported format '{tag}'")))
    }

    /// Validate options, then decode.
    pub fn decode(
        &self,
        tag: &FormatTag,
        input: RawInput,
        options: &FormatOptions,
    ) -> BridgeResult<Decoded> {
        let codec = self.get(tag)?;
        codec.validate(options)?;
        codec.decode(input, options)
    }

    /// Validate options, then encode. Fails fast for decode-only formats.
    pub fn encode(
        &self,
        tag: &FormatTag,
        columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let codec = self.get(tag)?;
        if !codec.can_encode() {
            return Err(BridgeError::Configuration(format!(
                "format '{tag}' cannot be encoded"
            )));
        }
        codec.validate(options)?;
        codec.encode(columns, rows, options)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split text into records on `separator`, numbering them in order.
///
/// A trailing separator does not open an extra record. With the default
/// `"\n"` separator a trailing `"\r"` is stripped from each record.
pub(crate) fn split_records<'a>(
    text: &'a str,
    separator: &'a str,
) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    let body = text.strip_suffix(separator).unwrap_or(text);
    let strip_cr = separator == "\n";
    let mut pieces = if text.is_empty() {
        None
    } else {
        Some(body.split(separator))
    };
    std::iter::from_fn(move || pieces.as_mut()?.next())
        .map(move |record| {
            if strip_cr {
                record.strip_suffix('\r').unwrap_or(record)
            } else {
                record
            }
        })
        .enumerate()
}

/// Reject a value that would break record framing on encode.
pub(crate) fn ensure_single_record(
    value: &str,
    record_separator: &str,
    row: usize,
) -> BridgeResult<()> {
    if value.contains(record_separator) {
        return Err(BridgeError::Schema(format!(
            "row {row}: value contains the record separator and cannot be encoded"
        )));
    }
    Ok(())
}
