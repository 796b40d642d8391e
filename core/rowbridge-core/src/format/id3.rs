//! Binary metadata: ID3v1 / ID3v1.1 trailers of audio files.
//!
//! The trailer is the final 128 bytes of a file:
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 3    | `"TAG"`                                 |
//! | 3      | 30   | title                                   |
//! | 33     | 30   | artist                                  |
//! | 63     | 30   | album                                   |
//! | 93     | 4    | year                                    |
//! | 97     | 30   | comment (v1.1: 28 bytes, NUL, track)    |
//! | 127    | 1    | genre index                             |
//!
//! Text fields are ISO-8859-1, NUL- or space-padded. Decode only: the
//! original container cannot be rebuilt from rows.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{Codec, Decoded, FormatOptions, NamedBlob, RawInput};
use crate::table::{Cell, Row};
use serde::{Deserialize, Serialize};

pub const ID3_COLUMNS: [&str; 8] = [
    "file_name",
    "title",
    "artist",
    "album",
    "year",
    "comment",
    "track",
    "genre",
];

const TRAILER_LEN: usize = 128;
const TRAILER_MAGIC: &[u8] = b"TAG";

/// Standard ID3v1 genre list.
pub const GENRES: [&str; 80] = [
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
    "Alternative",
    "Ska",
    "Death Metal",
    "Pranks",
    "Soundtrack",
    "Euro-Techno",
    "Ambient",
    "Trip-Hop",
    "Vocal",
    "Jazz+Funk",
    "Fusion",
    "Trance",
    "Classical",
    "Instrumental",
    "Acid",
    "House",
    "Game",
    "Sound Clip",
    "Gospel",
    "Noise",
    "AlternRock",
    "Bass",
    "Soul",
    "Punk",
    "Space",
    "Meditative",
    "Instrumental Pop",
    "Instrumental Rock",
    "Ethnic",
    "Gothic",
    "Darkwave",
    "Techno-Industrial",
    "Electronic",
    "Pop-Folk",
    "Eurodance",
    "Dream",
    "Southern Rock",
    "Comedy",
    "Cult",
    "Gangsta",
    "Top 40",
    "Christian Rap",
    "Pop/Funk",
    "Jungle",
    "Native American",
    "Cabaret",
    "New Wave",
    "Psychadelic",
    "Rave",
    "Showtunes",
    "Trailer",
    "Lo-Fi",
    "Tribal",
    "Acid Punk",
    "Acid Jazz",
    "Polka",
    "Retro",
    "Musical",
    "Rock & Roll",
    "Hard Rock",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id3Options {
    /// Only files with this extension (case-insensitive) are read.
    #[serde(default)]
    pub extension: Option<String>,
}

impl Id3Options {
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
        }
    }

    fn accepts(&self, name: &str) -> bool {
        let Some(wanted) = &self.extension else {
            return true;
        };
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(wanted.trim_start_matches('.')))
    }
}

pub struct Id3Codec;

fn id3_options(options: &FormatOptions) -> BridgeResult<&Id3Options> {
    match options {
        FormatOptions::BinaryMetadata(opts) => Ok(opts),
        other => Err(other.mismatch("binary metadata")),
    }
}

fn latin1_field(bytes: &[u8]) -> Cell {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text: String = bytes[..end].iter().map(|&b| b as char).collect();
    let text = text.trim_end_matches(' ');
    (!text.is_empty()).then(|| text.to_string())
}

/// One record for one file; a file without a trailer yields its name only.
fn read_trailer(file_name: Cell, bytes: &[u8]) -> Vec<Cell> {
    let mut record = vec![None; ID3_COLUMNS.len()];
    record[0] = file_name;

    if bytes.len() < TRAILER_LEN {
        return record;
    }
    let tag = &bytes[bytes.len() - TRAILER_LEN..];
    if !tag.starts_with(TRAILER_MAGIC) {
        return record;
    }

    record[1] = latin1_field(&tag[3..33]);
    record[2] = latin1_field(&tag[33..63]);
    record[3] = latin1_field(&tag[63..93]);
    record[4] = latin1_field(&tag[93..97]);

    let comment = &tag[97..127];
    if comment[28] == 0 && comment[29] != 0 {
        record[5] = latin1_field(&comment[..28]);
        record[6] = Some(comment[29].to_string());
    } else {
        record[5] = latin1_field(comment);
    }
    record[7] = GENRES.get(usize::from(tag[127])).map(|g| g.to_string());
    record
}

impl Codec for Id3Codec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        let opts = id3_options(options)?;
        if opts.extension.as_deref().is_some_and(str::is_empty) {
            return Err(BridgeError::Configuration(
                "file extension filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        let opts = id3_options(options)?;
        let records = match input {
            RawInput::Files(files) => files
                .iter()
                .filter(|file| opts.accepts(&file.name))
                .map(|NamedBlob { name, bytes }| read_trailer(Some(name.clone()), bytes))
                .collect(),
            RawInput::Bytes(bytes) => vec![read_trailer(None, &bytes)],
            RawInput::Text(_) | RawInput::Structured(_) => {
                return Err(BridgeError::Configuration(
                    "binary metadata needs file or byte input".to_string(),
                ));
            }
        };
        let columns = ID3_COLUMNS.iter().map(|c| c.to_string()).collect();
        Ok(Decoded::new(records).with_columns(columns))
    }

    fn encode(
        &self,
        _columns: &[String],
        _rows: &[Row],
        _options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        Err(BridgeError::Configuration(
            "binary metadata cannot be written back into its container".to_string(),
        ))
    }

    fn can_encode(&self) -> bool {
        false
    }

    fn known_columns(&self, _options: &FormatOptions) -> Option<Vec<String>> {
        Some(ID3_COLUMNS.iter().map(|c| c.to_string()).collect())
    }
}
