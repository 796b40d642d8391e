// Directive integration tests: import, export, convert through a Session
//
// 세션 단위의 종단 간 동작 검증: 이름 부여, 덮어쓰기 export, 원격 fetch, 루트 변경

use parking_lot::Mutex;
use rowbridge_core::error::{BridgeResult, ErrorKind};
use rowbridge_core::format::{DelimitedOptions, NativeOptions, UserCodec};
use rowbridge_core::persist::Fetch;
use rowbridge_core::schema::ColumnSpec;
use rowbridge_core::{
    ConvertDirective, ExportDirective, FoldSpec, FormatOptions, FormatTag, ImportDirective,
    PersistenceMode, RowQuery, Session, SessionConfig, Source, TableProvider,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use url::Url;

// ─── Helpers ────────────────────────────────────────────

fn session(root: &Path) -> Session {
    rowbridge_core::logging::init_test();
    Session::new(SessionConfig::new().with_root_dir(root)).unwrap()
}

/// In-memory remote store keyed by URL.
#[derive(Default)]
struct MemoryRemote {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryRemote {
    fn with_file(self, url: &str, bytes: &[u8]) -> Self {
        self.files.lock().insert(url.to_string(), bytes.to_vec());
        self
    }
}

impl Fetch for MemoryRemote {
    fn fetch(&self, url: &Url) -> BridgeResult<Vec<u8>> {
        self.files
            .lock()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| rowbridge_core::BridgeError::storage(url.as_str(), "not found"))
    }
}

// ═══════════════════════════════════════════════════════════
// Naming
// ═══════════════════════════════════════════════════════════

#[test]
fn test_default_names_are_sequential() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());

    let mut names = Vec::new();
    for data in ["a\n", "b\n", "c\n"] {
        names.push(session.import(ImportDirective::new(FormatTag::Csv, Source::text(data)))?);
    }
    assert_eq!(names, vec!["table1", "table2", "table3"]);
    assert_eq!(session.table_names(), names);
    Ok(())
}

#[test]
fn test_illegal_name_leaves_session_untouched() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());

    let err = session
        .import(ImportDirective::new(FormatTag::Csv, Source::text("1\n")).named("my-table"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Naming);
    assert!(session.table_names().is_empty());

    let name = session
        .import(ImportDirective::new(FormatTag::Csv, Source::text("1\n")).named("my_table2"))?;
    assert_eq!(name, "my_table2");
    Ok(())
}

#[test]
fn test_explicit_columns_win_over_header() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let name = session.import(
        ImportDirective::new(FormatTag::Csv, Source::text("x,y\n1,2\n"))
            .with_columns(ColumnSpec::explicit(["a", "b"]).with_header(true)),
    )?;
    let table = session.table(&name)?;
    assert_eq!(table.columns()?, vec!["a", "b"]);
    assert_eq!(table.row_count()?, 1);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Export
// ═══════════════════════════════════════════════════════════

#[test]
fn test_export_overwrites_in_full() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let name = session.import(
        ImportDirective::new(FormatTag::Csv, Source::text("id,city\n1,Oslo\n2,Rome\n3,Oslo\n"))
            .with_columns(ColumnSpec::first_line()),
    )?;
    let target = dir.path().join("out.csv");
    fs::write(&target, "stale content that is much longer than the export\n")?;

    let written = session.export(
        ExportDirective::new(RowQuery::all(&name), FormatTag::Csv, "out.csv").with_header(true),
    )?;
    assert_eq!(written, 3);
    assert_eq!(fs::read_to_string(&target)?, "id,city\n1,Oslo\n2,Rome\n3,Oslo\n");

    let oslo = RowQuery::all(&name)
        .select(["id"])
        .filter(|row| row.get("city") == Some("Oslo"));
    session.export(ExportDirective::new(oslo, FormatTag::Csv, "out.csv"))?;
    assert_eq!(fs::read_to_string(&target)?, "1\n3\n");
    assert_eq!(session.table(&name)?.persistence(), PersistenceMode::Batch);
    Ok(())
}

#[test]
fn test_export_to_decode_only_format_fails_fast() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let name = session.import(ImportDirective::new(FormatTag::Csv, Source::text("1\n")))?;

    let err = session
        .export(ExportDirective::new(RowQuery::all(&name), FormatTag::Mp3, "x.mp3"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!dir.path().join("x.mp3").exists());
    Ok(())
}

#[test]
fn test_export_unknown_table() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let err = session
        .export(ExportDirective::new(RowQuery::all("nope"), FormatTag::Csv, "x.csv"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Formats through the session
// ═══════════════════════════════════════════════════════════

#[test]
fn test_xml_import_broadcasts_ancestor_attributes() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("staff.xml"),
        r#"<root>
  <office type="branch" location="Portland">
    <employee id="1"><name>Ann</name></employee>
    <employee id="2"><name>Bob</name></employee>
  </office>
</root>"#,
    )?;
    let session = session(dir.path());
    let spec = FoldSpec::new("root office employee")
        .with_marker("office", "branch")
        .with_marker("office^", "location")
        .attribute("id", "Id")
        .field("name", "Name");
    let name = session.import(
        ImportDirective::new(FormatTag::Xml, Source::location("staff.xml"))
            .with_options(FormatOptions::Markup(spec))
            .named("staff"),
    )?;

    let scan = session.table(&name)?.scan()?;
    assert_eq!(scan.columns(), ["branch", "location", "Id", "Name"]);
    let rows: Vec<_> = scan
        .iter()
        .map(|r| (r.get("branch"), r.get("location"), r.get("Name")))
        .collect();
    assert_eq!(
        rows,
        vec![
            (Some("branch"), Some("Portland"), Some("Ann")),
            (Some("branch"), Some("Portland"), Some("Bob")),
        ]
    );
    Ok(())
}

#[test]
fn test_structured_maps_and_value_filter() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let value = serde_json::json!([
        {"name": "ann", "age": 31},
        {"name": "bob", "city": "Rome"}
    ]);
    let name = session.import(
        ImportDirective::new(FormatTag::Array, Source::structured(value))
            .with_value_filter(rowbridge_core::format::ValueFilter::new(|v| v.to_uppercase())),
    )?;
    let scan = session.table(&name)?.scan()?;
    assert_eq!(scan.columns(), ["name", "age", "city"]);
    let second = scan.iter().nth(1).map(|r| (r.get("name"), r.get("age"), r.get("city")));
    assert_eq!(second, Some((Some("BOB"), None, Some("ROME"))));
    Ok(())
}

#[test]
fn test_latin1_decoder() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("names.txt"), b"Jos\xe9|1\n")?;
    let session = session(dir.path());

    let err = session
        .import(ImportDirective::new(FormatTag::Pipe, Source::location("names.txt")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);

    let name = session.import(
        ImportDirective::new(FormatTag::Pipe, Source::location("names.txt"))
            .with_text_decoder(rowbridge_core::format::TextDecoder::latin1()),
    )?;
    let scan = session.table(&name)?.scan()?;
    assert_eq!(scan.iter().next().and_then(|r| r.get("col1")), Some("José"));
    Ok(())
}

#[test]
fn test_user_codec() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let codec = UserCodec::new(|record: &str| {
        record.split('=').map(|v| Some(v.trim().to_string())).collect()
    })
    .with_compose(|cells: &[Option<String>]| {
        cells
            .iter()
            .map(|c| c.clone().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("=")
    });
    let tag = FormatTag::Custom("eq".to_string());
    session.register_codec(tag.clone(), Arc::new(codec));

    let name = session.import(ImportDirective::new(tag.clone(), Source::text("a = 1\nb = 2\n")))?;
    assert_eq!(session.table(&name)?.row_count()?, 2);

    session.export(ExportDirective::new(RowQuery::all(&name), tag, "pairs.txt"))?;
    assert_eq!(fs::read_to_string(dir.path().join("pairs.txt"))?, "a=1\nb=2\n");
    Ok(())
}

#[test]
fn test_header_needs_a_format_that_carries_one() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("access.log"),
        r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /a.gif HTTP/1.0" 200 2326 "-" "curl""#,
    )?;
    let session = session(dir.path());
    let with_header = || {
        ImportDirective::new(FormatTag::Weblog, Source::location("access.log"))
            .with_columns(ColumnSpec::first_line())
    };

    let err = session.import(with_header()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(session.table_names().is_empty());

    let err = session
        .convert(ConvertDirective::new(with_header(), FormatTag::Csv, "out.csv"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!dir.path().join("out.csv").exists());

    let name = session.import(ImportDirective::new(FormatTag::Weblog, Source::location("access.log")))?;
    assert_eq!(name, "table1");
    assert_eq!(session.table(&name)?.row_count()?, 1);
    Ok(())
}

#[test]
fn test_convert_pipe_to_json() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("in.txt"), "ann|31\nbob|\n")?;
    let session = session(dir.path());

    let input = ImportDirective::new(FormatTag::Pipe, Source::location("in.txt"))
        .with_columns(ColumnSpec::explicit(["name", "age"]));
    let converted = session.convert(
        ConvertDirective::new(input, FormatTag::Array, "out.json")
            .with_options(FormatOptions::Native(NativeOptions::maps())),
    )?;
    assert_eq!(converted, 2);
    assert!(session.table_names().is_empty());

    let json: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("out.json"))?)?;
    assert_eq!(json[0]["name"], "ann");
    assert_eq!(json[0]["age"], "31");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Locations
// ═══════════════════════════════════════════════════════════

#[test]
fn test_remote_import_through_injected_fetcher() -> BridgeResult<()> {
    let dir = tempdir()?;
    let remote = MemoryRemote::default().with_file("ftp://files.example.org/data.csv", b"1,2\n3,4\n");
    let session = Session::with_fetcher(
        SessionConfig::new().with_root_dir(dir.path()),
        Arc::new(remote),
    )?;

    let name = session.import(ImportDirective::new(
        FormatTag::Csv,
        Source::location("ftp://files.example.org/data.csv"),
    ))?;
    assert_eq!(session.table(&name)?.row_count()?, 2);

    let err = session
        .import(ImportDirective::new(
            FormatTag::Csv,
            Source::location("ftp://files.example.org/missing.csv"),
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    // the default transport cannot write remote targets
    let err = session
        .export(ExportDirective::new(
            RowQuery::all(&name),
            FormatTag::Csv,
            "ftp://files.example.org/out.csv",
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    Ok(())
}

#[test]
fn test_root_change_affects_later_resolutions_only() -> BridgeResult<()> {
    let first = tempdir()?;
    let second = tempdir()?;
    fs::write(first.path().join("data.tsv"), "a\tb\n")?;
    fs::write(second.path().join("data.tsv"), "c\td\ne\tf\n")?;

    let session = session(first.path());
    let before = session.import(ImportDirective::new(FormatTag::Tab, Source::location("data.tsv")))?;

    session.set_root_dir(second.path());
    assert_eq!(session.root_dir(), second.path());
    let after = session.import(ImportDirective::new(FormatTag::Tab, Source::location("data.tsv")))?;

    assert_eq!(session.table(&before)?.row_count()?, 1);
    assert_eq!(session.table(&after)?.row_count()?, 2);
    Ok(())
}

#[test]
fn test_custom_delimited_options() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let mut options = DelimitedOptions::new(";");
    options.trim = true;
    let name = session.import(
        ImportDirective::new(FormatTag::Csv, Source::text(" a ; b \n"))
            .with_options(FormatOptions::Delimited(options)),
    )?;
    let scan = session.table(&name)?.scan()?;
    let row = scan.iter().next().map(|r| (r.get("col1"), r.get("col2")));
    assert_eq!(row, Some((Some("a"), Some("b"))));
    Ok(())
}

#[test]
fn test_record_batch_view() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    let name = session.import(ImportDirective::new(FormatTag::Csv, Source::text("1,\n2,x\n")))?;
    let batch = session.table(&name)?.record_batch()?;
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(batch.num_columns(), 2);
    Ok(())
}
