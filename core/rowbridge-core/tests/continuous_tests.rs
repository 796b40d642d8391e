// Continuous-mode integration tests: catalog bindings backed by files
//
// 바인딩된 테이블의 모든 문장이 백업 위치를 거치는지 검증:
// 가시성, 동시성, 실패 시 원본 보존, 원격 쓰기 정책

use parking_lot::Mutex;
use rowbridge_core::error::{BridgeError, BridgeResult, ErrorKind};
use rowbridge_core::persist::Fetch;
use rowbridge_core::schema::ColumnSpec;
use rowbridge_core::table::Assignment;
use rowbridge_core::{
    CatalogEntry, FormatTag, ImportDirective, PersistenceMode, Row, Session, SessionConfig,
    Source, TableProvider,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;
use url::Url;

// ─── Helpers ────────────────────────────────────────────

const ACCESS_LOG: &str = concat!(
    r#"10.0.0.1 - ann [10/Oct/2000:13:55:36 -0700] "GET / HTTP/1.0" 200 2326 "-" "curl/8.0""#,
    "\n",
    r#"10.0.0.2 - bob [10/Oct/2000:13:55:37 -0700] "GET /a HTTP/1.0" 404 17 "-" "curl/8.0""#,
    "\n",
    r#"10.0.0.3 - cy [10/Oct/2000:13:55:38 -0700] "POST /b HTTP/1.0" 201 5 "-" "curl/8.0""#,
    "\n",
);

fn session(root: &Path) -> Session {
    rowbridge_core::logging::init_test();
    Session::new(SessionConfig::new().with_root_dir(root)).unwrap()
}

/// Remote store that optionally accepts writes.
struct MemoryRemote {
    files: Mutex<HashMap<String, Vec<u8>>>,
    writable: bool,
}

impl MemoryRemote {
    fn new(writable: bool) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            writable,
        }
    }

    fn put(&self, url: &str, bytes: &[u8]) {
        self.files.lock().insert(url.to_string(), bytes.to_vec());
    }

    fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.files.lock().get(url).cloned()
    }
}

impl Fetch for MemoryRemote {
    fn fetch(&self, url: &Url) -> BridgeResult<Vec<u8>> {
        self.get(url.as_str())
            .ok_or_else(|| BridgeError::storage(url.as_str(), "not found"))
    }

    fn supports_write(&self, _url: &Url) -> bool {
        self.writable
    }

    fn store(&self, url: &Url, bytes: &[u8]) -> BridgeResult<()> {
        self.put(url.as_str(), bytes);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Visibility
// ═══════════════════════════════════════════════════════════

#[test]
fn test_insert_is_visible_to_next_select() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("people.csv"), "id,name\n1,ann\n2,bob\n")?;
    let session = session(dir.path());
    session.bind(vec![
        CatalogEntry::new("people", FormatTag::Csv, "people.csv")
            .with_columns(ColumnSpec::first_line()),
    ])?;

    let before = session.table("people")?.row_count()?;
    session
        .table("people")?
        .insert_row(Row::from_strs(&["3", "cy"]))?;
    let after = session.table("people")?.row_count()?;
    assert_eq!(after, before + 1);

    assert_eq!(
        fs::read_to_string(dir.path().join("people.csv"))?,
        "id,name\n1,ann\n2,bob\n3,cy\n"
    );
    assert_eq!(session.table("people")?.persistence(), PersistenceMode::Continuous);
    Ok(())
}

#[test]
fn test_external_edits_are_seen() -> BridgeResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.txt");
    fs::write(&path, "a|1\n")?;
    let session = session(dir.path());
    session.bind(vec![CatalogEntry::new("kv", FormatTag::Pipe, "kv.txt")])?;
    let table = session.table("kv")?;
    assert_eq!(table.row_count()?, 1);

    fs::write(&path, "a|1\nb|2\n")?;
    assert_eq!(table.row_count()?, 2);

    let updated = table.update_where(
        &|row| row.get("col1") == Some("b"),
        &[Assignment::set("col2", "20")],
    )?;
    assert_eq!(updated, 1);
    assert_eq!(fs::read_to_string(&path)?, "a|1\nb|20\n");

    let deleted = table.delete_where(&|row| row.get("col1") == Some("a"))?;
    assert_eq!(deleted, 1);
    assert_eq!(fs::read_to_string(&path)?, "b|20\n");
    Ok(())
}

#[test]
fn test_missing_file_reads_empty() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    session.bind(vec![
        CatalogEntry::new("log", FormatTag::Weblog, "access.log"),
        CatalogEntry::new("notes", FormatTag::Csv, "notes.csv")
            .with_columns(ColumnSpec::explicit(["day", "text"])),
    ])?;

    assert_eq!(session.table("log")?.row_count()?, 0);
    assert_eq!(session.table("log")?.columns()?.len(), 9);

    let notes = session.table("notes")?;
    assert_eq!(notes.columns()?, vec!["day", "text"]);
    notes.insert_row(Row::from_strs(&["mon", "hello"]))?;
    assert_eq!(fs::read_to_string(dir.path().join("notes.csv"))?, "mon,hello\n");
    Ok(())
}

#[test]
fn test_continuous_import_binds_location() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("t.tsv"), "x\ty\n")?;
    let session = session(dir.path());

    let name = session.import(
        ImportDirective::new(FormatTag::Tab, Source::location("t.tsv"))
            .with_persistence(PersistenceMode::Continuous),
    )?;
    assert_eq!(name, "table1");
    assert!(session.catalog().contains(&name));

    session.table(&name)?.insert_row(Row::from_strs(&["z", "w"]))?;
    assert_eq!(fs::read_to_string(dir.path().join("t.tsv"))?, "x\ty\nz\tw\n");
    Ok(())
}

#[test]
fn test_continuous_import_of_broken_source_is_unbound() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("bad.csv"), "\"unterminated\n")?;
    let session = session(dir.path());

    let err = session
        .import(
            ImportDirective::new(FormatTag::Csv, Source::location("bad.csv"))
                .named("bad")
                .with_persistence(PersistenceMode::Continuous),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(session.catalog().is_empty());
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Failure leaves the prior content
// ═══════════════════════════════════════════════════════════

#[test]
fn test_encode_failure_keeps_prior_file() -> BridgeResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cards.txt");
    fs::write(&path, "Ann\nOslo\n\nBob\nRome\n")?;
    let session = session(dir.path());
    session.bind(vec![CatalogEntry::new("cards", FormatTag::Paragraph, "cards.txt")])?;
    let table = session.table("cards")?;
    assert_eq!(table.row_count()?, 2);

    let err = table
        .insert_row(Row::from_strs(&["Cy", "two\nlines"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(fs::read_to_string(&path)?, "Ann\nOslo\n\nBob\nRome\n");
    assert_eq!(table.row_count()?, 2);
    Ok(())
}

#[test]
fn test_row_without_values_is_not_lost() -> BridgeResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cards.txt");
    fs::write(&path, "Ann\nOslo\n\nBob\nRome\n")?;
    let session = session(dir.path());
    session.bind(vec![CatalogEntry::new("cards", FormatTag::Paragraph, "cards.txt")])?;
    let table = session.table("cards")?;

    let err = table.insert_row(Row::absent(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(table.row_count()?, 2);
    assert_eq!(fs::read_to_string(&path)?, "Ann\nOslo\n\nBob\nRome\n");
    Ok(())
}

#[test]
fn test_schema_violation_is_not_written() -> BridgeResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("p.csv");
    fs::write(&path, "1,2\n")?;
    let session = session(dir.path());
    session.bind(vec![CatalogEntry::new("p", FormatTag::Csv, "p.csv")])?;

    let err = session
        .table("p")?
        .insert_row(Row::from_strs(&["1", "2", "3"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(fs::read_to_string(&path)?, "1,2\n");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Concurrency
// ═══════════════════════════════════════════════════════════

#[test]
fn test_concurrent_inserts_are_not_lost() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = Arc::new(session(dir.path()));
    session.bind(vec![
        CatalogEntry::new("events", FormatTag::Csv, "events.csv")
            .with_columns(ColumnSpec::explicit(["worker", "seq"])),
    ])?;

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let session = Arc::clone(&session);
            thread::spawn(move || -> BridgeResult<()> {
                let table = session.table("events")?;
                let worker = worker.to_string();
                for seq in 0..10 {
                    let seq = seq.to_string();
                    table.insert_row(Row::from_strs(&[worker.as_str(), seq.as_str()]))?;
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    assert_eq!(session.table("events")?.row_count()?, 40);
    let lines = fs::read_to_string(dir.path().join("events.csv"))?.lines().count();
    assert_eq!(lines, 40);
    Ok(())
}

#[test]
fn test_create_and_bind_cannot_both_claim_a_name() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = Arc::new(session(dir.path()));

    for round in 0..50 {
        let name = format!("race{round}");
        let creator = {
            let session = Arc::clone(&session);
            let name = name.clone();
            thread::spawn(move || session.create_table(&name, &["a"]).is_ok())
        };
        let binder = {
            let session = Arc::clone(&session);
            let name = name.clone();
            thread::spawn(move || {
                let location = format!("{name}.csv");
                session
                    .bind(vec![CatalogEntry::new(name, FormatTag::Csv, location)])
                    .is_ok()
            })
        };
        let created = creator.join().expect("creator panicked");
        let bound = binder.join().expect("binder panicked");
        assert!(created != bound, "round {round}: created={created} bound={bound}");
    }
    assert_eq!(session.table_names().len(), 50);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Catalog directives
// ═══════════════════════════════════════════════════════════

#[test]
fn test_conflicting_bindings() -> BridgeResult<()> {
    let dir = tempdir()?;
    let session = session(dir.path());
    session.create_table("mem", &["a"])?;

    let err = session
        .bind(vec![CatalogEntry::new("mem", FormatTag::Csv, "mem.csv")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);

    session.bind(vec![CatalogEntry::new("t", FormatTag::Csv, "t.csv")])?;
    assert!(session.bind(vec![CatalogEntry::new("t", FormatTag::Csv, "t.csv")])?.is_empty());
    let err = session
        .bind(vec![CatalogEntry::new("t", FormatTag::Pipe, "t.csv")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);

    // a name bound in the catalog cannot be reused by an import
    let err = session
        .import(ImportDirective::new(FormatTag::Csv, Source::text("1\n")).named("t"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Naming);
    Ok(())
}

#[test]
fn test_drop_bound_table_keeps_file() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("keep.csv"), "1\n")?;
    let session = session(dir.path());
    session.bind(vec![CatalogEntry::new("keep", FormatTag::Csv, "keep.csv")])?;

    session.drop_table("keep")?;
    assert!(dir.path().join("keep.csv").exists());
    assert_eq!(session.table("keep").err().map(|e| e.kind()), Some(ErrorKind::Catalog));
    Ok(())
}

#[test]
fn test_catalog_survives_sessions() -> BridgeResult<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.csv"), "1\n2\n")?;
    {
        let session = session(dir.path());
        session.bind(vec![CatalogEntry::new("a", FormatTag::Csv, "a.csv")])?;
        session.save_catalog("catalog.json")?;
    }

    let session = session(dir.path());
    assert_eq!(session.load_catalog("catalog.json")?, vec!["a"]);
    assert_eq!(session.table("a")?.row_count()?, 2);
    Ok(())
}

#[test]
fn test_bound_location_follows_root() -> BridgeResult<()> {
    let first = tempdir()?;
    let second = tempdir()?;
    fs::write(first.path().join("d.csv"), "1\n")?;
    fs::write(second.path().join("d.csv"), "1\n2\n3\n")?;

    let session = session(first.path());
    session.bind(vec![CatalogEntry::new("d", FormatTag::Csv, "d.csv")])?;
    assert_eq!(session.table("d")?.row_count()?, 1);

    session.set_root_dir(second.path());
    assert_eq!(session.table("d")?.row_count()?, 3);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Remote bindings
// ═══════════════════════════════════════════════════════════

#[test]
fn test_read_only_remote_rejects_mutation() -> BridgeResult<()> {
    let dir = tempdir()?;
    let remote = Arc::new(MemoryRemote::new(false));
    remote.put("http://data.example.org/r.csv", b"1\n");
    let session =
        Session::with_fetcher(SessionConfig::new().with_root_dir(dir.path()), remote.clone())?;
    session.bind(vec![CatalogEntry::new(
        "r",
        FormatTag::Csv,
        "http://data.example.org/r.csv",
    )])?;

    assert_eq!(session.table("r")?.row_count()?, 1);
    let err = session
        .table("r")?
        .insert_row(Row::from_strs(&["2"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(remote.get("http://data.example.org/r.csv"), Some(b"1\n".to_vec()));
    Ok(())
}

#[test]
fn test_writable_remote_is_rewritten() -> BridgeResult<()> {
    let dir = tempdir()?;
    let remote = Arc::new(MemoryRemote::new(true));
    remote.put("ftp://files.example.org/w.csv", b"1\n");
    let session =
        Session::with_fetcher(SessionConfig::new().with_root_dir(dir.path()), remote.clone())?;
    session.bind(vec![CatalogEntry::new(
        "w",
        FormatTag::Csv,
        "ftp://files.example.org/w.csv",
    )])?;

    session.table("w")?.insert_row(Row::from_strs(&["2"]))?;
    assert_eq!(remote.get("ftp://files.example.org/w.csv"), Some(b"1\n2\n".to_vec()));
    assert_eq!(session.table("w")?.row_count()?, 2);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Header records
// ═══════════════════════════════════════════════════════════

#[test]
fn test_header_binding_on_headerless_format_is_rejected() -> BridgeResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("access.log");
    fs::write(&path, ACCESS_LOG)?;
    let session = session(dir.path());

    let err = session
        .bind(vec![
            CatalogEntry::new("hits", FormatTag::Weblog, "access.log")
                .with_columns(ColumnSpec::first_line()),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = session
        .import(
            ImportDirective::new(FormatTag::Weblog, Source::location("access.log"))
                .named("hits")
                .with_columns(ColumnSpec::first_line())
                .with_persistence(PersistenceMode::Continuous),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(session.catalog().is_empty());

    // without a header every line stays a record across rewrites
    session.bind(vec![CatalogEntry::new("hits", FormatTag::Weblog, "access.log")])?;
    let table = session.table("hits")?;
    assert_eq!(table.row_count()?, 3);
    assert_eq!(table.delete_where(&|_| false)?, 0);
    assert_eq!(table.row_count()?, 3);
    assert_eq!(fs::read_to_string(&path)?, ACCESS_LOG);
    Ok(())
}
