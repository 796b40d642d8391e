// Codec 성능 벤치마크
//
// Section 1: CSV decode / encode
// Section 2: continuous-mode insert (decode → mutate → encode → staged write)

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rowbridge_core::format::{CodecRegistry, DelimitedOptions};
use rowbridge_core::{
    CatalogEntry, FormatOptions, FormatTag, RawInput, Row, Session, SessionConfig, TableProvider,
};

fn sample_csv(rows: usize) -> String {
    let mut text = String::with_capacity(rows * 32);
    for i in 0..rows {
        text.push_str(&format!("{i},name_{i},\"city, {}\",{}\n", i % 17, i * 3));
    }
    text
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: CSV codec
// ═══════════════════════════════════════════════════════════════════════════

fn bench_csv_codec(c: &mut Criterion) {
    let registry = CodecRegistry::new();
    let options = FormatOptions::Delimited(DelimitedOptions::csv());
    let text = sample_csv(10_000);

    let mut group = c.benchmark_group("csv_codec");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("decode_10k", |b| {
        b.iter(|| {
            registry
                .decode(&FormatTag::Csv, black_box(RawInput::Text(text.clone())), &options)
                .unwrap()
        })
    });

    let decoded = registry
        .decode(&FormatTag::Csv, RawInput::Text(text.clone()), &options)
        .unwrap();
    let columns: Vec<String> = (1..=4).map(|i| format!("col{i}")).collect();
    let rows: Vec<Row> = decoded.records.into_iter().map(Row::new).collect();

    group.bench_function("encode_10k", |b| {
        b.iter(|| {
            registry
                .encode(&FormatTag::Csv, &columns, black_box(&rows), &options)
                .unwrap()
        })
    });

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: continuous insert
// ═══════════════════════════════════════════════════════════════════════════

fn bench_continuous_insert(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bound.csv"), sample_csv(1_000)).unwrap();
    let session = Session::new(SessionConfig::new().with_root_dir(dir.path())).unwrap();
    session
        .bind(vec![CatalogEntry::new("bound", FormatTag::Csv, "bound.csv")])
        .unwrap();
    let table = session.table("bound").unwrap();

    c.bench_function("continuous_insert_1k", |b| {
        b.iter(|| {
            table
                .insert_row(black_box(Row::from_strs(&["x", "y", "z", "0"])))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_csv_codec, bench_continuous_insert);
criterion_main!(benches);
