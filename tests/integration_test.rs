//! Integration tests for tagsignal.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow::datatypes::{DataType, Field, Schema};
use chrono::TimeZone;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tagsignal::io::{JsonPostSource, SignalManifest, VecPostSource, export};
use tagsignal::services::IngestService;
use tagsignal::services::deduplication::DeduplicationConfig;
use tagsignal::storage::{SCHEMA_VERSION, SCHEMA_VERSION_KEY};
use tagsignal::{
    CorpusStore, DeduplicationService, Error, ExportMetadata, FeatureConfig, FeatureExtractor,
    RawPostRecord, SharedCorpus, SignalExporter,
};
use tempfile::TempDir;

fn scraper_records() -> Vec<RawPostRecord> {
    vec![
        RawPostRecord::new("desk", "Nifty50 rallies today! #nifty50 #banknifty")
            .with_post_id("1")
            .with_query("#nifty50")
            .with_engagement(12, 3, 1),
        RawPostRecord::new("desk", "Nifty50 rallies today! #nifty50")
            .with_post_id("2")
            .with_query("#nifty50"),
        RawPostRecord::new("trader", "Sensex slips as banks drag @NSEIndia https://t.co/x")
            .with_post_id("3")
            .with_query("#sensex")
            .with_engagement(-5, 0, 0),
        RawPostRecord::new("scalper", "Intraday rally rally in Bank Nifty #intraday")
            .with_post_id("4")
            .with_query("#intraday"),
    ]
}

fn write_ndjson(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

#[test]
fn test_full_pipeline_persist_extract_export() {
    let dir = TempDir::new().unwrap();
    let corpus_path = dir.path().join("tweets.parquet");

    let mut corpus = CorpusStore::new();
    let mut dedup = DeduplicationService::default();
    let summary = dedup.submit_batch(scraper_records(), &mut corpus).unwrap();
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rejected_duplicates, 1);

    corpus.persist(&corpus_path).unwrap();
    let loaded = CorpusStore::load(&corpus_path).unwrap();
    assert_eq!(loaded.posts(), corpus.posts());
    assert_eq!(loaded.snapshot_id(), corpus.snapshot_id());

    let config = FeatureConfig::default();
    let (vocabulary, matrix) = FeatureExtractor::new(config.clone()).extract(&loaded).unwrap();
    assert_eq!(matrix.n_rows(), 3);
    assert_eq!(matrix.n_cols(), vocabulary.len());
    assert!(vocabulary.index_of("rally").is_some());
    assert!(vocabulary.index_of("https").is_none());
    assert_eq!(matrix.rows()[1].structured.mentions, vec!["NSEIndia"]);
    assert_eq!(matrix.rows()[1].structured.like_count, 0);

    let metadata = ExportMetadata::for_corpus(&loaded, &config);
    let signals = SignalExporter::export(&vocabulary, &matrix, metadata).unwrap();
    let out = dir.path().join("signals");
    let manifest = signals.write_to_dir(&out).unwrap();

    for file in &manifest.files {
        assert!(out.join(file).exists(), "missing {file}");
    }
    let text = std::fs::read_to_string(out.join(export::MANIFEST_FILE)).unwrap();
    let parsed: SignalManifest = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.metadata.snapshot_id, loaded.snapshot_id());
    assert_eq!(parsed.metadata.schema_version, SCHEMA_VERSION);
    assert_eq!(parsed.n_rows, 3);
    assert_eq!(parsed.n_terms, vocabulary.len());

    let posts_csv = std::fs::read_to_string(out.join(export::POSTS_FILE)).unwrap();
    assert_eq!(posts_csv.lines().count(), 4);

    let leftovers: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

fn ingest_files(files: &[&Path]) -> (tagsignal::services::IngestReport, CorpusStore) {
    let shared = SharedCorpus::default();
    let sessions = files
        .iter()
        .map(|path| (path.display().to_string(), JsonPostSource::open(path).unwrap()))
        .collect();
    let report = IngestService::new(DeduplicationConfig::default())
        .ingest_sessions(&shared, sessions, Some("#nifty50"))
        .unwrap();
    (report, shared.into_inner().unwrap())
}

#[test]
fn test_ingest_files_as_parallel_sessions() {
    let dir = TempDir::new().unwrap();
    let first = write_ndjson(
        dir.path(),
        "nifty.jsonl",
        &[
            r#"{"tweet_id": "10", "username": "desk", "content": "Nifty50 rallies today! #nifty50", "likes": "1,204 Likes"}"#,
            r#"{"tweet_id": "11", "username": "desk", "content": "Nifty50 rallies today! #nifty50 #banknifty"}"#,
            r"not json at all",
        ],
    );
    let second = write_ndjson(
        dir.path(),
        "sensex.jsonl",
        &[
            r#"{"tweet_id": "20", "username": "DESK", "content": "nifty50 rallies today!"}"#,
            r#"{"tweet_id": "21", "username": "ops", "content": "Sensex flat into the close"}"#,
            r#"{"tweet_id": "22", "content": "orphan without author"}"#,
        ],
    );

    let (report, corpus) = ingest_files(&[&first, &second]);

    assert!(report.failures.is_empty());
    assert_eq!(report.total().submitted, 6);
    assert_eq!(report.total().malformed, 2);
    assert_eq!(report.corpus_size, 2);
    assert!(corpus.iter().all(|p| p.source_hashtag_query == "#nifty50"));

    let kept = &corpus.posts()[0];
    assert_eq!(kept.post_id.as_deref(), Some("10"));
    assert_eq!(kept.like_count, 1204);
    assert_eq!(corpus.posts()[1].post_id.as_deref(), Some("21"));

    for _ in 0..3 {
        let (_, again) = ingest_files(&[&first, &second]);
        assert_eq!(again.snapshot_id(), corpus.snapshot_id());
    }
}

#[test]
fn test_invalid_utf8_line_does_not_abort_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.jsonl");
    let mut bytes = b"{\"username\": \"a\", \"content\": \"Nifty opens flat\"}\n".to_vec();
    bytes.extend_from_slice(b"{\"username\": \"b\", \"content\": \"\xff broken\"}\n");
    bytes.extend_from_slice(b"{\"username\": \"c\", \"content\": \"Nifty closes green\"}\n");
    std::fs::write(&path, bytes).unwrap();

    let (report, corpus) = ingest_files(&[&path]);

    assert!(report.failures.is_empty());
    assert_eq!(report.total().malformed, 1);
    assert_eq!(corpus.len(), 2);
}

#[test]
fn test_far_future_timestamp_survives_persist() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tweets.parquet");
    let far = chrono::Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).single().unwrap();

    let mut corpus = CorpusStore::new();
    DeduplicationService::default()
        .submit(RawPostRecord::new("alice", "Expiry far away").with_timestamp(far), &mut corpus)
        .unwrap();
    corpus.persist(&path).unwrap();

    let loaded = CorpusStore::load(&path).unwrap();
    assert_eq!(loaded.posts(), corpus.posts());
    assert_eq!(loaded.posts()[0].timestamp, Some(far));
}

#[test]
fn test_merge_sizes_and_persist_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut a = CorpusStore::new();
    let mut b = CorpusStore::new();
    let mut dedup = DeduplicationService::default();
    dedup
        .submit_batch(
            vec![RawPostRecord::new("a", "one"), RawPostRecord::new("a", "two")],
            &mut a,
        )
        .unwrap();
    let mut dedup = DeduplicationService::default();
    dedup
        .submit_batch(
            vec![RawPostRecord::new("a", "two"), RawPostRecord::new("b", "three")],
            &mut b,
        )
        .unwrap();

    let a_path = dir.path().join("a.parquet");
    let b_path = dir.path().join("b.parquet");
    a.persist(&a_path).unwrap();
    b.persist(&b_path).unwrap();

    let mut merged = CorpusStore::load(&a_path).unwrap();
    let report = merged.merge(CorpusStore::load(&b_path).unwrap());
    assert_eq!(report.added, 1);
    assert_eq!(report.skipped_duplicates, 1);
    assert_eq!(merged.len(), 3);
    let texts: Vec<_> = merged.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[test]
fn test_foreign_parquet_is_schema_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("foreign.parquet");

    let schema = Arc::new(Schema::new(vec![
        Field::new("dedup_key", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(vec![1_i64])),
        Arc::new(StringArray::from(vec!["hello"])),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(vec![KeyValue::new(
            SCHEMA_VERSION_KEY.to_string(),
            SCHEMA_VERSION.to_string(),
        )]))
        .build();
    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    match CorpusStore::load(&path) {
        Err(Error::SchemaMismatch { path: reported, .. }) => {
            assert!(reported.contains("foreign.parquet"));
        },
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn test_garbage_file_is_not_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tweets.parquet");
    std::fs::write(&path, b"definitely not parquet").unwrap();
    assert!(CorpusStore::load(&path).is_err());
}

#[test]
fn test_empty_corpus_exports_cleanly() {
    let dir = TempDir::new().unwrap();
    let corpus = CorpusStore::new();
    let config = FeatureConfig::default();
    let (vocabulary, matrix) = FeatureExtractor::new(config.clone()).extract(&corpus).unwrap();
    assert!(vocabulary.is_empty());
    assert_eq!(matrix.n_rows(), 0);

    let signals =
        SignalExporter::export(&vocabulary, &matrix, ExportMetadata::for_corpus(&corpus, &config))
            .unwrap();
    let manifest = signals.write_to_dir(dir.path()).unwrap();
    assert_eq!(manifest.n_rows, 0);
    assert_eq!(manifest.nnz, 0);
    assert_eq!(manifest.mean_std, 0.0);
}

#[test]
fn test_vec_source_session_matches_batch_submit() {
    let shared = SharedCorpus::default();
    let report = IngestService::new(DeduplicationConfig::default())
        .ingest_session(&shared, "vec", VecPostSource::new(scraper_records()), None)
        .unwrap();

    let mut direct = CorpusStore::new();
    DeduplicationService::default()
        .submit_batch(scraper_records(), &mut direct)
        .unwrap();

    assert_eq!(report.summary.accepted, 3);
    let corpus = shared.into_inner().unwrap();
    let keys: Vec<_> = corpus.keys().cloned().collect();
    let direct_keys: Vec<_> = direct.keys().cloned().collect();
    assert_eq!(keys, direct_keys);
}
