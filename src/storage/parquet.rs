//! Parquet encoding of the corpus.
//!
//! One row per canonical post, in corpus order. The schema version is stored
//! in the file's key-value metadata under [`SCHEMA_VERSION_KEY`].
//!
//! | Column | Type | Since |
//! |--------|------|-------|
//! | `dedup_key` | Utf8 | 1 |
//! | `content_fingerprint` | Utf8 | 1 |
//! | `post_id` | Utf8, nullable | 1 |
//! | `author_handle` | Utf8 | 1 |
//! | `timestamp` | Timestamp(ns, UTC) in 1-2, Timestamp(us, UTC) from 3, nullable | 1 |
//! | `text` | Utf8 | 1 |
//! | `hashtags` | List<Utf8> | 1 |
//! | `mentions` | List<Utf8> | 1 |
//! | `like_count` | Int64 | 1 |
//! | `repost_count` | Int64 | 1 |
//! | `reply_count` | Int64 | 1 |
//! | `source_hashtag_query` | Utf8 | 1 |
//! | `ingested_at` | Int64 | 2 |
//!
//! Version 3 stores timestamps in microseconds, which cover the whole range
//! of `DateTime<Utc>`. Nanosecond files from versions 1 and 2 still load.

use crate::models::{CanonicalPost, DedupKey, Fingerprint};
use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, Int64Array, ListArray, ListBuilder, StringArray, StringBuilder,
    TimestampMicrosecondArray, TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 3;

/// Key-value metadata entry holding the schema version.
pub const SCHEMA_VERSION_KEY: &str = "tagsignal.schema_version";

const DEDUP_KEY: &str = "dedup_key";
const CONTENT_FINGERPRINT: &str = "content_fingerprint";
const POST_ID: &str = "post_id";
const AUTHOR_HANDLE: &str = "author_handle";
const TIMESTAMP: &str = "timestamp";
const TEXT: &str = "text";
const HASHTAGS: &str = "hashtags";
const MENTIONS: &str = "mentions";
const LIKE_COUNT: &str = "like_count";
const REPOST_COUNT: &str = "repost_count";
const REPLY_COUNT: &str = "reply_count";
const SOURCE_HASHTAG_QUERY: &str = "source_hashtag_query";
const INGESTED_AT: &str = "ingested_at";

fn string_list() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
}

const fn timestamp_unit(version: u32) -> TimeUnit {
    if version >= 3 {
        TimeUnit::Microsecond
    } else {
        TimeUnit::Nanosecond
    }
}

fn utc_timestamp(version: u32) -> DataType {
    DataType::Timestamp(timestamp_unit(version), Some("UTC".into()))
}

/// Arrow schema of a corpus file at `version`.
#[must_use]
pub fn schema_for(version: u32) -> Schema {
    let mut fields = vec![
        Field::new(DEDUP_KEY, DataType::Utf8, false),
        Field::new(CONTENT_FINGERPRINT, DataType::Utf8, false),
        Field::new(POST_ID, DataType::Utf8, true),
        Field::new(AUTHOR_HANDLE, DataType::Utf8, false),
        Field::new(TIMESTAMP, utc_timestamp(version), true),
        Field::new(TEXT, DataType::Utf8, false),
        Field::new(HASHTAGS, string_list(), false),
        Field::new(MENTIONS, string_list(), false),
        Field::new(LIKE_COUNT, DataType::Int64, false),
        Field::new(REPOST_COUNT, DataType::Int64, false),
        Field::new(REPLY_COUNT, DataType::Int64, false),
        Field::new(SOURCE_HASHTAG_QUERY, DataType::Utf8, false),
    ];
    if version >= 2 {
        fields.push(Field::new(INGESTED_AT, DataType::Int64, false));
    }
    Schema::new(fields)
}

fn string_list_array<'a, I>(lists: I) -> ListArray
where
    I: Iterator<Item = &'a Vec<String>>,
{
    let mut builder = ListBuilder::new(StringBuilder::new());
    for list in lists {
        for item in list {
            builder.values().append_value(item);
        }
        builder.append(true);
    }
    builder.finish()
}

/// Converts posts to a record batch laid out for `version`.
fn to_record_batch(posts: &[CanonicalPost], version: u32) -> Result<RecordBatch> {
    let schema = Arc::new(schema_for(version));

    let dedup_keys: StringArray = posts.iter().map(|p| Some(p.dedup_key.as_str())).collect();
    let fingerprints: StringArray = posts
        .iter()
        .map(|p| Some(p.content_fingerprint.as_str()))
        .collect();
    let post_ids: StringArray = posts.iter().map(|p| p.post_id.as_deref()).collect();
    let authors: StringArray = posts
        .iter()
        .map(|p| Some(p.author_handle.as_str()))
        .collect();
    let timestamps: ArrayRef = if timestamp_unit(version) == TimeUnit::Nanosecond {
        Arc::new(
            TimestampNanosecondArray::from(
                posts
                    .iter()
                    .map(|p| p.timestamp.and_then(|t| t.timestamp_nanos_opt()))
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        )
    } else {
        Arc::new(
            TimestampMicrosecondArray::from(
                posts
                    .iter()
                    .map(|p| p.timestamp.map(|t| t.timestamp_micros()))
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        )
    };
    let texts: StringArray = posts.iter().map(|p| Some(p.text.as_str())).collect();
    let queries: StringArray = posts
        .iter()
        .map(|p| Some(p.source_hashtag_query.as_str()))
        .collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(dedup_keys),
        Arc::new(fingerprints),
        Arc::new(post_ids),
        Arc::new(authors),
        timestamps,
        Arc::new(texts),
        Arc::new(string_list_array(posts.iter().map(|p| &p.hashtags))),
        Arc::new(string_list_array(posts.iter().map(|p| &p.mentions))),
        Arc::new(Int64Array::from_iter_values(posts.iter().map(|p| p.like_count))),
        Arc::new(Int64Array::from_iter_values(posts.iter().map(|p| p.repost_count))),
        Arc::new(Int64Array::from_iter_values(posts.iter().map(|p| p.reply_count))),
        Arc::new(queries),
    ];
    if version >= 2 {
        columns.push(Arc::new(Int64Array::from_iter_values(
            posts.iter().map(|p| p.ingested_at),
        )));
    }

    RecordBatch::try_new(schema, columns).map_err(|e| Error::op("build_record_batch", e))
}

/// Writes posts as a Parquet file at the current schema version.
///
/// An empty slice still produces a valid file carrying the schema.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_posts<W: Write + Send>(writer: W, posts: &[CanonicalPost]) -> Result<()> {
    write_posts_at(writer, posts, SCHEMA_VERSION)
}

fn write_posts_at<W: Write + Send>(writer: W, posts: &[CanonicalPost], version: u32) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            SCHEMA_VERSION_KEY.to_string(),
            version.to_string(),
        )]))
        .build();

    let schema = Arc::new(schema_for(version));
    let mut arrow_writer = ArrowWriter::try_new(writer, schema, Some(props))
        .map_err(|e| Error::op("create_parquet_writer", e))?;

    if !posts.is_empty() {
        let batch = to_record_batch(posts, version)?;
        arrow_writer
            .write(&batch)
            .map_err(|e| Error::op("write_parquet_batch", e))?;
    }

    arrow_writer
        .close()
        .map_err(|e| Error::op("close_parquet_writer", e))?;
    Ok(())
}

/// Reads posts from a corpus file, upgrading older schema versions.
///
/// # Errors
///
/// Returns [`Error::SchemaMismatch`] if the file does not match a supported
/// schema version, or an operation error if it cannot be read.
pub fn read_posts(path: &Path) -> Result<Vec<CanonicalPost>> {
    let file = File::open(path).map_err(|e| Error::op("open_corpus", e))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| Error::op("read_corpus", e))?;

    let mismatch = |reason: String| Error::SchemaMismatch {
        path: path.display().to_string(),
        reason,
    };

    let version_entry = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == SCHEMA_VERSION_KEY))
        .and_then(|kv| kv.value.clone())
        .ok_or_else(|| mismatch("missing schema version metadata".to_string()))?;
    let version: u32 = version_entry
        .trim()
        .parse()
        .map_err(|_| mismatch(format!("unreadable schema version '{version_entry}'")))?;
    if version == 0 || version > SCHEMA_VERSION {
        return Err(mismatch(format!("unsupported schema version {version}")));
    }

    let expected = schema_for(version);
    let actual = builder.schema();
    for field in expected.fields() {
        let found = actual
            .field_with_name(field.name())
            .map_err(|_| mismatch(format!("missing column '{}'", field.name())))?;
        if !type_matches(field.data_type(), found.data_type()) {
            return Err(mismatch(format!(
                "column '{}' has type {}, expected {}",
                field.name(),
                found.data_type(),
                field.data_type()
            )));
        }
    }

    let reader = builder.build().map_err(|e| Error::op("read_corpus", e))?;
    let mut posts = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| Error::op("read_corpus", e))?;
        decode_batch(&batch, version, &mut posts).map_err(mismatch)?;
    }

    tracing::debug!(path = %path.display(), version, rows = posts.len(), "Corpus file read");
    Ok(posts)
}

/// Compares column types, ignoring the timestamp zone and list item naming.
fn type_matches(expected: &DataType, actual: &DataType) -> bool {
    match (expected, actual) {
        (DataType::Timestamp(e, _), DataType::Timestamp(a, _)) => e == a,
        (DataType::List(e), DataType::List(a)) => e.data_type() == a.data_type(),
        _ => expected == actual,
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> std::result::Result<&'a T, String> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| format!("column '{name}' could not be decoded"))
}

fn required<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> std::result::Result<&'a T, String> {
    let array = column::<T>(batch, name)?;
    if array.null_count() > 0 {
        return Err(format!("required column '{name}' contains nulls"));
    }
    Ok(array)
}

fn list_values(list: &ListArray, row: usize) -> std::result::Result<Vec<String>, String> {
    if list.is_null(row) {
        return Ok(Vec::new());
    }
    let values = list.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| "list column does not hold strings".to_string())?;
    Ok(strings.iter().flatten().map(str::to_string).collect())
}

fn decode_timestamps(
    batch: &RecordBatch,
    version: u32,
) -> std::result::Result<Vec<Option<DateTime<Utc>>>, String> {
    if timestamp_unit(version) == TimeUnit::Nanosecond {
        let array = column::<TimestampNanosecondArray>(batch, TIMESTAMP)?;
        return Ok(array
            .iter()
            .map(|v| v.map(DateTime::from_timestamp_nanos))
            .collect());
    }

    let array = column::<TimestampMicrosecondArray>(batch, TIMESTAMP)?;
    array
        .iter()
        .map(|v| {
            v.map(|micros| {
                DateTime::from_timestamp_micros(micros)
                    .ok_or_else(|| format!("timestamp {micros} is out of range"))
            })
            .transpose()
        })
        .collect()
}

fn decode_batch(
    batch: &RecordBatch,
    version: u32,
    out: &mut Vec<CanonicalPost>,
) -> std::result::Result<(), String> {
    let dedup_keys = required::<StringArray>(batch, DEDUP_KEY)?;
    let fingerprints = required::<StringArray>(batch, CONTENT_FINGERPRINT)?;
    let post_ids = column::<StringArray>(batch, POST_ID)?;
    let authors = required::<StringArray>(batch, AUTHOR_HANDLE)?;
    let timestamps = decode_timestamps(batch, version)?;
    let texts = required::<StringArray>(batch, TEXT)?;
    let hashtags = column::<ListArray>(batch, HASHTAGS)?;
    let mentions = column::<ListArray>(batch, MENTIONS)?;
    let likes = required::<Int64Array>(batch, LIKE_COUNT)?;
    let reposts = required::<Int64Array>(batch, REPOST_COUNT)?;
    let replies = required::<Int64Array>(batch, REPLY_COUNT)?;
    let queries = required::<StringArray>(batch, SOURCE_HASHTAG_QUERY)?;
    let ingested = if version >= 2 {
        Some(required::<Int64Array>(batch, INGESTED_AT)?)
    } else {
        None
    };

    out.reserve(batch.num_rows());
    for row in 0..batch.num_rows() {
        out.push(CanonicalPost {
            dedup_key: DedupKey::new(dedup_keys.value(row)),
            content_fingerprint: Fingerprint::new(fingerprints.value(row)),
            post_id: (!post_ids.is_null(row)).then(|| post_ids.value(row).to_string()),
            author_handle: authors.value(row).to_string(),
            timestamp: timestamps[row],
            text: texts.value(row).to_string(),
            hashtags: list_values(hashtags, row)?,
            mentions: list_values(mentions, row)?,
            like_count: likes.value(row),
            repost_count: reposts.value(row),
            reply_count: replies.value(row),
            source_hashtag_query: queries.value(row).to_string(),
            ingested_at: ingested.map_or(0, |col| col.value(row)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn post(key: &str) -> CanonicalPost {
        CanonicalPost {
            dedup_key: DedupKey::new(key),
            content_fingerprint: Fingerprint::new(format!("fp-{key}")),
            post_id: Some(format!("id-{key}")),
            author_handle: "desk".to_string(),
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).single(),
            text: format!("post {key} #nifty50 @desk"),
            hashtags: vec!["nifty50".to_string()],
            mentions: vec!["desk".to_string()],
            like_count: 12,
            repost_count: 3,
            reply_count: 1,
            source_hashtag_query: "#nifty50".to_string(),
            ingested_at: 1_700_000_000,
        }
    }

    fn write_file(dir: &TempDir, name: &str, posts: &[CanonicalPost], version: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        write_posts_at(file, posts, version).unwrap();
        path
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let dir = TempDir::new().unwrap();
        let mut second = post("b");
        second.post_id = None;
        second.timestamp = None;
        second.hashtags.clear();
        let posts = vec![post("a"), second];

        let path = write_file(&dir, "corpus.parquet", &posts, SCHEMA_VERSION);
        let loaded = read_posts(&path).unwrap();
        assert_eq!(loaded, posts);
    }

    #[test]
    fn test_far_timestamps_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut future = post("future");
        future.timestamp = chrono::Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).single();
        let mut past = post("past");
        past.timestamp = chrono::Utc.with_ymd_and_hms(1200, 6, 30, 12, 0, 0).single();
        let posts = vec![future, past];

        let path = write_file(&dir, "far.parquet", &posts, SCHEMA_VERSION);
        let loaded = read_posts(&path).unwrap();
        assert_eq!(loaded, posts);
        assert!(loaded.iter().all(|p| p.timestamp.is_some()));
    }

    #[test]
    fn test_version_two_nanosecond_file_loads() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "v2.parquet", &[post("a")], 2);
        let loaded = read_posts(&path).unwrap();
        assert_eq!(loaded, vec![post("a")]);
    }

    #[test]
    fn test_empty_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.parquet", &[], SCHEMA_VERSION);
        assert!(read_posts(&path).unwrap().is_empty());
    }

    #[test]
    fn test_version_one_fills_ingested_at() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "v1.parquet", &[post("a")], 1);
        let loaded = read_posts(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ingested_at, 0);
        assert_eq!(loaded[0].text, post("a").text);
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.parquet");
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![KeyValue::new(
                SCHEMA_VERSION_KEY.to_string(),
                "9".to_string(),
            )]))
            .build();
        let writer = ArrowWriter::try_new(
            File::create(&path).unwrap(),
            Arc::new(schema_for(SCHEMA_VERSION)),
            Some(props),
        )
        .unwrap();
        writer.close().unwrap();

        let err = read_posts(&path).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { ref reason, .. } if reason.contains("version 9")));
    }

    #[test]
    fn test_missing_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.parquet");
        let writer = ArrowWriter::try_new(
            File::create(&path).unwrap(),
            Arc::new(schema_for(SCHEMA_VERSION)),
            None,
        )
        .unwrap();
        writer.close().unwrap();

        let err = read_posts(&path).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn test_wrong_column_type_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrong.parquet");
        let fields: Vec<Field> = schema_for(1)
            .fields()
            .iter()
            .map(|f| {
                if f.name() == LIKE_COUNT {
                    Field::new(LIKE_COUNT, DataType::Utf8, false)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![KeyValue::new(
                SCHEMA_VERSION_KEY.to_string(),
                "1".to_string(),
            )]))
            .build();
        let writer = ArrowWriter::try_new(
            File::create(&path).unwrap(),
            Arc::new(Schema::new(fields)),
            Some(props),
        )
        .unwrap();
        writer.close().unwrap();

        let err = read_posts(&path).unwrap_err();
        match err {
            Error::SchemaMismatch { path: p, reason } => {
                assert!(p.ends_with("wrong.parquet"));
                assert!(reason.contains("like_count"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_v2_file_missing_ingested_at_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.parquet");
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![KeyValue::new(
                SCHEMA_VERSION_KEY.to_string(),
                "2".to_string(),
            )]))
            .build();
        let writer = ArrowWriter::try_new(
            File::create(&path).unwrap(),
            Arc::new(schema_for(1)),
            Some(props),
        )
        .unwrap();
        writer.close().unwrap();

        let err = read_posts(&path).unwrap_err();
        assert!(
            matches!(err, Error::SchemaMismatch { ref reason, .. } if reason.contains("ingested_at"))
        );
    }
}
