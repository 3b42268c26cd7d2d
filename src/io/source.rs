//! Raw post sources.
//!
//! The scraper is an external producer; its output reaches the pipeline
//! through [`PostSource`].

use crate::models::RawPostRecord;
use crate::{Error, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A stream of raw post records.
///
/// # Example
///
/// ```rust,ignore
/// use tagsignal::{PostSource, RawPostRecord, Result};
///
/// struct Fixed(Vec<RawPostRecord>);
///
/// impl PostSource for Fixed {
///     fn next(&mut self) -> Result<Option<RawPostRecord>> {
///         Ok(self.0.pop())
///     }
/// }
/// ```
pub trait PostSource {
    /// Returns the next record, or `None` when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] for a record that cannot be decoded;
    /// the source stays usable and the following call moves on. Any other
    /// error ends the stream.
    fn next(&mut self) -> Result<Option<RawPostRecord>>;

    /// Number of records left, when known.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Reads scraper output in JSON form.
///
/// Handles both layouts the scraper has produced:
/// - **NDJSON/JSONL**: one object per line, blank lines skipped
/// - **Array**: a single `[{...}, {...}]` document
///
/// Each object is decoded on its own, so one bad record does not spoil the
/// rest of the file.
pub struct JsonPostSource<R: BufRead> {
    reader: R,
    /// Array elements not yet decoded.
    pending: VecDeque<serde_json::Value>,
    started: bool,
    array_mode: bool,
    line_number: usize,
}

impl JsonPostSource<BufReader<File>> {
    /// Opens a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::op("open_source", e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonPostSource<R> {
    /// Wraps a reader.
    #[must_use]
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
            started: false,
            array_mode: false,
            line_number: 0,
        }
    }

    /// Reads the next non-blank line, if any.
    ///
    /// A line that is not valid UTF-8 is reported as a malformed record.
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| Error::op("read_json", e))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = std::str::from_utf8(&buf).map_err(|e| Error::MalformedRecord {
                field: "json",
                reason: format!("line {}: invalid UTF-8: {e}", self.line_number),
            })?;
            if !line.trim().is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    /// Switches to array mode if the document starts with `[`.
    ///
    /// Returns the first NDJSON line otherwise.
    fn detect_format(&mut self) -> Result<Option<String>> {
        self.started = true;
        let Some(first) = self.next_line()? else {
            return Ok(None);
        };
        if !first.trim_start().starts_with('[') {
            return Ok(Some(first));
        }

        self.array_mode = true;
        let mut rest = String::new();
        self.reader
            .read_to_string(&mut rest)
            .map_err(|e| Error::op("read_json", e))?;
        let document = format!("{first}{rest}");
        let items: Vec<serde_json::Value> = serde_json::from_str(&document)
            .map_err(|e| Error::InvalidInput(format!("Failed to parse JSON array: {e}")))?;
        self.pending = items.into();
        Ok(None)
    }

    fn decode_line(&self, line: &str) -> Result<RawPostRecord> {
        serde_json::from_str(line.trim()).map_err(|e| Error::MalformedRecord {
            field: "json",
            reason: format!("line {}: {e}", self.line_number),
        })
    }
}

impl<R: BufRead> PostSource for JsonPostSource<R> {
    fn next(&mut self) -> Result<Option<RawPostRecord>> {
        if !self.started {
            if let Some(line) = self.detect_format()? {
                return self.decode_line(&line).map(Some);
            }
        }

        if self.array_mode {
            return self
                .pending
                .pop_front()
                .map(|value| {
                    serde_json::from_value(value).map_err(|e| Error::MalformedRecord {
                        field: "json",
                        reason: e.to_string(),
                    })
                })
                .transpose();
        }

        match self.next_line()? {
            Some(line) => self.decode_line(&line).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        self.array_mode.then_some(self.pending.len())
    }
}

/// In-memory source, mostly for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct VecPostSource {
    records: VecDeque<RawPostRecord>,
}

impl VecPostSource {
    /// Creates a source yielding `records` in order.
    #[must_use]
    pub fn new(records: Vec<RawPostRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }
}

impl PostSource for VecPostSource {
    fn next(&mut self) -> Result<Option<RawPostRecord>> {
        Ok(self.records.pop_front())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}
