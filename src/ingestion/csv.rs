//! Bounded sampling and streamed row counting for delimited text.
//!
//! Rules:
//!
//! - The first record is the header. Empty header cells become `Unnamed: <index>` and repeated
//!   names get `.1`, `.2`, ... suffixes.
//! - Records with more fields than the header are malformed and skipped; shorter records are padded
//!   with nulls.
//! - Header names and text cells are kept verbatim after decoding with the sniffed encoding.
//!   Whitespace-only cells are null; numbers and booleans may carry surrounding whitespace. Types
//!   come from inference over the sample (see [`infer_column_type`]).
//! - A line with an unbalanced quote would swallow the rest of the input into one field. It is
//!   detected and skipped on its own (see [`sample_from_reader`]).
//! - The total row count is a second, independent pass that holds one record at a time and folds
//!   rows into fixed-size chunks. If it fails, the sample size is reported instead, as
//!   [`TotalRows::Estimated`].

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::path::Path;

use csv::ByteRecord;
use encoding_rs::Encoding;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, DataType, Field, Schema, Shape, ShapeSource, Value};

use super::sniff::{Delimiter, FileType, SniffResult};

/// Records folded into one chunk by the counting pass.
pub const DEFAULT_COUNT_CHUNK_ROWS: usize = 100_000;

/// Cells treated as missing, besides empty/whitespace-only cells.
const NA_TOKENS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "<NA>",
];

/// Outcome of the total-count pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalRows {
    /// The streaming pass completed.
    Counted(u64),
    /// The streaming pass failed; this is the sample's own row count, not a true total.
    Estimated { from_sample: u64 },
}

impl TotalRows {
    pub fn rows(self) -> u64 {
        match self {
            Self::Counted(n) => n,
            Self::Estimated { from_sample } => from_sample,
        }
    }

    pub fn source(self) -> ShapeSource {
        match self {
            Self::Counted(_) => ShapeSource::Counted,
            Self::Estimated { .. } => ShapeSource::Estimated,
        }
    }
}

/// A bounded in-memory sample plus the full-file row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub data: DataSet,
    pub total: TotalRows,
    /// Malformed records skipped while reading the sample.
    pub skipped_rows: usize,
}

impl Sample {
    pub fn sample_shape(&self) -> Shape {
        self.data.shape()
    }

    pub fn total_shape(&self) -> Shape {
        Shape::new(self.total.rows(), self.data.column_count() as u64)
    }
}

/// Limits for [`load_sample_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    /// Maximum number of well-formed records kept in memory.
    pub max_rows: usize,
    /// Records per chunk in the counting pass.
    pub count_chunk_rows: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            max_rows: 5_000,
            count_chunk_rows: DEFAULT_COUNT_CHUNK_ROWS,
        }
    }
}

/// Load at most `max_sample_rows` rows and count the whole file.
pub fn load_sample(
    path: impl AsRef<Path>,
    sniff: &SniffResult,
    max_sample_rows: usize,
) -> IngestionResult<Sample> {
    let options = SampleOptions {
        max_rows: max_sample_rows,
        ..Default::default()
    };
    load_sample_with(path, sniff, &options)
}

/// Load a bounded sample and count the whole file with explicit limits.
///
/// Errors:
///
/// - [`IngestionError::FileMissing`] if `path` does not exist.
/// - [`IngestionError::LoadFailed`] if the header or a record cannot be read.
/// - [`IngestionError::EmptyResult`] if no well-formed data row was found.
///
/// A failing count pass is never an error; it yields [`TotalRows::Estimated`].
pub fn load_sample_with(
    path: impl AsRef<Path>,
    sniff: &SniffResult,
    options: &SampleOptions,
) -> IngestionResult<Sample> {
    let path = path.as_ref();
    match sniff.filetype {
        FileType::DelimitedText => {}
    }
    if !sniff.delimiter_splits_cleanly() {
        tracing::warn!(
            path = %path.display(),
            encoding = %sniff.encoding,
            delimiter = %sniff.delimiter.as_char().escape_default(),
            "delimiter byte can occur inside multi-byte characters; cells may be split"
        );
    }

    let (data, skipped_rows) = read_sample(path, sniff, options.max_rows)?;
    if data.row_count() == 0 {
        return Err(IngestionError::EmptyResult {
            path: path.to_path_buf(),
        });
    }

    let total = total_or_estimate(
        path,
        count_rows(path, sniff, options.count_chunk_rows),
        data.row_count(),
    );

    Ok(Sample {
        data,
        total,
        skipped_rows,
    })
}

/// Fold the outcome of the counting pass; a failed pass reports the sample size instead.
fn total_or_estimate(path: &Path, count: IngestionResult<u64>, sample_rows: usize) -> TotalRows {
    match count {
        Ok(n) => TotalRows::Counted(n),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                sample_rows,
                "total row count failed; reporting sample size as total"
            );
            TotalRows::Estimated {
                from_sample: sample_rows as u64,
            }
        }
    }
}

/// Read at most `max_rows` well-formed rows without counting the rest of the file.
///
/// Returns the sample and the number of malformed records skipped on the way.
pub fn read_sample(
    path: &Path,
    sniff: &SniffResult,
    max_rows: usize,
) -> IngestionResult<(DataSet, usize)> {
    let file = File::open(path).map_err(|e| IngestionError::from_io_at(e, path))?;
    let mut rdr = reader_builder(sniff.delimiter).from_reader(file);
    sample_from_reader(&mut rdr, sniff.resolved_encoding(), max_rows)
}

/// Sample rows from an existing CSV reader.
///
/// The reader must be built with `has_headers(true)` and `flexible(true)` (see
/// [`reader_builder`]) so short and long records reach the skip/pad logic instead of erroring.
/// It must be seekable so reading can resume after a line with an unbalanced quote.
pub fn sample_from_reader<R: Read + Seek>(
    rdr: &mut csv::Reader<R>,
    encoding: &'static Encoding,
    max_rows: usize,
) -> IngestionResult<(DataSet, usize)> {
    let headers = rdr.byte_headers().map_err(load_failed)?.clone();
    let raw_names: Vec<String> = headers
        .iter()
        .map(|h| decode_field(h, encoding).into_owned())
        .collect();
    if raw_names.is_empty() || (raw_names.len() == 1 && raw_names[0].trim().is_empty()) {
        return Err(IngestionError::LoadFailed {
            message: "no columns to parse from file".to_string(),
        });
    }
    let names = normalize_headers(&raw_names);
    let width = names.len();

    let mut records = DataRecords::new(rdr, width);
    let mut cells: Vec<Vec<String>> = Vec::new();
    let mut record = ByteRecord::new();
    while cells.len() < max_rows {
        if !records.next_into(&mut record).map_err(load_failed)? {
            break;
        }
        let mut row: Vec<String> = record
            .iter()
            .map(|f| decode_field(f, encoding).into_owned())
            .collect();
        row.resize(width, String::new());
        cells.push(row);
    }
    let skipped = records.skipped;

    let fields: Vec<Field> = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let column = cells.iter().map(|row| row[idx].as_str());
            Field::new(name, infer_column_type(column))
        })
        .collect();

    let rows = cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(&fields)
                .map(|(raw, field)| typed_value(raw, field.data_type))
                .collect()
        })
        .collect();

    Ok((DataSet::new(Schema::new(fields), rows), skipped))
}

/// Count well-formed data rows in the whole file, streaming.
///
/// Any failure is reported as [`IngestionError::TotalCountFailed`]; a partial count is discarded.
pub fn count_rows(path: &Path, sniff: &SniffResult, chunk_rows: usize) -> IngestionResult<u64> {
    count_rows_inner(path, sniff, chunk_rows.max(1)).map_err(|e| IngestionError::TotalCountFailed {
        message: e.to_string(),
    })
}

fn count_rows_inner(path: &Path, sniff: &SniffResult, chunk_rows: usize) -> IngestionResult<u64> {
    let file = File::open(path).map_err(|e| IngestionError::from_io_at(e, path))?;
    let mut rdr = reader_builder(sniff.delimiter).from_reader(file);
    let width = rdr.byte_headers()?.len();

    let mut records = DataRecords::new(&mut rdr, width);
    let mut record = ByteRecord::new();
    let mut total: u64 = 0;
    let mut in_chunk: usize = 0;
    let mut chunks: u64 = 0;
    while records.next_into(&mut record)? {
        in_chunk += 1;
        if in_chunk == chunk_rows {
            total += in_chunk as u64;
            in_chunk = 0;
            chunks += 1;
            tracing::debug!(path = %path.display(), chunks, rows = total, "counted chunk");
        }
    }
    Ok(total + in_chunk as u64)
}

/// Data records of a headed reader, minus malformed ones.
///
/// A record is malformed when it has more fields than the header, or when an unbalanced quote
/// swallowed the lines after it: the record spans lines and is either shorter than the header or
/// runs to end of input with an odd number of quotes. In the second case reading resumes on the
/// line after the one the record started on, so only that line is lost.
struct DataRecords<'r, R> {
    rdr: &'r mut csv::Reader<R>,
    width: usize,
    lookahead: Option<ByteRecord>,
    skipped: usize,
}

impl<'r, R: Read + Seek> DataRecords<'r, R> {
    fn new(rdr: &'r mut csv::Reader<R>, width: usize) -> Self {
        Self {
            rdr,
            width,
            lookahead: None,
            skipped: 0,
        }
    }

    fn next_into(&mut self, record: &mut ByteRecord) -> csv::Result<bool> {
        loop {
            match self.lookahead.take() {
                Some(next) => *record = next,
                None => {
                    if !self.rdr.read_byte_record(record)? {
                        return Ok(false);
                    }
                }
            }
            if record.len() > self.width {
                self.skipped += 1;
                continue;
            }
            if !spans_lines(record) {
                return Ok(true);
            }
            if record.len() < self.width || self.quote_runs_to_end(record)? {
                self.skipped += 1;
                self.resume_after_first_line(record)?;
                continue;
            }
            return Ok(true);
        }
    }

    /// True when `record` is the last one and the input from its start holds an odd number of
    /// quotes. Otherwise the following record is kept as lookahead.
    fn quote_runs_to_end(&mut self, record: &ByteRecord) -> csv::Result<bool> {
        let mut next = ByteRecord::new();
        if self.rdr.read_byte_record(&mut next)? {
            self.lookahead = Some(next);
            return Ok(false);
        }
        let Some(start) = record.position().map(|p| p.byte()) else {
            return Ok(false);
        };
        let inner = self.rdr.get_mut();
        inner.seek(SeekFrom::Start(start))?;
        let mut quotes: u64 = 0;
        let mut buf = [0u8; 8 * 1024];
        loop {
            let n = match inner.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            quotes += buf[..n].iter().filter(|&&b| b == b'"').count() as u64;
        }
        Ok(quotes % 2 == 1)
    }

    fn resume_after_first_line(&mut self, record: &ByteRecord) -> csv::Result<()> {
        let Some(pos) = record.position().cloned() else {
            return Ok(());
        };
        let inner = self.rdr.get_mut();
        inner.seek(SeekFrom::Start(pos.byte()))?;
        let mut line = Vec::new();
        let consumed = io::BufReader::new(inner).read_until(b'\n', &mut line)?;

        tracing::debug!(line = pos.line(), "skipping record with an unbalanced quote");
        let mut resume = csv::Position::new();
        resume
            .set_byte(pos.byte() + consumed as u64)
            .set_line(pos.line() + 1)
            .set_record(pos.record() + 1);
        self.lookahead = None;
        self.rdr.seek(resume)
    }
}

fn spans_lines(record: &ByteRecord) -> bool {
    record.iter().any(|f| f.contains(&b'\n') || f.contains(&b'\r'))
}

/// CSV reader configuration shared by sampling and counting.
pub fn reader_builder(delimiter: Delimiter) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter.as_byte());
    builder
}

fn load_failed(err: csv::Error) -> IngestionError {
    IngestionError::LoadFailed {
        message: err.to_string(),
    }
}

fn decode_field<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_start_matches('\u{feff}')),
        Cow::Owned(s) => Cow::Owned(s.trim_start_matches('\u{feff}').to_owned()),
    }
}

fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    raw.iter()
        .enumerate()
        .map(|(idx, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                name.clone()
            };
            let mut candidate = base.clone();
            let mut suffix = 1;
            while seen.contains(&candidate) {
                candidate = format!("{base}.{suffix}");
                suffix += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn is_null_cell(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || NA_TOKENS.contains(&raw)
}

/// Narrowest type every non-null cell parses as (ignoring surrounding whitespace): `Int64`, then
/// `Float64`, then `Bool`, else `Utf8`. Columns with no non-null cells are `Utf8`.
pub fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> DataType {
    let mut non_null = cells.filter(|c| !is_null_cell(c)).peekable();
    if non_null.peek().is_none() {
        return DataType::Utf8;
    }
    [DataType::Int64, DataType::Float64, DataType::Bool]
        .into_iter()
        .find(|ty| non_null.clone().all(|c| ty.parse(c.trim()).is_some()))
        .unwrap_or(DataType::Utf8)
}

fn typed_value(raw: &str, data_type: DataType) -> Value {
    if is_null_cell(raw) {
        return Value::Null;
    }
    match data_type {
        DataType::Utf8 => Value::Utf8(raw.to_owned()),
        ty => ty
            .parse(raw.trim())
            .unwrap_or_else(|| Value::Utf8(raw.to_owned())),
    }
}
