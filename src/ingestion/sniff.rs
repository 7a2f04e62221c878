//! Encoding and delimiter detection for delimited-text uploads.
//!
//! Sniffing reads two bounded prefixes of the file and never the whole file:
//!
//! - the first [`SniffOptions::encoding_probe_bytes`] bytes go through a statistical encoding
//!   detector (`chardetng`); an empty prefix defaults to UTF-8.
//! - the first [`SniffOptions::delimiter_probe_bytes`] bytes are decoded with that encoding
//!   (UTF-8 on decode errors) and scored against [`Delimiter::CANDIDATES`]; an undecidable sample
//!   defaults to comma.
//!
//! A `.tsv` extension forces tab regardless of content.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::{
    BIG5, Encoding, GB18030, GBK, ISO_2022_JP, SHIFT_JIS, UTF_8, UTF_16BE, UTF_16LE,
};
use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// Extensions accepted for upload (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

/// Logical file category. Delimited text is currently the only member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FileType {
    DelimitedText,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DelimitedText => "csv",
        }
    }
}

impl TryFrom<String> for FileType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "csv" => Ok(Self::DelimitedText),
            other => Err(format!("unsupported file type: {other}")),
        }
    }
}

impl From<FileType> for String {
    fn from(t: FileType) -> Self {
        t.as_str().to_owned()
    }
}

/// Normalized (lowercase) upload extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceExtension {
    Csv,
    Tsv,
    Txt,
}

impl SourceExtension {
    /// Parse an extension (case-insensitive, leading `.` allowed).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    /// Like [`Self::from_extension`], but unsupported extensions are a typed error.
    pub fn parse(ext: &str) -> IngestionResult<Self> {
        Self::from_extension(ext)
            .ok_or_else(|| IngestionError::unsupported(ext.trim_start_matches('.').to_ascii_lowercase()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Txt => "txt",
        }
    }

    /// Every supported extension is delimited text.
    pub fn file_type(self) -> FileType {
        FileType::DelimitedText
    }

    /// Delimiter forced by the extension convention, if any.
    pub fn implied_delimiter(self) -> Option<Delimiter> {
        match self {
            Self::Tsv => Some(Delimiter::TAB),
            Self::Csv | Self::Txt => None,
        }
    }
}

impl fmt::Display for SourceExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-byte ASCII field separator, persisted as a one-character string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Delimiter(u8);

impl Delimiter {
    pub const COMMA: Self = Self(b',');
    pub const TAB: Self = Self(b'\t');
    pub const SEMICOLON: Self = Self(b';');
    pub const PIPE: Self = Self(b'|');
    pub const CARET: Self = Self(b'^');

    /// Candidates in tie-break preference order.
    pub const CANDIDATES: [Self; 5] = [
        Self::COMMA,
        Self::TAB,
        Self::SEMICOLON,
        Self::PIPE,
        Self::CARET,
    ];

    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }
}

impl TryFrom<String> for Delimiter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_bytes() {
            [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(Self(*b)),
            _ => Err(format!("unsupported delimiter {value:?}: expected one ASCII character")),
        }
    }
}

impl From<Delimiter> for String {
    fn from(d: Delimiter) -> Self {
        d.as_char().to_string()
    }
}

/// Where a detected value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    /// The heuristic decided.
    Detected,
    /// The heuristic could not decide; the fallback was applied.
    Defaulted,
    /// The declared extension forced the value.
    ExtensionOverride,
}

/// A best guess plus how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guess<T> {
    pub value: T,
    pub detection: Detection,
}

impl<T> Guess<T> {
    fn detected(value: T) -> Self {
        Self {
            value,
            detection: Detection::Detected,
        }
    }

    fn defaulted(value: T) -> Self {
        Self {
            value,
            detection: Detection::Defaulted,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        self.detection == Detection::Defaulted
    }
}

/// Structural hints for one raw file. Field names are the persisted layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SniffResult {
    pub filetype: FileType,
    /// Lowercased encoding_rs canonical name.
    pub encoding: String,
    pub delimiter: Delimiter,
    pub ext: SourceExtension,
}

impl SniffResult {
    /// Resolve [`Self::encoding`] back to an encoding, falling back to UTF-8 for unknown labels.
    pub fn resolved_encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.encoding.as_bytes()).unwrap_or(UTF_8)
    }

    /// See [`delimiter_splits_cleanly`].
    pub fn delimiter_splits_cleanly(&self) -> bool {
        delimiter_splits_cleanly(self.resolved_encoding(), self.delimiter)
    }
}

/// Whether splitting raw bytes on `delimiter` is safe for text in `encoding`.
///
/// Records are split before decoding, so the delimiter byte must never occur inside a
/// multi-byte character. That holds for UTF-8, single-byte and EUC encodings. Shift_JIS, Big5
/// and the GBK family reuse `0x40..=0x7E` as trail bytes, which covers `|` and `^`. ISO-2022-JP
/// and UTF-16 encode characters with ASCII-range bytes throughout.
pub fn delimiter_splits_cleanly(encoding: &'static Encoding, delimiter: Delimiter) -> bool {
    let byte = delimiter.as_byte();
    if encoding == UTF_16LE || encoding == UTF_16BE {
        false
    } else if encoding == ISO_2022_JP {
        !(0x21..=0x7E).contains(&byte)
    } else if encoding == SHIFT_JIS || encoding == BIG5 || encoding == GBK || encoding == GB18030 {
        !(0x40..=0x7E).contains(&byte)
    } else {
        true
    }
}

/// [`SniffResult`] plus how each hint was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffReport {
    pub result: SniffResult,
    pub encoding: Detection,
    pub delimiter: Detection,
}

/// Prefix sizes used while sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffOptions {
    pub encoding_probe_bytes: usize,
    pub delimiter_probe_bytes: usize,
}

impl Default for SniffOptions {
    fn default() -> Self {
        Self {
            encoding_probe_bytes: 200_000,
            delimiter_probe_bytes: 50_000,
        }
    }
}

/// Sniff `path` with default probe sizes.
pub fn sniff(path: impl AsRef<Path>, declared_extension: &str) -> IngestionResult<SniffResult> {
    sniff_with(path, declared_extension, &SniffOptions::default()).map(|r| r.result)
}

/// Sniff `path`, reporting whether each hint was detected, defaulted or overridden.
///
/// Fails with [`IngestionError::UnsupportedFormat`] before touching the file when
/// `declared_extension` is not supported.
pub fn sniff_with(
    path: impl AsRef<Path>,
    declared_extension: &str,
    options: &SniffOptions,
) -> IngestionResult<SniffReport> {
    let path = path.as_ref();
    let ext = SourceExtension::parse(declared_extension)?;

    let enc_prefix = read_prefix(path, options.encoding_probe_bytes)?;
    let at_eof = enc_prefix.len() < options.encoding_probe_bytes;
    let encoding = detect_encoding(&enc_prefix, at_eof);

    let delim_bytes: Cow<'_, [u8]> = if options.delimiter_probe_bytes <= enc_prefix.len() || at_eof {
        Cow::Borrowed(&enc_prefix[..options.delimiter_probe_bytes.min(enc_prefix.len())])
    } else {
        Cow::Owned(read_prefix(path, options.delimiter_probe_bytes)?)
    };
    let ends_at_eof = at_eof && delim_bytes.len() == enc_prefix.len();
    let truncated = delim_bytes.len() >= options.delimiter_probe_bytes && !ends_at_eof;
    let text = decode_prefix(&delim_bytes, encoding.value);
    let sniffed = detect_delimiter(&text, truncated);

    let delimiter = match ext.implied_delimiter() {
        Some(forced) => Guess {
            value: forced,
            detection: Detection::ExtensionOverride,
        },
        None => sniffed,
    };

    tracing::debug!(
        path = %path.display(),
        encoding = encoding.value.name(),
        encoding_detection = ?encoding.detection,
        delimiter = ?delimiter.value.as_char(),
        delimiter_detection = ?delimiter.detection,
        "sniffed file"
    );

    Ok(SniffReport {
        result: SniffResult {
            filetype: ext.file_type(),
            encoding: encoding.value.name().to_ascii_lowercase(),
            delimiter: delimiter.value,
            ext,
        },
        encoding: encoding.detection,
        delimiter: delimiter.detection,
    })
}

fn read_prefix(path: &Path, limit: usize) -> IngestionResult<Vec<u8>> {
    let file = File::open(path).map_err(|e| IngestionError::from_io_at(e, path))?;
    let mut buf = Vec::with_capacity(limit.min(1 << 20));
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Guess the character encoding of a byte prefix.
///
/// `at_eof` tells the detector the prefix is the whole file, so a trailing partial sequence counts
/// against an encoding rather than being treated as cut off.
pub fn detect_encoding(prefix: &[u8], at_eof: bool) -> Guess<&'static Encoding> {
    if prefix.is_empty() {
        return Guess::defaulted(UTF_8);
    }
    if let Some((enc, _)) = Encoding::for_bom(prefix) {
        if enc == UTF_8 {
            return Guess::detected(UTF_8);
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    let non_ascii = detector.feed(prefix, at_eof);
    if !non_ascii {
        // Pure ASCII decodes identically under every ASCII-compatible encoding.
        return Guess::detected(UTF_8);
    }
    Guess::detected(detector.guess(None, true))
}

fn decode_prefix(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors && encoding != UTF_8 {
        return UTF_8.decode_without_bom_handling(bytes).0.into_owned();
    }
    text.into_owned()
}

/// Minimum fraction of sampled records whose candidate count must equal the modal count.
const MIN_CONSISTENCY: f64 = 0.9;
/// Records considered by the delimiter heuristic.
const MAX_SNIFF_RECORDS: usize = 1_000;

/// Pick the candidate delimiter that splits sampled records most consistently.
///
/// For each candidate, occurrences outside double quotes are counted per record; the modal count
/// must be non-zero and shared by at least 90% of records. Among passing candidates the highest
/// consistency wins, then the larger modal count, then [`Delimiter::CANDIDATES`] order. When
/// `truncated` is set the final record is dropped since it may be cut mid-line.
pub fn detect_delimiter(text: &str, truncated: bool) -> Guess<Delimiter> {
    let mut records = split_records(text);
    if truncated && records.len() > 1 {
        records.pop();
    }
    records.retain(|r| !r.trim().is_empty());
    records.truncate(MAX_SNIFF_RECORDS);
    if records.is_empty() {
        return Guess::defaulted(Delimiter::COMMA);
    }

    let mut best: Option<(f64, usize, Delimiter)> = None;
    for candidate in Delimiter::CANDIDATES {
        let counts: Vec<usize> = records
            .iter()
            .map(|r| count_unquoted(r, candidate.as_byte()))
            .collect();
        let (mode, hits) = modal_count(&counts);
        if mode == 0 {
            continue;
        }
        let consistency = hits as f64 / counts.len() as f64;
        if consistency < MIN_CONSISTENCY {
            continue;
        }
        let better = match best {
            None => true,
            Some((c, m, _)) => consistency > c || (consistency == c && mode > m),
        };
        if better {
            best = Some((consistency, mode, candidate));
        }
    }

    match best {
        Some((_, _, d)) => Guess::detected(d),
        None => Guess::defaulted(Delimiter::COMMA),
    }
}

/// Split text into logical records, keeping quoted newlines inside their record.
fn split_records(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => {
                let end = if i > start && bytes[i - 1] == b'\r' { i - 1 } else { i };
                out.push(&text[start..end]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn count_unquoted(record: &str, delim: u8) -> usize {
    let mut in_quotes = false;
    let mut n = 0;
    for &b in record.as_bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delim && !in_quotes {
            n += 1;
        }
    }
    n
}

/// Most frequent value and its frequency; ties go to the larger value.
fn modal_count(counts: &[usize]) -> (usize, usize) {
    let mut freq: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();
    for &c in counts {
        *freq.entry(c).or_default() += 1;
    }
    freq.into_iter()
        .max_by_key(|&(value, hits)| (hits, value))
        .unwrap_or((0, 0))
}
