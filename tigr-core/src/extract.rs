//! Contains the Record Extractor: recovers the detector's CSV dataset from a
//! raw block.
//!
//! The detector writes its readings as plain ASCII lines straight into the
//! first sectors of the card. What comes back from a raw read is that text
//! mixed with zero padding, leftovers from earlier runs and half-written
//! sectors. Extraction is a single linear pass:
//!
//! 1.  Decode the bytes as ASCII, dropping anything outside it, and remove
//!     every null byte wherever it sits.
//! 2.  Find the first `Muon#,Band` anchor. Without one there is no dataset.
//! 3.  Discard everything before the anchor.
//! 4.  Keep header lines (containing `Muon#`) and data lines (five or more
//!     comma-separated fields), in their original order. Everything else is
//!     dropped silently.
use crate::error::ExtractError;
use crate::read::RawBlock;
use std::fmt;

/// Marks the start of the dataset in the decoded text.
pub const ANCHOR: &str = "Muon#,Band";

/// Any line containing this token is a header record.
pub const HEADER_TOKEN: &str = "Muon#";

/// Minimum number of comma-separated fields in a data record.
pub const MIN_FIELDS: usize = 5;

/// A raw block decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    text: String,
    /// Offsets into `text` at which a non-ASCII byte was dropped, ascending.
    dropped_at: Vec<usize>,
    nulls_removed: usize,
}

impl DecodedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn nulls_removed(&self) -> usize {
        self.nulls_removed
    }

    pub fn non_ascii_dropped(&self) -> usize {
        self.dropped_at.len()
    }

    /// Number of dropped bytes whose position falls in `lo..=hi`.
    fn dropped_between(&self, lo: usize, hi: usize) -> usize {
        let first = self.dropped_at.partition_point(|&p| p < lo);
        let last = self.dropped_at.partition_point(|&p| p <= hi);
        last.saturating_sub(first)
    }
}

/// Decodes `bytes` as permissive ASCII.
///
/// Bytes above `0x7F` are dropped rather than substituted, and every `0x00`
/// is removed. Partially written sectors scatter nulls through the middle of
/// lines, so stripping only the edges is not enough. Control bytes
/// `0x01..=0x1F` and `0x7F` are ASCII and are kept as they are.
pub fn decode(bytes: &[u8]) -> DecodedText {
    let mut text = String::with_capacity(bytes.len());
    let mut dropped_at = Vec::new();
    let mut nulls_removed = 0;

    for &b in bytes {
        match b {
            0x00 => nulls_removed += 1,
            0x01..=0x7F => text.push(char::from(b)),
            _ => dropped_at.push(text.len()),
        }
    }

    DecodedText {
        text,
        dropped_at,
        nulls_removed,
    }
}

/// The two kinds of line that make up a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Header,
    Data,
}

/// Classifies one line, or returns `None` if it is not a record.
pub fn classify(line: &str) -> Option<RecordKind> {
    if line.contains(HEADER_TOKEN) {
        Some(RecordKind::Header)
    } else if line.split(',').count() >= MIN_FIELDS {
        Some(RecordKind::Data)
    } else {
        None
    }
}

/// One retained line of the dataset, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind: RecordKind,
    line: String,
    line_number: usize,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn is_header(&self) -> bool {
        self.kind == RecordKind::Header
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// 1-based line number counted from the anchor line.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.line.split(',')
    }
}

/// Counters describing what the extractor threw away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Offset of the anchor in the decoded text.
    pub anchor_offset: usize,
    pub nulls_removed: usize,
    pub non_ascii_dropped: usize,
    /// Lines after the anchor that were not records, blank lines included.
    pub lines_dropped: usize,
    /// Retained records that lost at least one non-ASCII byte while decoding.
    pub altered_records: usize,
}

/// Knobs for [`extract_with`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Fail instead of keeping a record that lost non-ASCII bytes.
    pub strict: bool,
}

/// The recovered dataset: records in the order they appear on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<Record>,
    stats: ExtractStats,
}

impl Dataset {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The first header record, if one survived filtering.
    pub fn header(&self) -> Option<&Record> {
        self.records.iter().find(|r| r.is_header())
    }

    pub fn has_header(&self) -> bool {
        self.header().is_some()
    }

    pub fn data(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| !r.is_header())
    }

    /// Number of readings, i.e. data records.
    ///
    /// With the usual single header line this is `len() - 1`. It does not go
    /// negative or drift when the header is missing.
    pub fn reading_count(&self) -> usize {
        self.data().count()
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    /// The dataset as CSV text: retained lines joined with `\n`, with no
    /// trailing newline.
    pub fn to_csv(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&record.line)?;
        }
        Ok(())
    }
}

/// Extracts the dataset from `raw` with default options.
///
/// # Errors
///
/// Returns [`ExtractError::NoDataFound`] when the block holds no anchor.
pub fn extract(raw: &RawBlock) -> Result<Dataset, ExtractError> {
    extract_with(raw, &ExtractOptions::default())
}

/// Extracts the dataset from `raw`.
///
/// # Errors
///
/// - [`ExtractError::NoDataFound`] when the block holds no anchor.
/// - [`ExtractError::AlteredRecord`] in strict mode, when a retained record
///   had non-ASCII bytes removed from it.
pub fn extract_with(raw: &RawBlock, options: &ExtractOptions) -> Result<Dataset, ExtractError> {
    let decoded = decode(raw.as_bytes());
    let text = decoded.as_str();

    let anchor_offset = text.find(ANCHOR).ok_or(ExtractError::NoDataFound)?;

    let mut stats = ExtractStats {
        anchor_offset,
        nulls_removed: decoded.nulls_removed(),
        non_ascii_dropped: decoded.non_ascii_dropped(),
        ..ExtractStats::default()
    };

    let region = &text[anchor_offset..];
    let mut records = Vec::new();
    let mut start = anchor_offset;
    let mut lines = region.split('\n').enumerate().peekable();

    while let Some((index, line)) = lines.next() {
        let end = start + line.len();
        let line_number = index + 1;
        let terminated = lines.peek().is_some();

        match classify(line) {
            Some(kind) => {
                // A dropped byte belongs to this line if it sat between the
                // line's first and last character, or next to its own
                // newline. The anchor line does not own the gap before it.
                let lo = if index == 0 { start + 1 } else { start };
                let hi = if terminated { end } else { end.saturating_sub(1) };
                if lo <= hi && decoded.dropped_between(lo, hi) > 0 {
                    if options.strict {
                        return Err(ExtractError::AlteredRecord { line: line_number });
                    }
                    stats.altered_records += 1;
                }

                records.push(Record {
                    kind,
                    line: line.to_string(),
                    line_number,
                });
            }
            None => {
                stats.lines_dropped += 1;
                if !line.trim().is_empty() {
                    log::debug!("dropping line {line_number}: {:?}", preview(line));
                }
            }
        }

        start = end + 1;
    }

    if stats.altered_records > 0 {
        log::warn!(
            "{} record(s) lost non-ASCII bytes while decoding",
            stats.altered_records
        );
    }
    log::debug!("extraction stats: {stats:?}");

    Ok(Dataset { records, stats })
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(60) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}
