//! Newline framing for the incoming log byte stream.
//!
//! The collector receives log records as raw bytes in arbitrarily
//! fragmented chunks. This module accumulates those chunks and splits out
//! complete records: a record is a byte span terminated by a single
//! line-feed byte, with no length prefix or other framing.
//!
//! This is pure logic with no I/O. The frame reader owns a [`FrameBuffer`]
//! per connection and invokes it once per readiness cycle, so extraction
//! must always surface *every* complete record currently buffered, not
//! just the first.

/// The record delimiter.
pub const DELIMITER: u8 = b'\n';

/// One complete log record, delimiter excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    bytes: Vec<u8>,
}

impl Record {
    /// Returns the raw record bytes (without the trailing delimiter).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the record as text, replacing invalid UTF-8 sequences.
    ///
    /// Log records are expected to be UTF-8 (or ASCII) text, but the wire
    /// carries arbitrary bytes, so this never fails.
    #[must_use]
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Consumes the record, returning the owned bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Record length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-length record (bare delimiter on the wire).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Per-connection pending buffer with record extraction.
///
/// Bytes are appended with [`push`] as they arrive; [`take_records`]
/// removes and returns every complete record, retaining the trailing
/// incomplete segment (possibly empty) as the new pending buffer.
///
/// [`push`]: FrameBuffer::push
/// [`take_records`]: FrameBuffer::take_records
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an empty frame buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of raw bytes to the pending buffer.
    ///
    /// Appending an empty chunk is a no-op.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Extracts all complete records from the pending buffer.
    ///
    /// Records are returned in arrival order, each with its delimiter
    /// stripped. The trailing segment after the last delimiter stays
    /// buffered. Calling this on an empty buffer returns no records and
    /// leaves the buffer empty (idempotent).
    pub fn take_records(&mut self) -> Vec<Record> {
        let Some(last_delim) = self.pending.iter().rposition(|&b| b == DELIMITER) else {
            return Vec::new();
        };

        // Split off the incomplete tail first, then split the complete
        // region on delimiters. `last_delim + 1` is the length of the
        // complete region including its final delimiter.
        let remainder = self.pending.split_off(last_delim + 1);
        let complete = std::mem::replace(&mut self.pending, remainder);

        // `complete` always ends with a delimiter, so `split` yields one
        // trailing empty span that is not a record. Interior empty spans
        // are genuine (blank-line) records and are kept.
        let mut spans: Vec<&[u8]> = complete.split(|&b| b == DELIMITER).collect();
        spans.pop();
        spans
            .into_iter()
            .map(|span| Record::from(span.to_vec()))
            .collect()
    }

    /// Number of pending (unframed) bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no bytes are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
