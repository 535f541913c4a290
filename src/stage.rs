//!
//! Result materializer
//! --------------------
//! Streams one tabular response into a local staging file before any row is
//! exposed. The payload arrives as a single JSON document,
//! `{"status":"OK","row_count":N,"columns":[...],"rows":[[...],...]}`,
//! optionally gzip-compressed (decided by the session flag, not by headers).
//! An incremental scanner splits the `rows` array into one JSON line per row
//! as bytes arrive, so the full response is never held in memory: the staged
//! file plus a `u64` offset per row is the entire footprint.
//!
//! The staging file is a `NamedTempFile` owned by the `StagedResult`; closing
//! or dropping the owner deletes it on every exit path.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::write::GzDecoder;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{self, ClientError, ClientResult};

/// Upper bound on the non-row portion of a payload (status, row_count,
/// column names). Anything bigger is a malformed response.
const MAX_HEADER_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Before the `rows` array: bytes accumulate into the header buffer.
    Header,
    /// Inside the `rows` array, between row elements.
    BetweenRows,
    /// Inside one row element: bytes accumulate into the row buffer.
    InRow,
    /// After the `rows` array closed: remaining bytes are ignored.
    Trailer,
}

/// Byte-at-a-time splitter. Tracks JSON string/escape state and bracket depth
/// so that commas and brackets inside cell strings never confuse it.
struct RowSplitter {
    tmp: NamedTempFile,
    header: Vec<u8>,
    offsets: Vec<u64>,
    written: u64,
    row_buf: Vec<u8>,
    mode: Mode,
    depth: u32,
    in_string: bool,
    escape: bool,
    capture_key: bool,
    str_buf: Vec<u8>,
    last_key: Vec<u8>,
    last_sig: u8,
    saw_rows: bool,
    overflow: bool,
}

impl RowSplitter {
    fn new() -> io::Result<Self> {
        Ok(Self {
            tmp: NamedTempFile::new()?,
            header: Vec::new(),
            offsets: Vec::new(),
            written: 0,
            row_buf: Vec::new(),
            mode: Mode::Header,
            depth: 0,
            in_string: false,
            escape: false,
            capture_key: false,
            str_buf: Vec::new(),
            last_key: Vec::new(),
            last_sig: 0,
            saw_rows: false,
            overflow: false,
        })
    }

    fn push_header(&mut self, b: u8) {
        if self.header.len() >= MAX_HEADER_BYTES {
            self.overflow = true;
        } else {
            self.header.push(b);
        }
    }

    fn append(&mut self, b: u8) {
        match self.mode {
            Mode::Header => self.push_header(b),
            Mode::InRow => self.row_buf.push(b),
            Mode::BetweenRows | Mode::Trailer => {}
        }
    }

    fn flush_row(&mut self) -> io::Result<()> {
        self.tmp.write_all(&self.row_buf)?;
        self.tmp.write_all(b"\n")?;
        self.offsets.push(self.written);
        self.written += self.row_buf.len() as u64 + 1;
        Ok(())
    }

    fn step(&mut self, b: u8) -> io::Result<()> {
        if self.in_string {
            self.append(b);
            if self.escape {
                self.escape = false;
            } else if b == b'\\' {
                self.escape = true;
            } else if b == b'"' {
                self.in_string = false;
                if self.capture_key {
                    self.last_key = std::mem::take(&mut self.str_buf);
                    self.capture_key = false;
                }
            } else if self.capture_key {
                self.str_buf.push(b);
            }
            return Ok(());
        }
        match b {
            b'"' => {
                self.in_string = true;
                // Only strings in key position of the top-level object matter.
                self.capture_key = self.mode == Mode::Header
                    && self.depth == 1
                    && (self.last_sig == b'{' || self.last_sig == b',');
                if self.capture_key {
                    self.str_buf.clear();
                }
                self.append(b);
            }
            b'{' => {
                self.depth += 1;
                self.append(b);
            }
            b'[' => {
                self.depth += 1;
                if self.mode == Mode::Header && self.depth == 2 && self.last_key == b"rows" {
                    // The rows payload begins here; the header keeps
                    // everything up to the colon and gets a synthetic empty
                    // array at parse time.
                    self.mode = Mode::BetweenRows;
                    self.saw_rows = true;
                } else if self.mode == Mode::BetweenRows && self.depth == 3 {
                    self.mode = Mode::InRow;
                    self.row_buf.clear();
                    self.row_buf.push(b);
                } else {
                    self.append(b);
                }
            }
            b'}' => {
                self.depth = self.depth.saturating_sub(1);
                self.append(b);
            }
            b']' => {
                self.depth = self.depth.saturating_sub(1);
                match self.mode {
                    Mode::InRow if self.depth == 2 => {
                        self.row_buf.push(b);
                        self.flush_row()?;
                        self.mode = Mode::BetweenRows;
                    }
                    Mode::InRow => self.row_buf.push(b),
                    Mode::BetweenRows if self.depth == 1 => self.mode = Mode::Trailer,
                    _ => self.append(b),
                }
            }
            _ => self.append(b),
        }
        if !b.is_ascii_whitespace() {
            self.last_sig = b;
        }
        Ok(())
    }

    fn finish(mut self) -> ClientResult<StagedResult> {
        if self.overflow {
            return Err(ClientError::protocol("tabular payload header too large"));
        }
        let header_text = if self.saw_rows {
            let mut h = std::mem::take(&mut self.header);
            h.extend_from_slice(b"[]}");
            h
        } else {
            std::mem::take(&mut self.header)
        };
        let header: serde_json::Value = serde_json::from_slice(&header_text)
            .map_err(|e| ClientError::protocol(format!("malformed tabular payload: {e}")))?;
        if let Some(fault) = error::fault_in_value(&header) {
            return Err(fault);
        }
        if header.get("status").and_then(|s| s.as_str()).map(|s| s.eq_ignore_ascii_case("ok"))
            != Some(true)
        {
            return Err(ClientError::protocol("tabular payload missing status"));
        }
        let row_count = header
            .get("row_count")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ClientError::protocol("tabular payload missing row_count"))?;
        let columns: Vec<String> = header
            .get("columns")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|c| c.as_str().map(|s| s.to_string())).collect())
            .ok_or_else(|| ClientError::protocol("tabular payload missing columns"))?;
        if row_count != self.offsets.len() as u64 {
            return Err(ClientError::protocol(format!(
                "row count mismatch: header says {row_count}, payload carried {}",
                self.offsets.len()
            )));
        }
        self.tmp.flush().map_err(ClientError::from)?;
        debug!(rows = row_count, cols = columns.len(), staged = self.written, "result staged");
        Ok(StagedResult { tmp: self.tmp, offsets: self.offsets, end: self.written, columns })
    }
}

impl Write for RowSplitter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.step(b)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

enum Inner {
    Plain(RowSplitter),
    Gzip(GzDecoder<RowSplitter>),
}

/// Push-based sink for one response body. Feed it chunks as they arrive off
/// the wire, then `finish()` to obtain the staged result.
pub struct StageWriter {
    inner: Inner,
}

impl StageWriter {
    pub fn new(gzip: bool) -> ClientResult<Self> {
        let splitter = RowSplitter::new().map_err(ClientError::from)?;
        let inner =
            if gzip { Inner::Gzip(GzDecoder::new(splitter)) } else { Inner::Plain(splitter) };
        Ok(Self { inner })
    }

    pub fn push(&mut self, chunk: &[u8]) -> ClientResult<()> {
        match &mut self.inner {
            Inner::Plain(s) => s.write_all(chunk).map_err(ClientError::from),
            Inner::Gzip(gz) => gz
                .write_all(chunk)
                .map_err(|e| ClientError::protocol(format!("invalid gzip stream: {e}"))),
        }
    }

    pub fn finish(self) -> ClientResult<StagedResult> {
        match self.inner {
            Inner::Plain(s) => s.finish(),
            Inner::Gzip(gz) => gz
                .finish()
                .map_err(|e| ClientError::protocol(format!("invalid gzip stream: {e}")))?
                .finish(),
        }
    }
}

/// Durable local copy of one decompressed tabular response: the staged row
/// file, its offset index and the column name list. Owned exclusively by the
/// cursor created for the execution; dropped, the staging file is deleted.
#[derive(Debug)]
pub struct StagedResult {
    tmp: NamedTempFile,
    offsets: Vec<u64>,
    end: u64,
    columns: Vec<String>,
}

impl StagedResult {
    /// Materialize a complete in-memory payload. Convenience for metadata
    /// calls and tests; the session streams responses chunk-wise through
    /// `StageWriter` directly.
    pub fn from_bytes(payload: &[u8], gzip: bool) -> ClientResult<Self> {
        let mut w = StageWriter::new(gzip)?;
        w.push(payload)?;
        w.finish()
    }

    pub fn row_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 1-based column index for a name: exact match wins, then the first
    /// case-insensitive match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        if let Some(i) = self.columns.iter().position(|c| c == name) {
            return Some(i + 1);
        }
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)).map(|i| i + 1)
    }

    /// Read one staged row (1-based) back as its cell strings.
    pub fn read_row(&mut self, n: usize) -> ClientResult<Vec<String>> {
        if n == 0 || n > self.offsets.len() {
            return Err(ClientError::protocol(format!("row {n} out of range")));
        }
        let start = self.offsets[n - 1];
        let stop = if n < self.offsets.len() { self.offsets[n] } else { self.end };
        // Minus the newline terminator.
        let len = (stop - start - 1) as usize;
        self.tmp.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; len];
        self.tmp.read_exact(&mut buf)?;
        serde_json::from_slice::<Vec<String>>(&buf)
            .map_err(|e| ClientError::protocol(format!("malformed staged row {n}: {e}")))
    }

    /// Filesystem path of the staging buffer (useful for diagnostics and for
    /// asserting deletion in tests).
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn sample_payload() -> Vec<u8> {
        br#"{"status":"OK","row_count":3,"columns":["CUSTOMER_ID","Name","balance"],
            "rows":[["1","Alice","10.5"],["2","NULL","0"],["3","Bob, [jr]","-3"]]}"#
            .to_vec()
    }

    #[test]
    fn splits_rows_and_parses_header() {
        let mut staged = StagedResult::from_bytes(&sample_payload(), false).unwrap();
        assert_eq!(staged.row_count(), 3);
        assert_eq!(staged.columns(), &["CUSTOMER_ID", "Name", "balance"]);
        assert_eq!(staged.read_row(1).unwrap(), vec!["1", "Alice", "10.5"]);
        assert_eq!(staged.read_row(3).unwrap(), vec!["3", "Bob, [jr]", "-3"]);
        assert_eq!(staged.read_row(2).unwrap()[1], "NULL");
    }

    #[test]
    fn byte_at_a_time_chunking_is_equivalent() {
        let payload = sample_payload();
        let mut w = StageWriter::new(false).unwrap();
        for b in payload {
            w.push(&[b]).unwrap();
        }
        let mut staged = w.finish().unwrap();
        assert_eq!(staged.row_count(), 3);
        assert_eq!(staged.read_row(2).unwrap(), vec!["2", "NULL", "0"]);
    }

    #[test]
    fn gzip_payload_is_inflated() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&sample_payload()).unwrap();
        let compressed = enc.finish().unwrap();
        let mut staged = StagedResult::from_bytes(&compressed, true).unwrap();
        assert_eq!(staged.row_count(), 3);
        assert_eq!(staged.read_row(1).unwrap()[1], "Alice");
    }

    #[test]
    fn brackets_and_escapes_inside_cells_do_not_split() {
        let payload = br#"{"status":"OK","row_count":1,"columns":["c"],
            "rows":[["tricky \" ]],[ {cell}"]]}"#;
        let mut staged = StagedResult::from_bytes(payload, false).unwrap();
        assert_eq!(staged.read_row(1).unwrap(), vec!["tricky \" ]],[ {cell}"]);
    }

    #[test]
    fn fail_payload_surfaces_remote_fault() {
        let payload = br#"{"status":"FAIL","error_id":7,"error_message":"no such table"}"#;
        match StagedResult::from_bytes(payload, false) {
            Err(ClientError::Remote { code, message, .. }) => {
                assert_eq!(code, 7);
                assert_eq!(message, "no such table");
            }
            other => panic!("expected remote fault, got {other:?}"),
        }
    }

    #[test]
    fn row_count_mismatch_is_a_protocol_violation() {
        let payload = br#"{"status":"OK","row_count":5,"columns":["c"],"rows":[["x"]]}"#;
        assert!(matches!(
            StagedResult::from_bytes(payload, false),
            Err(ClientError::Protocol { .. })
        ));
    }

    #[test]
    fn garbage_body_is_a_protocol_violation() {
        assert!(matches!(
            StagedResult::from_bytes(b"<html>oops</html>", false),
            Err(ClientError::Protocol { .. })
        ));
    }

    #[test]
    fn empty_result_has_zero_rows() {
        let payload = br#"{"status":"OK","row_count":0,"columns":["a","b"],"rows":[]}"#;
        let mut staged = StagedResult::from_bytes(payload, false).unwrap();
        assert_eq!(staged.row_count(), 0);
        assert!(staged.read_row(1).is_err());
    }

    #[test]
    fn column_lookup_prefers_exact_then_case_insensitive() {
        let payload = br#"{"status":"OK","row_count":0,
            "columns":["Customer_Id","CUSTOMER_ID","other"],"rows":[]}"#;
        let staged = StagedResult::from_bytes(payload, false).unwrap();
        // Exact matches win even when a differently-cased twin exists.
        assert_eq!(staged.column_index("CUSTOMER_ID"), Some(2));
        assert_eq!(staged.column_index("Customer_Id"), Some(1));
        // Fallback takes the first case-insensitive hit.
        assert_eq!(staged.column_index("customer_id"), Some(1));
        assert_eq!(staged.column_index("OTHER"), Some(3));
        assert_eq!(staged.column_index("missing"), None);
    }

    #[test]
    fn staging_file_is_deleted_on_drop() {
        let staged = StagedResult::from_bytes(&sample_payload(), false).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }
}
