//!
//! Row cursor
//! -----------
//! Random/forward navigable view over one staged result. Position runs
//! `0..=N` where 0 is before-first; every navigation call is purely local
//! (a seek into the staging file at most). Value access is by 1-based column
//! index or by name, decoding the string wire value for the requested target
//! type; the `was_null` flag is reset on every access and set only when that
//! access hit the NULL sentinel.

use chrono::{DateTime, Utc};

use crate::error::{ClientError, ClientResult};
use crate::stage::StagedResult;
use crate::wire;

pub struct RowCursor {
    // None once closed; the staging file is deleted when this drops.
    staged: Option<StagedResult>,
    /// Current position, `0..=row_count`. 0 is before-first.
    pos: usize,
    /// Cells of the current row; None at position 0.
    row: Option<Vec<String>>,
    /// Set once `next()` has returned false at the end; cleared by any
    /// successful navigation. Value access while exhausted is an error even
    /// though the position itself never moves past the last row.
    exhausted: bool,
    was_null: bool,
}

impl RowCursor {
    pub fn new(staged: StagedResult) -> Self {
        Self { staged: Some(staged), pos: 0, row: None, exhausted: false, was_null: false }
    }

    fn staged_mut(&mut self) -> ClientResult<&mut StagedResult> {
        self.staged.as_mut().ok_or(ClientError::CursorClosed)
    }

    pub fn row_count(&self) -> ClientResult<usize> {
        self.staged.as_ref().map(|s| s.row_count()).ok_or(ClientError::CursorClosed)
    }

    pub fn columns(&self) -> ClientResult<&[String]> {
        self.staged.as_ref().map(|s| s.columns()).ok_or(ClientError::CursorClosed)
    }

    /// 1-based index for a column name; exact match first, then the first
    /// case-insensitive match.
    pub fn column_index(&self, name: &str) -> ClientResult<usize> {
        let staged = self.staged.as_ref().ok_or(ClientError::CursorClosed)?;
        staged
            .column_index(name)
            .ok_or_else(|| ClientError::ColumnNotFound { name: name.to_string() })
    }

    /// Current position; 0 means before-first.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn load(&mut self, pos: usize) -> ClientResult<()> {
        if pos == 0 {
            self.row = None;
        } else {
            self.row = Some(self.staged_mut()?.read_row(pos)?);
        }
        self.pos = pos;
        self.exhausted = false;
        Ok(())
    }

    /// Advance one row. Returns false (and stays put) once past the last row.
    pub fn next(&mut self) -> ClientResult<bool> {
        let n = self.row_count()?;
        if self.pos >= n {
            self.exhausted = true;
            return Ok(false);
        }
        self.load(self.pos + 1)?;
        Ok(true)
    }

    /// Step back one row. Returns false when already on the first row (or
    /// before it).
    pub fn previous(&mut self) -> ClientResult<bool> {
        self.row_count()?;
        if self.pos <= 1 {
            return Ok(false);
        }
        self.load(self.pos - 1)?;
        Ok(true)
    }

    /// Jump to a position, `0..=row_count`. Out-of-range returns false and
    /// leaves the position unchanged.
    pub fn absolute(&mut self, pos: usize) -> ClientResult<bool> {
        let n = self.row_count()?;
        if pos > n {
            return Ok(false);
        }
        self.load(pos)?;
        Ok(true)
    }

    pub fn first(&mut self) -> ClientResult<bool> {
        match self.row_count()? {
            0 => Ok(false),
            _ => self.absolute(1),
        }
    }

    pub fn last(&mut self) -> ClientResult<bool> {
        match self.row_count()? {
            0 => Ok(false),
            n => self.absolute(n),
        }
    }

    /// Raw wire value of a cell on the current row (1-based column index).
    /// Resets and re-derives `was_null`.
    fn cell(&mut self, col: usize) -> ClientResult<(bool, &str)> {
        if self.staged.is_none() {
            return Err(ClientError::CursorClosed);
        }
        self.was_null = false;
        if self.exhausted || self.row.is_none() {
            return Err(ClientError::NoCurrentRow);
        }
        let is_null = {
            let row = self.row.as_ref().unwrap();
            let cell = row.get(col.wrapping_sub(1)).ok_or_else(|| {
                ClientError::protocol(format!("column index {col} out of range"))
            })?;
            wire::is_null_literal(cell)
        };
        self.was_null = is_null;
        Ok((is_null, self.row.as_ref().unwrap()[col - 1].as_str()))
    }

    /// Whether the most recent value access read SQL NULL.
    pub fn was_null(&self) -> bool {
        self.was_null
    }

    pub fn get_str(&mut self, col: usize) -> ClientResult<Option<String>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            Ok(None)
        } else {
            Ok(Some(cell.to_string()))
        }
    }

    pub fn get_i32(&mut self, col: usize) -> ClientResult<Option<i32>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            return Ok(None);
        }
        wire::decode_i32(cell).map(Some)
    }

    pub fn get_i64(&mut self, col: usize) -> ClientResult<Option<i64>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            return Ok(None);
        }
        wire::decode_i64(cell).map(Some)
    }

    pub fn get_f64(&mut self, col: usize) -> ClientResult<Option<f64>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            return Ok(None);
        }
        wire::decode_f64(cell).map(Some)
    }

    pub fn get_bool(&mut self, col: usize) -> ClientResult<Option<bool>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            return Ok(None);
        }
        wire::decode_bool(cell).map(Some)
    }

    pub fn get_timestamp(&mut self, col: usize) -> ClientResult<Option<DateTime<Utc>>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            return Ok(None);
        }
        wire::decode_epoch_millis(cell).map(Some)
    }

    /// DECIMAL cells validated and handed back verbatim.
    pub fn get_decimal_str(&mut self, col: usize) -> ClientResult<Option<String>> {
        let (was_null, cell) = self.cell(col)?;
        if was_null {
            return Ok(None);
        }
        wire::decode_decimal(cell).map(Some)
    }

    /// Object identifier of a BLOB/CLOB cell, for the transfer engine. Valid
    /// only while this cursor's session is alive.
    pub fn get_blob_id(&mut self, col: usize) -> ClientResult<Option<String>> {
        self.get_str(col)
    }

    pub fn is_closed(&self) -> bool {
        self.staged.is_none()
    }

    /// Release the staging buffer. Every later navigation or access call
    /// fails with a cursor-closed error.
    pub fn close(&mut self) {
        self.staged = None;
        self.row = None;
    }

    /// Staging file path, for diagnostics.
    pub fn staging_path(&self) -> Option<std::path::PathBuf> {
        self.staged.as_ref().map(|s| s.path().to_path_buf())
    }
}
