// SPDX-License-Identifier: AGPL-3.0-only

//! Whitespace-delimited text record store.
//!
//! The optimizer and simulation engine exchange results as plain text: one
//! record per line, fields separated by whitespace. This module writes such
//! files in the same `%.18e` layout NumPy's `savetxt` produces and parses
//! them back into typed sequences.
//!
//! # Write contract
//!
//! Writing to an existing path **appends**; writing to a new path creates it.
//! Callers that want overwrite semantics must delete the destination first.
//! There is no locking: concurrent writers to one destination interleave.
//!
//! # File formats
//!
//! | Reader | Columns | Example |
//! |--------|---------|---------|
//! | [`read_scalar_series`] | 1 float | `losses.txt`, `x0trajectory.txt` |
//! | [`read_pair_series`] | 2 floats | generic (X, Y) pairs |
//! | [`read_rows`] | N floats | cached (χD, χA, min N) triples |
//! | [`read_tuple_series`] | int, int, float, int, int | deque snapshots |

use crate::error::{Result, SweepError};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::debug;

/// A row that can be serialized as one line of a record file.
pub trait Record {
    /// Append this row's fields (space separated, no trailing newline) to `out`.
    fn write_fields(&self, out: &mut String);
}

/// Format a float as `%.18e`: 18 fractional mantissa digits, signed exponent
/// with at least two digits (`1.500000000000000000e+00`).
#[must_use]
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let raw = format!("{value:.18e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = exp.strip_prefix('-').map_or(('+', exp), |d| ('-', d));
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => raw,
    }
}

fn push_floats(out: &mut String, values: &[f64]) {
    for (k, v) in values.iter().enumerate() {
        if k > 0 {
            out.push(' ');
        }
        out.push_str(&format_scientific(*v));
    }
}

impl Record for f64 {
    fn write_fields(&self, out: &mut String) {
        out.push_str(&format_scientific(*self));
    }
}

impl<const N: usize> Record for [f64; N] {
    fn write_fields(&self, out: &mut String) {
        push_floats(out, self);
    }
}

impl Record for Vec<f64> {
    fn write_fields(&self, out: &mut String) {
        push_floats(out, self);
    }
}

impl Record for (f64, f64) {
    fn write_fields(&self, out: &mut String) {
        push_floats(out, &[self.0, self.1]);
    }
}

impl Record for (f64, f64, f64) {
    fn write_fields(&self, out: &mut String) {
        push_floats(out, &[self.0, self.1, self.2]);
    }
}

impl Record for String {
    fn write_fields(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl Record for &str {
    fn write_fields(&self, out: &mut String) {
        out.push_str(self);
    }
}

/// One line of a deque snapshot dump: two integer indices, a value, two more
/// integer indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DequeRecord {
    /// Leading index pair (columns 0 and 1).
    pub lead: [i64; 2],
    /// Float payload (column 2).
    pub value: f64,
    /// Trailing index pair (columns 3 and 4).
    pub trail: [i64; 2],
}

impl Record for DequeRecord {
    #[allow(clippy::cast_precision_loss)]
    fn write_fields(&self, out: &mut String) {
        push_floats(
            out,
            &[
                self.lead[0] as f64,
                self.lead[1] as f64,
                self.value,
                self.trail[0] as f64,
                self.trail[1] as f64,
            ],
        );
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Writing
// ═══════════════════════════════════════════════════════════════════

/// Serialize `records` to `destination`, one record per line.
///
/// Appends when the file exists, creates it otherwise. The whole batch is
/// formatted up front and written with a single `write_all`.
///
/// # Errors
///
/// Returns [`SweepError::TypeMismatch`] if `destination` is a directory and
/// [`SweepError::Io`] if the file cannot be opened or written.
pub fn write_records<R: Record>(records: &[R], destination: &Path) -> Result<()> {
    if destination.is_dir() {
        return Err(SweepError::TypeMismatch(format!(
            "record destination {} is a directory",
            destination.display()
        )));
    }

    let mut buf = String::new();
    for record in records {
        record.write_fields(&mut buf);
        buf.push('\n');
    }

    let appending = destination.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(destination)
        .map_err(|e| SweepError::Io(format!("open {}: {e}", destination.display())))?;
    file.write_all(buf.as_bytes())
        .map_err(|e| SweepError::Io(format!("write {}: {e}", destination.display())))?;

    debug!(
        path = %destination.display(),
        rows = records.len(),
        appending,
        "wrote records"
    );
    Ok(())
}

/// Render `records` exactly as [`write_records`] would put them on disk.
#[must_use]
pub fn render_records<R: Record>(records: &[R]) -> String {
    records.iter().fold(String::new(), |mut buf, record| {
        record.write_fields(&mut buf);
        buf.push('\n');
        buf
    })
}

// ═══════════════════════════════════════════════════════════════════
//  Reading
// ═══════════════════════════════════════════════════════════════════

/// Stream `source` line by line, handing each line's tokens to `parse`.
fn parse_lines<T>(
    source: &Path,
    mut parse: impl FnMut(usize, &[&str]) -> Result<T>,
) -> Result<Vec<T>> {
    if source.is_dir() {
        return Err(SweepError::TypeMismatch(format!(
            "record source {} is a directory",
            source.display()
        )));
    }
    let file = File::open(source).map_err(|e| SweepError::from_io(source, &e))?;
    let mut reader = BufReader::new(file);

    let mut out = Vec::new();
    let mut raw = Vec::new();
    let mut line_no = 0;
    loop {
        raw.clear();
        let read = reader
            .read_until(b'\n', &mut raw)
            .map_err(|e| SweepError::from_io(source, &e))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let line = std::str::from_utf8(&raw).map_err(|e| {
            SweepError::parse(source, line_no, format!("not valid UTF-8: {e}"))
        })?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        out.push(parse(line_no, &fields)?);
    }
    debug!(path = %source.display(), records = out.len(), "read records");
    Ok(out)
}

fn field_f64(source: &Path, line: usize, fields: &[&str], col: usize) -> Result<f64> {
    let token = fields.get(col).ok_or_else(|| {
        SweepError::parse(
            source,
            line,
            format!("expected at least {} columns, found {}", col + 1, fields.len()),
        )
    })?;
    token.parse::<f64>().map_err(|_| {
        SweepError::parse(source, line, format!("column {col}: '{token}' is not a number"))
    })
}

/// Parse a float column and truncate it toward zero (`"3.0"` and `"3"` both give 3).
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn field_truncated_int(source: &Path, line: usize, fields: &[&str], col: usize) -> Result<i64> {
    let value = field_f64(source, line, fields, col)?;
    let truncated = value.trunc();
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(SweepError::parse(
            source,
            line,
            format!("column {col}: {value} is not representable as an integer"),
        ));
    }
    Ok(truncated as i64)
}

/// Read the first numeric token of every line.
///
/// # Errors
///
/// [`SweepError::MissingFile`] if `source` does not exist,
/// [`SweepError::Parse`] if any line lacks a numeric first token.
pub fn read_scalar_series(source: &Path) -> Result<Vec<f64>> {
    parse_lines(source, |line, fields| field_f64(source, line, fields, 0))
}

/// Read columns 0 and 1 of every line as two parallel sequences.
///
/// # Errors
///
/// As [`read_scalar_series`], plus a parse error for lines with fewer than
/// two numeric columns.
pub fn read_pair_series(source: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let rows = read_rows(source, 2)?;
    Ok(rows.into_iter().map(|r| (r[0], r[1])).unzip())
}

/// Read the first `width` numeric columns of every line.
///
/// Extra columns are ignored, matching the fixed-column readers.
///
/// # Errors
///
/// [`SweepError::InvalidInput`] for `width == 0`; otherwise as
/// [`read_scalar_series`].
pub fn read_rows(source: &Path, width: usize) -> Result<Vec<Vec<f64>>> {
    if width == 0 {
        return Err(SweepError::InvalidInput(
            "row width must be at least one column".into(),
        ));
    }
    parse_lines(source, |line, fields| {
        (0..width)
            .map(|col| field_f64(source, line, fields, col))
            .collect()
    })
}

/// Read a five-column deque snapshot dump (int, int, float, int, int).
///
/// # Errors
///
/// As [`read_scalar_series`]; integer columns holding non-finite values are
/// parse errors.
pub fn read_tuple_series(source: &Path) -> Result<Vec<DequeRecord>> {
    parse_lines(source, |line, fields| {
        Ok(DequeRecord {
            lead: [
                field_truncated_int(source, line, fields, 0)?,
                field_truncated_int(source, line, fields, 1)?,
            ],
            value: field_f64(source, line, fields, 2)?,
            trail: [
                field_truncated_int(source, line, fields, 3)?,
                field_truncated_int(source, line, fields, 4)?,
            ],
        })
    })
}
