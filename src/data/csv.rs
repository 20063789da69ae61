//! CSV import and export for frames.
//!
//! The pipeline's wire format: a one-line header followed by numeric data
//! rows. Empty fields and the markers `NA` / `NaN` (any case) read back as
//! NaN. Export writes plain decimal notation so downstream parsers never
//! see scientific notation.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{DataError, Frame};

/// Parse a numeric cell, mapping missing-value markers to NaN.
fn parse_cell(field: &str, row: usize, column: usize) -> Result<f64, DataError> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan")
    {
        return Ok(f64::NAN);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| DataError::NumericConversion {
            row,
            column,
            value: field.to_string(),
        })
}

/// Import a frame from a CSV file with a one-line header.
///
/// # Errors
///
/// Fails on I/O or CSV syntax errors, on a ragged row, or on a cell that is
/// neither numeric nor a missing-value marker.
pub fn import_csv<P: AsRef<Path>>(path: P) -> Result<Frame, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_ref())?;

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.is_empty() {
        return Err(DataError::EmptyInput);
    }

    let mut cells = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != columns.len() {
            return Err(DataError::RaggedRow {
                row: row_idx,
                expected: columns.len(),
                got: record.len(),
            });
        }
        for (col_idx, field) in record.iter().enumerate() {
            cells.push(parse_cell(field, row_idx, col_idx)?);
        }
    }

    Frame::new(columns, cells)
}

/// Format one cell for export. NaN is written as `NA`.
fn format_cell(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else {
        // `Display` for f64 is shortest round-trip decimal, never scientific.
        format!("{value}")
    }
}

/// Export a frame to a CSV file with a one-line header.
///
/// # Errors
///
/// Fails on I/O errors.
pub fn export_csv<P: AsRef<Path>>(frame: &Frame, path: P) -> Result<(), DataError> {
    let file = File::create(path.as_ref())?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", frame.columns().join(","))?;
    for row in 0..frame.n_rows() {
        let line: Vec<String> = frame.row(row).iter().copied().map(format_cell).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()?;
    Ok(())
}
