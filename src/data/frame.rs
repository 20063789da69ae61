//! The `Frame` type: an immutable rectangular f64 table with named columns.

use std::io;

/// Errors produced by frame construction and I/O.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("cell ({row}, {column}) is not numeric: {value:?}")]
    NumericConversion {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("row {row} has {got} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("cell count {got} does not match {rows} rows x {cols} columns")]
    CellCountMismatch { rows: usize, cols: usize, got: usize },

    #[error("unknown column: {0:?}")]
    UnknownColumn(String),

    #[error("input has no columns")]
    EmptyInput,
}

/// An immutable rectangular table of named f64 columns.
///
/// Cells are stored row-major and addressable by `(row, column)` index or by
/// `(row, column name)`. NaN is a valid cell value and denotes a missing
/// entry. A frame never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    /// Row-major cell storage, length = n_rows * columns.len().
    cells: Vec<f64>,
    n_rows: usize,
}

impl Frame {
    /// Create a frame from column names and row-major cells.
    ///
    /// # Errors
    ///
    /// Fails if there are no columns or the cell count is not a multiple of
    /// the column count.
    pub fn new(columns: Vec<String>, cells: Vec<f64>) -> Result<Self, DataError> {
        if columns.is_empty() {
            return Err(DataError::EmptyInput);
        }
        if cells.len() % columns.len() != 0 {
            return Err(DataError::CellCountMismatch {
                rows: cells.len() / columns.len(),
                cols: columns.len(),
                got: cells.len(),
            });
        }
        let n_rows = cells.len() / columns.len();
        Ok(Self {
            columns,
            cells,
            n_rows,
        })
    }

    /// Create a frame from a sequence of equally sized rows.
    ///
    /// # Errors
    ///
    /// Fails on a ragged row.
    pub fn from_rows<S: Into<String>>(
        columns: Vec<S>,
        rows: &[Vec<f64>],
    ) -> Result<Self, DataError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(DataError::EmptyInput);
        }
        let mut cells = Vec::with_capacity(columns.len() * rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DataError::RaggedRow {
                    row: i,
                    expected: columns.len(),
                    got: row.len(),
                });
            }
            cells.extend_from_slice(row);
        }
        Self::new(columns, cells)
    }

    /// Constructor for callers that guarantee a rectangular layout.
    pub(crate) fn from_raw(columns: Vec<String>, cells: Vec<f64>) -> Self {
        debug_assert!(!columns.is_empty(), "frame needs at least one column");
        debug_assert_eq!(cells.len() % columns.len(), 0, "cells must be rectangular");
        let n_rows = cells.len() / columns.len();
        Self {
            columns,
            cells,
            n_rows,
        }
    }

    /// Number of data rows (the header is not a row).
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)` shape.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.columns.len())
    }

    /// Column names in positional order.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Positional index of a named column, if present. Case-sensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value at `(row, column)`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.n_rows, "row index out of bounds");
        debug_assert!(col < self.columns.len(), "column index out of bounds");
        self.cells[row * self.columns.len() + col]
    }

    /// Cell value at `(row, column name)`.
    ///
    /// # Errors
    ///
    /// Fails if no column has that name.
    pub fn get_by_name(&self, row: usize, name: &str) -> Result<f64, DataError> {
        let col = self
            .column_index(name)
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))?;
        Ok(self.get(row, col))
    }

    /// One row as a slice, in column order.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        debug_assert!(row < self.n_rows, "row index out of bounds");
        let w = self.columns.len();
        &self.cells[row * w..(row + 1) * w]
    }
}
