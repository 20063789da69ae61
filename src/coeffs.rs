//! Coefficient table: named weights defining a linear predictor.
//!
//! The table is parsed once from a headerless two-column CSV source
//! (`name,weight` per row) and is immutable afterwards. Any source row
//! whose name contains `intercept` in any case is normalized to the
//! reserved [`INTERCEPT_KEY`]. The key set is validated at construction:
//! duplicate names are rejected up front instead of surfacing as
//! last-write-wins lookups later.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// Reserved key for the intercept weight.
pub const INTERCEPT_KEY: &str = "Intercept";

/// Errors produced while building a coefficient table.
#[derive(Debug, thiserror::Error)]
pub enum CoeffError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row} is malformed: expected `name,weight`, got {got} fields")]
    MalformedRow { row: usize, got: usize },

    #[error("row {row}: weight for {name:?} is not numeric: {value:?}")]
    NumericConversion {
        row: usize,
        name: String,
        value: String,
    },

    #[error("duplicate coefficient name: {0:?}")]
    DuplicateName(String),
}

/// Immutable mapping from predictor name (case-sensitive) to weight.
///
/// One reserved entry, [`INTERCEPT_KEY`], carries the intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    weights: BTreeMap<String, f64>,
}

impl CoefficientTable {
    /// Build a table from `(name, weight)` entries.
    ///
    /// Names containing `intercept` (case-insensitive) normalize to
    /// [`INTERCEPT_KEY`].
    ///
    /// # Errors
    ///
    /// Fails on duplicate names after normalization.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, CoeffError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights = BTreeMap::new();
        for (name, weight) in entries {
            let name = normalize_name(name.into());
            if weights.insert(name.clone(), weight).is_some() {
                return Err(CoeffError::DuplicateName(name));
            }
        }
        Ok(Self { weights })
    }

    /// Parse a table from a headerless CSV file with `name,weight` rows.
    ///
    /// # Errors
    ///
    /// Fails on I/O or CSV errors, a row without exactly two fields, a
    /// non-numeric weight, or a duplicate name.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, CoeffError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_ref())?;

        let mut entries = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != 2 {
                return Err(CoeffError::MalformedRow {
                    row,
                    got: record.len(),
                });
            }
            let name = record[0].trim().to_string();
            let value = record[1].trim();
            let weight = value
                .parse::<f64>()
                .map_err(|_| CoeffError::NumericConversion {
                    row,
                    name: name.clone(),
                    value: value.to_string(),
                })?;
            entries.push((name, weight));
        }
        Self::from_entries(entries)
    }

    /// Weight for a name, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    /// Intercept weight, if present.
    pub fn intercept(&self) -> Option<f64> {
        self.get(INTERCEPT_KEY)
    }

    /// All names in the table, intercept included, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Predictor names only (everything except the intercept).
    pub fn predictor_names(&self) -> impl Iterator<Item = &str> {
        self.names().filter(|n| *n != INTERCEPT_KEY)
    }

    /// Number of entries, intercept included.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

fn normalize_name(name: String) -> String {
    if name.to_ascii_lowercase().contains("intercept") {
        INTERCEPT_KEY.to_string()
    } else {
        name
    }
}
