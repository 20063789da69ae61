//! Sampling frame comparator.
//!
//! Compares two equally shaped frames cell by cell under a per-cell
//! sampling probability and a relative tolerance with an absolute floor:
//! `|a - b| / max(1, |a|, |b|)`. Near zero this behaves as an absolute
//! tolerance, for large magnitudes as a relative one. The comparator fails
//! on the first violation; it never collects mismatches.
//!
//! Sampling draws come from a `Xoshiro256PlusPlus` seeded from the options,
//! so a run is reproducible and tests can pin the exact cells visited. One
//! uniform draw is consumed per cell whether or not the cell is compared,
//! keeping the stream independent of the data.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::Frame;

/// Comparator failure, carrying full cell context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompareError {
    #[error(
        "frame shapes differ: {left_rows}x{left_cols} vs {right_rows}x{right_cols}"
    )]
    ShapeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("NaN mismatch at row {row}, column {column}: {left} vs {right}")]
    NanMismatch {
        row: usize,
        column: usize,
        left: f64,
        right: f64,
    },

    #[error(
        "value mismatch at row {row}, column {column}: {left} vs {right} \
         (relative diff {rel_diff:e})"
    )]
    ValueMismatch {
        row: usize,
        column: usize,
        left: f64,
        right: f64,
        rel_diff: f64,
    },
}

/// How exhaustively a frame pair is checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    /// Probability that any given cell is compared, in `[0, 1]`.
    pub sample_probability: f64,
    /// Maximum allowed `|a - b| / max(1, |a|, |b|)`.
    pub tolerance: f64,
    /// Seed for the sampling stream.
    pub seed: u64,
}

impl Default for CompareOptions {
    /// Deterministic full scan at the customary tolerance.
    fn default() -> Self {
        Self {
            sample_probability: 1.0,
            tolerance: 1e-6,
            seed: 0,
        }
    }
}

impl CompareOptions {
    /// Full deterministic scan at `tolerance`.
    pub fn exhaustive(tolerance: f64) -> Self {
        Self {
            sample_probability: 1.0,
            tolerance,
            seed: 0,
        }
    }

    /// Sampled scan: each cell is checked with probability `p`.
    pub fn sampled(p: f64, tolerance: f64, seed: u64) -> Self {
        Self {
            sample_probability: p,
            tolerance,
            seed,
        }
    }
}

/// Relative difference with an absolute floor of 1.
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    (a - b).abs() / 1.0_f64.max(a.abs()).max(b.abs())
}

/// Compare two frames cell by cell, failing on the first violation.
///
/// Shape equality is required before any cell is looked at. Cells are
/// visited column-major; each is skipped unless a uniform draw lands below
/// `sample_probability`. Two NaN cells match trivially; a NaN on exactly
/// one side is a [`CompareError::NanMismatch`]; otherwise the cell fails if
/// its [`relative_diff`] exceeds the tolerance.
///
/// # Errors
///
/// The first [`CompareError`] encountered.
pub fn compare_frames(
    f1: &Frame,
    f2: &Frame,
    options: &CompareOptions,
) -> Result<(), CompareError> {
    if f1.shape() != f2.shape() {
        let (left_rows, left_cols) = f1.shape();
        let (right_rows, right_cols) = f2.shape();
        return Err(CompareError::ShapeMismatch {
            left_rows,
            left_cols,
            right_rows,
            right_cols,
        });
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(options.seed);
    for column in 0..f1.n_cols() {
        for row in 0..f1.n_rows() {
            let draw: f64 = rng.gen();
            if draw >= options.sample_probability {
                continue;
            }

            let left = f1.get(row, column);
            let right = f2.get(row, column);
            match (left.is_nan(), right.is_nan()) {
                (true, true) => continue,
                (true, false) | (false, true) => {
                    return Err(CompareError::NanMismatch {
                        row,
                        column,
                        left,
                        right,
                    })
                }
                (false, false) => {
                    let rel_diff = relative_diff(left, right);
                    if rel_diff > options.tolerance {
                        return Err(CompareError::ValueMismatch {
                            row,
                            column,
                            left,
                            right,
                            rel_diff,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}
