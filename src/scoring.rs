//! Manual scorer: closed-form logistic evaluation of a coefficient table.
//!
//! This is the harness's independent re-derivation of expected outputs. It
//! shares no state with [`crate::model::GlmModel`]: coefficients are looked
//! up by name from the table and multiplied against named frame columns,
//! row by row, exactly as one would do the arithmetic by hand.

use crate::coeffs::{CoefficientTable, INTERCEPT_KEY};
use crate::data::Frame;

/// Errors produced by the manual scorer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    #[error("no coefficient for predictor {0:?}")]
    MissingCoefficient(String),

    #[error("no column named {0:?} in the frame")]
    MissingColumn(String),
}

/// Numerically stable logistic link.
///
/// Evaluated as `1/(1+exp(-z))` for `z >= 0` and `exp(z)/(1+exp(z))`
/// otherwise, so extreme `|z|` saturates to 0 or 1 instead of overflowing
/// into NaN or Inf.
#[inline]
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Score every row of `frame` with the logistic link.
///
/// For each row the linear predictor is
/// `intercept + sum(coeffs[name] * frame[row, name])` over
/// `predictor_names`, in the given order. The output is the class-1
/// probability per row, index-aligned with the input rows. A zero-row frame
/// yields an empty vector.
///
/// Coefficient and column bindings are resolved before the row loop, so an
/// unknown predictor fails before any arithmetic happens.
///
/// # Errors
///
/// [`ScoreError::MissingCoefficient`] if a predictor (or the intercept) has
/// no table entry; [`ScoreError::MissingColumn`] if a predictor has no
/// frame column.
pub fn score(
    coeffs: &CoefficientTable,
    frame: &Frame,
    predictor_names: &[String],
) -> Result<Vec<f64>, ScoreError> {
    let intercept = coeffs
        .intercept()
        .ok_or_else(|| ScoreError::MissingCoefficient(INTERCEPT_KEY.to_string()))?;

    // (column index, weight) per predictor, resolved up front.
    let mut bindings = Vec::with_capacity(predictor_names.len());
    for name in predictor_names {
        let weight = coeffs
            .get(name)
            .ok_or_else(|| ScoreError::MissingCoefficient(name.clone()))?;
        let col = frame
            .column_index(name)
            .ok_or_else(|| ScoreError::MissingColumn(name.clone()))?;
        bindings.push((col, weight));
    }

    let mut preds = Vec::with_capacity(frame.n_rows());
    for row in 0..frame.n_rows() {
        let mut z = intercept;
        for &(col, weight) in &bindings {
            z += weight * frame.get(row, col);
        }
        preds.push(sigmoid(z));
    }
    Ok(preds)
}
