//! Shared fixtures for integration tests.
//!
//! For assertion helpers and scripted collaborators, use
//! `scorecheck::testing`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use scorecheck::model::GlmModel;

#[allow(unused_imports)]
pub use scorecheck::testing::{
    assert_probs_match, FailingTrainer, FakeScorerRunner, StubTrainer,
};

/// Response column used by the sample dataset.
pub const RESPONSE: &str = "flag";

/// Write the three-row sample dataset and return its path.
pub fn sample_data_csv(dir: &Path) -> PathBuf {
    let path = dir.join("data.csv");
    std::fs::write(&path, "age,income,flag\n30,50000,0\n45,80000,1\n60,30000,0\n")
        .expect("write sample data");
    path
}

/// Write the matching coefficient source and return its path.
///
/// The intercept row deliberately uses a non-canonical spelling to exercise
/// normalization.
pub fn sample_coeffs_csv(dir: &Path) -> PathBuf {
    let path = dir.join("coeffs.csv");
    std::fs::write(&path, "model_intercept,-0.5\nage,0.02\nincome,0.00001\n")
        .expect("write sample coefficients");
    path
}

/// The model the injected pipeline model is numerically equal to.
///
/// A fake scorer configured with this twin reproduces the native path's
/// arithmetic exactly.
pub fn injected_twin() -> GlmModel {
    GlmModel::new(
        "external_twin",
        vec!["age".to_string(), "income".to_string()],
        vec![0.02, 0.00001],
        -0.5,
    )
}

/// Expected class-1 probabilities for the sample dataset under the sample
/// coefficients, from the closed-form arithmetic.
pub fn expected_p1() -> Vec<f64> {
    [0.6f64, 1.2, 1.0]
        .iter()
        .map(|z| 1.0 / (1.0 + (-z).exp()))
        .collect()
}
