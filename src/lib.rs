//! scorecheck: a consistency harness for GLM scoring paths.
//!
//! This crate verifies that three independent evaluators of the same
//! binomial linear model produce numerically equivalent predictions for the
//! same input frame and the same coefficients:
//!
//! 1. the live in-process scorer ([`model::GlmModel::predict`]),
//! 2. a compiled standalone scoring artifact (the "class" artifact),
//! 3. a packaged portable scoring artifact (the "bundle" artifact).
//!
//! Expected values are re-derived independently by the manual scorer in
//! [`scoring`], and all pairs are checked by the sampling frame comparator
//! in [`compare`]. The whole sequence is driven by [`pipeline::Pipeline`].
//!
//! Model training and artifact execution are external collaborators behind
//! the [`model::Trainer`] and [`process::ProcessRunner`] seams, so the
//! harness itself never depends on a particular training service or
//! artifact technology.

pub mod artifact;
pub mod coeffs;
pub mod compare;
pub mod data;
pub mod model;
pub mod pipeline;
pub mod process;
pub mod scoring;
pub mod testing;
