//! Testing utilities: assertion helpers and scripted collaborators.
//!
//! Usable from unit tests and integration tests alike:
//!
//! ```ignore
//! use scorecheck::testing::{assert_probs_match, FakeScorerRunner, StubTrainer};
//! ```
//!
//! [`FakeScorerRunner`] stands in for the external artifact toolchain: it
//! satisfies build invocations by touching the requested output binary and
//! satisfies scorer invocations by scoring the input CSV with a configured
//! model, so no test ever spawns a real process.

use std::path::Path;
use std::sync::Mutex;

use crate::data::{export_csv, import_csv};
use crate::model::{GlmModel, TrainError, Trainer};
use crate::process::{ProcessCommand, ProcessError, ProcessOutput, ProcessRunner};

// =============================================================================
// Assertions
// =============================================================================

/// Assert element-wise closeness of two probability sequences.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than
/// `tolerance`, naming the index and both values.
pub fn assert_probs_match(actual: &[f64], expected: &[f64], tolerance: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        assert!(
            diff <= tolerance,
            "{context}[{i}]: {a} != {e} (diff={diff:e}, tolerance={tolerance:e})"
        );
    }
}

// =============================================================================
// Trainer stubs
// =============================================================================

/// Backend stand-in that honors the requested schema.
///
/// Produces a model over exactly the requested predictors with arbitrary
/// nonzero weights. The pipeline discards trained weights via injection,
/// so the values only need to be distinguishable from injected ones.
#[derive(Debug, Default)]
pub struct StubTrainer;

impl Trainer for StubTrainer {
    fn train(
        &self,
        _data: &crate::data::Frame,
        predictors: &[String],
        _response: &str,
    ) -> Result<GlmModel, TrainError> {
        let weights = (0..predictors.len())
            .map(|i| 0.1 * (i as f64 + 1.0))
            .collect();
        Ok(GlmModel::new("stub_glm", predictors.to_vec(), weights, 0.25))
    }
}

/// Backend stand-in that always fails.
#[derive(Debug)]
pub struct FailingTrainer(pub String);

impl Trainer for FailingTrainer {
    fn train(
        &self,
        _data: &crate::data::Frame,
        _predictors: &[String],
        _response: &str,
    ) -> Result<GlmModel, TrainError> {
        Err(TrainError::Backend(self.0.clone()))
    }
}

// =============================================================================
// Fake scorer runner
// =============================================================================

/// Scripted [`ProcessRunner`] for the artifact toolchain.
///
/// Build invocations (no `--input` flag) touch the `-o` target and exit 0.
/// Scorer invocations read `--input`, score it with the configured model,
/// and write `--output`. Failure modes are opt-in via the builder methods.
/// Every invocation is recorded for inspection.
#[derive(Debug)]
pub struct FakeScorerRunner {
    model: GlmModel,
    invocations: Mutex<Vec<ProcessCommand>>,
    build_failure: Option<(i32, String)>,
    exec_failure: Option<(i32, String)>,
    skip_output: bool,
}

impl FakeScorerRunner {
    /// A runner whose scorer invocations score with `model`.
    pub fn scoring_with(model: GlmModel) -> Self {
        Self {
            model,
            invocations: Mutex::new(Vec::new()),
            build_failure: None,
            exec_failure: None,
            skip_output: false,
        }
    }

    /// Make build invocations fail with the given status and output.
    pub fn failing_build<S: Into<String>>(mut self, status: i32, output: S) -> Self {
        self.build_failure = Some((status, output.into()));
        self
    }

    /// Make scorer invocations fail with the given status and output.
    pub fn failing_exec<S: Into<String>>(mut self, status: i32, output: S) -> Self {
        self.exec_failure = Some((status, output.into()));
        self
    }

    /// Make scorer invocations exit 0 without writing the output file.
    pub fn skipping_output(mut self) -> Self {
        self.skip_output = true;
        self
    }

    /// All commands this runner has received, in order.
    pub fn invocations(&self) -> Vec<ProcessCommand> {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .clone()
    }

    fn record(&self, cmd: &ProcessCommand) {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .push(cmd.clone());
    }
}

impl ProcessRunner for FakeScorerRunner {
    fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.record(cmd);

        let is_scorer_call = cmd.flag_value("--input").is_some();
        if !is_scorer_call {
            // Build step.
            if let Some((status, output)) = &self.build_failure {
                return Ok(ProcessOutput {
                    status: *status,
                    combined: output.clone(),
                });
            }
            if let Some(target) = cmd.flag_value("-o") {
                std::fs::write(Path::new(target), "").expect("touch build target");
            }
            return Ok(ProcessOutput {
                status: 0,
                combined: String::new(),
            });
        }

        if let Some((status, output)) = &self.exec_failure {
            return Ok(ProcessOutput {
                status: *status,
                combined: output.clone(),
            });
        }

        let input = cmd.flag_value("--input").expect("scorer call has --input");
        let output = cmd.flag_value("--output").expect("scorer call has --output");

        let frame = import_csv(Path::new(input)).expect("readable input CSV");
        let predictions = self.model.predict(&frame).expect("scorable input frame");
        if !self.skip_output {
            export_csv(&predictions, Path::new(output)).expect("writable output CSV");
        }

        Ok(ProcessOutput {
            status: 0,
            combined: format!("scored {} rows\n", frame.n_rows()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data::Frame;

    #[test]
    fn probs_match_passes_within_tolerance() {
        assert_probs_match(&[0.5, 0.25], &[0.5000001, 0.25], 1e-6, "test");
    }

    #[test]
    #[should_panic(expected = "test[1]")]
    fn probs_match_names_the_failing_index() {
        assert_probs_match(&[0.5, 0.25], &[0.5, 0.5], 1e-6, "test");
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn probs_match_rejects_length_mismatch() {
        assert_probs_match(&[0.5], &[0.5, 0.25], 1e-6, "test");
    }

    #[test]
    fn stub_trainer_honors_schema() {
        let frame = Frame::from_rows(vec!["a", "b", "y"], &[vec![1.0, 2.0, 0.0]]).unwrap();
        let predictors = vec!["a".to_string(), "b".to_string()];
        let model = StubTrainer.train(&frame, &predictors, "y").unwrap();
        assert_eq!(model.predictors(), &["a", "b"]);
    }

    #[test]
    fn failing_trainer_reports_backend_error() {
        let frame = Frame::from_rows(vec!["a"], &[]).unwrap();
        let err = FailingTrainer("cluster down".to_string())
            .train(&frame, &[], "y")
            .unwrap_err();
        assert!(err.to_string().contains("cluster down"));
    }
}
