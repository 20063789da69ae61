//! Artifact generation and execution adapter.
//!
//! Two entry points share one execution skeleton: export the artifact,
//! compile it when the kind requires a build step, invoke the external
//! scorer with the fixed flag set, check that the promised output file
//! exists, and parse it back into a frame. The external side is an opaque
//! CSV-in/CSV-out contract; everything it prints is captured and carried
//! inside the error value when it misbehaves.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::data::{import_csv, DataError, Frame};
use crate::model::{ArtifactKind, ExportError, GlmModel};
use crate::process::{ProcessCommand, ProcessError, ProcessRunner};

/// Output CSV name for the class-artifact path.
pub const CLASS_OUTPUT: &str = "out_class.csv";
/// Output CSV name for the packaged-artifact path.
pub const PACKAGED_OUTPUT: &str = "out_packaged.csv";

/// Errors produced along an artifact scoring path.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact export failed: {0}")]
    Export(#[from] ExportError),

    #[error("artifact build failed with status {status}:\n{output}")]
    Build { status: i32, output: String },

    #[error(
        "artifact execution failed (status {status}, expected output {expected}):\n{output}"
    )]
    Execution {
        status: i32,
        expected: PathBuf,
        output: String,
    },

    #[error("external process failure: {0}")]
    Process(#[from] ProcessError),

    #[error("failed to parse artifact output: {0}")]
    Data(#[from] DataError),
}

/// External tool names for the two adapter steps.
///
/// The build program compiles class-artifact source into an executable; the
/// exec program drives either artifact form against a CSV. Both are
/// resolved through `PATH` unless given as absolute paths.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub build_program: String,
    pub exec_program: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            build_program: "rustc".to_string(),
            exec_program: "scorer".to_string(),
        }
    }
}

/// Runs exported artifacts through the external toolchain.
pub struct ArtifactRunner<'a> {
    runner: &'a dyn ProcessRunner,
    config: AdapterConfig,
}

impl<'a> ArtifactRunner<'a> {
    /// Create an adapter over a process runner with default tool names.
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self {
            runner,
            config: AdapterConfig::default(),
        }
    }

    /// Override the external tool names.
    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Export, compile, and execute the class artifact.
    ///
    /// The exported source is compiled with the build program; a non-zero
    /// build exit fails with [`ArtifactError::Build`]. The compiled binary
    /// is then run through the exec program against `input_csv`, and the
    /// produced `out_class.csv` is parsed into a frame.
    pub fn run_class_artifact(
        &self,
        model: &GlmModel,
        workdir: &Path,
        input_csv: &Path,
    ) -> Result<Frame, ArtifactError> {
        let handle = model.export_artifact(ArtifactKind::Class, workdir)?;
        info!(artifact = %handle.path.display(), "exported class artifact");

        let binary = workdir.join(model.sanitized_id());
        let build = ProcessCommand::new(
            &self.config.build_program,
            vec![
                handle.path.display().to_string(),
                "-O".to_string(),
                "-o".to_string(),
                binary.display().to_string(),
            ],
        )
        .in_dir(workdir);
        let output = self.runner.run(&build)?;
        if !output.success() {
            return Err(ArtifactError::Build {
                status: output.status,
                output: output.combined,
            });
        }
        debug!(binary = %binary.display(), "class artifact compiled");

        self.execute(&["--class", &binary.display().to_string()], workdir, input_csv, CLASS_OUTPUT)
    }

    /// Export and execute the packaged artifact.
    ///
    /// No build step: the bundle is handed to the exec program as-is, and
    /// the produced `out_packaged.csv` is parsed into a frame.
    pub fn run_packaged_artifact(
        &self,
        model: &GlmModel,
        workdir: &Path,
        input_csv: &Path,
    ) -> Result<Frame, ArtifactError> {
        let handle = model.export_artifact(ArtifactKind::Packaged, workdir)?;
        info!(artifact = %handle.path.display(), "exported packaged artifact");

        self.execute(
            &["--bundle", &handle.path.display().to_string()],
            workdir,
            input_csv,
            PACKAGED_OUTPUT,
        )
    }

    /// Shared execution tail: invoke the scorer, check the output file,
    /// parse it.
    fn execute(
        &self,
        artifact_args: &[&str],
        workdir: &Path,
        input_csv: &Path,
        output_name: &str,
    ) -> Result<Frame, ArtifactError> {
        let output_csv = workdir.join(output_name);

        let mut args: Vec<String> =
            artifact_args.iter().map(|s| s.to_string()).collect();
        args.extend([
            "--input".to_string(),
            input_csv.display().to_string(),
            "--output".to_string(),
            output_csv.display().to_string(),
            "--decimal".to_string(),
        ]);

        let cmd = ProcessCommand::new(&self.config.exec_program, args).in_dir(workdir);
        let output = self.runner.run(&cmd)?;
        debug!(status = output.status, "artifact scorer finished");

        if !output.success() || !output_csv.exists() {
            return Err(ArtifactError::Execution {
                status: output.status,
                expected: output_csv,
                output: output.combined,
            });
        }

        Ok(import_csv(&output_csv)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data::Frame;
    use crate::testing::FakeScorerRunner;

    fn model() -> GlmModel {
        GlmModel::new(
            "m1",
            vec!["age".to_string(), "income".to_string()],
            vec![0.02, 0.00001],
            -0.5,
        )
    }

    fn write_input(dir: &Path) -> PathBuf {
        let frame = Frame::from_rows(
            vec!["age", "income"],
            &[vec![30.0, 50_000.0], vec![45.0, 80_000.0]],
        )
        .unwrap();
        let path = dir.join("in.csv");
        crate::data::export_csv(&frame, &path).unwrap();
        path
    }

    #[test]
    fn packaged_path_produces_prediction_frame() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let fake = FakeScorerRunner::scoring_with(model());

        let adapter = ArtifactRunner::new(&fake);
        let frame = adapter
            .run_packaged_artifact(&model(), dir.path(), &input)
            .unwrap();

        assert_eq!(frame.shape(), (2, 3));
        assert_eq!(frame.columns(), &["predict", "p0", "p1"]);
        // Bundle must have been materialized for the scorer.
        assert!(dir.path().join("m1.bundle.json").exists());
    }

    #[test]
    fn class_path_compiles_then_scores() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let fake = FakeScorerRunner::scoring_with(model());

        let adapter = ArtifactRunner::new(&fake);
        let frame = adapter
            .run_class_artifact(&model(), dir.path(), &input)
            .unwrap();

        assert_eq!(frame.shape(), (2, 3));
        assert!(dir.path().join("m1.rs").exists());

        let invocations = fake.invocations();
        assert_eq!(invocations.len(), 2);
        // First the build step, then the scorer invocation.
        assert_eq!(invocations[0].program, "rustc");
        assert_eq!(invocations[1].program, "scorer");
        assert_eq!(invocations[1].flag_value("--input").unwrap(), input.display().to_string());
        assert!(invocations[1].args.contains(&"--decimal".to_string()));
    }

    #[test]
    fn build_failure_carries_captured_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let fake = FakeScorerRunner::scoring_with(model()).failing_build(9, "syntax error");

        let adapter = ArtifactRunner::new(&fake);
        let err = adapter
            .run_class_artifact(&model(), dir.path(), &input)
            .unwrap_err();
        match err {
            ArtifactError::Build { status, output } => {
                assert_eq!(status, 9);
                assert!(output.contains("syntax error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_output_file_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let fake = FakeScorerRunner::scoring_with(model()).skipping_output();

        let adapter = ArtifactRunner::new(&fake);
        let err = adapter
            .run_packaged_artifact(&model(), dir.path(), &input)
            .unwrap_err();
        match err {
            ArtifactError::Execution { status, expected, .. } => {
                assert_eq!(status, 0);
                assert!(expected.ends_with(PACKAGED_OUTPUT));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nonzero_exec_status_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let fake = FakeScorerRunner::scoring_with(model()).failing_exec(7, "bad bundle");

        let adapter = ArtifactRunner::new(&fake);
        let err = adapter
            .run_packaged_artifact(&model(), dir.path(), &input)
            .unwrap_err();
        match err {
            ArtifactError::Execution { status, output, .. } => {
                assert_eq!(status, 7);
                assert!(output.contains("bad bundle"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
