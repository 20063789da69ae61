//! The verification pipeline: a linear, fail-fast stage machine.
//!
//! One run walks `Init -> Train -> InjectCoefficients -> NativePredict ->
//! ManualPredict -> NativeVsManual -> ArtifactGeneration ->
//! ArtifactExecution -> ArtifactComparison`. Any failure is terminal: the
//! harness is a correctness oracle, so the first divergence or execution
//! error already falsifies the property under test and aborts the run with
//! the stage it happened in.
//!
//! Collaborators are held by a [`ServiceHandle`], acquired when the run
//! starts and released when it ends, on success and failure alike.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::artifact::{AdapterConfig, ArtifactError, ArtifactRunner};
use crate::coeffs::{CoeffError, CoefficientTable};
use crate::compare::{compare_frames, CompareError, CompareOptions};
use crate::data::{export_csv, import_csv, DataError};
use crate::model::{InjectError, TrainError, Trainer, P1_COLUMN};
use crate::process::ProcessRunner;
use crate::scoring::{self, ScoreError};

/// Name of the shared input snapshot every prediction path scores.
pub const INPUT_SNAPSHOT: &str = "in.csv";
/// Name of the persisted native prediction frame.
pub const NATIVE_PREDICTIONS: &str = "native_pred.csv";

// =============================================================================
// Stages and errors
// =============================================================================

/// Pipeline stage in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Train,
    InjectCoefficients,
    NativePredict,
    ManualPredict,
    NativeVsManual,
    ArtifactGeneration,
    ArtifactExecution,
    ArtifactComparison,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "initialization",
            Stage::Train => "training",
            Stage::InjectCoefficients => "coefficient injection",
            Stage::NativePredict => "native prediction",
            Stage::ManualPredict => "manual prediction",
            Stage::NativeVsManual => "native-vs-manual verification",
            Stage::ArtifactGeneration => "artifact generation",
            Stage::ArtifactExecution => "artifact execution",
            Stage::ArtifactComparison => "artifact comparison",
        };
        f.write_str(name)
    }
}

/// Failure cause inside a stage.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Coeff(#[from] CoeffError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error(
        "native and manual predictions diverge at row {row}: \
         native {native} vs manual {manual} (diff {diff:e})"
    )]
    NativeManualDivergence {
        row: usize,
        native: f64,
        manual: f64,
        diff: f64,
    },
}

/// A terminal pipeline failure: the stage and its cause.
#[derive(Debug, thiserror::Error)]
#[error("pipeline failed during {stage}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StepError,
}

fn at_stage<E: Into<StepError>>(stage: Stage) -> impl Fn(E) -> PipelineError {
    move |e| PipelineError {
        stage,
        source: e.into(),
    }
}

/// Export failures surface as generation, everything later as execution.
fn artifact_stage(err: &ArtifactError) -> Stage {
    match err {
        ArtifactError::Export(_) => Stage::ArtifactGeneration,
        _ => Stage::ArtifactExecution,
    }
}

// =============================================================================
// Configuration and report
// =============================================================================

/// One verification run's inputs and knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input dataset, CSV with a one-line header.
    pub data_csv: PathBuf,
    /// Coefficient source, headerless `name,weight` CSV.
    pub coeffs_csv: PathBuf,
    /// Response column name, excluded from the predictors.
    pub response: String,
    /// Working directory exclusively owned by this run.
    pub workdir: PathBuf,
    /// Per-cell sampling probability for the artifact comparisons.
    pub sample_probability: f64,
    /// Relative tolerance (with floor) for the artifact comparisons.
    pub tolerance: f64,
    /// Absolute per-row tolerance for the native-vs-manual check.
    pub manual_tolerance: f64,
    /// Seed for the sampling comparator.
    pub seed: u64,
}

impl PipelineConfig {
    /// Configuration with the customary verification knobs: 10% cell
    /// sampling at 1e-10 for artifacts, 1e-10 absolute for the manual
    /// cross-check.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>, R: Into<PathBuf>>(
        data_csv: P,
        coeffs_csv: Q,
        response: impl Into<String>,
        workdir: R,
    ) -> Self {
        Self {
            data_csv: data_csv.into(),
            coeffs_csv: coeffs_csv.into(),
            response: response.into(),
            workdir: workdir.into(),
            sample_probability: 0.1,
            tolerance: 1e-10,
            manual_tolerance: 1e-10,
            seed: 42,
        }
    }
}

/// Successful run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Id of the injected model all paths scored with.
    pub model_id: String,
    /// Rows verified across every path.
    pub rows: usize,
}

// =============================================================================
// ServiceHandle
// =============================================================================

/// Scoped access to the external collaborators.
///
/// Acquired once when a run starts and released when the handle drops,
/// which happens on every exit path of [`Pipeline::run`].
pub struct ServiceHandle<'a> {
    trainer: &'a dyn Trainer,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ServiceHandle<'a> {
    /// Acquire the collaborator handles for one run.
    pub fn acquire(trainer: &'a dyn Trainer, runner: &'a dyn ProcessRunner) -> Self {
        info!("scoring service acquired");
        Self { trainer, runner }
    }

    /// The training backend.
    pub fn trainer(&self) -> &dyn Trainer {
        self.trainer
    }

    /// The external process capability.
    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner
    }
}

impl Drop for ServiceHandle<'_> {
    fn drop(&mut self) {
        info!("scoring service released");
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// The orchestrator.
pub struct Pipeline<'a> {
    trainer: &'a dyn Trainer,
    runner: &'a dyn ProcessRunner,
    adapter_config: AdapterConfig,
}

impl<'a> Pipeline<'a> {
    /// Build a pipeline over the two collaborator seams.
    pub fn new(trainer: &'a dyn Trainer, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            trainer,
            runner,
            adapter_config: AdapterConfig::default(),
        }
    }

    /// Override the artifact toolchain names.
    pub fn with_adapter_config(mut self, config: AdapterConfig) -> Self {
        self.adapter_config = config;
        self
    }

    /// Execute one verification run.
    ///
    /// # Errors
    ///
    /// The first failure of any stage, tagged with that stage. Nothing is
    /// retried or recovered.
    pub fn run(&self, config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
        let service = ServiceHandle::acquire(self.trainer, self.runner);

        // Init: load inputs, claim the workdir.
        let data = import_csv(&config.data_csv).map_err(at_stage(Stage::Init))?;
        let coeffs =
            CoefficientTable::from_csv(&config.coeffs_csv).map_err(at_stage(Stage::Init))?;
        if data.column_index(&config.response).is_none() {
            return Err(at_stage(Stage::Init)(DataError::UnknownColumn(
                config.response.clone(),
            )));
        }
        fs::create_dir_all(&config.workdir)
            .map_err(|e| at_stage(Stage::Init)(DataError::Io(e)))?;
        let predictors: Vec<String> = data
            .columns()
            .iter()
            .filter(|c| **c != config.response)
            .cloned()
            .collect();
        info!(
            rows = data.n_rows(),
            predictors = predictors.len(),
            "verification run starting"
        );

        let base = service
            .trainer()
            .train(&data, &predictors, &config.response)
            .map_err(at_stage(Stage::Train))?;

        let model = base
            .with_coefficients(&coeffs)
            .map_err(at_stage(Stage::InjectCoefficients))?;
        info!(model = model.id(), "coefficients injected");

        let native = model
            .predict(&data)
            .map_err(at_stage(Stage::NativePredict))?;

        let manual = scoring::score(&coeffs, &data, &predictors)
            .map_err(at_stage(Stage::ManualPredict))?;

        // Native vs manual: absolute per-row check on the class-1 column.
        let p1_col = native
            .column_index(P1_COLUMN)
            .ok_or_else(|| {
                at_stage(Stage::NativeVsManual)(DataError::UnknownColumn(
                    P1_COLUMN.to_string(),
                ))
            })?;
        for (row, manual_p1) in manual.iter().enumerate() {
            let native_p1 = native.get(row, p1_col);
            let diff = (native_p1 - manual_p1).abs();
            if diff > config.manual_tolerance {
                return Err(PipelineError {
                    stage: Stage::NativeVsManual,
                    source: StepError::NativeManualDivergence {
                        row,
                        native: native_p1,
                        manual: *manual_p1,
                        diff,
                    },
                });
            }
        }
        info!(rows = native.n_rows(), "native and manual predictions agree");

        // Persist the shared input snapshot and the native predictions.
        let in_csv = config.workdir.join(INPUT_SNAPSHOT);
        export_csv(&data, &in_csv).map_err(at_stage(Stage::ArtifactGeneration))?;
        export_csv(&native, config.workdir.join(NATIVE_PREDICTIONS))
            .map_err(at_stage(Stage::ArtifactGeneration))?;

        let adapter =
            ArtifactRunner::new(service.runner()).with_config(self.adapter_config.clone());

        let packaged = adapter
            .run_packaged_artifact(&model, &config.workdir, &in_csv)
            .map_err(|e| at_stage(artifact_stage(&e))(e))?;
        compare_frames(
            &native,
            &packaged,
            &CompareOptions::sampled(config.sample_probability, config.tolerance, config.seed),
        )
        .map_err(at_stage(Stage::ArtifactComparison))?;
        info!("native and packaged-artifact predictions agree");

        let class = adapter
            .run_class_artifact(&model, &config.workdir, &in_csv)
            .map_err(|e| at_stage(artifact_stage(&e))(e))?;
        compare_frames(
            &native,
            &class,
            &CompareOptions::sampled(
                config.sample_probability,
                config.tolerance,
                config.seed.wrapping_add(1),
            ),
        )
        .map_err(at_stage(Stage::ArtifactComparison))?;
        info!("native and class-artifact predictions agree");

        Ok(PipelineReport {
            model_id: model.id().to_string(),
            rows: native.n_rows(),
        })
    }
}
