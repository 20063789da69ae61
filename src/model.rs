//! The in-process GLM scorer, the coefficient injector, and artifact export.
//!
//! [`GlmModel`] is the harness's native scoring path: a binomial GLM with
//! named coefficients. A second, logically distinct model is derived from a
//! trained one via [`GlmModel::with_coefficients`]; the base model is never
//! mutated. Both artifact kinds are materialized by
//! [`GlmModel::export_artifact`]: the class kind as generated standalone
//! scoring source, the packaged kind as a self-contained JSON bundle.
//!
//! Training itself is an external collaborator behind the [`Trainer`]
//! trait.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coeffs::{CoefficientTable, INTERCEPT_KEY};
use crate::data::Frame;
use crate::scoring::{sigmoid, ScoreError};

/// Column name for the predicted class label.
pub const LABEL_COLUMN: &str = "predict";
/// Column name for the class-0 probability.
pub const P0_COLUMN: &str = "p0";
/// Column name for the class-1 probability.
pub const P1_COLUMN: &str = "p1";

// =============================================================================
// Errors
// =============================================================================

/// Coefficient injection failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectError {
    #[error(
        "coefficient table does not match the model schema \
         (missing: {missing:?}, unknown: {unknown:?})"
    )]
    IncompatiblePredictorSet {
        /// Names the schema requires but the table omits.
        missing: Vec<String>,
        /// Names the table carries but the schema does not know.
        unknown: Vec<String>,
    },
}

/// Artifact export failure.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize model bundle: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Training failure reported by the external backend.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("training backend failure: {0}")]
    Backend(String),
}

// =============================================================================
// Trainer seam
// =============================================================================

/// External model-training collaborator.
///
/// The harness never trains models itself; it only requires that some
/// backend can produce a [`GlmModel`] whose schema matches the given
/// predictors. The trained coefficients are irrelevant: the pipeline
/// replaces them via [`GlmModel::with_coefficients`] immediately after
/// training.
pub trait Trainer {
    /// Train a binomial model on `data` with the given predictor columns
    /// and response column.
    fn train(
        &self,
        data: &Frame,
        predictors: &[String],
        response: &str,
    ) -> Result<GlmModel, TrainError>;
}

// =============================================================================
// Artifact kinds
// =============================================================================

/// The two artifact variants a model can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Generated scoring source that an external toolchain compiles.
    Class,
    /// Self-contained portable bundle executed as-is.
    Packaged,
}

/// A materialized artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

// =============================================================================
// GlmModel
// =============================================================================

/// A binomial GLM: ordered predictors, one weight each, plus an intercept.
///
/// `predict` applies the logistic link to the linear predictor of each row
/// and emits a three-column frame: predicted label (0.5 threshold on the
/// class-1 probability), `p0`, and `p1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmModel {
    id: String,
    predictors: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
    standardize: bool,
}

impl GlmModel {
    /// Create a model from ordered predictors and their weights.
    ///
    /// # Panics
    ///
    /// Panics if `weights.len()` does not match `predictors.len()`.
    pub fn new<S: Into<String>>(
        id: S,
        predictors: Vec<String>,
        weights: Vec<f64>,
        intercept: f64,
    ) -> Self {
        assert_eq!(
            weights.len(),
            predictors.len(),
            "weights length {} doesn't match predictor count {}",
            weights.len(),
            predictors.len()
        );
        Self {
            id: id.into(),
            predictors,
            weights,
            intercept,
            standardize: false,
        }
    }

    /// Set the standardization flag inherited by derived models.
    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    /// Model identifier.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ordered predictor names.
    #[inline]
    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    /// Intercept weight.
    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Weight for a named predictor, if it is part of the schema.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.predictors
            .iter()
            .position(|p| p == name)
            .map(|i| self.weights[i])
    }

    /// Whether inputs are standardized before scoring.
    #[inline]
    pub fn standardize(&self) -> bool {
        self.standardize
    }

    /// Model id reduced to `[A-Za-z0-9_]`, used for artifact file names.
    pub fn sanitized_id(&self) -> String {
        self.id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    // =========================================================================
    // Coefficient injection
    // =========================================================================

    /// Derive a new model with the table's coefficients substituted.
    ///
    /// The base model is unchanged; the derived model inherits everything
    /// except the weights. The table must match the schema exactly: every
    /// schema predictor present, no extra names, intercept included. There
    /// is no implicit zero-fill.
    ///
    /// # Errors
    ///
    /// [`InjectError::IncompatiblePredictorSet`] listing the missing and
    /// unknown names.
    pub fn with_coefficients(
        &self,
        coeffs: &CoefficientTable,
    ) -> Result<GlmModel, InjectError> {
        let required: BTreeSet<&str> =
            self.predictors.iter().map(String::as_str).collect();

        let mut missing = Vec::new();
        let mut weights = Vec::with_capacity(self.predictors.len());
        for name in &self.predictors {
            match coeffs.get(name) {
                Some(w) => weights.push(w),
                None => missing.push(name.clone()),
            }
        }
        let unknown: Vec<String> = coeffs
            .predictor_names()
            .filter(|n| !required.contains(n))
            .map(|n| n.to_string())
            .collect();

        let intercept = coeffs.intercept();
        if intercept.is_none() {
            missing.push(INTERCEPT_KEY.to_string());
        }

        match intercept {
            Some(intercept) if missing.is_empty() && unknown.is_empty() => Ok(GlmModel {
                id: format!("{}_injected", self.id),
                predictors: self.predictors.clone(),
                weights,
                intercept,
                standardize: self.standardize,
            }),
            _ => Err(InjectError::IncompatiblePredictorSet { missing, unknown }),
        }
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Score every row of `frame`.
    ///
    /// Returns a frame with columns `predict`, `p0`, `p1`; rows are aligned
    /// with the input.
    ///
    /// # Errors
    ///
    /// [`ScoreError::MissingColumn`] if a schema predictor has no column in
    /// the frame.
    pub fn predict(&self, frame: &Frame) -> Result<Frame, ScoreError> {
        let mut col_indices = Vec::with_capacity(self.predictors.len());
        for name in &self.predictors {
            let col = frame
                .column_index(name)
                .ok_or_else(|| ScoreError::MissingColumn(name.clone()))?;
            col_indices.push(col);
        }

        let mut cells = Vec::with_capacity(frame.n_rows() * 3);
        for row in 0..frame.n_rows() {
            let mut z = self.intercept;
            for (i, &col) in col_indices.iter().enumerate() {
                z += self.weights[i] * frame.get(row, col);
            }
            let p1 = sigmoid(z);
            let label = if p1 > 0.5 { 1.0 } else { 0.0 };
            cells.push(label);
            cells.push(1.0 - p1);
            cells.push(p1);
        }

        Ok(Frame::from_raw(
            vec![
                LABEL_COLUMN.to_string(),
                P0_COLUMN.to_string(),
                P1_COLUMN.to_string(),
            ],
            cells,
        ))
    }

    // =========================================================================
    // Artifact export
    // =========================================================================

    /// Materialize a scoring artifact under `dir`.
    ///
    /// The class kind writes `<sanitized_id>.rs`, a standalone generated
    /// scorer an external toolchain can compile. The packaged kind writes
    /// `<sanitized_id>.bundle.json`, a self-describing bundle executed
    /// as-is.
    ///
    /// # Errors
    ///
    /// [`ExportError`] on filesystem or serialization failure.
    pub fn export_artifact(
        &self,
        kind: ArtifactKind,
        dir: &Path,
    ) -> Result<ArtifactHandle, ExportError> {
        let path = match kind {
            ArtifactKind::Class => {
                let path = dir.join(format!("{}.rs", self.sanitized_id()));
                fs::write(&path, self.class_source()).map_err(|source| ExportError::Io {
                    path: path.clone(),
                    source,
                })?;
                path
            }
            ArtifactKind::Packaged => {
                let path = dir.join(format!("{}.bundle.json", self.sanitized_id()));
                let bundle = serde_json::to_string_pretty(self)?;
                fs::write(&path, bundle).map_err(|source| ExportError::Io {
                    path: path.clone(),
                    source,
                })?;
                path
            }
        };
        Ok(ArtifactHandle { kind, path })
    }

    /// Generated standalone scoring source for the class artifact.
    ///
    /// The emitted program speaks the external execution contract itself:
    /// `--input <csv> --output <csv> --decimal`. Coefficients are inlined
    /// as shortest round-trip literals, so the compiled artifact scores
    /// with exactly the weights of this model.
    fn class_source(&self) -> String {
        let mut src = String::new();
        let _ = writeln!(src, "// Generated scorer for model {}.", self.id);
        let _ = writeln!(src, "// Reads a CSV with a one-line header, appends");
        let _ = writeln!(src, "// predict/p0/p1 columns, writes plain decimal output.");
        let _ = writeln!(src);
        let _ = writeln!(src, "const INTERCEPT: f64 = {:?};", self.intercept);
        let _ = writeln!(src, "const PREDICTORS: [&str; {}] = [", self.predictors.len());
        for name in &self.predictors {
            let _ = writeln!(src, "    {name:?},");
        }
        let _ = writeln!(src, "];");
        let _ = writeln!(src, "const WEIGHTS: [f64; {}] = [", self.weights.len());
        for w in &self.weights {
            let _ = writeln!(src, "    {w:?},");
        }
        let _ = writeln!(src, "];");
        let _ = writeln!(
            src,
            r#"
fn sigmoid(z: f64) -> f64 {{
    if z >= 0.0 {{
        1.0 / (1.0 + (-z).exp())
    }} else {{
        let e = z.exp();
        e / (1.0 + e)
    }}
}}

fn score(row: &[f64], columns: &[usize]) -> f64 {{
    let mut z = INTERCEPT;
    for (w, &c) in WEIGHTS.iter().zip(columns) {{
        z += w * row[c];
    }}
    sigmoid(z)
}}

fn arg(args: &[String], flag: &str) -> String {{
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .unwrap_or_else(|| panic!("missing {{flag}}"))
        .clone()
}}

fn main() {{
    let args: Vec<String> = std::env::args().collect();
    let input = arg(&args, "--input");
    let output = arg(&args, "--output");

    let text = std::fs::read_to_string(&input).expect("read input");
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().expect("header").split(',').collect();
    let columns: Vec<usize> = PREDICTORS
        .iter()
        .map(|p| header.iter().position(|h| h == p).expect("predictor column"))
        .collect();

    let mut out = String::from("predict,p0,p1\n");
    for line in lines {{
        let row: Vec<f64> = line
            .split(',')
            .map(|f| f.parse().unwrap_or(f64::NAN))
            .collect();
        let p1 = score(&row, &columns);
        let label = if p1 > 0.5 {{ 1 }} else {{ 0 }};
        out.push_str(&format!("{{label}},{{}},{{}}\n", 1.0 - p1, p1));
    }}
    std::fs::write(&output, out).expect("write output");
}}
"#
        );
        src
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn base_model() -> GlmModel {
        GlmModel::new(
            "glm-fit #1",
            vec!["age".to_string(), "income".to_string()],
            vec![0.1, 0.2],
            0.0,
        )
    }

    fn sample_frame() -> Frame {
        Frame::from_rows(
            vec!["age", "income"],
            &[
                vec![30.0, 50_000.0],
                vec![45.0, 80_000.0],
                vec![60.0, 30_000.0],
            ],
        )
        .unwrap()
    }

    fn injected_model() -> GlmModel {
        let coeffs = CoefficientTable::from_entries([
            ("Intercept", -0.5),
            ("age", 0.02),
            ("income", 0.00001),
        ])
        .unwrap();
        base_model().with_coefficients(&coeffs).unwrap()
    }

    #[test]
    #[should_panic(expected = "weights length")]
    fn new_rejects_mismatched_weights() {
        GlmModel::new("m", vec!["a".to_string()], vec![1.0, 2.0], 0.0);
    }

    #[test]
    fn sanitized_id_keeps_alphanumerics() {
        assert_eq!(base_model().sanitized_id(), "glm_fit__1");
    }

    #[test]
    fn inject_replaces_weights_and_keeps_base_unchanged() {
        let base = base_model().with_standardize(true);
        let coeffs = CoefficientTable::from_entries([
            ("Intercept", -0.5),
            ("age", 0.02),
            ("income", 0.00001),
        ])
        .unwrap();

        let injected = base.with_coefficients(&coeffs).unwrap();
        assert_eq!(injected.coefficient("age"), Some(0.02));
        assert_eq!(injected.intercept(), -0.5);
        assert!(injected.standardize());
        assert_eq!(injected.id(), "glm-fit #1_injected");

        // Base keeps its original weights.
        assert_eq!(base.coefficient("age"), Some(0.1));
        assert_eq!(base.intercept(), 0.0);
    }

    #[test]
    fn inject_rejects_missing_predictor() {
        let coeffs =
            CoefficientTable::from_entries([("Intercept", 0.0), ("age", 0.02)]).unwrap();
        let err = base_model().with_coefficients(&coeffs).unwrap_err();
        match err {
            InjectError::IncompatiblePredictorSet { missing, unknown } => {
                assert_eq!(missing, vec!["income".to_string()]);
                assert!(unknown.is_empty());
            }
        }
    }

    #[test]
    fn inject_rejects_unknown_predictor() {
        let coeffs = CoefficientTable::from_entries([
            ("Intercept", 0.0),
            ("age", 0.02),
            ("income", 0.1),
            ("height", 0.3),
        ])
        .unwrap();
        let err = base_model().with_coefficients(&coeffs).unwrap_err();
        match err {
            InjectError::IncompatiblePredictorSet { missing, unknown } => {
                assert!(missing.is_empty());
                assert_eq!(unknown, vec!["height".to_string()]);
            }
        }
    }

    #[test]
    fn inject_rejects_missing_intercept() {
        let coeffs =
            CoefficientTable::from_entries([("age", 0.02), ("income", 0.1)]).unwrap();
        let err = base_model().with_coefficients(&coeffs).unwrap_err();
        match err {
            InjectError::IncompatiblePredictorSet { missing, unknown } => {
                assert_eq!(missing, vec![INTERCEPT_KEY.to_string()]);
                assert!(unknown.is_empty());
            }
        }
    }

    #[test]
    fn predict_emits_label_and_probabilities() {
        let output = injected_model().predict(&sample_frame()).unwrap();
        assert_eq!(output.columns(), &[LABEL_COLUMN, P0_COLUMN, P1_COLUMN]);
        assert_eq!(output.n_rows(), 3);

        // Row 0: z = -0.5 + 0.6 + 0.5 = 0.6.
        assert_abs_diff_eq!(output.get(0, 2), sigmoid(0.6), epsilon = 1e-15);
        assert_abs_diff_eq!(
            output.get(0, 1),
            1.0 - output.get(0, 2),
            epsilon = 1e-15
        );
        assert_eq!(output.get(0, 0), 1.0);
    }

    #[test]
    fn injected_predict_keeps_shape_of_base_predict() {
        let base_out = base_model().predict(&sample_frame()).unwrap();
        let injected_out = injected_model().predict(&sample_frame()).unwrap();
        assert_eq!(base_out.shape(), injected_out.shape());
        assert_eq!(base_out.columns(), injected_out.columns());
    }

    #[test]
    fn predict_rejects_missing_column() {
        let frame = Frame::from_rows(vec!["age"], &[vec![30.0]]).unwrap();
        let err = base_model().predict(&frame).unwrap_err();
        assert_eq!(err, ScoreError::MissingColumn("income".to_string()));
    }

    #[test]
    fn export_class_artifact_inlines_coefficients() {
        let dir = tempfile::tempdir().unwrap();
        let handle = injected_model()
            .export_artifact(ArtifactKind::Class, dir.path())
            .unwrap();

        assert_eq!(handle.kind, ArtifactKind::Class);
        let source = std::fs::read_to_string(&handle.path).unwrap();
        assert!(source.contains("const INTERCEPT: f64 = -0.5;"));
        assert!(source.contains("\"age\""));
        assert!(source.contains("1e-5") || source.contains("0.00001"));
    }

    #[test]
    fn export_packaged_artifact_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let model = injected_model();
        let handle = model
            .export_artifact(ArtifactKind::Packaged, dir.path())
            .unwrap();

        assert_eq!(handle.kind, ArtifactKind::Packaged);
        let text = std::fs::read_to_string(&handle.path).unwrap();
        let loaded: GlmModel = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, model);
    }
}
