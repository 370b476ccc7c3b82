//! JSON artifact writer for pipeline stage outputs.

use std::fs;
use std::path::{Path, PathBuf};

use lek_rf::{
    ClassDistribution, CrossValidationResult, ImportanceMetric, ModelSelectionResult,
    PartialDependenceCurve, PermutationImportance, RandomForestResult, SignificanceResult,
    ThresholdCandidate,
};
use lek_screen::ScreenReport;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ExperimentName, Response};

/// Writes stage results to JSON files and names the model binary.
///
/// Creates the output directory on construction if it does not exist. Output
/// files are named `{experiment}_screen.json` for the covariate screen and
/// `{experiment}_{response}_{stage}.json` for the per-response stages.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write a collinearity screen report to `{experiment}_screen.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_screen(&self, report: &ScreenReport) -> Result<(), IoError> {
        let path = self
            .output_dir
            .join(format!("{}_screen.json", self.experiment.as_str()));

        let hinge_pins: Vec<HingePinEntry> = report
            .hinge_pins
            .iter()
            .map(|pin| HingePinEntry {
                left_out: &pin.left_out,
                still_flagged: &pin.still_flagged,
            })
            .collect();

        let artifact = ScreenArtifact {
            experiment: self.experiment.as_str(),
            threshold: report.threshold,
            n_samples: report.n_samples,
            n_covariates: report.n_covariates,
            flagged: &report.flagged,
            kept: &report.kept,
            hinge_pins,
        };

        let json = serde_json::to_string_pretty(&artifact).expect("serialization cannot fail");
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "screen report written");
        Ok(())
    }

    /// Write a threshold-grid selection result to
    /// `{experiment}_{response}_selection.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(response = %response))]
    pub fn write_selection(
        &self,
        response: Response,
        result: &ModelSelectionResult,
    ) -> Result<(), IoError> {
        let path = self.output_dir.join(format!(
            "{}_{}_selection.json",
            self.experiment.as_str(),
            response.as_str()
        ));

        let artifact = SelectionArtifact {
            experiment: self.experiment.as_str(),
            response: response.as_str(),
            metric: result.metric(),
            winner: result.winner(),
            candidates: result.candidates(),
        };

        let json = serde_json::to_string_pretty(&artifact).expect("serialization cannot fail");
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "selection result written");
        Ok(())
    }

    /// Write a final fit summary to `{experiment}_{response}_fit.json`.
    ///
    /// Covers training metadata, the OOB score with its convergence
    /// trajectories, both importance rankings, partial dependence curves,
    /// and the proximity matrix when one was computed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(response = %response))]
    pub fn write_fit(
        &self,
        response: Response,
        result: &RandomForestResult,
        permutation: &[PermutationImportance],
        curves: &[PartialDependenceCurve],
    ) -> Result<(), IoError> {
        let path = self.output_dir.join(format!(
            "{}_{}_fit.json",
            self.experiment.as_str(),
            response.as_str()
        ));

        let meta = result.metadata();
        let oob = result.oob_score().map(|score| OobEntry {
            accuracy: score.accuracy,
            error: score.error,
            class_errors: &score.class_errors,
            n_oob_samples: score.n_oob_samples,
            error_trajectory: &score.error_trajectory,
            class_error_trajectories: &score.class_error_trajectories,
            confusion_matrix: score.confusion.as_rows(),
        });

        let impurity_importances: Vec<ImportanceEntry> = result
            .importances()
            .iter()
            .map(|f| ImportanceEntry {
                name: &f.name,
                importance: f.importance,
                rank: f.rank,
            })
            .collect();
        let permutation_importances: Vec<PermutationEntry> = permutation
            .iter()
            .map(|f| PermutationEntry {
                name: &f.name,
                importance: f.importance,
                std: f.std,
                rank: f.rank,
            })
            .collect();
        let partial_dependence: Vec<CurveEntry> = curves
            .iter()
            .map(|c| CurveEntry {
                feature: &c.feature,
                class: c.class,
                grid: &c.grid,
                response: &c.response,
            })
            .collect();

        let artifact = FitArtifact {
            experiment: self.experiment.as_str(),
            response: response.as_str(),
            n_trees: meta.n_trees,
            n_features: meta.n_features,
            n_classes: meta.n_classes,
            n_samples: meta.n_samples,
            max_features_resolved: meta.max_features_resolved,
            covariates: result.forest().feature_names(),
            oob,
            impurity_importances,
            permutation_importances,
            partial_dependence,
            proximity: result.proximity().map(lek_rf::ProximityMatrix::to_rows),
        };

        let json = serde_json::to_string_pretty(&artifact).expect("serialization cannot fail");
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "fit summary written");
        Ok(())
    }

    /// Write validation results to `{experiment}_{response}_validation.json`.
    ///
    /// Bundles the repeated holdout errors with the label-permutation test.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(response = %response))]
    pub fn write_validation(
        &self,
        response: Response,
        validation: &CrossValidationResult,
        significance: &SignificanceResult,
    ) -> Result<(), IoError> {
        let path = self.output_dir.join(format!(
            "{}_{}_validation.json",
            self.experiment.as_str(),
            response.as_str()
        ));

        let artifact = ValidationArtifact {
            experiment: self.experiment.as_str(),
            response: response.as_str(),
            holdout_fraction: validation.holdout_fraction,
            n_reps: validation.n_reps,
            holdout_errors: &validation.holdout_errors,
            mean_error: validation.mean_error,
            std_error: validation.std_error,
            class_errors: &validation.class_errors,
            significance: SignificanceEntry {
                observed_error: significance.observed_error,
                p_value: significance.p_value,
                n_permutations: significance.n_permutations,
                permuted_errors: &significance.permuted_errors,
            },
        };

        let json = serde_json::to_string_pretty(&artifact).expect("serialization cannot fail");
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "validation result written");
        Ok(())
    }

    /// Write predictions to `{experiment}_{response}_predictions.json`.
    ///
    /// One entry per input row, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(response = %response, n_rows = distributions.len()))]
    pub fn write_predictions(
        &self,
        response: Response,
        distributions: &[ClassDistribution],
    ) -> Result<(), IoError> {
        let path = self.output_dir.join(format!(
            "{}_{}_predictions.json",
            self.experiment.as_str(),
            response.as_str()
        ));

        let predictions: Vec<PredictionEntry> = distributions
            .iter()
            .enumerate()
            .map(|(row, dist)| PredictionEntry {
                row,
                predicted_class: dist.predicted_class(),
                probabilities: dist.as_slice(),
            })
            .collect();

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            response: response.as_str(),
            n_rows: distributions.len(),
            predictions,
        };

        let json = serde_json::to_string_pretty(&artifact).expect("serialization cannot fail");
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "predictions written");
        Ok(())
    }

    /// Return the path where the model binary for a response should be saved.
    ///
    /// Does not write anything; just computes
    /// `{output_dir}/{experiment}_{response}_model.bin`.
    #[must_use]
    pub fn model_path(&self, response: Response) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}_model.bin",
            self.experiment.as_str(),
            response.as_str()
        ))
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct ScreenArtifact<'a> {
    experiment: &'a str,
    threshold: f64,
    n_samples: usize,
    n_covariates: usize,
    flagged: &'a [String],
    kept: &'a [String],
    hinge_pins: Vec<HingePinEntry<'a>>,
}

#[derive(Serialize)]
struct HingePinEntry<'a> {
    left_out: &'a str,
    still_flagged: &'a [String],
}

#[derive(Serialize)]
struct SelectionArtifact<'a> {
    experiment: &'a str,
    response: &'a str,
    metric: ImportanceMetric,
    winner: &'a ThresholdCandidate,
    candidates: &'a [ThresholdCandidate],
}

#[derive(Serialize)]
struct FitArtifact<'a> {
    experiment: &'a str,
    response: &'a str,
    n_trees: usize,
    n_features: usize,
    n_classes: usize,
    n_samples: usize,
    max_features_resolved: usize,
    covariates: &'a [String],
    oob: Option<OobEntry<'a>>,
    impurity_importances: Vec<ImportanceEntry<'a>>,
    permutation_importances: Vec<PermutationEntry<'a>>,
    partial_dependence: Vec<CurveEntry<'a>>,
    proximity: Option<Vec<Vec<f64>>>,
}

#[derive(Serialize)]
struct OobEntry<'a> {
    accuracy: f64,
    error: f64,
    class_errors: &'a [f64],
    n_oob_samples: usize,
    error_trajectory: &'a [f64],
    class_error_trajectories: &'a [Vec<f64>],
    confusion_matrix: &'a [Vec<usize>],
}

#[derive(Serialize)]
struct ImportanceEntry<'a> {
    name: &'a str,
    importance: f64,
    rank: usize,
}

#[derive(Serialize)]
struct PermutationEntry<'a> {
    name: &'a str,
    importance: f64,
    std: f64,
    rank: usize,
}

#[derive(Serialize)]
struct CurveEntry<'a> {
    feature: &'a str,
    class: usize,
    grid: &'a [f64],
    response: &'a [f64],
}

#[derive(Serialize)]
struct ValidationArtifact<'a> {
    experiment: &'a str,
    response: &'a str,
    holdout_fraction: f64,
    n_reps: usize,
    holdout_errors: &'a [f64],
    mean_error: f64,
    std_error: f64,
    class_errors: &'a [f64],
    significance: SignificanceEntry<'a>,
}

#[derive(Serialize)]
struct SignificanceEntry<'a> {
    observed_error: f64,
    p_value: f64,
    n_permutations: usize,
    permuted_errors: &'a [f64],
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    response: &'a str,
    n_rows: usize,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    row: usize,
    predicted_class: usize,
    probabilities: &'a [f64],
}
