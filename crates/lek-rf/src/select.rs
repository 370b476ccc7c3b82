//! Covariate subset selection over an importance-threshold grid.
//!
//! A ranking forest is fitted once on the full covariate set, its importances
//! are rescaled so the top covariate scores 1.0, and a candidate forest is
//! refitted for each threshold keeping only covariates at or above it. The
//! winning subset has the lowest OOB error; ties go to the smaller subset,
//! then to the lower threshold.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::{OobMode, ProximityMode, RandomForestConfig};
use crate::error::RfError;

/// Importance measure used to rank covariates before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceMetric {
    /// Permutation importance on OOB samples.
    MeanDecreaseAccuracy,
    /// Gini importance aggregated over all splits.
    MeanDecreaseImpurity,
}

/// Configuration for threshold-grid covariate selection.
///
/// # Defaults
///
/// | Parameter | Default |
/// |---|---|
/// | `thresholds` | `0.1, 0.2, ..., 0.9` |
/// | `metric` | `MeanDecreaseAccuracy` |
/// | `seed` | `42` |
#[derive(Debug, Clone)]
pub struct ModelSelection {
    thresholds: Vec<f64>,
    metric: ImportanceMetric,
    seed: u64,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSelection {
    /// Create a selection config with the default threshold grid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            thresholds: (1..=9).map(|i| f64::from(i) / 10.0).collect(),
            metric: ImportanceMetric::MeanDecreaseAccuracy,
            seed: 42,
        }
    }

    /// Replace the threshold grid.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyThresholdGrid`] | `thresholds` is empty |
    /// | [`RfError::InvalidThreshold`] | a threshold is not finite or not in `(0.0, 1.0]` |
    /// | [`RfError::NonAscendingThresholds`] | grid is not strictly ascending |
    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Result<Self, RfError> {
        if thresholds.is_empty() {
            return Err(RfError::EmptyThresholdGrid);
        }
        for &t in &thresholds {
            if !t.is_finite() || t <= 0.0 || t > 1.0 {
                return Err(RfError::InvalidThreshold { threshold: t });
            }
        }
        for pair in thresholds.windows(2) {
            if pair[1] <= pair[0] {
                return Err(RfError::NonAscendingThresholds {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        self.thresholds = thresholds;
        Ok(self)
    }

    /// Set the importance metric used for ranking.
    #[must_use]
    pub fn with_metric(mut self, metric: ImportanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the random seed for the ranking fit and the per-threshold refits.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the threshold grid.
    #[must_use]
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Return the importance metric.
    #[must_use]
    pub fn metric(&self) -> ImportanceMetric {
        self.metric
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run the threshold grid and pick the winning covariate subset.
    ///
    /// The ranking forest and every candidate refit run with OOB evaluation
    /// enabled regardless of `config`; proximity is skipped until the final
    /// fit on the winning subset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyCovariateSubset`] | a threshold retains no covariates |
    /// | [`RfError::MissingOobScore`] | a refit produced no OOB score |
    ///
    /// Also returns any error from the underlying forest fits.
    #[instrument(skip_all, fields(n_thresholds = self.thresholds.len(), n_samples = features.len()))]
    pub fn evaluate(
        &self,
        config: &RandomForestConfig,
        features: &[Vec<f64>],
        labels: &[usize],
        feature_names: &[String],
    ) -> Result<ModelSelectionResult, RfError> {
        let base = config
            .clone()
            .with_oob_mode(OobMode::Enabled)
            .with_proximity_mode(ProximityMode::Disabled);

        let ranking = base
            .clone()
            .with_seed(self.seed)
            .fit(features, labels, feature_names)?;

        let scores_by_name: HashMap<String, f64> = match self.metric {
            ImportanceMetric::MeanDecreaseAccuracy => ranking
                .permutation_importances(features, labels, self.seed)
                .into_iter()
                .map(|p| (p.name, p.importance))
                .collect(),
            ImportanceMetric::MeanDecreaseImpurity => ranking
                .importances()
                .iter()
                .map(|r| (r.name.clone(), r.importance))
                .collect(),
        };
        let raw: Vec<f64> = feature_names
            .iter()
            .map(|name| scores_by_name.get(name).copied().unwrap_or(0.0))
            .collect();

        // Rescale so the top covariate scores exactly 1.0 and the grid spans
        // the whole ranking. If no covariate has positive importance, every
        // threshold empties the subset and selection fails on the first one.
        let max = raw.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let scaled: Vec<f64> = if max > 0.0 {
            raw.iter().map(|&v| v / max).collect()
        } else {
            vec![0.0; raw.len()]
        };

        let mut candidates = Vec::with_capacity(self.thresholds.len());
        for (idx, &threshold) in self.thresholds.iter().enumerate() {
            let retained: Vec<usize> = (0..feature_names.len())
                .filter(|&i| scaled[i] >= threshold)
                .collect();
            if retained.is_empty() {
                return Err(RfError::EmptyCovariateSubset { threshold });
            }

            let subset_features: Vec<Vec<f64>> = features
                .iter()
                .map(|row| retained.iter().map(|&i| row[i]).collect())
                .collect();
            let subset_names: Vec<String> = retained
                .iter()
                .map(|&i| feature_names[i].clone())
                .collect();

            let refit = base
                .clone()
                .with_seed(self.seed.wrapping_add(idx as u64 + 1))
                .fit(&subset_features, labels, &subset_names)?;
            let oob = refit.oob_score().ok_or(RfError::MissingOobScore)?;

            info!(
                threshold,
                oob_error = oob.error,
                n_covariates = retained.len(),
                "threshold candidate evaluated"
            );

            candidates.push(ThresholdCandidate {
                threshold,
                oob_error: oob.error,
                class_errors: oob.class_errors.clone(),
                n_covariates: retained.len(),
                covariates: subset_names,
            });
        }

        // Lowest OOB error wins; at equal error the smaller subset wins; at
        // equal error and size the earlier (lower) threshold is kept.
        let mut winner_index = 0;
        for (idx, cand) in candidates.iter().enumerate().skip(1) {
            let best = &candidates[winner_index];
            if cand.oob_error < best.oob_error
                || (cand.oob_error == best.oob_error && cand.n_covariates < best.n_covariates)
            {
                winner_index = idx;
            }
        }

        let winner = &candidates[winner_index];
        info!(
            threshold = winner.threshold,
            oob_error = winner.oob_error,
            n_covariates = winner.n_covariates,
            "selected covariate subset"
        );

        Ok(ModelSelectionResult {
            candidates,
            winner_index,
            metric: self.metric,
        })
    }
}

/// One evaluated point on the threshold grid.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdCandidate {
    /// Importance threshold for this candidate.
    pub threshold: f64,
    /// OOB error of the refitted forest.
    pub oob_error: f64,
    /// Per-class OOB error of the refitted forest.
    pub class_errors: Vec<f64>,
    /// Number of covariates retained.
    pub n_covariates: usize,
    /// Retained covariate names in original column order.
    pub covariates: Vec<String>,
}

/// Full threshold-grid outcome with the winning candidate marked.
#[derive(Debug, Clone)]
pub struct ModelSelectionResult {
    candidates: Vec<ThresholdCandidate>,
    winner_index: usize,
    metric: ImportanceMetric,
}

impl ModelSelectionResult {
    /// Return every evaluated candidate in ascending threshold order.
    #[must_use]
    pub fn candidates(&self) -> &[ThresholdCandidate] {
        &self.candidates
    }

    /// Return the winning candidate.
    #[must_use]
    pub fn winner(&self) -> &ThresholdCandidate {
        &self.candidates[self.winner_index]
    }

    /// Return the winning covariate subset in original column order.
    #[must_use]
    pub fn selected_covariates(&self) -> &[String] {
        &self.winner().covariates
    }

    /// Return the importance metric the ranking used.
    #[must_use]
    pub fn metric(&self) -> ImportanceMetric {
        self.metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two informative covariates and two noise columns.
    fn make_selection_data() -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let x = i as f64 * 0.1;
            features.push(vec![x, x * 0.5, (i % 7) as f64, (i % 3) as f64]);
            labels.push(0);
        }
        for i in 0..30 {
            let x = 10.0 + i as f64 * 0.1;
            features.push(vec![x, x * 0.5, (i % 7) as f64, (i % 3) as f64]);
            labels.push(1);
        }
        let names = vec![
            "sagebrush_cover".to_string(),
            "shrub_height".to_string(),
            "noise_a".to_string(),
            "noise_b".to_string(),
        ];
        (features, labels, names)
    }

    #[test]
    fn winner_keeps_informative_covariates() {
        let (features, labels, names) = make_selection_data();
        let config = RandomForestConfig::new(31).unwrap().with_seed(42);
        let selection = ModelSelection::new().with_seed(42);

        let result = selection.evaluate(&config, &features, &labels, &names).unwrap();

        assert_eq!(result.candidates().len(), 9);
        let winner = result.winner();
        assert!(
            winner.covariates.contains(&"sagebrush_cover".to_string()),
            "winner should retain the separating covariate: {:?}",
            winner.covariates
        );
        assert!(winner.oob_error <= result.candidates()[0].oob_error);
        for cand in result.candidates() {
            assert_eq!(cand.n_covariates, cand.covariates.len());
            assert!((0.0..=1.0).contains(&cand.oob_error));
        }
    }

    #[test]
    fn subset_sizes_never_grow_with_threshold() {
        let (features, labels, names) = make_selection_data();
        let config = RandomForestConfig::new(21).unwrap().with_seed(42);
        let selection = ModelSelection::new().with_seed(42);

        let result = selection.evaluate(&config, &features, &labels, &names).unwrap();
        for pair in result.candidates().windows(2) {
            assert!(
                pair[1].n_covariates <= pair[0].n_covariates,
                "higher threshold cannot retain more covariates"
            );
        }
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let (features, labels, names) = make_selection_data();
        let config = RandomForestConfig::new(21).unwrap().with_seed(42);
        let selection = ModelSelection::new().with_seed(7);

        let a = selection.evaluate(&config, &features, &labels, &names).unwrap();
        let b = selection.evaluate(&config, &features, &labels, &names).unwrap();

        assert_eq!(a.winner().threshold, b.winner().threshold);
        assert_eq!(a.winner().covariates, b.winner().covariates);
        for (x, y) in a.candidates().iter().zip(b.candidates().iter()) {
            assert_eq!(x.oob_error, y.oob_error);
        }
    }

    #[test]
    fn threshold_grid_validation() {
        assert!(matches!(
            ModelSelection::new().with_thresholds(vec![]),
            Err(RfError::EmptyThresholdGrid)
        ));
        assert!(matches!(
            ModelSelection::new().with_thresholds(vec![0.0, 0.5]),
            Err(RfError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            ModelSelection::new().with_thresholds(vec![0.5, 1.5]),
            Err(RfError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            ModelSelection::new().with_thresholds(vec![0.5, 0.2]),
            Err(RfError::NonAscendingThresholds { .. })
        ));
        let ok = ModelSelection::new().with_thresholds(vec![0.25, 0.5, 1.0]).unwrap();
        assert_eq!(ok.thresholds(), &[0.25, 0.5, 1.0]);
    }

    #[test]
    fn all_zero_importances_empty_the_first_threshold() {
        // Constant covariates admit no split, so every importance is zero.
        let features = vec![vec![1.0, 2.0]; 20];
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let names = vec!["flat_a".to_string(), "flat_b".to_string()];
        let config = RandomForestConfig::new(11).unwrap().with_seed(42);
        let selection = ModelSelection::new().with_seed(42);

        let err = selection
            .evaluate(&config, &features, &labels, &names)
            .unwrap_err();
        assert!(matches!(
            err,
            RfError::EmptyCovariateSubset { threshold } if (threshold - 0.1).abs() < f64::EPSILON
        ));
    }
}
