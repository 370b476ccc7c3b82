//! Repeated stratified holdout cross-validation for Random Forest.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::config::{OobMode, ProximityMode, RandomForestConfig};
use crate::error::RfError;

/// Cross-validation configuration.
///
/// Construct via [`CrossValidation::new`], then chain `with_seed` if desired.
#[derive(Debug, Clone)]
pub struct CrossValidation {
    holdout_fraction: f64,
    n_reps: usize,
    seed: u64,
}

/// Results of repeated stratified holdout validation.
#[derive(Debug)]
pub struct CrossValidationResult {
    /// Misclassification error for each repetition.
    pub holdout_errors: Vec<f64>,
    /// Mean error across repetitions.
    pub mean_error: f64,
    /// Standard deviation of repetition errors.
    pub std_error: f64,
    /// Per-class error pooled over all repetitions.
    pub class_errors: Vec<f64>,
    /// Number of repetitions.
    pub n_reps: usize,
    /// Fraction of each class held out per repetition.
    pub holdout_fraction: f64,
    /// Total number of samples.
    pub n_samples: usize,
}

impl CrossValidation {
    /// Create a cross-validation config.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidHoldoutFraction`] | `holdout_fraction` not finite or not in `(0.0, 1.0)` |
    /// | [`RfError::InvalidRepetitions`] | `n_reps == 0` |
    pub fn new(holdout_fraction: f64, n_reps: usize) -> Result<Self, RfError> {
        if !holdout_fraction.is_finite() || holdout_fraction <= 0.0 || holdout_fraction >= 1.0 {
            return Err(RfError::InvalidHoldoutFraction {
                fraction: holdout_fraction,
            });
        }
        if n_reps == 0 {
            return Err(RfError::InvalidRepetitions { n_reps });
        }
        Ok(Self {
            holdout_fraction,
            n_reps,
            seed: 42,
        })
    }

    /// Set the random seed for holdout partitioning and the per-rep fits.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the holdout fraction.
    #[must_use]
    pub fn holdout_fraction(&self) -> f64 {
        self.holdout_fraction
    }

    /// Return the number of repetitions.
    #[must_use]
    pub fn n_reps(&self) -> usize {
        self.n_reps
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run repeated stratified holdout validation.
    ///
    /// Each repetition draws `holdout_fraction` of every class (rounded, and
    /// always leaving at least one sample of the class in training), fits a
    /// forest on the remainder, and scores the held-out samples. Repetitions
    /// run in parallel with seeds derived from the validation seed, so results
    /// do not depend on scheduling order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | zero samples |
    /// | [`RfError::LabelCountMismatch`] | labels and rows disagree |
    /// | [`RfError::EmptyHoldout`] | the fraction rounds to zero held-out samples |
    ///
    /// Also returns any error from the underlying forest fits.
    #[instrument(skip_all, fields(n_reps = self.n_reps, n_samples = features.len()))]
    pub fn evaluate(
        &self,
        config: &RandomForestConfig,
        features: &[Vec<f64>],
        labels: &[usize],
        feature_names: &[String],
    ) -> Result<CrossValidationResult, RfError> {
        if features.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let n_samples = features.len();
        if labels.len() != n_samples {
            return Err(RfError::LabelCountMismatch {
                n_labels: labels.len(),
                n_samples,
            });
        }
        let n_classes = labels.iter().max().copied().unwrap_or(0) + 1;

        // Group indices by class once; repetitions reshuffle within classes.
        let mut class_indices: Vec<Vec<usize>> = vec![vec![]; n_classes];
        for (i, &label) in labels.iter().enumerate() {
            class_indices[label].push(i);
        }

        // Holdout counts are per class and identical for every repetition, so
        // an empty overall holdout can be rejected before any fit.
        let hold_counts: Vec<usize> = class_indices
            .iter()
            .map(|indices| {
                let n_hold = (indices.len() as f64 * self.holdout_fraction).round() as usize;
                n_hold.min(indices.len().saturating_sub(1))
            })
            .collect();
        let n_holdout: usize = hold_counts.iter().sum();
        if n_holdout == 0 {
            return Err(RfError::EmptyHoldout {
                fraction: self.holdout_fraction,
                n_samples,
            });
        }

        let rep_outcomes: Vec<(f64, Vec<usize>)> = (0..self.n_reps)
            .into_par_iter()
            .map(|rep| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(rep as u64));

                let mut train_features = Vec::with_capacity(n_samples - n_holdout);
                let mut train_labels = Vec::with_capacity(n_samples - n_holdout);
                let mut test_features = Vec::with_capacity(n_holdout);
                let mut test_labels = Vec::with_capacity(n_holdout);

                for (class, indices) in class_indices.iter().enumerate() {
                    let mut shuffled = indices.clone();
                    shuffled.shuffle(&mut rng);
                    for (j, &idx) in shuffled.iter().enumerate() {
                        if j < hold_counts[class] {
                            test_features.push(features[idx].clone());
                            test_labels.push(labels[idx]);
                        } else {
                            train_features.push(features[idx].clone());
                            train_labels.push(labels[idx]);
                        }
                    }
                }

                let rep_config = config
                    .clone()
                    .with_seed(self.seed.wrapping_add(rep as u64))
                    .with_oob_mode(OobMode::Disabled)
                    .with_proximity_mode(ProximityMode::Disabled);
                let result = rep_config.fit(&train_features, &train_labels, feature_names)?;
                let predictions = result.forest().predict_batch(&test_features)?;

                let mut misclassified = vec![0_usize; n_classes];
                for (&pred, &truth) in predictions.iter().zip(&test_labels) {
                    if pred != truth {
                        misclassified[truth] += 1;
                    }
                }
                let total_mis: usize = misclassified.iter().sum();
                let rep_error = total_mis as f64 / n_holdout as f64;

                info!(rep, error = rep_error, "holdout repetition complete");

                Ok((rep_error, misclassified))
            })
            .collect::<Result<Vec<_>, RfError>>()?;

        let holdout_errors: Vec<f64> = rep_outcomes.iter().map(|(e, _)| *e).collect();
        let mean_error = holdout_errors.iter().sum::<f64>() / self.n_reps as f64;
        let std_error = {
            let variance = holdout_errors
                .iter()
                .map(|&e| (e - mean_error).powi(2))
                .sum::<f64>()
                / self.n_reps as f64;
            variance.sqrt()
        };

        // Pool per-class errors over repetitions; the denominator is the fixed
        // per-class holdout count times the repetition count.
        let class_errors: Vec<f64> = (0..n_classes)
            .map(|class| {
                let total = hold_counts[class] * self.n_reps;
                if total == 0 {
                    return 0.0;
                }
                let mis: usize = rep_outcomes.iter().map(|(_, m)| m[class]).sum();
                mis as f64 / total as f64
            })
            .collect();

        info!(mean_error, std_error, "cross-validation complete");

        Ok(CrossValidationResult {
            holdout_errors,
            mean_error,
            std_error,
            class_errors,
            n_reps: self.n_reps,
            holdout_fraction: self.holdout_fraction,
            n_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxFeatures;

    fn make_separable_data() -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            features.push(vec![i as f64 * 0.1, 0.5]);
            labels.push(0);
        }
        for i in 0..30 {
            features.push(vec![10.0 + i as f64 * 0.1, 0.5]);
            labels.push(1);
        }
        let names = vec!["sagebrush_cover".to_string(), "slope".to_string()];
        (features, labels, names)
    }

    #[test]
    fn separable_data_low_error() {
        let (features, labels, names) = make_separable_data();
        let rf_config = RandomForestConfig::new(21)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let cv = CrossValidation::new(0.2, 9).unwrap().with_seed(42);
        let result = cv.evaluate(&rf_config, &features, &labels, &names).unwrap();

        assert!(result.mean_error < 0.2, "mean_error = {}", result.mean_error);
        assert_eq!(result.holdout_errors.len(), 9);
        assert_eq!(result.n_reps, 9);
        assert_eq!(result.n_samples, 60);
        assert_eq!(result.class_errors.len(), 2);
        for &e in &result.holdout_errors {
            assert!((0.0..=1.0).contains(&e), "error out of range: {e}");
        }
        for &e in &result.class_errors {
            assert!((0.0..=1.0).contains(&e), "class error out of range: {e}");
        }
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let (features, labels, names) = make_separable_data();
        let rf_config = RandomForestConfig::new(11).unwrap().with_seed(42);
        let cv = CrossValidation::new(0.25, 5).unwrap().with_seed(7);

        let a = cv.evaluate(&rf_config, &features, &labels, &names).unwrap();
        let b = cv.evaluate(&rf_config, &features, &labels, &names).unwrap();
        assert_eq!(a.holdout_errors, b.holdout_errors);
        assert_eq!(a.class_errors, b.class_errors);
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(matches!(
            CrossValidation::new(0.0, 10),
            Err(RfError::InvalidHoldoutFraction { .. })
        ));
        assert!(matches!(
            CrossValidation::new(1.0, 10),
            Err(RfError::InvalidHoldoutFraction { .. })
        ));
        assert!(matches!(
            CrossValidation::new(f64::NAN, 10),
            Err(RfError::InvalidHoldoutFraction { .. })
        ));
        assert!(matches!(
            CrossValidation::new(0.2, 0),
            Err(RfError::InvalidRepetitions { n_reps: 0 })
        ));
    }

    #[test]
    fn tiny_classes_empty_holdout() {
        // Two samples per class at 10 percent rounds to zero held out.
        let features = vec![vec![1.0], vec![2.0], vec![10.0], vec![11.0]];
        let labels = vec![0, 0, 1, 1];
        let names = vec!["x".to_string()];
        let rf_config = RandomForestConfig::new(5).unwrap();
        let cv = CrossValidation::new(0.1, 3).unwrap();

        let err = cv
            .evaluate(&rf_config, &features, &labels, &names)
            .unwrap_err();
        assert!(matches!(
            err,
            RfError::EmptyHoldout {
                n_samples: 4,
                ..
            }
        ));
    }

    #[test]
    fn training_always_keeps_every_class() {
        // 3 of 4 samples of each class held out still leaves one in training,
        // so no repetition can fail on a one-class training set.
        let features = vec![
            vec![1.0],
            vec![2.0],
            vec![3.0],
            vec![4.0],
            vec![10.0],
            vec![11.0],
            vec![12.0],
            vec![13.0],
        ];
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let names = vec!["x".to_string()];
        let rf_config = RandomForestConfig::new(5).unwrap().with_seed(42);
        let cv = CrossValidation::new(0.75, 7).unwrap().with_seed(42);

        let result = cv.evaluate(&rf_config, &features, &labels, &names).unwrap();
        assert_eq!(result.holdout_errors.len(), 7);
    }
}
