//! Prediction methods for the Random Forest ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Class probability distribution from a prediction.
#[derive(Debug, Clone)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    /// Create a new class distribution.
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the predicted class (argmax of probabilities).
    ///
    /// Ties break toward the lower class index.
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        let mut best = 0;
        for (idx, &p) in self.probs.iter().enumerate().skip(1) {
            if p > self.probs[best] {
                best = idx;
            }
        }
        best
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

impl RandomForest {
    /// Predict the class label for a single sample.
    ///
    /// Returns the argmax of the averaged probability distribution, with ties
    /// broken toward the lower class index.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, RfError> {
        Ok(self.predict_proba(sample)?.predicted_class())
    }

    /// Return the averaged class probability distribution for a single sample.
    ///
    /// Averages the leaf distributions from all trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<ClassDistribution, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }

        let mut avg = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            let proba = tree.predict_proba(sample)?;
            for (i, p) in proba.iter().enumerate() {
                avg[i] += p;
            }
        }
        let n = self.trees.len() as f64;
        avg.iter_mut().for_each(|v| *v /= n);

        Ok(ClassDistribution::new(avg))
    }

    /// Predict class labels for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return probability distributions for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_proba_batch(
        &self,
        features: &[Vec<f64>],
    ) -> Result<Vec<ClassDistribution>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict_proba(sample))
            .collect()
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RandomForestConfig;

    #[test]
    fn tied_probabilities_pick_lower_class() {
        let dist = ClassDistribution::new(vec![0.5, 0.5]);
        assert_eq!(dist.predicted_class(), 0);

        let dist = ClassDistribution::new(vec![0.2, 0.4, 0.4]);
        assert_eq!(dist.predicted_class(), 1);
    }

    #[test]
    fn argmax_picks_highest_probability() {
        let dist = ClassDistribution::new(vec![0.1, 0.7, 0.2]);
        assert_eq!(dist.predicted_class(), 1);
    }

    #[test]
    fn batch_rejects_feature_mismatch() {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.1, 1.0],
            vec![5.0, 0.0],
            vec![5.1, 1.0],
        ];
        let labels = vec![0, 0, 1, 1];
        let names = vec!["a".to_string(), "b".to_string()];
        let config = RandomForestConfig::new(3).unwrap().with_seed(1);
        let result = config.fit(&features, &labels, &names).unwrap();

        let bad = vec![vec![1.0, 2.0], vec![1.0]];
        let err = result.forest().predict_batch(&bad).unwrap_err();
        assert!(matches!(
            err,
            RfError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.1, 1.0],
            vec![5.0, 0.0],
            vec![5.1, 1.0],
        ];
        let labels = vec![0, 0, 1, 1];
        let names = vec!["a".to_string(), "b".to_string()];
        let config = RandomForestConfig::new(5).unwrap().with_seed(1);
        let result = config.fit(&features, &labels, &names).unwrap();

        let dist = result.forest().predict_proba(&[0.05, 0.5]).unwrap();
        let sum: f64 = dist.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "probabilities must sum to 1: {sum}");
    }
}
