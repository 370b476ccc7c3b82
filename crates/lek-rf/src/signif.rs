//! Label-permutation significance test for a fitted forest.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::config::{OobMode, ProximityMode, RandomForestConfig};
use crate::error::RfError;
use crate::result::RandomForestResult;

/// Configuration for the label-permutation test.
///
/// Construct via [`SignificanceTest::new`], then chain `with_seed` if desired.
#[derive(Debug, Clone)]
pub struct SignificanceTest {
    n_permutations: usize,
    seed: u64,
}

/// Outcome of the label-permutation test.
///
/// The p-value is the fraction of permuted fits whose OOB error is at or
/// below the observed error. A small value means the observed error is
/// unlikely under shuffled labels, so the model found real structure.
#[derive(Debug)]
pub struct SignificanceResult {
    /// OOB error of the fitted model under the true labels.
    pub observed_error: f64,
    /// OOB error of each permuted refit.
    pub permuted_errors: Vec<f64>,
    /// Fraction of permuted errors at or below the observed error.
    pub p_value: f64,
    /// Number of permutations run.
    pub n_permutations: usize,
}

impl SignificanceTest {
    /// Create a significance test config.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidPermutations`] if `n_permutations == 0`.
    pub fn new(n_permutations: usize) -> Result<Self, RfError> {
        if n_permutations == 0 {
            return Err(RfError::InvalidPermutations { n_permutations });
        }
        Ok(Self {
            n_permutations,
            seed: 42,
        })
    }

    /// Set the random seed for label shuffles and the permuted refits.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of permutations.
    #[must_use]
    pub fn n_permutations(&self) -> usize {
        self.n_permutations
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run the permutation test against a fitted model.
    ///
    /// Each permutation shuffles the label column, refits a forest with OOB
    /// evaluation enabled, and records its OOB error. Shuffles preserve class
    /// counts, so a permuted fit can never fail on a one-class label column
    /// when the observed fit did not. Permutations run in parallel with seeds
    /// derived from the test seed.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::MissingOobScore`] | `fitted` was trained without OOB evaluation |
    ///
    /// Also returns any error from the underlying forest fits.
    #[instrument(skip_all, fields(n_permutations = self.n_permutations, n_samples = features.len()))]
    pub fn evaluate(
        &self,
        config: &RandomForestConfig,
        fitted: &RandomForestResult,
        features: &[Vec<f64>],
        labels: &[usize],
        feature_names: &[String],
    ) -> Result<SignificanceResult, RfError> {
        let observed_error = fitted.oob_score().ok_or(RfError::MissingOobScore)?.error;

        let permuted_errors: Vec<f64> = (0..self.n_permutations)
            .into_par_iter()
            .map(|perm| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(perm as u64));
                let mut shuffled = labels.to_vec();
                shuffled.shuffle(&mut rng);

                let perm_config = config
                    .clone()
                    .with_seed(self.seed.wrapping_add(perm as u64))
                    .with_oob_mode(OobMode::Enabled)
                    .with_proximity_mode(ProximityMode::Disabled);
                let result = perm_config.fit(features, &shuffled, feature_names)?;
                let error = result
                    .oob_score()
                    .map(|s| s.error)
                    .ok_or(RfError::MissingOobScore)?;

                info!(perm, error, "permutation refit complete");
                Ok(error)
            })
            .collect::<Result<Vec<f64>, RfError>>()?;

        let at_or_below = permuted_errors
            .iter()
            .filter(|&&e| e <= observed_error)
            .count();
        let p_value = at_or_below as f64 / self.n_permutations as f64;

        info!(observed_error, p_value, "label permutation test complete");

        Ok(SignificanceResult {
            observed_error,
            permuted_errors,
            p_value,
            n_permutations: self.n_permutations,
        })
    }
}
