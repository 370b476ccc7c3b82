//! Random Forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{MaxFeatures, OobMode, ProximityMode, RandomForestConfig};
use crate::error::RfError;
use crate::importance::aggregate_importances;
use crate::oob::compute_oob;
use crate::proximity::ProximityMatrix;
use crate::result::{RandomForestResult, TrainingMetadata};
use crate::tree::{DecisionTree, DecisionTreeConfig};

/// A fitted Random Forest ensemble.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
    pub(crate) feature_names: Vec<String>,
}

/// Resolve `MaxFeatures` to a concrete count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, RfError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
        MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(RfError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Generate a bootstrap sample and the out-of-bag indices.
fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    labels: &[usize],
    feature_names: &[String],
) -> Result<RandomForestResult, RfError> {
    // --- Validate inputs ---
    if features.is_empty() {
        return Err(RfError::EmptyDataset);
    }
    let n_samples = features.len();
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    if labels.len() != n_samples {
        return Err(RfError::LabelCountMismatch {
            n_labels: labels.len(),
            n_samples,
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(RfError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }

    // A one-class label column is rejected before any tree is grown.
    let first_class = labels[0];
    if labels.iter().all(|&l| l == first_class) {
        return Err(RfError::DegenerateLabels {
            class: first_class,
            n_samples,
        });
    }

    // --- Validate config ---
    let max_features_resolved = resolve_max_features(config.max_features, n_features)?;

    if config.bootstrap_fraction <= 0.0 || config.bootstrap_fraction > 1.0 {
        return Err(RfError::InvalidBootstrapFraction {
            fraction: config.bootstrap_fraction,
        });
    }

    let n_classes = labels.iter().max().copied().unwrap_or(0) + 1;
    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        n_classes,
        max_features = max_features_resolved,
        draw_count,
        "training random forest"
    );

    // Per-tree seeds come from a master RNG so training is deterministic
    // regardless of which rayon worker grows which tree.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    // Capture config fields needed in the closure.
    let criterion = config.criterion;
    let max_depth = config.max_depth;
    let min_samples_split = config.min_samples_split;
    let min_samples_leaf = config.min_samples_leaf;

    let tree_results: Vec<(DecisionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) =
                bootstrap_sample(n_samples, draw_count, &mut rng);

            let boot_features: Vec<Vec<f64>> = bootstrap_indices
                .iter()
                .map(|&i| features[i].clone())
                .collect();
            let boot_labels: Vec<usize> =
                bootstrap_indices.iter().map(|&i| labels[i]).collect();

            let tree_config = DecisionTreeConfig::new()
                .with_criterion(criterion)
                .with_max_depth(max_depth)
                .with_min_samples_split(min_samples_split)
                .with_min_samples_leaf(min_samples_leaf)
                .with_max_features(Some(max_features_resolved))
                .with_seed(rng.r#gen());

            // All inputs are pre-validated, so the per-tree fit cannot fail.
            let tree = tree_config
                .fit(&boot_features, &boot_labels)
                .expect("tree fit should not fail on pre-validated data");

            (tree, oob_indices)
        })
        .collect();

    let mut trees = Vec::with_capacity(config.n_trees);
    let mut oob_indices_per_tree = Vec::with_capacity(config.n_trees);
    for (tree, oob) in tree_results {
        trees.push(tree);
        oob_indices_per_tree.push(oob);
    }

    let per_tree_importances: Vec<Vec<f64>> =
        trees.iter().map(|t| t.feature_importances()).collect();
    let importances = aggregate_importances(&per_tree_importances, feature_names);

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let oob_score = if config.oob_mode == OobMode::Enabled {
        Some(compute_oob(
            &trees,
            features,
            labels,
            n_classes,
            &oob_indices_per_tree,
        )?)
    } else {
        None
    };

    let proximity = if config.proximity_mode == ProximityMode::Enabled {
        Some(ProximityMatrix::compute(&trees, features))
    } else {
        None
    };

    let forest = RandomForest {
        trees,
        n_features,
        n_classes,
        feature_names: feature_names.to_vec(),
    };

    let metadata = TrainingMetadata {
        n_trees: config.n_trees,
        n_features,
        n_classes,
        n_samples,
        max_features_resolved,
    };

    info!(
        oob_error = oob_score.as_ref().map(|s| s.error),
        "random forest training complete"
    );

    Ok(RandomForestResult::new(
        forest,
        importances,
        oob_score,
        proximity,
        oob_indices_per_tree,
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::{MaxFeatures, OobMode, ProximityMode, RandomForestConfig};

    /// Nest-vs-absence style dataset: one informative covariate, one constant.
    fn make_binary_data() -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            features.push(vec![i as f64 * 0.15, 0.5]);
            labels.push(0);
        }
        for i in 0..30 {
            features.push(vec![10.0 + i as f64 * 0.15, 0.5]);
            labels.push(1);
        }
        let names = vec!["sagebrush_cover".to_string(), "flat".to_string()];
        (features, labels, names)
    }

    #[test]
    fn separable_binary_accuracy() {
        let (features, labels, names) = make_binary_data();
        let config = RandomForestConfig::new(51)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let result = config.fit(&features, &labels, &names).unwrap();

        let predictions = result.forest().predict_batch(&features).unwrap();
        let correct = predictions
            .iter()
            .zip(&labels)
            .filter(|&(&p, &l)| p == l)
            .count();
        let accuracy = correct as f64 / labels.len() as f64;
        assert!(accuracy > 0.9, "accuracy = {accuracy}");
    }

    #[test]
    fn oob_score_computed_when_enabled() {
        let (features, labels, names) = make_binary_data();
        let config = RandomForestConfig::new(51)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .with_seed(42);
        let result = config.fit(&features, &labels, &names).unwrap();

        let oob = result.oob_score().expect("OOB must be computed when enabled");
        assert!(oob.error < 0.2, "oob error = {}", oob.error);
        assert!(oob.n_oob_samples > 0);
        assert_eq!(oob.error_trajectory.len(), 51);
    }

    #[test]
    fn oob_skipped_when_disabled() {
        let (features, labels, names) = make_binary_data();
        let config = RandomForestConfig::new(11).unwrap().with_seed(42);
        let result = config.fit(&features, &labels, &names).unwrap();
        assert!(result.oob_score().is_none());
    }

    #[test]
    fn proximity_computed_when_enabled() {
        let (features, labels, names) = make_binary_data();
        let config = RandomForestConfig::new(11)
            .unwrap()
            .with_proximity_mode(ProximityMode::Enabled)
            .with_seed(42);
        let result = config.fit(&features, &labels, &names).unwrap();
        let prox = result.proximity().expect("proximity must be computed when enabled");
        assert_eq!(prox.n_samples(), features.len());
    }

    #[test]
    fn degenerate_labels_rejected_before_fit() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![1, 1, 1];
        let names = vec!["x".to_string()];
        let config = RandomForestConfig::new(11).unwrap();
        let err = config.fit(&features, &labels, &names).unwrap_err();
        assert!(matches!(
            err,
            crate::RfError::DegenerateLabels {
                class: 1,
                n_samples: 3
            }
        ));
    }

    #[test]
    fn label_count_mismatch_rejected() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![0, 1];
        let names = vec!["x".to_string()];
        let config = RandomForestConfig::new(11).unwrap();
        let err = config.fit(&features, &labels, &names).unwrap_err();
        assert!(matches!(err, crate::RfError::LabelCountMismatch { .. }));
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let (features, labels, names) = make_binary_data();
        let config = RandomForestConfig::new(21).unwrap().with_seed(42);
        let result = config.fit(&features, &labels, &names).unwrap();

        let total: f64 = result.importances().iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, labels, names) = make_binary_data();
        let result1 = RandomForestConfig::new(11)
            .unwrap()
            .with_seed(99)
            .fit(&features, &labels, &names)
            .unwrap();
        let result2 = RandomForestConfig::new(11)
            .unwrap()
            .with_seed(99)
            .fit(&features, &labels, &names)
            .unwrap();

        let preds1 = result1.forest().predict_batch(&features).unwrap();
        let preds2 = result2.forest().predict_batch(&features).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn empty_dataset_error() {
        let config = RandomForestConfig::new(11).unwrap();
        let err = config.fit(&[], &[], &[]).unwrap_err();
        assert!(matches!(err, crate::RfError::EmptyDataset));
    }
}
