//! Permutation-based covariate importance (mean decrease in accuracy).

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::forest::RandomForest;
use crate::tree::DecisionTree;

/// Permutation importance result for a single covariate.
#[derive(Debug, Clone)]
pub struct PermutationImportance {
    /// Covariate name.
    pub name: String,
    /// Mean accuracy drop when this covariate is permuted.
    pub importance: f64,
    /// Standard deviation of the accuracy drop across trees.
    pub std: f64,
    /// Rank (1 = most important).
    pub rank: usize,
}

/// Baseline accuracy of a single tree on its OOB samples.
fn tree_oob_accuracy(
    tree: &DecisionTree,
    features: &[Vec<f64>],
    labels: &[usize],
    oob_indices: &[usize],
) -> f64 {
    if oob_indices.is_empty() {
        return 0.0;
    }
    let correct = oob_indices
        .iter()
        .filter(|&&idx| {
            tree.predict(&features[idx])
                .map(|pred| pred == labels[idx])
                .unwrap_or(false)
        })
        .count();
    correct as f64 / oob_indices.len() as f64
}

/// Accuracy of a single tree on its OOB samples with one covariate shuffled.
fn tree_permuted_accuracy(
    tree: &DecisionTree,
    features: &[Vec<f64>],
    labels: &[usize],
    oob_indices: &[usize],
    feature_idx: usize,
    rng: &mut ChaCha8Rng,
) -> f64 {
    if oob_indices.is_empty() {
        return 0.0;
    }

    let mut permuted_values: Vec<f64> = oob_indices
        .iter()
        .map(|&idx| features[idx][feature_idx])
        .collect();
    permuted_values.shuffle(rng);

    let correct = oob_indices
        .iter()
        .zip(permuted_values.iter())
        .filter(|&(&idx, &permuted_val)| {
            let mut sample = features[idx].clone();
            sample[feature_idx] = permuted_val;
            tree.predict(&sample)
                .map(|pred| pred == labels[idx])
                .unwrap_or(false)
        })
        .count();
    correct as f64 / oob_indices.len() as f64
}

/// Compute permutation covariate importance from per-tree OOB samples.
///
/// For each tree and each covariate: take the tree's baseline OOB accuracy,
/// shuffle that covariate's values among the OOB samples, re-predict, and
/// record the accuracy drop. The reported importance is the mean drop across
/// trees with non-empty OOB sets; the spread is the population standard
/// deviation across those trees.
pub(crate) fn compute_permutation_importance(
    forest: &RandomForest,
    features: &[Vec<f64>],
    labels: &[usize],
    oob_indices_per_tree: &[Vec<usize>],
    feature_names: &[String],
    seed: u64,
) -> Vec<PermutationImportance> {
    let n_features = feature_names.len();

    let mut drops: Vec<Vec<f64>> = Vec::new();

    for (tree_idx, (tree, oob_indices)) in forest
        .trees
        .iter()
        .zip(oob_indices_per_tree.iter())
        .enumerate()
    {
        if oob_indices.is_empty() {
            continue;
        }

        let baseline_acc = tree_oob_accuracy(tree, features, labels, oob_indices);

        let mut tree_drops = Vec::with_capacity(n_features);
        for feat_idx in 0..n_features {
            // Per-(tree, covariate) seed so results do not depend on
            // iteration order.
            let rng_seed = seed
                .wrapping_add((tree_idx as u64).wrapping_mul(n_features as u64))
                .wrapping_add(feat_idx as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);

            let permuted_acc =
                tree_permuted_accuracy(tree, features, labels, oob_indices, feat_idx, &mut rng);
            tree_drops.push(baseline_acc - permuted_acc);
        }
        drops.push(tree_drops);
    }

    // No tree had OOB samples: report zero importances in column order.
    if drops.is_empty() {
        return feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| PermutationImportance {
                name: name.clone(),
                importance: 0.0,
                std: 0.0,
                rank: i + 1,
            })
            .collect();
    }

    let n_valid_trees = drops.len() as f64;

    let mut results: Vec<PermutationImportance> = (0..n_features)
        .map(|feat_idx| {
            let values: Vec<f64> = drops.iter().map(|tree_drops| tree_drops[feat_idx]).collect();

            let mean = values.iter().sum::<f64>() / n_valid_trees;
            let variance =
                values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n_valid_trees;
            let std = variance.sqrt();

            PermutationImportance {
                name: feature_names[feat_idx].clone(),
                importance: mean,
                std,
                rank: 0, // assigned after sorting
            }
        })
        .collect();

    results.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }

    results
}
