use rand::Rng;

use crate::node::{FeatureIndex, Impurity};

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Returns zero impurity when `n_samples` is zero (pure node).
    #[must_use]
    pub fn impurity(self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let value = match self {
            SplitCriterion::Gini => {
                let sum_sq: f64 = class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            SplitCriterion::Entropy => {
                -class_counts
                    .iter()
                    .filter(|&&c| c > 0)
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p.ln()
                    })
                    .sum::<f64>()
            }
        };
        Impurity::new(value)
    }
}

/// The winning split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Covariate the node splits on.
    pub(crate) feature: FeatureIndex,
    /// Threshold value (midpoint between adjacent sorted values).
    pub(crate) threshold: f64,
    /// Weighted impurity decrease from this split (MDI formula).
    pub(crate) impurity_decrease: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among a random subset of covariates.
///
/// For each of up to `max_features` randomly chosen covariates, sorts the
/// node's samples by value and scans the boundaries between distinct
/// adjacent values with incremental class-count updates, keeping the split
/// with the largest weighted impurity decrease.
///
/// Returns `None` when no valid split exists (all candidate values
/// identical, or every boundary violates `min_samples_leaf`).
///
/// `features` is column-major: `features[feature_idx][sample_idx]`, with
/// `sample_indices` indexing into the inner vectors.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    features: &[Vec<f64>],
    labels: &[usize],
    sample_indices: &[usize],
    n_classes: usize,
    criterion: SplitCriterion,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = features.len();
    let n_samples = sample_indices.len();

    if n_samples == 0 || n_features == 0 {
        return None;
    }

    let mut parent_counts = vec![0usize; n_classes];
    for &si in sample_indices {
        parent_counts[labels[si]] += 1;
    }
    let parent_impurity = criterion.impurity(&parent_counts, n_samples);

    // Partial Fisher-Yates: only the first `take` positions need shuffling.
    let take = max_features.min(n_features);
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feat_idx in &feature_order[..take] {
        let feat_col = &features[feat_idx];

        let mut sorted: Vec<(f64, usize)> = sample_indices
            .iter()
            .map(|&si| (feat_col[si], si))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        // Left grows from empty, right shrinks from the full parent counts.
        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = parent_counts.clone();

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let class_i = labels[si];

            left_counts[class_i] += 1;
            right_counts[class_i] -= 1;

            // Identical adjacent values offer no boundary.
            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let left_impurity = criterion.impurity(&left_counts, n_left);
            let right_impurity = criterion.impurity(&right_counts, n_right);

            // Weighted decrease, the quantity MDI importances accumulate.
            let decrease = (n_samples as f64) * parent_impurity.value()
                - (n_left as f64) * left_impurity.value()
                - (n_right as f64) * right_impurity.value();

            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat_idx), (val_i + val_next) / 2.0));
            }
        }
    }

    let (feature, threshold) = best?;

    let feat_col = &features[feature.index()];
    let mut left_indices = Vec::with_capacity(n_samples / 2);
    let mut right_indices = Vec::with_capacity(n_samples / 2);
    for &si in sample_indices {
        if feat_col[si] <= threshold {
            left_indices.push(si);
        } else {
            right_indices.push(si);
        }
    }

    Some(SplitResult {
        feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{SplitCriterion, find_best_split};

    #[test]
    fn gini_pure_node_is_zero() {
        let imp = SplitCriterion::Gini.impurity(&[12, 0], 12);
        assert!((imp.value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gini_balanced_binary_is_half() {
        let imp = SplitCriterion::Gini.impurity(&[6, 6], 12);
        assert!((imp.value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_balanced_binary_is_ln_two() {
        let imp = SplitCriterion::Entropy.impurity(&[6, 6], 12);
        assert!((imp.value() - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn zero_samples_is_zero_impurity() {
        let imp = SplitCriterion::Gini.impurity(&[0, 0], 0);
        assert!((imp.value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn separable_column_splits_at_gap() {
        // Values 1..3 are class 0, values 10..12 are class 1.
        let features = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let sample_indices: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = find_best_split(
            &features,
            &labels,
            &sample_indices,
            2,
            SplitCriterion::Gini,
            1,
            1,
            &mut rng,
        )
        .expect("separable data must split");

        assert_eq!(split.feature.index(), 0);
        assert!(split.threshold > 3.0 && split.threshold < 10.0);
        assert_eq!(split.left_indices.len(), 3);
        assert_eq!(split.right_indices.len(), 3);
    }

    #[test]
    fn constant_column_has_no_split() {
        let features = vec![vec![5.0, 5.0, 5.0, 5.0]];
        let labels = vec![0, 0, 1, 1];
        let sample_indices: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = find_best_split(
            &features,
            &labels,
            &sample_indices,
            2,
            SplitCriterion::Gini,
            1,
            1,
            &mut rng,
        );
        assert!(result.is_none());
    }

    #[test]
    fn min_samples_leaf_blocks_split() {
        // Two samples with min_samples_leaf 2: each child would hold one.
        let features = vec![vec![1.0, 10.0]];
        let labels = vec![0, 1];
        let sample_indices: Vec<usize> = (0..2).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = find_best_split(
            &features,
            &labels,
            &sample_indices,
            2,
            SplitCriterion::Gini,
            1,
            2,
            &mut rng,
        );
        assert!(result.is_none());
    }
}
