//! Mean-decrease-in-impurity importance aggregation across trees.

/// A ranked covariate with name, importance score, and rank.
#[derive(Debug, Clone)]
pub struct RankedFeature {
    /// Covariate name.
    pub name: String,
    /// Normalized importance score (sums to 1.0 across all covariates).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Aggregate per-tree MDI importances into ranked covariates.
///
/// Sums importances across trees, normalizes the totals to 1.0, sorts
/// descending, and assigns 1-based ranks.
pub(crate) fn aggregate_importances(
    per_tree: &[Vec<f64>],
    names: &[String],
) -> Vec<RankedFeature> {
    if per_tree.is_empty() || names.is_empty() {
        return vec![];
    }

    let n_features = names.len();
    let mut totals = vec![0.0f64; n_features];

    for tree_importances in per_tree {
        for (i, &val) in tree_importances.iter().enumerate() {
            if i < n_features {
                totals[i] += val;
            }
        }
    }

    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.iter_mut().for_each(|v| *v /= sum);
    }

    let mut features: Vec<RankedFeature> = names
        .iter()
        .zip(totals.iter())
        .map(|(name, &importance)| RankedFeature {
            name: name.clone(),
            importance,
            rank: 0, // assigned after sorting
        })
        .collect();

    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    for (i, feature) in features.iter_mut().enumerate() {
        feature.rank = i + 1;
    }

    features
}
