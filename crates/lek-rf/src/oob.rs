//! Out-of-bag (OOB) evaluation for the Random Forest.

use crate::confusion::ConfusionMatrix;
use crate::error::RfError;
use crate::tree::{DecisionTree, majority_class};

/// Out-of-bag evaluation result.
///
/// For each sample, only trees where the sample was NOT in the bootstrap
/// contribute votes. Majority votes break ties toward the lower class index;
/// per-sample OOB tree counts can be even regardless of ensemble size.
#[derive(Debug, Clone)]
pub struct OobScore {
    /// Fraction of OOB-evaluated samples predicted correctly.
    pub accuracy: f64,
    /// Fraction of OOB-evaluated samples predicted incorrectly.
    pub error: f64,
    /// Per-class OOB error, indexed by true class. Classes with no
    /// OOB-evaluated samples report 0.0.
    pub class_errors: Vec<f64>,
    /// Confusion matrix over the OOB predictions.
    pub confusion: ConfusionMatrix,
    /// Cumulative OOB error after each tree, in training order. The final
    /// entry equals `error`; this is the bootstrap convergence curve.
    pub error_trajectory: Vec<f64>,
    /// Cumulative per-class OOB error after each tree:
    /// `class_error_trajectories[class][tree]`.
    pub class_error_trajectories: Vec<Vec<f64>>,
    /// Number of samples that had at least one OOB tree.
    pub n_oob_samples: usize,
}

/// Overall and per-class error of the majority votes accumulated so far.
///
/// Samples without any OOB vote yet are excluded; classes with no evaluated
/// samples report an error of 0.0.
fn vote_errors(
    votes: &[Vec<usize>],
    has_oob: &[bool],
    labels: &[usize],
    n_classes: usize,
) -> (f64, Vec<f64>) {
    let mut evaluated = 0usize;
    let mut misclassified = 0usize;
    let mut class_evaluated = vec![0usize; n_classes];
    let mut class_misclassified = vec![0usize; n_classes];

    for (i, sample_votes) in votes.iter().enumerate() {
        if !has_oob[i] {
            continue;
        }
        evaluated += 1;
        class_evaluated[labels[i]] += 1;
        if majority_class(sample_votes) != labels[i] {
            misclassified += 1;
            class_misclassified[labels[i]] += 1;
        }
    }

    let error = if evaluated == 0 {
        0.0
    } else {
        misclassified as f64 / evaluated as f64
    };
    let class_errors = (0..n_classes)
        .map(|c| {
            if class_evaluated[c] == 0 {
                0.0
            } else {
                class_misclassified[c] as f64 / class_evaluated[c] as f64
            }
        })
        .collect();
    (error, class_errors)
}

/// Compute the OOB score, including the cumulative error trajectories.
pub(crate) fn compute_oob(
    trees: &[DecisionTree],
    features: &[Vec<f64>],
    labels: &[usize],
    n_classes: usize,
    oob_indices_per_tree: &[Vec<usize>],
) -> Result<OobScore, RfError> {
    let n_samples = features.len();

    let mut votes: Vec<Vec<usize>> = vec![vec![0; n_classes]; n_samples];
    let mut has_oob = vec![false; n_samples];
    let mut error_trajectory = Vec::with_capacity(trees.len());
    let mut class_error_trajectories: Vec<Vec<f64>> =
        vec![Vec::with_capacity(trees.len()); n_classes];

    for (tree, oob_indices) in trees.iter().zip(oob_indices_per_tree.iter()) {
        for &sample_idx in oob_indices {
            let pred = tree.predict(&features[sample_idx])?;
            votes[sample_idx][pred] += 1;
            has_oob[sample_idx] = true;
        }

        let (error, class_errors) = vote_errors(&votes, &has_oob, labels, n_classes);
        error_trajectory.push(error);
        for (class, trajectory) in class_error_trajectories.iter_mut().enumerate() {
            trajectory.push(class_errors[class]);
        }
    }

    let n_oob_samples = has_oob.iter().filter(|&&h| h).count();
    if n_oob_samples == 0 {
        return Err(RfError::OobEvaluationFailed {
            reason: "no sample has any OOB tree".to_string(),
        });
    }

    // The reported error is the final trajectory entry, so the convergence
    // curve and the headline number cannot drift apart.
    let error = error_trajectory
        .last()
        .copied()
        .ok_or_else(|| RfError::OobEvaluationFailed {
            reason: "ensemble has no trees".to_string(),
        })?;
    let class_errors: Vec<f64> = class_error_trajectories
        .iter()
        .map(|trajectory| trajectory.last().copied().unwrap_or(0.0))
        .collect();

    let mut true_labels = Vec::with_capacity(n_oob_samples);
    let mut predicted = Vec::with_capacity(n_oob_samples);
    for (i, sample_votes) in votes.iter().enumerate() {
        if has_oob[i] {
            true_labels.push(labels[i]);
            predicted.push(majority_class(sample_votes));
        }
    }
    let confusion = ConfusionMatrix::from_labels(&true_labels, &predicted, n_classes)?;
    let accuracy = confusion.accuracy();

    Ok(OobScore {
        accuracy,
        error,
        class_errors,
        confusion,
        error_trajectory,
        class_error_trajectories,
        n_oob_samples,
    })
}
