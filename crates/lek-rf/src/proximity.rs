//! Sample proximity from terminal-leaf co-occurrence.

use std::collections::HashMap;

use crate::tree::DecisionTree;

/// Pairwise sample proximity matrix.
///
/// `proximity(i, j)` is the fraction of trees in which samples `i` and `j`
/// land in the same terminal leaf. The matrix is symmetric with a unit
/// diagonal and every value lies in [0, 1]. Stored as a flat row-major
/// buffer of `n_samples * n_samples` values.
#[derive(Debug, Clone)]
pub struct ProximityMatrix {
    values: Vec<f64>,
    n_samples: usize,
}

impl ProximityMatrix {
    /// Compute the proximity matrix for the training samples.
    ///
    /// Sample lengths must have been validated against the trees before the
    /// call; training does this once for the whole dataset.
    pub(crate) fn compute(trees: &[DecisionTree], features: &[Vec<f64>]) -> Self {
        let n_samples = features.len();
        let mut counts = vec![0usize; n_samples * n_samples];

        for tree in trees {
            // Group samples by the leaf they fall into.
            let mut leaf_members: HashMap<usize, Vec<usize>> = HashMap::new();
            for (sample_idx, sample) in features.iter().enumerate() {
                leaf_members
                    .entry(tree.traverse(sample))
                    .or_default()
                    .push(sample_idx);
            }

            for members in leaf_members.values() {
                for (a_pos, &a) in members.iter().enumerate() {
                    for &b in &members[a_pos + 1..] {
                        counts[a * n_samples + b] += 1;
                        counts[b * n_samples + a] += 1;
                    }
                }
            }
        }

        let n_trees = trees.len().max(1) as f64;
        let mut values: Vec<f64> = counts.iter().map(|&c| c as f64 / n_trees).collect();
        for i in 0..n_samples {
            values[i * n_samples + i] = 1.0;
        }

        Self { values, n_samples }
    }

    /// Return the proximity between samples `i` and `j`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is out of range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n_samples && j < self.n_samples, "sample index out of range");
        self.values[i * self.n_samples + j]
    }

    /// Return one row of the matrix.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        assert!(i < self.n_samples, "sample index out of range");
        &self.values[i * self.n_samples..(i + 1) * self.n_samples]
    }

    /// Return the number of samples the matrix covers.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Copy the matrix out as nested rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_samples).map(|i| self.row(i).to_vec()).collect()
    }
}
