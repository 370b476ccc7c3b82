use std::fmt;

/// Zero-based covariate column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying one node of a decision tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Criterion-agnostic impurity value (Gini or Entropy).
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    /// Create a new impurity value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A node in a decision tree arena.
///
/// Trees are stored as `Vec<Node>` with children referenced by [`NodeIndex`]
/// rather than pointers, so a fitted tree serializes trivially.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Covariate used for the split.
        feature: FeatureIndex,
        /// Threshold value: samples with feature <= threshold go left.
        threshold: f64,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Impurity at this node before splitting.
        impurity: Impurity,
        /// Number of training samples that reached this node.
        n_samples: usize,
        /// Weighted decrease in impurity from this split.
        impurity_decrease: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Predicted class (argmax of the distribution, ties to the lower class).
        prediction: usize,
        /// Normalized class probability distribution.
        distribution: Vec<f64>,
        /// Impurity at this leaf.
        impurity: Impurity,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the impurity at this node (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Impurity, Node, NodeIndex};

    fn make_leaf() -> Node {
        Node::Leaf {
            prediction: 0,
            distribution: vec![0.75, 0.25],
            impurity: Impurity::new(0.375),
            n_samples: 8,
        }
    }

    fn make_split() -> Node {
        Node::Split {
            feature: FeatureIndex::new(3),
            threshold: 12.5,
            left: NodeIndex::new(1),
            right: NodeIndex::new(4),
            impurity: Impurity::new(0.5),
            n_samples: 16,
            impurity_decrease: 2.0,
        }
    }

    #[test]
    fn feature_index_roundtrip_and_display() {
        let fi = FeatureIndex::new(7);
        assert_eq!(fi.index(), 7);
        assert_eq!(format!("{fi}"), "7");
    }

    #[test]
    fn node_index_roundtrip_and_ordering() {
        let a = NodeIndex::new(10);
        let b = NodeIndex::new(20);
        assert_eq!(a.index(), 10);
        assert!(a < b);
    }

    #[test]
    fn impurity_display_fixed_precision() {
        assert_eq!(format!("{}", Impurity::new(0.5)), "0.500000");
        assert_eq!(format!("{}", Impurity::new(0.0)), "0.000000");
    }

    #[test]
    fn leaf_accessors() {
        let leaf = make_leaf();
        assert!(leaf.is_leaf());
        assert_eq!(leaf.n_samples(), 8);
        assert!((leaf.impurity().value() - 0.375).abs() < f64::EPSILON);
    }

    #[test]
    fn split_accessors() {
        let split = make_split();
        assert!(!split.is_leaf());
        assert_eq!(split.n_samples(), 16);
        assert!((split.impurity().value() - 0.5).abs() < f64::EPSILON);
    }
}
