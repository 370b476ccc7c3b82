//! Random Forest engine for nest-site selection and nest survival models.
//!
//! Provides a hand-rolled Random Forest classifier with CART decision trees,
//! Gini/Entropy split criteria, parallel training via rayon, out-of-bag
//! evaluation, sample proximities, impurity and permutation importance, and
//! model serialization. On top of the core classifier sit the analysis
//! stages: covariate subset selection over an importance-threshold grid,
//! repeated stratified holdout validation, a label-permutation significance
//! test, and partial dependence curves.

mod config;
mod confusion;
mod error;
mod eval;
mod forest;
mod importance;
mod node;
mod oob;
mod partial;
mod perm_importance;
mod predict;
mod proximity;
mod result;
mod select;
mod serialize;
mod signif;
mod split;
mod tree;

pub use config::{MaxFeatures, OobMode, ProximityMode, RandomForestConfig};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use error::RfError;
pub use eval::{CrossValidation, CrossValidationResult};
pub use forest::RandomForest;
pub use importance::RankedFeature;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::OobScore;
pub use partial::{PartialDependenceCurve, partial_dependence};
pub use perm_importance::PermutationImportance;
pub use predict::ClassDistribution;
pub use proximity::ProximityMatrix;
pub use result::{RandomForestResult, TrainingMetadata};
pub use select::{ImportanceMetric, ModelSelection, ModelSelectionResult, ThresholdCandidate};
pub use signif::{SignificanceResult, SignificanceTest};
pub use split::SplitCriterion;
pub use tree::{DecisionTree, DecisionTreeConfig};
