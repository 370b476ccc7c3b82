use std::path::PathBuf;

/// Errors from Random Forest modeling operations.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when n_trees is even.
    #[error("n_trees must be odd so a full-ensemble majority vote cannot tie, got {n_trees}")]
    EvenTreeCount {
        /// The even n_trees value provided.
        n_trees: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds n_features.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when bootstrap_fraction is not in (0.0, 1.0].
    #[error("bootstrap_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBootstrapFraction {
        /// The invalid bootstrap_fraction value provided.
        fraction: f64,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero covariate columns.
    #[error("training dataset has zero covariate columns")]
    ZeroFeatures,

    /// Returned when the label vector and the feature matrix disagree in length.
    #[error("label count {n_labels} does not match sample count {n_samples}")]
    LabelCountMismatch {
        /// The number of labels provided.
        n_labels: usize,
        /// The number of samples in the feature matrix.
        n_samples: usize,
    },

    /// Returned when every label belongs to a single class.
    ///
    /// Fitting a classifier on a one-class label column is rejected before
    /// any tree is grown.
    #[error("degenerate label column: all {n_samples} samples belong to class {class}")]
    DegenerateLabels {
        /// The single class observed.
        class: usize,
        /// The number of samples, all carrying that class.
        n_samples: usize,
    },

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a feature column index is out of range.
    #[error("feature index {feature_index} is out of range for {n_features} features")]
    InvalidFeatureIndex {
        /// The out-of-range feature index.
        feature_index: usize,
        /// The number of feature columns available.
        n_features: usize,
    },

    /// Returned when a class index is out of range.
    #[error("class {class} is out of range for {n_classes} classes")]
    InvalidClassIndex {
        /// The out-of-range class index.
        class: usize,
        /// The number of classes the model distinguishes.
        n_classes: usize,
    },

    /// Returned when a partial-dependence grid has fewer than 2 points.
    #[error("partial-dependence grid must have at least 2 points, got {n_points}")]
    InvalidGridSize {
        /// The invalid grid size provided.
        n_points: usize,
    },

    /// Returned when OOB evaluation fails (no sample has any OOB tree).
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of why OOB evaluation failed.
        reason: String,
    },

    /// Returned when an operation needs an OOB score from a model fitted
    /// without OOB evaluation.
    #[error("model was fitted without OOB evaluation; refit with OobMode::Enabled")]
    MissingOobScore,

    /// Returned when the selection threshold grid is empty.
    #[error("importance threshold grid is empty")]
    EmptyThresholdGrid,

    /// Returned when a selection threshold is outside (0.0, 1.0].
    #[error("importance threshold must be in (0.0, 1.0], got {threshold}")]
    InvalidThreshold {
        /// The invalid threshold value provided.
        threshold: f64,
    },

    /// Returned when the selection threshold grid is not strictly ascending.
    #[error("importance thresholds must be strictly ascending, got {prev} before {next}")]
    NonAscendingThresholds {
        /// The earlier threshold in the grid.
        prev: f64,
        /// The threshold that failed to increase past it.
        next: f64,
    },

    /// Returned when an importance threshold retains no covariates.
    #[error("importance threshold {threshold} retained no covariates")]
    EmptyCovariateSubset {
        /// The threshold that produced the empty subset.
        threshold: f64,
    },

    /// Returned when holdout_fraction is not in (0.0, 1.0).
    #[error("holdout_fraction must be in (0.0, 1.0), got {fraction}")]
    InvalidHoldoutFraction {
        /// The invalid holdout_fraction value provided.
        fraction: f64,
    },

    /// Returned when the cross-validation repetition count is zero.
    #[error("n_reps must be at least 1, got {n_reps}")]
    InvalidRepetitions {
        /// The invalid repetition count provided.
        n_reps: usize,
    },

    /// Returned when the stratified holdout draw selects no samples.
    #[error("holdout fraction {fraction} holds out no samples from {n_samples}")]
    EmptyHoldout {
        /// The requested holdout fraction.
        fraction: f64,
        /// The number of samples available.
        n_samples: usize,
    },

    /// Returned when the permutation count is zero.
    #[error("n_permutations must be at least 1, got {n_permutations}")]
    InvalidPermutations {
        /// The invalid permutation count provided.
        n_permutations: usize,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
