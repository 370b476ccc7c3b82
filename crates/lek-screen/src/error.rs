//! Error types for lek-screen.

/// Errors from covariate screening.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    /// Returned when the pivot tolerance is outside `(0, 1)`.
    #[error("collinearity threshold must be in (0, 1), got {threshold}")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold: f64,
    },

    /// Returned when the covariate matrix has no rows or no columns.
    #[error("empty covariate matrix ({n_rows} rows x {n_columns} columns)")]
    EmptyMatrix {
        /// Number of rows supplied.
        n_rows: usize,
        /// Number of columns supplied.
        n_columns: usize,
    },

    /// Returned when the name list and the matrix width disagree.
    #[error("covariate name count {n_names} does not match matrix width {n_columns}")]
    NameCountMismatch {
        /// Number of covariate names supplied.
        n_names: usize,
        /// Number of columns in the matrix.
        n_columns: usize,
    },

    /// Returned when a row has a different length than the first row.
    #[error("inconsistent row length: row {row_index} has {got} values, expected {expected}")]
    InconsistentRowLength {
        /// Index of the offending row.
        row_index: usize,
        /// Expected row length.
        expected: usize,
        /// Actual row length.
        got: usize,
    },

    /// Returned when a matrix cell is NaN or infinite.
    #[error("non-finite value in covariate \"{column}\" at row {row_index}")]
    NonFiniteValue {
        /// Index of the offending row.
        row_index: usize,
        /// Name of the offending column.
        column: String,
    },

    /// Returned when screening flags every covariate, leaving nothing to
    /// model.
    #[error("screening flagged all {n_flagged} covariates, no covariates remain")]
    NoCovariatesRemain {
        /// Number of covariates flagged.
        n_flagged: usize,
    },
}
