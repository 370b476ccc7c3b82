//! I/O error types for lek-io.

use std::path::PathBuf;

/// Errors from file I/O, CSV parsing, table projection, and artifact writing.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty table (no data rows) in {path}")]
    EmptyTable {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a required label column is absent from the header.
    #[error("missing label column \"{column}\" in {path}")]
    MissingLabelColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// Name of the missing column (`Nest` or `Surv`).
        column: String,
    },

    /// Returned when the header lists no covariate columns beyond the labels.
    #[error("no covariate columns in {path}")]
    NoCovariateColumns {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when the same column name appears twice in the header.
    #[error("duplicate column \"{name}\" in {path}")]
    DuplicateColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The duplicated column name.
        name: String,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a label cell holds anything other than `0` or `1`
    /// (or, for `Surv` on a pseudo-absence row, an empty/`NA` cell).
    #[error("non-binary label in {path}: column \"{column}\", row {row_index}, raw value \"{raw}\"")]
    NonBinaryLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Name of the label column.
        column: String,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw cell content.
        raw: String,
    },

    /// Returned when a pseudo-absence row (`Nest = 0`) carries a survival outcome.
    #[error("survival outcome on pseudo-absence row in {path}: row {row_index} has Nest = 0 but Surv = \"{raw}\"")]
    SurvivalOnAbsence {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The offending `Surv` cell content.
        raw: String,
    },

    /// Returned when a nest row (`Nest = 1`) is missing its survival outcome.
    #[error("missing survival outcome in {path}: row {row_index} has Nest = 1 but Surv is empty")]
    SurvivalMissing {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
    },

    /// Returned when a covariate cell is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: column \"{column}\", row {row_index}, raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Name of the covariate column.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when a column subset names a covariate the table does not have.
    #[error("unknown covariate column \"{name}\"")]
    UnknownCovariate {
        /// The requested column name.
        name: String,
    },

    /// Returned when a response view holds a single class, so no model can
    /// separate anything.
    #[error("degenerate label column for {response} response: all {n_samples} rows have class {class}")]
    DegenerateResponse {
        /// The response being built (`selection` or `survival`).
        response: String,
        /// The only class present.
        class: usize,
        /// Number of rows in the view.
        n_samples: usize,
    },

    /// Returned when the experiment name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// The invalid name.
        name: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an artifact file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
