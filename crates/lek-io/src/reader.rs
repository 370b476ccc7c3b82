//! CSV observation reader with full input validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{CovariateTable, ObservationTable};

/// Header name of the nest-site selection label column.
const NEST_COLUMN: &str = "Nest";
/// Header name of the nest survival label column.
const SURV_COLUMN: &str = "Surv";

/// Reads nest observation data from a CSV file.
///
/// Expected CSV format:
/// - Header row required; a `Nest` column and a `Surv` column plus one or
///   more covariate columns, in any order
/// - `Nest` is `0` (pseudo-absence) or `1` (nest site)
/// - `Surv` is `0` or `1` on nest rows and empty or `NA` on pseudo-absence
///   rows; any other combination is rejected
/// - Every remaining column is a finite numeric covariate
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyTable`] | Zero data rows after header |
/// | [`IoError::MissingLabelColumn`] | No `Nest` or no `Surv` column |
/// | [`IoError::DuplicateColumn`] | Same header name appears twice |
/// | [`IoError::NoCovariateColumns`] | Only label columns, no covariates |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonBinaryLabel`] | Label cell is not `0`/`1` (or blank `Surv`) |
/// | [`IoError::SurvivalOnAbsence`] | `Surv` present on a `Nest = 0` row |
/// | [`IoError::SurvivalMissing`] | `Surv` absent on a `Nest = 1` row |
/// | [`IoError::NonFiniteValue`] | Covariate cell is NaN, Inf, or unparseable |
pub struct ObservationReader {
    path: PathBuf,
}

/// Header positions of the label columns and the covariate columns.
struct ColumnLayout {
    n_header_columns: usize,
    nest: Option<usize>,
    surv: Option<usize>,
    /// `(column index in the file, column name)` for every covariate.
    covariates: Vec<(usize, String)>,
}

impl ObservationReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning an [`ObservationTable`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<ObservationTable, IoError> {
        let mut rdr = self.open()?;
        let layout = self.column_layout(&mut rdr)?;

        let nest_idx = layout.nest.ok_or_else(|| IoError::MissingLabelColumn {
            path: self.path.clone(),
            column: NEST_COLUMN.to_string(),
        })?;
        let surv_idx = layout.surv.ok_or_else(|| IoError::MissingLabelColumn {
            path: self.path.clone(),
            column: SURV_COLUMN.to_string(),
        })?;

        let covariate_names: Vec<String> =
            layout.covariates.iter().map(|(_, name)| name.clone()).collect();

        let mut covariates = Vec::new();
        let mut nest = Vec::new();
        let mut surv = Vec::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            self.check_row_length(row_index, &record, layout.n_header_columns)?;

            let nest_value = self.parse_nest(row_index, record.get(nest_idx).unwrap_or(""))?;
            let surv_value =
                self.parse_surv(row_index, nest_value, record.get(surv_idx).unwrap_or(""))?;

            let mut row = Vec::with_capacity(layout.covariates.len());
            for (col_idx, name) in &layout.covariates {
                row.push(self.parse_covariate(
                    row_index,
                    name,
                    record.get(*col_idx).unwrap_or(""),
                )?);
            }

            covariates.push(row);
            nest.push(nest_value);
            surv.push(surv_value);
        }

        if nest.is_empty() {
            return Err(IoError::EmptyTable {
                path: self.path.clone(),
            });
        }

        let n_nests = nest.iter().filter(|&&n| n).count();
        info!(
            n_rows = nest.len(),
            n_covariates = covariate_names.len(),
            n_nests,
            n_absences = nest.len() - n_nests,
            "observation table loaded"
        );
        Ok(ObservationTable::new(covariate_names, covariates, nest, surv))
    }

    /// Read and validate a label-free covariate file, returning a
    /// [`CovariateTable`] for prediction.
    ///
    /// `Nest` and `Surv` columns are ignored when present, so a full
    /// observation file also works as prediction input.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_covariates(&self) -> Result<CovariateTable, IoError> {
        let mut rdr = self.open()?;
        let layout = self.column_layout(&mut rdr)?;

        let covariate_names: Vec<String> =
            layout.covariates.iter().map(|(_, name)| name.clone()).collect();

        let mut rows = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            self.check_row_length(row_index, &record, layout.n_header_columns)?;

            let mut row = Vec::with_capacity(layout.covariates.len());
            for (col_idx, name) in &layout.covariates {
                row.push(self.parse_covariate(
                    row_index,
                    name,
                    record.get(*col_idx).unwrap_or(""),
                )?);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(IoError::EmptyTable {
                path: self.path.clone(),
            });
        }

        info!(
            n_rows = rows.len(),
            n_covariates = covariate_names.len(),
            "covariate table loaded"
        );
        Ok(CovariateTable::new(covariate_names, rows))
    }

    fn open(&self) -> Result<csv::Reader<std::fs::File>, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) allows rows with varying column counts so that our own
        // InconsistentRowLength check fires instead of a low-level CsvParse error.
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file))
    }

    /// Classify header columns into labels and covariates, rejecting
    /// duplicate names and headers with no covariates.
    fn column_layout(
        &self,
        rdr: &mut csv::Reader<std::fs::File>,
    ) -> Result<ColumnLayout, IoError> {
        let header = rdr.headers().map_err(|e| self.csv_error(e))?;
        debug!(n_columns = header.len(), "read CSV header");

        let mut seen = HashSet::new();
        let mut layout = ColumnLayout {
            n_header_columns: header.len(),
            nest: None,
            surv: None,
            covariates: Vec::new(),
        };

        for (idx, name) in header.iter().enumerate() {
            if !seen.insert(name.to_string()) {
                return Err(IoError::DuplicateColumn {
                    path: self.path.clone(),
                    name: name.to_string(),
                });
            }
            match name {
                NEST_COLUMN => layout.nest = Some(idx),
                SURV_COLUMN => layout.surv = Some(idx),
                _ => layout.covariates.push((idx, name.to_string())),
            }
        }

        if layout.covariates.is_empty() {
            return Err(IoError::NoCovariateColumns {
                path: self.path.clone(),
            });
        }
        Ok(layout)
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn check_row_length(
        &self,
        row_index: usize,
        record: &csv::StringRecord,
        expected: usize,
    ) -> Result<(), IoError> {
        if record.len() != expected {
            return Err(IoError::InconsistentRowLength {
                path: self.path.clone(),
                row_index,
                expected,
                got: record.len(),
            });
        }
        Ok(())
    }

    fn parse_nest(&self, row_index: usize, raw: &str) -> Result<bool, IoError> {
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(IoError::NonBinaryLabel {
                path: self.path.clone(),
                column: NEST_COLUMN.to_string(),
                row_index,
                raw: raw.to_string(),
            }),
        }
    }

    /// Parse a `Surv` cell and enforce the label invariant: a survival
    /// outcome exists if and only if the row is a nest.
    fn parse_surv(
        &self,
        row_index: usize,
        nest: bool,
        raw: &str,
    ) -> Result<Option<bool>, IoError> {
        let outcome = match raw.trim() {
            "" | "NA" => None,
            "0" => Some(false),
            "1" => Some(true),
            _ => {
                return Err(IoError::NonBinaryLabel {
                    path: self.path.clone(),
                    column: SURV_COLUMN.to_string(),
                    row_index,
                    raw: raw.to_string(),
                });
            }
        };

        match (nest, outcome) {
            (false, Some(_)) => Err(IoError::SurvivalOnAbsence {
                path: self.path.clone(),
                row_index,
                raw: raw.trim().to_string(),
            }),
            (true, None) => Err(IoError::SurvivalMissing {
                path: self.path.clone(),
                row_index,
            }),
            _ => Ok(outcome),
        }
    }

    fn parse_covariate(
        &self,
        row_index: usize,
        column: &str,
        raw: &str,
    ) -> Result<f64, IoError> {
        let value: f64 = raw.trim().parse().map_err(|_| IoError::NonFiniteValue {
            path: self.path.clone(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(IoError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: column.to_string(),
                raw: raw.to_string(),
            });
        }
        Ok(value)
    }
}
