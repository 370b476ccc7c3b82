//! Domain types for lek-io.

use tracing::{debug, info};

use crate::IoError;

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two responses modeled from one observation table.
///
/// `Selection` contrasts nest sites against pseudo-absence sites over all
/// rows. `Survival` contrasts successful against failed nests over the nest
/// rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Nest-site selection: `Nest` is the label, every row participates.
    Selection,
    /// Nest survival: `Surv` is the label, restricted to rows with `Nest = 1`.
    Survival,
}

impl Response {
    /// Stable lowercase name used in artifact file names and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Response::Selection => "selection",
            Response::Survival => "survival",
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table of nest observations: covariates plus the two label columns.
///
/// Produced by [`ObservationReader`](crate::ObservationReader). Covariate
/// rows and label vectors are parallel: `covariates[i]`, `nest[i]` and
/// `surv[i]` describe the same site. The reader guarantees that
/// `surv[i].is_some()` exactly when `nest[i]` is true: survival outcomes
/// exist for real nests and for nothing else.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    /// Covariate column names from the CSV header, in file order.
    covariate_names: Vec<String>,
    /// Covariate values: `covariates[row_index][covariate_index]`.
    covariates: Vec<Vec<f64>>,
    /// Nest-site selection labels: true for nests, false for pseudo-absences.
    nest: Vec<bool>,
    /// Nest survival outcomes, defined only on nest rows.
    surv: Vec<Option<bool>>,
}

impl ObservationTable {
    /// Create a new observation table.
    pub(crate) fn new(
        covariate_names: Vec<String>,
        covariates: Vec<Vec<f64>>,
        nest: Vec<bool>,
        surv: Vec<Option<bool>>,
    ) -> Self {
        debug_assert!(
            nest.iter().zip(&surv).all(|(n, s)| *n == s.is_some()),
            "survival outcome must exist exactly on nest rows"
        );
        Self {
            covariate_names,
            covariates,
            nest,
            surv,
        }
    }

    /// Return the covariate column names.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Return the covariate matrix (row-major).
    #[must_use]
    pub fn covariates(&self) -> &[Vec<f64>] {
        &self.covariates
    }

    /// Return the nest-site selection labels.
    #[must_use]
    pub fn nest(&self) -> &[bool] {
        &self.nest
    }

    /// Return the survival outcomes (defined only on nest rows).
    #[must_use]
    pub fn surv(&self) -> &[Option<bool>] {
        &self.surv
    }

    /// Return the number of observation rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.nest.len()
    }

    /// Return the number of covariate columns.
    #[must_use]
    pub fn n_covariates(&self) -> usize {
        self.covariate_names.len()
    }

    /// Return a copy of the table without the named covariate columns.
    ///
    /// Names not present in the table are skipped (logged at debug level),
    /// so a denylist written for the full field dataset also applies to
    /// reduced exports. Row count and the relative order of the remaining
    /// columns are unchanged.
    #[must_use]
    pub fn drop_columns(&self, names: &[String]) -> ObservationTable {
        for name in names {
            if !self.covariate_names.iter().any(|c| c == name) {
                debug!(column = %name, "denylist column not present, skipping");
            }
        }

        let kept: Vec<usize> = (0..self.covariate_names.len())
            .filter(|&j| !names.contains(&self.covariate_names[j]))
            .collect();

        let table = self.project(&kept);
        info!(
            dropped = self.n_covariates() - table.n_covariates(),
            remaining = table.n_covariates(),
            "denylist applied"
        );
        table
    }

    /// Return a copy of the table holding only the named covariate columns,
    /// in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownCovariate`] if a name is not a column of
    /// this table.
    pub fn select_columns(&self, names: &[String]) -> Result<ObservationTable, IoError> {
        let mut kept = Vec::with_capacity(names.len());
        for name in names {
            let j = self
                .covariate_names
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| IoError::UnknownCovariate { name: name.clone() })?;
            kept.push(j);
        }
        Ok(self.project(&kept))
    }

    /// Build the modeling view for one response.
    ///
    /// `Selection` uses every row with `Nest` as the label. `Survival` keeps
    /// only the rows with `Nest = 1` and uses `Surv` as the label.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::DegenerateResponse`] if the resulting label vector
    /// holds fewer than two classes; such a response cannot be modeled and
    /// the failure must surface before any fit is attempted.
    pub fn response_data(&self, response: Response) -> Result<ResponseData, IoError> {
        let mut features = Vec::new();
        let mut labels = Vec::new();

        match response {
            Response::Selection => {
                features.extend(self.covariates.iter().cloned());
                labels.extend(self.nest.iter().map(|&n| usize::from(n)));
            }
            Response::Survival => {
                for (i, row) in self.covariates.iter().enumerate() {
                    if let Some(outcome) = self.surv[i] {
                        features.push(row.clone());
                        labels.push(usize::from(outcome));
                    }
                }
            }
        }

        let n_positive = labels.iter().filter(|&&l| l == 1).count();
        if n_positive == 0 || n_positive == labels.len() {
            return Err(IoError::DegenerateResponse {
                response: response.to_string(),
                class: usize::from(n_positive > 0),
                n_samples: labels.len(),
            });
        }

        debug!(
            response = %response,
            n_samples = labels.len(),
            n_positive,
            "response view built"
        );
        Ok(ResponseData {
            response,
            covariate_names: self.covariate_names.clone(),
            features,
            labels,
        })
    }

    /// Project onto the covariate columns at `kept` (indices into the
    /// current column order), keeping every row.
    fn project(&self, kept: &[usize]) -> ObservationTable {
        let covariate_names = kept
            .iter()
            .map(|&j| self.covariate_names[j].clone())
            .collect();
        let covariates = self
            .covariates
            .iter()
            .map(|row| kept.iter().map(|&j| row[j]).collect())
            .collect();
        ObservationTable {
            covariate_names,
            covariates,
            nest: self.nest.clone(),
            surv: self.surv.clone(),
        }
    }
}

/// The feature matrix and label vector for one response, ready for fitting.
#[derive(Debug, Clone)]
pub struct ResponseData {
    response: Response,
    covariate_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl ResponseData {
    /// Return which response this view models.
    #[must_use]
    pub fn response(&self) -> Response {
        self.response
    }

    /// Return the covariate column names.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the binary labels (0 or 1).
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Return the number of rows in this view.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    /// Return `(n_negative, n_positive)` label counts.
    #[must_use]
    pub fn class_counts(&self) -> (usize, usize) {
        let n_positive = self.labels.iter().filter(|&&l| l == 1).count();
        (self.labels.len() - n_positive, n_positive)
    }
}

/// An unlabeled covariate table, the input shape for prediction.
///
/// Produced by [`ObservationReader::read_covariates`](crate::ObservationReader::read_covariates).
#[derive(Debug, Clone)]
pub struct CovariateTable {
    /// Covariate column names from the CSV header, in file order.
    covariate_names: Vec<String>,
    /// Covariate values: `rows[row_index][covariate_index]`.
    rows: Vec<Vec<f64>>,
}

impl CovariateTable {
    /// Create a new covariate table.
    pub(crate) fn new(covariate_names: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self {
            covariate_names,
            rows,
        }
    }

    /// Return the covariate column names.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Return the covariate matrix (row-major).
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    /// Return the rows projected onto the named columns, in the given order.
    ///
    /// A fitted model carries the covariate names it was trained on; this
    /// builds the matching prediction matrix regardless of column order in
    /// the file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownCovariate`] if a name is not a column of
    /// this table.
    pub fn matrix_for(&self, names: &[String]) -> Result<Vec<Vec<f64>>, IoError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let j = self
                .covariate_names
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| IoError::UnknownCovariate { name: name.clone() })?;
            indices.push(j);
        }
        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&j| row[j]).collect())
            .collect())
    }
}
