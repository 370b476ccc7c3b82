//! Multicollinearity screening via pivoted QR on the standardized matrix.

use tracing::{debug, info, instrument};

use crate::ScreenError;
use crate::qr::pivoted_qr;

/// Configuration for the multicollinearity screen.
///
/// Covariate columns are centered and unit-scaled, then decomposed by QR
/// with column pivoting. Columns outside the numerical rank at the given
/// relative tolerance are linearly redundant and get flagged. Constant
/// columns standardize to all-zero and are always flagged.
///
/// # Defaults
///
/// | Parameter | Default |
/// |---|---|
/// | `threshold` | `0.05` |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollinearityScreen {
    threshold: f64,
}

impl CollinearityScreen {
    /// Default pivot tolerance.
    pub const DEFAULT_THRESHOLD: f64 = 0.05;

    /// Create a screen with the given pivot tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`ScreenError::InvalidThreshold`] if `threshold` is not in
    /// `(0, 1)`.
    pub fn new(threshold: f64) -> Result<Self, ScreenError> {
        if !threshold.is_finite() || threshold <= 0.0 || threshold >= 1.0 {
            return Err(ScreenError::InvalidThreshold { threshold });
        }
        Ok(Self { threshold })
    }

    /// Return the pivot tolerance.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Screen a row-major covariate matrix for linear redundancy.
    ///
    /// Flagged columns are reported in their original column order, as are
    /// the kept columns. For each flagged covariate the screen re-runs on
    /// the full set minus that one covariate and records what remains
    /// flagged; a covariate whose removal clears other flags is the hinge
    /// pin of a redundancy cluster. The audit informs the report only; the
    /// removal decision is always the full-set flag list, applied once.
    ///
    /// Screening the kept set again at the same threshold flags nothing.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ScreenError::EmptyMatrix`] | No rows or no columns |
    /// | [`ScreenError::NameCountMismatch`] | Name list length differs from matrix width |
    /// | [`ScreenError::InconsistentRowLength`] | Ragged rows |
    /// | [`ScreenError::NonFiniteValue`] | NaN or infinite cell |
    /// | [`ScreenError::NoCovariatesRemain`] | Every covariate flagged |
    #[instrument(skip_all, fields(threshold = self.threshold, n_covariates = names.len()))]
    pub fn screen(
        &self,
        names: &[String],
        rows: &[Vec<f64>],
    ) -> Result<ScreenReport, ScreenError> {
        self.validate(names, rows)?;

        let all: Vec<usize> = (0..names.len()).collect();
        let flagged = self.flag_subset(names, rows, &all)?;

        let kept: Vec<String> = names
            .iter()
            .enumerate()
            .filter(|(j, _)| !flagged.contains(j))
            .map(|(_, name)| name.clone())
            .collect();
        if kept.is_empty() {
            return Err(ScreenError::NoCovariatesRemain {
                n_flagged: flagged.len(),
            });
        }

        // Hinge-pin audit: re-test with each flagged covariate left out.
        let mut hinge_pins = Vec::with_capacity(flagged.len());
        for &f in &flagged {
            let subset: Vec<usize> = all.iter().copied().filter(|&j| j != f).collect();
            let still: Vec<String> = self
                .flag_subset(names, rows, &subset)?
                .into_iter()
                .map(|j| names[j].clone())
                .collect();
            debug!(
                left_out = %names[f],
                still_flagged = still.len(),
                "hinge-pin re-test"
            );
            hinge_pins.push(HingePin {
                left_out: names[f].clone(),
                still_flagged: still,
            });
        }

        let flagged_names: Vec<String> = flagged.iter().map(|&j| names[j].clone()).collect();
        info!(
            n_flagged = flagged_names.len(),
            n_kept = kept.len(),
            "collinearity screen complete"
        );

        Ok(ScreenReport {
            threshold: self.threshold,
            n_samples: rows.len(),
            n_covariates: names.len(),
            flagged: flagged_names,
            kept,
            hinge_pins,
        })
    }

    /// Flag redundant columns within `subset` (original column indices).
    /// Returned indices are original and ascending.
    fn flag_subset(
        &self,
        names: &[String],
        rows: &[Vec<f64>],
        subset: &[usize],
    ) -> Result<Vec<usize>, ScreenError> {
        let mut columns: Vec<Vec<f64>> = subset
            .iter()
            .map(|&j| standardize(rows.iter().map(|r| r[j])))
            .collect();

        let qr = pivoted_qr(&mut columns);
        let rank = qr.rank(self.threshold);

        let mut flagged: Vec<usize> = qr.pivots[rank..]
            .iter()
            .map(|&local| subset[local])
            .collect();
        flagged.sort_unstable();

        for &j in &flagged {
            debug!(covariate = %names[j], "flagged as redundant");
        }
        Ok(flagged)
    }

    fn validate(&self, names: &[String], rows: &[Vec<f64>]) -> Result<(), ScreenError> {
        if rows.is_empty() || names.is_empty() {
            return Err(ScreenError::EmptyMatrix {
                n_rows: rows.len(),
                n_columns: names.len(),
            });
        }
        let expected = rows[0].len();
        if names.len() != expected {
            return Err(ScreenError::NameCountMismatch {
                n_names: names.len(),
                n_columns: expected,
            });
        }
        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != expected {
                return Err(ScreenError::InconsistentRowLength {
                    row_index,
                    expected,
                    got: row.len(),
                });
            }
            for (j, value) in row.iter().enumerate() {
                if !value.is_finite() {
                    return Err(ScreenError::NonFiniteValue {
                        row_index,
                        column: names[j].clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Center a column and scale it to unit sample variance.
///
/// A zero-variance column becomes all-zero, which the pivoted QR then flags
/// as redundant.
fn standardize(values: impl Iterator<Item = f64> + Clone) -> Vec<f64> {
    let n = values.clone().count();
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values
        .clone()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / (n as f64 - 1.0).max(1.0);
    let sd = var.sqrt();
    if sd > 0.0 {
        values.map(|v| (v - mean) / sd).collect()
    } else {
        vec![0.0; n]
    }
}

/// A leave-one-out re-test result for one flagged covariate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HingePin {
    /// The flagged covariate excluded for this re-test.
    pub left_out: String,
    /// Covariates still flagged with it excluded.
    pub still_flagged: Vec<String>,
}

/// Outcome of a multicollinearity screen.
#[derive(Debug, Clone)]
pub struct ScreenReport {
    /// Pivot tolerance the screen ran with.
    pub threshold: f64,
    /// Number of observation rows screened.
    pub n_samples: usize,
    /// Number of covariates screened.
    pub n_covariates: usize,
    /// Redundant covariates, in original column order.
    pub flagged: Vec<String>,
    /// Retained covariates, in original column order.
    pub kept: Vec<String>,
    /// Leave-one-out audit, one entry per flagged covariate.
    pub hinge_pins: Vec<HingePin>,
}

impl ScreenReport {
    /// Return true if any covariate was flagged.
    #[must_use]
    pub fn has_flags(&self) -> bool {
        !self.flagged.is_empty()
    }
}
