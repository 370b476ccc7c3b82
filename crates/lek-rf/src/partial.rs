//! Partial dependence of the predicted class probability on one covariate.

use rayon::prelude::*;

use crate::error::RfError;
use crate::forest::RandomForest;

/// Marginal response of a fitted forest to one covariate.
///
/// The grid spans the observed range of the covariate; each response value is
/// the predicted probability of the target class averaged over the dataset
/// with that covariate forced to the grid value.
#[derive(Debug, Clone)]
pub struct PartialDependenceCurve {
    /// Covariate name.
    pub feature: String,
    /// Class whose probability is traced.
    pub class: usize,
    /// Covariate values the response is evaluated at, ascending.
    pub grid: Vec<f64>,
    /// Mean predicted probability of `class` at each grid value.
    pub response: Vec<f64>,
}

/// Compute the partial dependence of `class` probability on one covariate.
///
/// # Errors
///
/// | Error | Condition |
/// |-------|-----------|
/// | [`RfError::EmptyDataset`] | `features` is empty |
/// | [`RfError::InvalidFeatureIndex`] | `feature_index` out of range |
/// | [`RfError::InvalidClassIndex`] | `class` out of range |
/// | [`RfError::InvalidGridSize`] | `n_points < 2` |
/// | [`RfError::PredictionFeatureMismatch`] | a row's column count differs from the fitted forest |
pub fn partial_dependence(
    forest: &RandomForest,
    features: &[Vec<f64>],
    feature_index: usize,
    class: usize,
    n_points: usize,
) -> Result<PartialDependenceCurve, RfError> {
    if features.is_empty() {
        return Err(RfError::EmptyDataset);
    }
    let n_features = forest.n_features;
    if feature_index >= n_features {
        return Err(RfError::InvalidFeatureIndex {
            feature_index,
            n_features,
        });
    }
    if class >= forest.n_classes {
        return Err(RfError::InvalidClassIndex {
            class,
            n_classes: forest.n_classes,
        });
    }
    if n_points < 2 {
        return Err(RfError::InvalidGridSize { n_points });
    }
    for row in features {
        if row.len() != n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: n_features,
                got: row.len(),
            });
        }
    }

    let (min, max) = features
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
            let v = row[feature_index];
            (lo.min(v), hi.max(v))
        });

    // Inclusive endpoints; the last point is pinned to the observed maximum.
    let step = (max - min) / (n_points - 1) as f64;
    let grid: Vec<f64> = (0..n_points)
        .map(|i| {
            if i == n_points - 1 {
                max
            } else {
                min + step * i as f64
            }
        })
        .collect();

    let n_samples = features.len() as f64;
    let response: Vec<f64> = grid
        .par_iter()
        .map(|&value| {
            let mut total = 0.0;
            let mut sample = vec![0.0; n_features];
            for row in features {
                sample.copy_from_slice(row);
                sample[feature_index] = value;
                let dist = forest.predict_proba(&sample)?;
                total += dist.as_slice()[class];
            }
            Ok(total / n_samples)
        })
        .collect::<Result<Vec<f64>, RfError>>()?;

    Ok(PartialDependenceCurve {
        feature: forest.feature_names[feature_index].clone(),
        class,
        grid,
        response,
    })
}
