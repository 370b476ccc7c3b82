//! End-to-end exercise of the analysis stages: covariate selection over the
//! threshold grid, a final fit on the winning subset, repeated holdout
//! validation, and the label-permutation significance test.

use lek_rf::{
    CrossValidation, ModelSelection, OobMode, ProximityMode, RandomForestConfig, RfError,
    SignificanceTest,
};

/// Two informative covariates and two noise columns, binary labels.
fn make_habitat_data() -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for i in 0..30 {
        let x = i as f64 * 0.1;
        features.push(vec![x, 20.0 - x, (i % 7) as f64, (i % 3) as f64]);
        labels.push(0);
    }
    for i in 0..30 {
        let x = 10.0 + i as f64 * 0.1;
        features.push(vec![x, 20.0 - x, (i % 7) as f64, (i % 3) as f64]);
        labels.push(1);
    }
    let names = vec![
        "sagebrush_cover".to_string(),
        "bare_ground".to_string(),
        "aspect_class".to_string(),
        "substrate_class".to_string(),
    ];
    (features, labels, names)
}

/// Project rows onto a named covariate subset, preserving column order.
fn project(
    features: &[Vec<f64>],
    names: &[String],
    keep: &[String],
) -> (Vec<Vec<f64>>, Vec<String>) {
    let indices: Vec<usize> = keep
        .iter()
        .map(|k| names.iter().position(|n| n == k).unwrap())
        .collect();
    let projected = features
        .iter()
        .map(|row| indices.iter().map(|&i| row[i]).collect())
        .collect();
    (projected, keep.to_vec())
}

#[test]
fn selection_final_fit_validation_significance() {
    let (features, labels, names) = make_habitat_data();
    let config = RandomForestConfig::new(21).unwrap().with_seed(42);

    // Stage 1: pick the covariate subset.
    let selection = ModelSelection::new().with_seed(42);
    let selected = selection
        .evaluate(&config, &features, &labels, &names)
        .unwrap();
    let winner = selected.winner();
    assert!(!winner.covariates.is_empty());
    assert!(winner.n_covariates <= names.len());

    // Stage 2: final fit on the subset with OOB and proximity.
    let (subset_features, subset_names) = project(&features, &names, &winner.covariates);
    let final_config = config
        .clone()
        .with_oob_mode(OobMode::Enabled)
        .with_proximity_mode(ProximityMode::Enabled);
    let fitted = final_config
        .fit(&subset_features, &labels, &subset_names)
        .unwrap();

    let oob = fitted.oob_score().unwrap();
    assert!((0.0..=1.0).contains(&oob.error));
    let proximity = fitted.proximity().unwrap();
    assert_eq!(proximity.n_samples(), features.len());

    // Stage 3: repeated holdout validation on the same subset.
    let cv = CrossValidation::new(0.2, 5).unwrap().with_seed(42);
    let validation = cv
        .evaluate(&final_config, &subset_features, &labels, &subset_names)
        .unwrap();
    assert_eq!(validation.holdout_errors.len(), 5);
    for &e in &validation.holdout_errors {
        assert!((0.0..=1.0).contains(&e), "holdout error out of range: {e}");
    }

    // Stage 4: label-permutation significance against the final fit.
    let signif = SignificanceTest::new(9).unwrap().with_seed(42);
    let test = signif
        .evaluate(&final_config, &fitted, &subset_features, &labels, &subset_names)
        .unwrap();
    assert_eq!(test.observed_error, oob.error);
    assert!((0.0..=1.0).contains(&test.p_value));
}

#[test]
fn pipeline_is_reproducible() {
    let (features, labels, names) = make_habitat_data();
    let config = RandomForestConfig::new(11).unwrap().with_seed(42);
    let selection = ModelSelection::new().with_seed(42);

    let a = selection
        .evaluate(&config, &features, &labels, &names)
        .unwrap();
    let b = selection
        .evaluate(&config, &features, &labels, &names)
        .unwrap();

    assert_eq!(a.winner().threshold, b.winner().threshold);
    assert_eq!(a.winner().covariates, b.winner().covariates);
    for (x, y) in a.candidates().iter().zip(b.candidates().iter()) {
        assert_eq!(x.oob_error, y.oob_error);
        assert_eq!(x.covariates, y.covariates);
    }
}

#[test]
fn one_class_labels_are_fatal_everywhere() {
    let (features, _, names) = make_habitat_data();
    let labels = vec![1_usize; features.len()];
    let config = RandomForestConfig::new(11).unwrap().with_seed(42);

    let err = config.fit(&features, &labels, &names).unwrap_err();
    assert!(matches!(err, RfError::DegenerateLabels { class: 1, .. }));

    let cv = CrossValidation::new(0.2, 3).unwrap();
    let err = cv.evaluate(&config, &features, &labels, &names).unwrap_err();
    assert!(matches!(err, RfError::DegenerateLabels { class: 1, .. }));

    let selection = ModelSelection::new();
    let err = selection
        .evaluate(&config, &features, &labels, &names)
        .unwrap_err();
    assert!(matches!(err, RfError::DegenerateLabels { class: 1, .. }));
}
