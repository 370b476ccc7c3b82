//! End-to-end integration tests: CSV -> screen/select/fit/validate -> JSON -> deserialize.

use std::fs;
use std::path::Path;

use lek_io::{ExperimentName, ObservationReader, Response, ResultWriter};
use lek_rf::{
    CrossValidation, ModelSelection, OobMode, ProximityMode, RandomForest, RandomForestConfig,
    SignificanceTest, partial_dependence,
};
use lek_screen::CollinearityScreen;
use tempfile::TempDir;

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn screen_and_selection_round_trip() {
    // 1. Read CSV (20 nests, 20 pseudo-absences; sage_total is 2x sage_cover)
    let table = ObservationReader::new(&fixture_path("nests_40x4.csv"))
        .read()
        .expect("fixture should parse");

    assert_eq!(table.n_samples(), 40);
    assert_eq!(table.n_covariates(), 4);

    // 2. Screen for collinearity; the duplicated pair loses one member
    let screen = CollinearityScreen::new(CollinearityScreen::DEFAULT_THRESHOLD).unwrap();
    let report = screen
        .screen(table.covariate_names(), table.covariates())
        .unwrap();

    assert_eq!(report.flagged.len(), 1, "exactly one redundant covariate");
    assert!(
        report.flagged[0] == "sage_cover" || report.flagged[0] == "sage_total",
        "flagged covariate should be one of the duplicated pair, got {}",
        report.flagged[0]
    );
    assert_eq!(report.kept.len(), 3);

    // 3. Write the screen artifact
    let dir = TempDir::new().unwrap();
    let experiment = ExperimentName::new("screen_rt".into()).unwrap();
    let writer = ResultWriter::new(dir.path(), experiment).unwrap();
    writer.write_screen(&report).unwrap();

    // 4. Deserialize back and verify
    let content = read_json(&dir.path().join("screen_rt_screen.json"));
    assert_eq!(content["experiment"], "screen_rt");
    assert_eq!(content["n_samples"].as_u64().unwrap(), 40);
    assert_eq!(content["n_covariates"].as_u64().unwrap(), 4);
    assert_eq!(content["flagged"].as_array().unwrap().len(), 1);
    assert_eq!(content["kept"].as_array().unwrap().len(), 3);

    // Removing the flagged member of the pair clears every flag
    let pins = content["hinge_pins"].as_array().unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0]["left_out"], content["flagged"][0]);
    assert!(pins[0]["still_flagged"].as_array().unwrap().is_empty());

    // 5. Select a covariate subset on the screened selection data
    let screened = table.drop_columns(&report.flagged);
    let data = screened.response_data(Response::Selection).unwrap();
    assert_eq!(data.n_samples(), 40);
    assert_eq!(data.class_counts(), (20, 20));

    let config = RandomForestConfig::new(21).unwrap().with_seed(11);
    let selection = ModelSelection::new()
        .with_thresholds(vec![0.2, 0.5, 1.0])
        .unwrap()
        .with_seed(5);
    let result = selection
        .evaluate(&config, data.features(), data.labels(), data.covariate_names())
        .unwrap();

    writer.write_selection(Response::Selection, &result).unwrap();

    // 6. Deserialize back and verify
    let content = read_json(&dir.path().join("screen_rt_selection_selection.json"));
    assert_eq!(content["experiment"], "screen_rt");
    assert_eq!(content["response"], "selection");
    assert_eq!(content["metric"], "MeanDecreaseAccuracy");

    let candidates = content["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 3);

    // Subset sizes shrink (weakly) as the threshold rises, errors stay in [0, 1]
    let mut prev = usize::MAX;
    for cand in candidates {
        let n = cand["n_covariates"].as_u64().unwrap() as usize;
        assert!(n >= 1 && n <= prev, "subset sizes must not grow");
        prev = n;

        let err = cand["oob_error"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&err));
        assert_eq!(
            cand["covariates"].as_array().unwrap().len(),
            n,
            "covariate list length must match n_covariates"
        );
    }

    // The winner is one of the candidates, drawn from the kept covariates
    let winner = &content["winner"];
    assert!(candidates.contains(winner), "winner must be a candidate");
    for name in winner["covariates"].as_array().unwrap() {
        let name = name.as_str().unwrap();
        assert!(
            report.kept.iter().any(|k| k == name),
            "winner covariate {name} should survive the screen"
        );
    }
}

#[test]
fn fit_predict_model_round_trip() {
    // 1. Read and screen
    let table = ObservationReader::new(&fixture_path("nests_40x4.csv"))
        .read()
        .expect("fixture should parse");
    let screen = CollinearityScreen::new(CollinearityScreen::DEFAULT_THRESHOLD).unwrap();
    let report = screen
        .screen(table.covariate_names(), table.covariates())
        .unwrap();

    let screened = table.drop_columns(&report.flagged);
    let data = screened.response_data(Response::Selection).unwrap();

    // 2. Final fit with OOB and proximity
    let config = RandomForestConfig::new(31)
        .unwrap()
        .with_seed(7)
        .with_oob_mode(OobMode::Enabled)
        .with_proximity_mode(ProximityMode::Enabled);
    let result = config
        .fit(data.features(), data.labels(), data.covariate_names())
        .unwrap();

    let perms = result.permutation_importances(data.features(), data.labels(), 13);
    let curve =
        partial_dependence(result.forest(), data.features(), 0, 1, 8).unwrap();

    // 3. Write the fit artifact
    let dir = TempDir::new().unwrap();
    let experiment = ExperimentName::new("fit_rt".into()).unwrap();
    let writer = ResultWriter::new(dir.path(), experiment).unwrap();
    writer
        .write_fit(Response::Selection, &result, &perms, &[curve])
        .unwrap();

    // 4. Deserialize back and verify
    let content = read_json(&dir.path().join("fit_rt_selection_fit.json"));
    assert_eq!(content["experiment"], "fit_rt");
    assert_eq!(content["response"], "selection");
    assert_eq!(content["n_trees"].as_u64().unwrap(), 31);
    assert_eq!(content["n_samples"].as_u64().unwrap(), 40);
    assert_eq!(content["covariates"].as_array().unwrap().len(), 3);

    let oob = &content["oob"];
    assert!(!oob.is_null(), "OOB was enabled so the entry must be present");
    assert_eq!(oob["confusion_matrix"].as_array().unwrap().len(), 2);
    assert_eq!(oob["error_trajectory"].as_array().unwrap().len(), 31);
    let accuracy = oob["accuracy"].as_f64().unwrap();
    assert!(accuracy > 0.9, "separable data should give accuracy > 0.9, got {accuracy}");

    assert_eq!(content["impurity_importances"].as_array().unwrap().len(), 3);
    assert_eq!(content["impurity_importances"][0]["rank"].as_u64().unwrap(), 1);
    assert_eq!(content["permutation_importances"].as_array().unwrap().len(), 3);

    let curves = content["partial_dependence"].as_array().unwrap();
    assert_eq!(curves.len(), 1);
    assert_eq!(curves[0]["feature"], data.covariate_names()[0].as_str());
    assert_eq!(curves[0]["grid"].as_array().unwrap().len(), 8);
    for point in curves[0]["response"].as_array().unwrap() {
        let p = point.as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p), "PDP response {p} outside [0, 1]");
    }

    assert_eq!(content["proximity"].as_array().unwrap().len(), 40);

    // 5. Predict on the same covariate file and write the artifact
    let covariates = ObservationReader::new(&fixture_path("nests_40x4.csv"))
        .read_covariates()
        .unwrap();
    let matrix = covariates.matrix_for(result.forest().feature_names()).unwrap();
    let predictions = result.forest().predict_proba_batch(&matrix).unwrap();
    writer
        .write_predictions(Response::Selection, &predictions)
        .unwrap();

    let content = read_json(&dir.path().join("fit_rt_selection_predictions.json"));
    assert_eq!(content["n_rows"].as_u64().unwrap(), 40);
    let entries = content["predictions"].as_array().unwrap();
    assert_eq!(entries.len(), 40);

    let mut correct = 0;
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry["row"].as_u64().unwrap() as usize, i);
        assert_eq!(entry["probabilities"].as_array().unwrap().len(), 2);
        let predicted = entry["predicted_class"].as_u64().unwrap() as usize;
        if predicted == usize::from(table.nest()[i]) {
            correct += 1;
        }
    }
    assert!(
        correct >= 36,
        "training-data predictions should be near-perfect, got {correct}/40"
    );

    // 6. Save the model, load it back, and compare predictions
    let model_path = writer.model_path(Response::Selection);
    assert!(model_path.ends_with("fit_rt_selection_model.bin"));
    result.forest().save(&model_path).unwrap();

    let loaded = RandomForest::load(&model_path).unwrap();
    let reloaded = loaded.predict_batch(&matrix).unwrap();
    let original = result.forest().predict_batch(&matrix).unwrap();
    assert_eq!(reloaded, original, "loaded model must predict identically");
}

#[test]
fn survival_validation_round_trip() {
    // 1. Read, screen, and take the survival view (20 nest rows, 10/10 labels)
    let table = ObservationReader::new(&fixture_path("nests_40x4.csv"))
        .read()
        .expect("fixture should parse");
    let screen = CollinearityScreen::new(CollinearityScreen::DEFAULT_THRESHOLD).unwrap();
    let report = screen
        .screen(table.covariate_names(), table.covariates())
        .unwrap();

    let screened = table.drop_columns(&report.flagged);
    let data = screened.response_data(Response::Survival).unwrap();
    assert_eq!(data.n_samples(), 20);
    assert_eq!(data.class_counts(), (10, 10));

    // 2. Fit with OOB, then cross-validate and test significance
    let config = RandomForestConfig::new(11)
        .unwrap()
        .with_seed(19)
        .with_oob_mode(OobMode::Enabled);
    let fitted = config
        .fit(data.features(), data.labels(), data.covariate_names())
        .unwrap();

    let cv = CrossValidation::new(0.25, 4).unwrap().with_seed(9);
    let cv_result = cv
        .evaluate(&config, data.features(), data.labels(), data.covariate_names())
        .unwrap();

    let signif = SignificanceTest::new(5).unwrap().with_seed(3);
    let signif_result = signif
        .evaluate(
            &config,
            &fitted,
            data.features(),
            data.labels(),
            data.covariate_names(),
        )
        .unwrap();

    // 3. Write the validation artifact
    let dir = TempDir::new().unwrap();
    let experiment = ExperimentName::new("validate_rt".into()).unwrap();
    let writer = ResultWriter::new(dir.path(), experiment).unwrap();
    writer
        .write_validation(Response::Survival, &cv_result, &signif_result)
        .unwrap();

    // 4. Deserialize back and verify
    let content = read_json(&dir.path().join("validate_rt_survival_validation.json"));
    assert_eq!(content["experiment"], "validate_rt");
    assert_eq!(content["response"], "survival");
    assert!((content["holdout_fraction"].as_f64().unwrap() - 0.25).abs() < 1e-12);
    assert_eq!(content["n_reps"].as_u64().unwrap(), 4);
    assert_eq!(content["holdout_errors"].as_array().unwrap().len(), 4);

    let mean_error = content["mean_error"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&mean_error));
    assert_eq!(content["class_errors"].as_array().unwrap().len(), 2);

    let signif = &content["significance"];
    assert_eq!(signif["n_permutations"].as_u64().unwrap(), 5);
    assert_eq!(signif["permuted_errors"].as_array().unwrap().len(), 5);
    let p = signif["p_value"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p), "p-value {p} outside [0, 1]");
}
