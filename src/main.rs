use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use lek_io::{
    ExperimentName, ObservationReader, ObservationTable, Response, ResponseData, ResultWriter,
};
use lek_rf::{
    CrossValidation, ImportanceMetric, MaxFeatures, ModelSelection, ModelSelectionResult, OobMode,
    PartialDependenceCurve, PermutationImportance, ProximityMode, RandomForest,
    RandomForestConfig, RandomForestResult, SignificanceTest, partial_dependence,
};
use lek_screen::{CollinearityScreen, ScreenReport};

#[derive(Parser)]
#[command(name = "lek")]
#[command(about = "Random Forest models of sage-grouse nest-site selection and nest survival")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Input table and covariate-screening parameters shared by every stage.
#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Path to the observation CSV file
    #[arg(long)]
    data: PathBuf,

    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Covariates to drop before screening (comma-separated)
    #[arg(long, value_delimiter = ',')]
    drop: Vec<String>,

    /// Relative tolerance for the collinearity screen
    #[arg(long, default_value_t = CollinearityScreen::DEFAULT_THRESHOLD)]
    collinearity_threshold: f64,
}

/// Random Forest hyperparameters and fit diagnostics.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees in the forest (must be odd)
    #[arg(long, default_value_t = 501)]
    trees: usize,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Covariates tried per split: "sqrt", "log2", "all", or a fixed count
    #[arg(long, default_value = "sqrt")]
    max_features: String,

    /// Compute the proximity matrix during the final fit
    #[arg(long, default_value_t = false)]
    proximity: bool,

    /// Grid points per partial-dependence curve
    #[arg(long, default_value_t = 25)]
    pdp_points: usize,
}

/// Covariate-subset selection parameters.
#[derive(Args, Debug, Clone)]
struct SelectArgs {
    /// Importance thresholds to try, comma-separated, ascending, in (0, 1]
    /// (defaults to 0.1 through 0.9)
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f64>>,

    /// Importance metric for ranking covariates: "mda" or "mdi"
    #[arg(long, default_value = "mda")]
    metric: String,
}

/// Cross-validation and significance-test parameters.
#[derive(Args, Debug, Clone)]
struct ValidateArgs {
    /// Fraction of each class held out per repetition
    #[arg(long, default_value_t = 0.1)]
    holdout_fraction: f64,

    /// Number of stratified holdout repetitions
    #[arg(long, default_value_t = 99)]
    cv_reps: usize,

    /// Number of label permutations for the significance test
    #[arg(long, default_value_t = 99)]
    permutations: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Drop denylisted covariates and screen the rest for collinearity
    Screen {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Screen, then pick a covariate subset per response over a threshold grid
    Select {
        #[command(flatten)]
        input: InputArgs,

        /// Response to model: "selection", "survival", or "both"
        #[arg(long, default_value = "both")]
        response: String,

        #[command(flatten)]
        forest: ForestArgs,

        #[command(flatten)]
        select: SelectArgs,
    },

    /// Screen, select, and fit the final model(s) with OOB diagnostics
    Fit {
        #[command(flatten)]
        input: InputArgs,

        /// Response to model: "selection", "survival", or "both"
        #[arg(long, default_value = "both")]
        response: String,

        #[command(flatten)]
        forest: ForestArgs,

        #[command(flatten)]
        select: SelectArgs,
    },

    /// Screen, select, fit, then cross-validate and permutation-test
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Response to model: "selection", "survival", or "both"
        #[arg(long, default_value = "both")]
        response: String,

        #[command(flatten)]
        forest: ForestArgs,

        #[command(flatten)]
        select: SelectArgs,

        #[command(flatten)]
        validate: ValidateArgs,
    },

    /// Predict class probabilities for a covariate table with a saved model
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the covariate CSV file
        #[arg(long)]
        data: PathBuf,

        /// Response the model was fitted for: "selection" or "survival"
        #[arg(long)]
        response: String,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Run screening, selection, fitting, and validation end to end
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Response to model: "selection", "survival", or "both"
        #[arg(long, default_value = "both")]
        response: String,

        #[command(flatten)]
        forest: ForestArgs,

        #[command(flatten)]
        select: SelectArgs,

        #[command(flatten)]
        validate: ValidateArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct ScreenOutput {
    experiment: String,
    n_samples: usize,
    n_covariates: usize,
    flagged: Vec<String>,
    kept: Vec<String>,
}

#[derive(Serialize)]
struct SelectOutput {
    experiment: String,
    responses: Vec<SelectEntry>,
}

#[derive(Serialize)]
struct SelectEntry {
    response: String,
    metric: String,
    winner_threshold: f64,
    oob_error: f64,
    covariates: Vec<String>,
}

#[derive(Serialize)]
struct FitOutput {
    experiment: String,
    responses: Vec<FitEntry>,
}

#[derive(Serialize)]
struct FitEntry {
    response: String,
    n_trees: usize,
    covariates: Vec<String>,
    oob_accuracy: Option<f64>,
    model_path: String,
}

#[derive(Serialize)]
struct ValidateOutput {
    experiment: String,
    responses: Vec<ValidateEntry>,
}

#[derive(Serialize)]
struct ValidateEntry {
    response: String,
    cv_mean_error: f64,
    cv_std_error: f64,
    n_reps: usize,
    p_value: f64,
    n_permutations: usize,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    response: String,
    n_rows: usize,
    model_n_trees: usize,
    model_n_features: usize,
}

#[derive(Serialize)]
struct RunOutput {
    experiment: String,
    responses: Vec<RunEntry>,
}

#[derive(Serialize)]
struct RunEntry {
    response: String,
    winner_threshold: f64,
    n_covariates: usize,
    oob_error: Option<f64>,
    cv_mean_error: f64,
    p_value: f64,
    model_path: String,
}

fn parse_max_features(s: &str) -> Result<MaxFeatures> {
    match s {
        "sqrt" => Ok(MaxFeatures::Sqrt),
        "log2" => Ok(MaxFeatures::Log2),
        "all" => Ok(MaxFeatures::All),
        other => match other.parse::<usize>() {
            Ok(n) => Ok(MaxFeatures::Fixed(n)),
            Err(_) => anyhow::bail!(
                "unknown max features: {other} (expected sqrt, log2, all, or a count)"
            ),
        },
    }
}

fn parse_metric(s: &str) -> Result<ImportanceMetric> {
    match s {
        "mda" => Ok(ImportanceMetric::MeanDecreaseAccuracy),
        "mdi" => Ok(ImportanceMetric::MeanDecreaseImpurity),
        other => anyhow::bail!("unknown importance metric: {other} (expected mda or mdi)"),
    }
}

fn metric_name(metric: ImportanceMetric) -> &'static str {
    match metric {
        ImportanceMetric::MeanDecreaseAccuracy => "mda",
        ImportanceMetric::MeanDecreaseImpurity => "mdi",
    }
}

fn parse_responses(s: &str) -> Result<Vec<Response>> {
    match s {
        "selection" => Ok(vec![Response::Selection]),
        "survival" => Ok(vec![Response::Survival]),
        "both" => Ok(vec![Response::Selection, Response::Survival]),
        other => anyhow::bail!("unknown response: {other} (expected selection, survival, or both)"),
    }
}

fn parse_single_response(s: &str) -> Result<Response> {
    match s {
        "selection" => Ok(Response::Selection),
        "survival" => Ok(Response::Survival),
        other => anyhow::bail!("unknown response: {other} (expected selection or survival)"),
    }
}

/// Load the observation table, drop denylisted covariates, screen the rest
/// for collinearity, and drop what the screen flags.
fn screen_stage(input: &InputArgs) -> Result<(ObservationTable, ScreenReport)> {
    let table = ObservationReader::new(&input.data)
        .read()
        .context("failed to read observation CSV")?;
    info!(
        n_samples = table.n_samples(),
        n_covariates = table.n_covariates(),
        "observation table loaded"
    );

    let table = table.drop_columns(&input.drop);
    let screen = CollinearityScreen::new(input.collinearity_threshold)?;
    let report = screen
        .screen(table.covariate_names(), table.covariates())
        .context("collinearity screen failed")?;

    let screened = table.drop_columns(&report.flagged);
    info!(
        n_flagged = report.flagged.len(),
        n_kept = screened.n_covariates(),
        "covariate screen complete"
    );
    Ok((screened, report))
}

fn forest_config(forest: &ForestArgs, seed: u64) -> Result<RandomForestConfig> {
    Ok(RandomForestConfig::new(forest.trees)?
        .with_max_depth(forest.max_depth)
        .with_max_features(parse_max_features(&forest.max_features)?)
        .with_seed(seed))
}

/// Build the response view on the screened table and run threshold-grid
/// covariate selection over it.
fn selection_stage(
    screened: &ObservationTable,
    response: Response,
    config: &RandomForestConfig,
    select: &SelectArgs,
    seed: u64,
) -> Result<ModelSelectionResult> {
    let data = screened.response_data(response)?;
    let (n_absent, n_present) = data.class_counts();
    info!(
        response = %response,
        n_samples = data.n_samples(),
        n_absent,
        n_present,
        "response view built"
    );

    let mut selection = ModelSelection::new()
        .with_metric(parse_metric(&select.metric)?)
        .with_seed(seed);
    if let Some(thresholds) = &select.thresholds {
        selection = selection.with_thresholds(thresholds.clone())?;
    }

    let result = selection
        .evaluate(config, data.features(), data.labels(), data.covariate_names())
        .with_context(|| format!("model selection failed for response {response}"))?;

    let winner = result.winner();
    info!(
        response = %response,
        threshold = winner.threshold,
        oob_error = winner.oob_error,
        n_covariates = winner.n_covariates,
        "covariate subset selected"
    );
    Ok(result)
}

/// A final fit on the winning covariate subset plus its diagnostics.
struct FitBundle {
    data: ResponseData,
    result: RandomForestResult,
    permutation: Vec<PermutationImportance>,
    curves: Vec<PartialDependenceCurve>,
}

/// Refit on the selected subset with OOB enabled, then compute permutation
/// importances and one partial-dependence curve per covariate.
fn fit_stage(
    screened: &ObservationTable,
    response: Response,
    selection: &ModelSelectionResult,
    config: &RandomForestConfig,
    forest: &ForestArgs,
    seed: u64,
) -> Result<FitBundle> {
    let winner_table = screened.select_columns(selection.selected_covariates())?;
    let data = winner_table.response_data(response)?;

    let proximity_mode = if forest.proximity {
        ProximityMode::Enabled
    } else {
        ProximityMode::Disabled
    };
    let result = config
        .clone()
        .with_oob_mode(OobMode::Enabled)
        .with_proximity_mode(proximity_mode)
        .fit(data.features(), data.labels(), data.covariate_names())
        .with_context(|| format!("final fit failed for response {response}"))?;

    let oob_accuracy = result.oob_score().map(|s| s.accuracy);
    info!(response = %response, oob_accuracy = ?oob_accuracy, "final model fitted");

    let permutation = result.permutation_importances(data.features(), data.labels(), seed);

    // Class 1 is the positive outcome: a used site, or a hatched nest.
    let mut curves = Vec::with_capacity(data.covariate_names().len());
    for feature_index in 0..data.covariate_names().len() {
        curves.push(partial_dependence(
            result.forest(),
            data.features(),
            feature_index,
            1,
            forest.pdp_points,
        )?);
    }

    Ok(FitBundle {
        data,
        result,
        permutation,
        curves,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Screen { input } => {
            let experiment_name = ExperimentName::new(input.experiment.clone())?;
            let (_, report) = screen_stage(&input)?;

            let writer = ResultWriter::new(&input.output_dir, experiment_name)?;
            writer.write_screen(&report)?;

            let output = ScreenOutput {
                experiment: input.experiment,
                n_samples: report.n_samples,
                n_covariates: report.n_covariates,
                flagged: report.flagged,
                kept: report.kept,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Select {
            input,
            response,
            forest,
            select,
        } => {
            let experiment_name = ExperimentName::new(input.experiment.clone())?;
            let responses = parse_responses(&response)?;
            let (screened, _) = screen_stage(&input)?;
            let config = forest_config(&forest, cli.seed)?;

            let writer = ResultWriter::new(&input.output_dir, experiment_name)?;
            let mut entries = Vec::new();
            for response in responses {
                let result = selection_stage(&screened, response, &config, &select, cli.seed)?;
                writer.write_selection(response, &result)?;

                let winner = result.winner();
                entries.push(SelectEntry {
                    response: response.to_string(),
                    metric: metric_name(result.metric()).to_string(),
                    winner_threshold: winner.threshold,
                    oob_error: winner.oob_error,
                    covariates: winner.covariates.clone(),
                });
            }

            let output = SelectOutput {
                experiment: input.experiment,
                responses: entries,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Fit {
            input,
            response,
            forest,
            select,
        } => {
            let experiment_name = ExperimentName::new(input.experiment.clone())?;
            let responses = parse_responses(&response)?;
            let (screened, _) = screen_stage(&input)?;
            let config = forest_config(&forest, cli.seed)?;

            let writer = ResultWriter::new(&input.output_dir, experiment_name)?;
            let mut entries = Vec::new();
            for response in responses {
                let selection = selection_stage(&screened, response, &config, &select, cli.seed)?;
                let bundle = fit_stage(&screened, response, &selection, &config, &forest, cli.seed)?;

                writer.write_fit(response, &bundle.result, &bundle.permutation, &bundle.curves)?;

                let model_path = writer.model_path(response);
                bundle
                    .result
                    .forest()
                    .save(&model_path)
                    .context("failed to save model")?;
                info!(path = %model_path.display(), "model saved");

                entries.push(FitEntry {
                    response: response.to_string(),
                    n_trees: bundle.result.metadata().n_trees,
                    covariates: bundle.data.covariate_names().to_vec(),
                    oob_accuracy: bundle.result.oob_score().map(|s| s.accuracy),
                    model_path: model_path.display().to_string(),
                });
            }

            let output = FitOutput {
                experiment: input.experiment,
                responses: entries,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Validate {
            input,
            response,
            forest,
            select,
            validate,
        } => {
            let experiment_name = ExperimentName::new(input.experiment.clone())?;
            let responses = parse_responses(&response)?;
            let (screened, _) = screen_stage(&input)?;
            let config = forest_config(&forest, cli.seed)?;

            let writer = ResultWriter::new(&input.output_dir, experiment_name)?;
            let mut entries = Vec::new();
            for response in responses {
                let selection = selection_stage(&screened, response, &config, &select, cli.seed)?;
                let bundle = fit_stage(&screened, response, &selection, &config, &forest, cli.seed)?;

                let cv = CrossValidation::new(validate.holdout_fraction, validate.cv_reps)?
                    .with_seed(cli.seed);
                let cv_result = cv
                    .evaluate(
                        &config,
                        bundle.data.features(),
                        bundle.data.labels(),
                        bundle.data.covariate_names(),
                    )
                    .with_context(|| format!("cross-validation failed for response {response}"))?;
                info!(
                    response = %response,
                    mean_error = cv_result.mean_error,
                    std_error = cv_result.std_error,
                    "cross-validation complete"
                );

                let signif = SignificanceTest::new(validate.permutations)?.with_seed(cli.seed);
                let signif_result = signif
                    .evaluate(
                        &config,
                        &bundle.result,
                        bundle.data.features(),
                        bundle.data.labels(),
                        bundle.data.covariate_names(),
                    )
                    .with_context(|| format!("significance test failed for response {response}"))?;
                info!(
                    response = %response,
                    p_value = signif_result.p_value,
                    "significance test complete"
                );

                writer.write_validation(response, &cv_result, &signif_result)?;

                entries.push(ValidateEntry {
                    response: response.to_string(),
                    cv_mean_error: cv_result.mean_error,
                    cv_std_error: cv_result.std_error,
                    n_reps: cv_result.n_reps,
                    p_value: signif_result.p_value,
                    n_permutations: signif_result.n_permutations,
                });
            }

            let output = ValidateOutput {
                experiment: input.experiment,
                responses: entries,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            response,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let response = parse_single_response(&response)?;

            let forest = RandomForest::load(&model).context("failed to load model")?;
            info!(
                n_trees = forest.n_trees(),
                n_features = forest.n_features(),
                n_classes = forest.n_classes(),
                "model loaded"
            );

            let covariates = ObservationReader::new(&data)
                .read_covariates()
                .context("failed to read covariate CSV")?;
            info!(n_rows = covariates.n_samples(), "covariate table loaded");

            let matrix = covariates
                .matrix_for(forest.feature_names())
                .context("covariate table does not match the model")?;
            let predictions = forest
                .predict_proba_batch(&matrix)
                .context("prediction failed")?;

            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_predictions(response, &predictions)?;

            let output = PredictOutput {
                experiment,
                response: response.to_string(),
                n_rows: predictions.len(),
                model_n_trees: forest.n_trees(),
                model_n_features: forest.n_features(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Run {
            input,
            response,
            forest,
            select,
            validate,
        } => {
            let experiment_name = ExperimentName::new(input.experiment.clone())?;
            let responses = parse_responses(&response)?;
            let (screened, report) = screen_stage(&input)?;
            let config = forest_config(&forest, cli.seed)?;

            let writer = ResultWriter::new(&input.output_dir, experiment_name)?;
            writer.write_screen(&report)?;

            let mut entries = Vec::new();
            for response in responses {
                let selection = selection_stage(&screened, response, &config, &select, cli.seed)?;
                writer.write_selection(response, &selection)?;

                let bundle = fit_stage(&screened, response, &selection, &config, &forest, cli.seed)?;
                writer.write_fit(response, &bundle.result, &bundle.permutation, &bundle.curves)?;

                let model_path = writer.model_path(response);
                bundle
                    .result
                    .forest()
                    .save(&model_path)
                    .context("failed to save model")?;
                info!(path = %model_path.display(), "model saved");

                let cv = CrossValidation::new(validate.holdout_fraction, validate.cv_reps)?
                    .with_seed(cli.seed);
                let cv_result = cv
                    .evaluate(
                        &config,
                        bundle.data.features(),
                        bundle.data.labels(),
                        bundle.data.covariate_names(),
                    )
                    .with_context(|| format!("cross-validation failed for response {response}"))?;

                let signif = SignificanceTest::new(validate.permutations)?.with_seed(cli.seed);
                let signif_result = signif
                    .evaluate(
                        &config,
                        &bundle.result,
                        bundle.data.features(),
                        bundle.data.labels(),
                        bundle.data.covariate_names(),
                    )
                    .with_context(|| format!("significance test failed for response {response}"))?;

                writer.write_validation(response, &cv_result, &signif_result)?;

                entries.push(RunEntry {
                    response: response.to_string(),
                    winner_threshold: selection.winner().threshold,
                    n_covariates: bundle.data.covariate_names().len(),
                    oob_error: bundle.result.oob_score().map(|s| s.error),
                    cv_mean_error: cv_result.mean_error,
                    p_value: signif_result.p_value,
                    model_path: model_path.display().to_string(),
                });
                info!(response = %response, "response workflow complete");
            }

            let output = RunOutput {
                experiment: input.experiment,
                responses: entries,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
