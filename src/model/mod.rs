//! Baseline home-win classifier: split, standardize, fit, evaluate, persist.

pub mod artifact;
pub mod logistic;
pub mod metrics;
pub mod plots;
pub mod scaler;
pub mod split;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::models::{GamePrediction, LabelledFeature};
use crate::features::join::format_game_date;
use crate::db::Database;
use crate::error::PipelineError;
use artifact::ModelArtifact;
use logistic::{FitReport, LogisticRegression};
use metrics::{calibration_curve, roc_curve, CalibrationBin, EvaluationMetrics, RocPoint};
use plots::{render_calibration, render_roc, save_png, ChartConfig};
use scaler::StandardScaler;
use split::train_test_split;

/// Fixed model inputs, in column order.
pub const FEATURES: [&str; 5] = [
    "home_odds_avg",
    "away_odds_avg",
    "home_imp_avg",
    "away_imp_avg",
    "home_favorite",
];

pub const MODEL_FILE: &str = "baseline_logreg.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const ROC_FILE: &str = "roc_curve.png";
pub const CALIBRATION_FILE: &str = "calibration_curve.png";

#[derive(Debug, Clone)]
pub struct TrainParams {
    pub test_fraction: f64,
    pub seed: u64,
    pub inverse_regularization: f64,
    pub max_iter: usize,
    pub calibration_bins: usize,
}

impl From<&Config> for TrainParams {
    fn from(config: &Config) -> Self {
        TrainParams {
            test_fraction: config.test_fraction,
            seed: config.seed,
            inverse_regularization: config.inverse_regularization,
            max_iter: config.max_iter,
            calibration_bins: config.calibration_bins,
        }
    }
}

/// How many rows survived each filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub total: usize,
    pub missing_target: usize,
    pub missing_features: usize,
    pub train: usize,
    pub test: usize,
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifact: ModelArtifact,
    pub metrics: EvaluationMetrics,
    pub roc: Vec<RocPoint>,
    pub calibration: Vec<CalibrationBin>,
    pub counts: RowCounts,
    pub fit: FitReport,
}

#[derive(Serialize)]
struct MetricsReport<'a> {
    rows: &'a RowCounts,
    metrics: &'a EvaluationMetrics,
    train_log_loss: f64,
    iterations: usize,
    converged: bool,
    calibration: &'a [CalibrationBin],
}

/// Drop rows lacking a target or any feature, then split and fit.
pub fn train_and_evaluate(rows: &[LabelledFeature], params: &TrainParams) -> Result<TrainOutcome> {
    let mut counts = RowCounts {
        total: rows.len(),
        ..RowCounts::default()
    };
    let mut x = Vec::new();
    let mut y = Vec::new();
    for row in rows {
        let Some(target) = row.home_win() else {
            counts.missing_target += 1;
            continue;
        };
        let Some(features) = row.feature_vector() else {
            counts.missing_features += 1;
            continue;
        };
        x.push(features);
        y.push(target);
    }
    info!(
        "Training rows: {} of {} kept ({} without final score, {} with missing features)",
        x.len(),
        counts.total,
        counts.missing_target,
        counts.missing_features
    );
    if x.is_empty() {
        return Err(PipelineError::EmptyFeatureSet {
            total: counts.total,
            dropped: counts.missing_target + counts.missing_features,
        }
        .into());
    }

    let split = train_test_split(x.len(), params.test_fraction, params.seed);
    counts.train = split.train.len();
    counts.test = split.test.len();
    if split.train.is_empty() || split.test.is_empty() {
        return Err(PipelineError::EmptySplit {
            train: counts.train,
            test: counts.test,
        }
        .into());
    }
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
        idx.iter().map(|&i| (x[i].clone(), y[i])).unzip()
    };
    let (x_train, y_train) = pick(&split.train);
    let (x_test, y_test) = pick(&split.test);

    let scaler = StandardScaler::fit(&x_train);
    info!("Training logistic regression model on {} rows…", x_train.len());
    let (model, fit) = LogisticRegression::fit(
        &scaler.transform(&x_train),
        &y_train,
        params.inverse_regularization,
        params.max_iter,
    )?;
    if !fit.converged {
        warn!("Logistic regression stopped after {} iterations without converging", fit.iterations);
    }

    let y_prob = model.predict_proba(&scaler.transform(&x_test));
    let metrics = EvaluationMetrics::compute(&y_test, &y_prob);
    if metrics.roc_auc.is_none() {
        warn!("Test set holds a single class; ROC AUC is undefined");
    }
    let roc = roc_curve(&y_test, &y_prob);
    let calibration = calibration_curve(&y_test, &y_prob, params.calibration_bins);

    let artifact = ModelArtifact {
        feature_names: FEATURES.iter().map(|s| s.to_string()).collect(),
        scaler,
        model,
        inverse_regularization: params.inverse_regularization,
        seed: params.seed,
        test_fraction: params.test_fraction,
    };
    Ok(TrainOutcome {
        artifact,
        metrics,
        roc,
        calibration,
        counts,
        fit,
    })
}

/// Join `game_features` with final scores from `schedule`.
///
/// A postponed game keeps its gamePk across schedule rows, so the label comes
/// from the row with the same gamePk and start time the feature was built
/// from. Failing that, a row of that gamePk with both scores is used.
pub fn load_labelled(db: &Database) -> Result<Vec<LabelledFeature>> {
    type Scores = (Option<i64>, Option<i64>);
    let features = db.load_game_features()?;
    let mut by_start: HashMap<(i64, String), Scores> = HashMap::new();
    let mut by_pk: HashMap<i64, Scores> = HashMap::new();
    for game in db.load_schedule()? {
        let scores = (game.home_score, game.away_score);
        let scored = scores.0.is_some() && scores.1.is_some();
        if !scored {
            debug!(
                "Game {} has no final score (status {})",
                game.game_pk,
                game.status.as_deref().unwrap_or("unknown")
            );
        }
        by_start
            .entry((game.game_pk, format_game_date(&game)))
            .or_insert(scores);
        match by_pk.get(&game.game_pk) {
            Some((Some(_), Some(_))) => {}
            Some(_) if !scored => {}
            _ => {
                by_pk.insert(game.game_pk, scores);
            }
        }
    }
    Ok(features
        .iter()
        .map(|f| {
            let (home, away) = by_start
                .get(&(f.game_pk, f.date.clone()))
                .or_else(|| by_pk.get(&f.game_pk))
                .copied()
                .unwrap_or((None, None));
            LabelledFeature::new(f, home, away)
        })
        .collect())
}

/// Train stage: fit on `game_features`, then write the artifact, metrics and plots.
pub fn run(config: &Config, db: &Database) -> Result<TrainOutcome> {
    let rows = load_labelled(db)?;
    let outcome = train_and_evaluate(&rows, &TrainParams::from(config))?;

    info!("Test Accuracy : {:.3}", outcome.metrics.accuracy);
    match outcome.metrics.roc_auc {
        Some(auc) => info!("Test ROC AUC  : {:.3}", auc),
        None => info!("Test ROC AUC  : undefined"),
    }
    info!("Test Brier    : {:.3}", outcome.metrics.brier);

    let dir = Path::new(&config.model_dir);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create model directory {}", dir.display()))?;

    let chart = ChartConfig::default();
    save_png(&render_roc(&outcome.roc, chart.clone()), &dir.join(ROC_FILE))?;
    save_png(
        &render_calibration(&outcome.calibration, chart),
        &dir.join(CALIBRATION_FILE),
    )?;

    let report = MetricsReport {
        rows: &outcome.counts,
        metrics: &outcome.metrics,
        train_log_loss: outcome.fit.train_log_loss,
        iterations: outcome.fit.iterations,
        converged: outcome.fit.converged,
        calibration: &outcome.calibration,
    };
    let metrics_path = dir.join(METRICS_FILE);
    std::fs::write(&metrics_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("failed to write {}", metrics_path.display()))?;

    let model_path = dir.join(MODEL_FILE);
    outcome.artifact.save(&model_path)?;
    info!("Model saved to {}", model_path.display());
    Ok(outcome)
}

/// Predict stage: replay the saved artifact over every complete `game_features` row.
pub fn predict(config: &Config, db: &mut Database) -> Result<Vec<GamePrediction>> {
    let model_path = Path::new(&config.model_dir).join(MODEL_FILE);
    let artifact = ModelArtifact::load(&model_path)?;
    artifact.check_features()?;

    let features = db.load_game_features()?;
    let mut predictions = Vec::with_capacity(features.len());
    let mut skipped = 0usize;
    for f in &features {
        match LabelledFeature::new(f, None, None).feature_vector() {
            Some(row) => predictions.push(GamePrediction {
                game_pk: f.game_pk,
                home_win_prob: artifact.predict_proba(&row)?,
            }),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} game_features rows with missing model inputs", skipped);
    }

    db.replace_predictions(&predictions)
        .context("failed to replace game_predictions table")?;
    info!("Wrote {} rows to game_predictions", predictions.len());
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::seeded_db;
    use approx::assert_relative_eq;

    fn params() -> TrainParams {
        TrainParams::from(&Config::default())
    }

    /// Deterministic market where the favourite wins except on every seventh game
    fn synthetic_rows(n: usize) -> Vec<LabelledFeature> {
        (0..n)
            .map(|i| {
                let home_odds = -200.0 + (i * 37 % 300) as f64;
                let home_odds = if home_odds > -100.0 && home_odds < 100.0 { home_odds + 200.0 } else { home_odds };
                let away_odds = -home_odds;
                let home_imp = crate::features::odds::implied_probability(home_odds).unwrap();
                let away_imp = crate::features::odds::implied_probability(away_odds).unwrap();
                let home_win = (home_imp > 0.5) != (i % 7 == 0);
                LabelledFeature {
                    game_pk: i as i64,
                    home_odds_avg: Some(home_odds),
                    away_odds_avg: Some(away_odds),
                    home_imp_avg: Some(home_imp),
                    away_imp_avg: Some(away_imp),
                    home_favorite: home_imp > away_imp,
                    home_score: Some(if home_win { 5 } else { 2 }),
                    away_score: Some(3),
                }
            })
            .collect()
    }

    #[test]
    fn trains_and_reports_on_synthetic_market() {
        let rows = synthetic_rows(200);
        let outcome = train_and_evaluate(&rows, &params()).unwrap();
        assert_eq!(outcome.counts.train, 140);
        assert_eq!(outcome.counts.test, 60);
        assert!(outcome.fit.converged);
        assert!((0.0..=1.0).contains(&outcome.metrics.accuracy));
        assert!((0.0..=1.0).contains(&outcome.metrics.brier));
        let auc = outcome.metrics.roc_auc.unwrap();
        assert!(auc > 0.5, "auc {auc}");
        assert!(outcome.calibration.len() <= 10);
        assert_eq!(outcome.calibration.iter().map(|b| b.count).sum::<usize>(), 60);
        assert_eq!(outcome.roc.first().map(|p| (p.fpr, p.tpr)), Some((0.0, 0.0)));
        assert_eq!(outcome.roc.last().map(|p| (p.fpr, p.tpr)), Some((1.0, 1.0)));
    }

    #[test]
    fn training_is_deterministic() {
        let rows = synthetic_rows(120);
        let a = train_and_evaluate(&rows, &params()).unwrap();
        let b = train_and_evaluate(&rows, &params()).unwrap();
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.artifact, b.artifact);
    }

    #[test]
    fn scaler_is_fit_on_training_rows_only() {
        let rows = synthetic_rows(50);
        let outcome = train_and_evaluate(&rows, &params()).unwrap();
        let split = train_test_split(50, 0.3, 42);
        let train_mean: f64 = split
            .train
            .iter()
            .map(|&i| rows[i].home_odds_avg.unwrap())
            .sum::<f64>()
            / split.train.len() as f64;
        assert_relative_eq!(outcome.artifact.scaler.mean[0], train_mean, epsilon = 1e-9);
    }

    #[test]
    fn rows_without_scores_or_features_are_dropped() {
        let mut rows = synthetic_rows(20);
        rows[0].home_score = None;
        rows[1].away_imp_avg = None;
        rows[2].away_score = None;
        let outcome = train_and_evaluate(&rows, &params()).unwrap();
        assert_eq!(outcome.counts.missing_target, 2);
        assert_eq!(outcome.counts.missing_features, 1);
        assert_eq!(outcome.counts.train + outcome.counts.test, 17);
    }

    #[test]
    fn empty_feature_set_is_fatal() {
        let mut rows = synthetic_rows(5);
        for r in &mut rows {
            r.home_odds_avg = None;
        }
        let err = train_and_evaluate(&rows, &params()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyFeatureSet { total: 5, dropped: 5 })
        ));
    }

    #[test]
    fn single_row_cannot_be_split() {
        let rows = synthetic_rows(1);
        let err = train_and_evaluate(&rows, &params()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptySplit { train: 0, test: 1 })
        ));
    }

    #[test]
    fn full_pipeline_writes_artifacts_and_replays_predictions() {
        let mut sql = String::new();
        for i in 0..40 {
            let day = 1 + i % 28;
            let (home_price, away_price) = if i % 3 == 0 { (130, -150) } else { (-160, 140) };
            let (hs, aws) = if (i * 7) % 10 < 6 { (5, 2) } else { (1, 4) };
            let home = format!("Home{}", i % 5);
            let away = format!("Away{}", i % 5);
            let date = format!("2024-05-{day:02}");
            sql.push_str(&format!(
                "INSERT INTO schedule VALUES ({i}, '{date}T23:05:00Z', '{home}', '{away}', 'Final', {hs}, {aws});
                 INSERT INTO odds VALUES ('{date}T23:05:00Z', '{home}', '{away}', 'X', 'h2h', '{home}', {home_price});
                 INSERT INTO odds VALUES ('{date}T23:05:00Z', '{home}', '{away}', 'X', 'h2h', '{away}', {away_price});
                 INSERT INTO odds VALUES ('{date}T23:05:00Z', '{home}', '{away}', 'Y', 'h2h', '{home}', {});
                 INSERT INTO odds VALUES ('{date}T23:05:00Z', '{home}', '{away}', 'Y', 'h2h', '{away}', {});",
                home_price - 5 - (i % 4) as i32,
                away_price + 5 + (i % 3) as i32,
            ));
        }
        // Upcoming game without a score: featurized and predicted, not trained on
        sql.push_str(
            "INSERT INTO schedule VALUES (99, '2024-06-01T23:05:00Z', 'Home0', 'Away0', 'Preview', NULL, NULL);
             INSERT INTO odds VALUES ('2024-06-01T23:05:00Z', 'Home0', 'Away0', 'X', 'h2h', 'Home0', -120);
             INSERT INTO odds VALUES ('2024-06-01T23:05:00Z', 'Home0', 'Away0', 'X', 'h2h', 'Away0', 110);",
        );

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            processed_dir: dir.path().join("processed").to_string_lossy().into_owned(),
            model_dir: dir.path().join("models").to_string_lossy().into_owned(),
            ..Config::default()
        };
        let mut db = seeded_db(&sql);

        let features = crate::features::run(&config, &mut db).unwrap();
        assert_eq!(features.len(), 41);

        let first = run(&config, &db).unwrap();
        assert_eq!(first.counts.missing_target, 1);
        assert_eq!(first.counts.train + first.counts.test, 40);
        for file in [MODEL_FILE, METRICS_FILE, ROC_FILE, CALIBRATION_FILE] {
            assert!(dir.path().join("models").join(file).exists(), "{file}");
        }

        let second = run(&config, &db).unwrap();
        assert_eq!(first.metrics, second.metrics);

        let predictions = predict(&config, &mut db).unwrap();
        assert_eq!(predictions.len(), 41);
        assert_eq!(db.load_predictions().unwrap(), predictions);
        let upcoming = predictions.iter().find(|p| p.game_pk == 99).unwrap();
        assert!((0.0..=1.0).contains(&upcoming.home_win_prob));
        assert_eq!(predict(&config, &mut db).unwrap(), predictions);
    }

    #[test]
    fn postponed_game_is_labelled_from_the_played_row() {
        let mut db = seeded_db(
            "INSERT INTO schedule VALUES (1, '2024-04-01T17:05:00Z', 'TeamA', 'TeamB', 'Postponed', NULL, NULL);
             INSERT INTO schedule VALUES (1, '2024-04-02T17:05:00Z', 'TeamA', 'TeamB', 'Final', 5, 2);
             INSERT INTO odds VALUES ('2024-04-02T17:05:00Z', 'TeamA', 'TeamB', 'X', 'h2h', 'TeamA', -130);
             INSERT INTO odds VALUES ('2024-04-02T17:05:00Z', 'TeamA', 'TeamB', 'X', 'h2h', 'TeamB', 120);",
        );
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            processed_dir: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        let features = crate::features::run(&config, &mut db).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].date, "2024-04-02 17:05:00");

        let labelled = load_labelled(&db).unwrap();
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].home_win(), Some(1.0));
    }

    #[test]
    fn scored_row_is_preferred_when_start_time_differs() {
        let mut db = seeded_db(
            "INSERT INTO schedule VALUES (1, '2024-04-02T17:05:00Z', 'TeamA', 'TeamB', 'Final', 2, 6);",
        );
        let feature = crate::db::models::GameFeature {
            game_pk: 1,
            season: 2024,
            date: "2024-04-02 23:05:00".into(),
            home_team: "TeamA".into(),
            away_team: "TeamB".into(),
            home_odds_avg: Some(-130.0),
            away_odds_avg: Some(120.0),
            home_imp_avg: Some(0.565),
            away_imp_avg: Some(0.4545),
            home_win_pct: None,
            away_win_pct: None,
            home_favorite: true,
        };
        db.replace_game_features(&[feature]).unwrap();
        let labelled = load_labelled(&db).unwrap();
        assert_eq!(labelled[0].home_win(), Some(0.0));
    }

    #[test]
    fn artifact_write_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("models");
        std::fs::write(&blocker, b"").unwrap();
        let mut sql = String::new();
        for i in 0..10 {
            let (hs, aws) = if i % 3 == 0 { (1, 4) } else { (5, 2) };
            sql.push_str(&format!(
                "INSERT INTO schedule VALUES ({i}, '2024-05-{:02}T23:05:00Z', 'H', 'A', 'Final', {hs}, {aws});
                 INSERT INTO odds VALUES ('2024-05-{:02}T23:05:00Z', 'H', 'A', 'X', 'h2h', 'H', {});
                 INSERT INTO odds VALUES ('2024-05-{:02}T23:05:00Z', 'H', 'A', 'X', 'h2h', 'A', 110);",
                i + 1,
                i + 1,
                -150 + 10 * i,
                i + 1,
            ));
        }
        let config = Config {
            processed_dir: dir.path().join("processed").to_string_lossy().into_owned(),
            model_dir: blocker.to_string_lossy().into_owned(),
            ..Config::default()
        };
        let mut db = seeded_db(&sql);
        crate::features::run(&config, &mut db).unwrap();
        assert!(run(&config, &db).is_err());
    }

    #[test]
    fn predict_without_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            model_dir: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        let mut db = Database::open_in_memory().unwrap();
        assert!(predict(&config, &mut db).is_err());
    }
}
