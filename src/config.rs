use clap::{Parser, Subcommand};

/// MLB game feature pipeline and baseline win-probability model
#[derive(Parser, Debug, Clone)]
#[command(name = "mlb-odds-model", version, about)]
pub struct Config {
    /// Pipeline stage to run (defaults to `run`: features then train)
    #[command(subcommand)]
    pub stage: Option<Stage>,

    /// SQLite database holding schedule, odds and team_stats
    #[arg(
        long,
        global = true,
        env = "DATABASE_PATH",
        default_value = "data/baseball_analytics.db"
    )]
    pub database_path: String,

    /// Directory for the CSV mirror of game_features
    #[arg(long, global = true, env = "PROCESSED_DIR", default_value = "data/processed")]
    pub processed_dir: String,

    /// Directory for the model artifact, metrics and diagnostic images
    #[arg(long, global = true, env = "MODEL_DIR", default_value = "models")]
    pub model_dir: String,

    /// Optional JSON object of team name variant -> canonical name
    #[arg(long, global = true, env = "TEAM_ALIASES")]
    pub team_aliases: Option<String>,

    /// Fraction of labelled games held out for evaluation
    #[arg(long, global = true, env = "TEST_FRACTION", default_value = "0.3")]
    pub test_fraction: f64,

    /// Seed for the train/test shuffle
    #[arg(long, global = true, env = "SPLIT_SEED", default_value = "42")]
    pub seed: u64,

    /// Number of probability buckets in the calibration curve
    #[arg(long, global = true, env = "CALIBRATION_BINS", default_value = "10")]
    pub calibration_bins: usize,

    /// Inverse L2 regularization strength of the logistic model
    #[arg(long, global = true, env = "LOGREG_C", default_value = "1.0")]
    pub inverse_regularization: f64,

    /// Newton iterations allowed when fitting the logistic model
    #[arg(long, global = true, env = "LOGREG_MAX_ITER", default_value = "100")]
    pub max_iter: usize,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Build the game_features table from schedule, odds and team_stats
    Features,
    /// Train and evaluate the baseline classifier on game_features
    Train,
    /// Score game_features rows with the persisted model
    Predict,
    /// Features followed by train
    Run,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            anyhow::bail!("test_fraction must be strictly between 0.0 and 1.0");
        }
        if self.calibration_bins == 0 {
            anyhow::bail!("calibration_bins must be at least 1");
        }
        if !(self.inverse_regularization > 0.0) {
            anyhow::bail!("inverse_regularization (C) must be positive");
        }
        if self.max_iter == 0 {
            anyhow::bail!("max_iter must be at least 1");
        }
        Ok(())
    }

    pub fn stage(&self) -> Stage {
        self.stage.unwrap_or(Stage::Run)
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Config {
            stage: None,
            database_path: ":memory:".into(),
            processed_dir: "data/processed".into(),
            model_dir: "models".into(),
            team_aliases: None,
            test_fraction: 0.3,
            seed: 42,
            calibration_bins: 10,
            inverse_regularization: 1.0,
            max_iter: 100,
        }
    }
}
