use thiserror::Error;

/// Failures the pipeline reports by name rather than as a generic I/O error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required relation '{relation}' is missing from the store")]
    MissingRelation { relation: String },

    #[error("relation '{relation}' has no column '{column}'")]
    MissingColumn { relation: String, column: String },

    #[error("{0} is not a valid American odds quote")]
    InvalidOdds(f64),

    #[error("unparseable timestamp '{value}' in relation '{relation}'")]
    InvalidTimestamp { relation: String, value: String },

    #[error(
        "empty feature set: all {total} rows were dropped ({dropped} with missing features or target)"
    )]
    EmptyFeatureSet { total: usize, dropped: usize },

    #[error("degenerate split: {train} training rows, {test} test rows")]
    EmptySplit { train: usize, test: usize },

    #[error("logistic regression fit failed: {0}")]
    FitFailed(String),

    #[error("model artifact expects {expected} features, got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },
}
