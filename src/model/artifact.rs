use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::logistic::LogisticRegression;
use super::scaler::StandardScaler;
use super::FEATURES;
use crate::error::PipelineError;

/// Everything needed to replay inference: preprocessing plus the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub model: LogisticRegression,
    pub inverse_regularization: f64,
    pub seed: u64,
    pub test_fraction: f64,
}

impl ModelArtifact {
    /// Home-win probability for one raw (unscaled) feature row.
    pub fn predict_proba(&self, raw: &[f64]) -> Result<f64, PipelineError> {
        if raw.len() != self.feature_names.len() {
            return Err(PipelineError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                got: raw.len(),
            });
        }
        Ok(self.model.predict_proba_row(&self.scaler.transform_row(raw)))
    }

    /// The artifact must have been trained on the current fixed feature set.
    pub fn check_features(&self) -> Result<()> {
        if self.feature_names.len() != FEATURES.len() {
            return Err(PipelineError::FeatureCountMismatch {
                expected: FEATURES.len(),
                got: self.feature_names.len(),
            }
            .into());
        }
        if self.feature_names.iter().zip(FEATURES).any(|(a, b)| a != b) {
            anyhow::bail!(
                "model artifact was trained on features {:?}, expected {:?}",
                self.feature_names,
                FEATURES
            );
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write model artifact {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read model artifact {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("model artifact {} is malformed", path.display()))
    }
}
