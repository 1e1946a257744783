//! The trained command model and its JSON persistence.
//!
//! A [`TrainedModel`] is produced once by a batch training pass, written
//! atomically to disk, and loaded read-only for the lifetime of a recognition
//! session — it is never mutated online.
//!
//! The file embeds the feature layout it was trained under (`fs`, `N`, `K`,
//! window, variant, compression, normalization).  [`TrainedModel::load_from`]
//! compares that tag against the caller's current [`FeatureParams`] and
//! refuses to serve a mismatched model; silently scoring incompatible
//! features would produce garbage decisions, not errors.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{FeatureVariant, Normalization, WindowKind};
use crate::features::FeatureParams;

// ---------------------------------------------------------------------------
// ModelError
// ---------------------------------------------------------------------------

/// Errors around model persistence.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The model file does not exist — training has not been run yet.
    #[error("no trained model at {path}; run training first")]
    NoModel { path: String },

    /// The file was trained under a different feature layout than the one
    /// currently configured.  Fatal: retrain or restore the old settings.
    #[error("model feature layout mismatch: trained with {found:?}, configured {expected:?}")]
    ConfigMismatch {
        expected: FeatureParams,
        found: FeatureParams,
    },

    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("model file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// CommandModel
// ---------------------------------------------------------------------------

/// Per-label statistics aggregated over the training exemplars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandModel {
    /// Per-band mean energy over all exemplars.
    pub mean: Vec<f32>,
    /// Per-band population standard deviation (ddof = 0).
    pub std: Vec<f32>,
    /// Number of exemplars that contributed.
    pub count: usize,
    /// Capped, evenly-subsampled exemplar temporal profiles for the
    /// nearest-exemplar strategy.  Absent when retention is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<Vec<f32>>>,
}

// ---------------------------------------------------------------------------
// TrainedModel
// ---------------------------------------------------------------------------

/// The persisted recognition model: one [`CommandModel`] per label plus the
/// feature layout everything was computed under.
///
/// Field names follow the on-disk schema: `fs`, `N`, `K`, `window`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    #[serde(rename = "fs")]
    pub sample_rate: u32,
    #[serde(rename = "N")]
    pub clip_samples: usize,
    #[serde(rename = "K")]
    pub bands: usize,
    pub window: WindowKind,
    pub variant: FeatureVariant,
    pub log_compress: bool,
    pub normalization: Normalization,
    /// Label → aggregated statistics, ordered for reproducible files.
    pub commands: BTreeMap<String, CommandModel>,
}

impl TrainedModel {
    /// Assemble a model from the feature layout and per-label statistics.
    pub fn new(params: &FeatureParams, commands: BTreeMap<String, CommandModel>) -> Self {
        Self {
            sample_rate: params.sample_rate,
            clip_samples: params.clip_samples,
            bands: params.bands,
            window: params.window,
            variant: params.variant,
            log_compress: params.log_compress,
            normalization: params.normalization,
            commands,
        }
    }

    /// The feature layout this model was trained under.
    pub fn params(&self) -> FeatureParams {
        FeatureParams {
            sample_rate: self.sample_rate,
            clip_samples: self.clip_samples,
            bands: self.bands,
            window: self.window,
            variant: self.variant,
            log_compress: self.log_compress,
            normalization: self.normalization,
        }
    }

    /// Labels the model can recognize, in file order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Write the model as pretty-printed JSON, atomically.
    ///
    /// The JSON is written to a sibling `.tmp` file first and renamed into
    /// place, so a crash mid-write never leaves a truncated model behind.
    pub fn save_to(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        log::info!(
            "saved model with {} labels to {}",
            self.commands.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a model and verify it matches `expected`.
    ///
    /// # Errors
    ///
    /// [`ModelError::NoModel`] when the file does not exist,
    /// [`ModelError::ConfigMismatch`] when the embedded layout differs from
    /// `expected`, plus I/O and JSON errors.
    pub fn load_from(path: &Path, expected: &FeatureParams) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NoModel {
                path: path.display().to_string(),
            });
        }

        let json = fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;

        let found = model.params();
        if found != *expected {
            return Err(ModelError::ConfigMismatch {
                expected: *expected,
                found,
            });
        }

        log::info!(
            "loaded model with {} labels from {}",
            model.commands.len(),
            path.display()
        );
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
