//! Batch training over a directory-per-label WAV corpus.
//!
//! [`Trainer::train`] walks the configured corpus, runs every exemplar
//! through preprocessing and feature extraction, and aggregates per-label
//! mean and population standard deviation into a [`TrainedModel`].  A capped,
//! evenly-subsampled set of temporal profiles is retained per label for the
//! nearest-exemplar strategy.
//!
//! Failure policy: a corrupt file is logged and skipped, a label with no
//! usable exemplars is logged and omitted.  Only an entirely empty corpus
//! aborts training.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::audio::{load_wav_mono, Preprocessor};
use crate::config::AppConfig;
use crate::features::{temporal_profile, FeatureError, FeatureExtractor};
use crate::model::{CommandModel, TrainedModel};

// ---------------------------------------------------------------------------
// TrainError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid feature layout: {0}")]
    Feature(#[from] FeatureError),

    /// Every configured label ended up with zero usable exemplars.
    #[error("no label produced any usable exemplars; nothing to train")]
    EmptyCorpus,
}

// ---------------------------------------------------------------------------
// TrainingReport
// ---------------------------------------------------------------------------

/// Per-label outcome of one training pass.
#[derive(Debug, Clone)]
pub struct LabelReport {
    pub label: String,
    /// Exemplars that contributed to the statistics.
    pub exemplars: usize,
    /// Files that failed to decode and were skipped.
    pub skipped: usize,
}

/// Summary of a training pass, for logging and the CLI.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    /// Labels that made it into the model.
    pub labels: Vec<LabelReport>,
    /// Labels omitted because no candidate directory existed or no file
    /// decoded.
    pub missing_labels: Vec<String>,
}

impl TrainingReport {
    /// Total corrupt files skipped across all labels.
    pub fn skipped_files(&self) -> usize {
        self.labels.iter().map(|l| l.skipped).sum()
    }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// One-shot, blocking batch trainer.
pub struct Trainer {
    preprocessor: Preprocessor,
    extractor: FeatureExtractor,
    commands: BTreeMap<String, Vec<PathBuf>>,
    max_patterns: usize,
    profile_len: usize,
}

impl Trainer {
    pub fn new(config: &AppConfig) -> Result<Self, TrainError> {
        Ok(Self {
            preprocessor: Preprocessor::new(&config.audio),
            extractor: FeatureExtractor::new(&config.audio, &config.features)?,
            commands: config.training.commands.clone(),
            max_patterns: config.training.max_patterns,
            profile_len: config.features.profile_len,
        })
    }

    /// Train over the configured corpus.
    ///
    /// Labels are processed in sorted order and files within a label in
    /// filename order, so repeated runs over the same corpus produce the
    /// same model.
    pub fn train(&self) -> Result<(TrainedModel, TrainingReport), TrainError> {
        let mut report = TrainingReport::default();
        let mut commands = BTreeMap::new();

        for (label, candidates) in &self.commands {
            let Some(dir) = candidates.iter().find(|d| d.is_dir()) else {
                log::warn!("label '{label}': no candidate directory exists, omitting");
                report.missing_labels.push(label.clone());
                continue;
            };

            let files = scan_wav_files(dir);
            if files.is_empty() {
                log::warn!(
                    "label '{label}': no .wav files in {}, omitting",
                    dir.display()
                );
                report.missing_labels.push(label.clone());
                continue;
            }

            let (model, skipped) = self.train_label(label, &files);
            match model {
                Some(model) => {
                    log::info!(
                        "label '{label}': {} exemplars ({skipped} skipped)",
                        model.count
                    );
                    report.labels.push(LabelReport {
                        label: label.clone(),
                        exemplars: model.count,
                        skipped,
                    });
                    commands.insert(label.clone(), model);
                }
                None => {
                    log::warn!("label '{label}': every file failed to decode, omitting");
                    report.missing_labels.push(label.clone());
                }
            }
        }

        if commands.is_empty() {
            return Err(TrainError::EmptyCorpus);
        }

        let model = TrainedModel::new(self.extractor.params(), commands);
        Ok((model, report))
    }

    /// Process one label's files; returns the aggregate (if any exemplar was
    /// usable) and the number of skipped files.
    fn train_label(&self, label: &str, files: &[PathBuf]) -> (Option<CommandModel>, usize) {
        let bands = self.extractor.params().bands;
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(files.len());
        let mut profiles: Vec<Vec<f32>> = Vec::with_capacity(files.len());
        let mut skipped = 0;

        for path in files {
            let wave = match load_wav_mono(path) {
                Ok(wave) => wave,
                Err(err) => {
                    log::warn!("label '{label}': skipping {}: {err}", path.display());
                    skipped += 1;
                    continue;
                }
            };

            let clip = self.preprocessor.process(&wave);
            vectors.push(self.extractor.extract(&clip.samples).values);
            profiles.push(temporal_profile(&clip.samples, self.profile_len));
        }

        if vectors.is_empty() {
            return (None, skipped);
        }

        let count = vectors.len();
        let (mean, std) = aggregate(&vectors, bands);
        let patterns = if self.max_patterns == 0 {
            None
        } else {
            Some(subsample(&profiles, self.max_patterns))
        };

        (
            Some(CommandModel {
                mean,
                std,
                count,
                patterns,
            }),
            skipped,
        )
    }
}

// ---------------------------------------------------------------------------
// Aggregation helpers
// ---------------------------------------------------------------------------

/// List `.wav` files directly inside `dir` (non-recursive), sorted by name.
fn scan_wav_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Per-band mean and population std (ddof = 0) over the exemplar vectors.
fn aggregate(vectors: &[Vec<f32>], bands: usize) -> (Vec<f32>, Vec<f32>) {
    let count = vectors.len() as f64;
    let mut mean = vec![0.0_f64; bands];
    for v in vectors {
        for (m, &x) in mean.iter_mut().zip(v.iter()) {
            *m += x as f64;
        }
    }
    for m in mean.iter_mut() {
        *m /= count;
    }

    let mut var = vec![0.0_f64; bands];
    for v in vectors {
        for ((s, &x), &m) in var.iter_mut().zip(v.iter()).zip(mean.iter()) {
            let d = x as f64 - m;
            *s += d * d;
        }
    }

    (
        mean.iter().map(|&m| m as f32).collect(),
        var.iter().map(|&s| (s / count).sqrt() as f32).collect(),
    )
}

/// Keep at most `cap` profiles, sampled evenly across the input order.
fn subsample(profiles: &[Vec<f32>], cap: usize) -> Vec<Vec<f32>> {
    if profiles.len() <= cap {
        return profiles.to_vec();
    }
    (0..cap)
        .map(|i| profiles[i * profiles.len() / cap].clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
