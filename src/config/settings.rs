//! Application settings structs, defaults and TOML persistence.
//!
//! Every knob of the recognition pipeline lives here: the preprocessing
//! geometry (sample rate, clip length), the feature layout (band count,
//! window, variant), the classifier strategy with its thresholds, and the
//! streaming recognizer timing constants.  The whole tree is an immutable
//! value threaded through component constructors — there is no global state.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//!
//! Training and inference must run with the **same** configuration; the
//! feature-layout subset is embedded into the trained model file and checked
//! on load (see [`crate::model::TrainedModel::load_from`]).

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// WindowKind
// ---------------------------------------------------------------------------

/// Analysis window applied before each FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Hamming window — the default for speech analysis.
    Hamming,
    /// Hann window.
    Hann,
    /// Rectangular window (no tapering).
    Rect,
}

impl WindowKind {
    /// Window coefficients of length `len`.
    ///
    /// Periodic form (denominator `len`, not `len − 1`) so consecutive
    /// frames tile without modulation artifacts.
    pub fn coefficients(&self, len: usize) -> Vec<f32> {
        if len == 0 {
            return Vec::new();
        }
        match self {
            WindowKind::Rect => vec![1.0; len],
            WindowKind::Hamming => (0..len)
                .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos())
                .collect(),
            WindowKind::Hann => (0..len)
                .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos())
                .collect(),
        }
    }
}

impl Default for WindowKind {
    fn default() -> Self {
        WindowKind::Hamming
    }
}

// ---------------------------------------------------------------------------
// FeatureVariant
// ---------------------------------------------------------------------------

/// How the K-band energy vector is computed from the N-sample clip.
///
/// The two variants are **not** numerically interchangeable; a model trained
/// with one cannot score features extracted with the other (enforced at model
/// load time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureVariant {
    /// One FFT over the whole clip; K contiguous ranges of spectrum bins.
    Frequency,
    /// K contiguous time segments; one windowed FFT per segment.
    Time,
}

impl Default for FeatureVariant {
    fn default() -> Self {
        FeatureVariant::Frequency
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Post-processing applied to the band-energy vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Leave the energies as computed.
    None,
    /// Scale so the components sum to 1 (relative energy distribution).
    UnitSum,
    /// Scale to unit Euclidean length (shape comparison).
    UnitL2,
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::UnitSum
    }
}

// ---------------------------------------------------------------------------
// AlignPolicy
// ---------------------------------------------------------------------------

/// How a trimmed clip is fitted to exactly N samples.
///
/// The same policy must be used for training and live capture; it is part of
/// the preprocessing contract, not a per-call option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignPolicy {
    /// Center-crop a long clip; zero-pad a short one at the end.
    CenterPad,
    /// Slide an N-sample window with stride N/4 and keep the sub-window
    /// with the highest energy.
    MaxEnergyWindow,
}

impl Default for AlignPolicy {
    fn default() -> Self {
        AlignPolicy::CenterPad
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Scoring rule used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Per-band z-scores with hard gates; argmin of the z sum among survivors.
    GatedZScore,
    /// Plain distance to each label's mean vector; argmin, no gating.
    NearestCentroid,
    /// DTW distance between temporal profiles; majority vote of k neighbours.
    NearestExemplar,
    /// Weighted combination of z-sum, Euclidean, Manhattan and correlation
    /// distances with a relative-margin ambiguity guard.
    WeightedMulti,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::GatedZScore
    }
}

// ---------------------------------------------------------------------------
// DistanceMetric
// ---------------------------------------------------------------------------

/// Distance used by the nearest-centroid strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Euclidean
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Preprocessing settings — everything between the raw waveform and the
/// fixed-length, denoised, amplitude-normalized clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate in Hz; every clip is resampled to this rate.
    pub sample_rate: u32,
    /// Fixed clip length N in samples (power of two keeps the FFT fast).
    pub clip_samples: usize,
    /// Pre-emphasis coefficient α in `y[n] = x[n] − α·x[n−1]`.
    pub preemphasis: f32,
    /// Low-pass denoise cutoff in Hz (clamped below Nyquist at run time).
    pub lowpass_cutoff_hz: f32,
    /// Silence-trim threshold in dB relative to the loudest 25 ms window.
    pub trim_threshold_db: f32,
    /// Margin kept on both sides of the detected voiced span, in ms.
    pub trim_margin_ms: f32,
    /// How the trimmed clip is fitted to exactly `clip_samples`.
    pub alignment: AlignPolicy,
    /// RMS level every clip is scaled to (skipped for near-silence).
    pub target_rms: f32,
    /// Duration of a one-shot microphone recording in seconds.
    pub record_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            clip_samples: 16_384, // ~1.02 s at 16 kHz
            preemphasis: 0.97,
            lowpass_cutoff_hz: 3_500.0,
            trim_threshold_db: -40.0,
            trim_margin_ms: 100.0,
            alignment: AlignPolicy::default(),
            target_rms: 0.1,
            record_secs: 1.5,
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureConfig
// ---------------------------------------------------------------------------

/// Feature-extraction settings.  This subset (together with `sample_rate`
/// and `clip_samples`) is embedded in the trained model file and must match
/// between training and inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Number of subbands K.
    pub bands: usize,
    /// Analysis window.
    pub window: WindowKind,
    /// Frequency-subband or time-subband layout.
    pub variant: FeatureVariant,
    /// Apply `log10(E + 1e-10)` to each band energy.
    pub log_compress: bool,
    /// Vector normalization applied after (optional) log compression.
    pub normalization: Normalization,
    /// Length of the coarse temporal RMS profile stored per exemplar.
    pub profile_len: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bands: 8,
            window: WindowKind::default(),
            variant: FeatureVariant::default(),
            log_compress: true,
            normalization: Normalization::default(),
            profile_len: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// ClassifyConfig
// ---------------------------------------------------------------------------

/// Classifier strategy selection and its empirically tuned thresholds.
///
/// The thresholds are configuration defaults, not invariants — retune them
/// per corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Which scoring rule to use.
    pub strategy: Strategy,
    /// Gated z-score: a label is discarded when any band's z exceeds this.
    pub z_max: f32,
    /// Gated z-score: a label is discarded when the mean z exceeds this.
    pub z_avg: f32,
    /// Floor applied to per-band std before dividing (avoids z blow-up on
    /// bands the corpus never varied).
    pub std_floor: f32,
    /// Nearest-centroid distance metric.
    pub metric: DistanceMetric,
    /// Nearest-centroid: compare unit-L2-normalized vectors (shape only).
    pub unit_normalize: bool,
    /// Weighted-multi weights for [z-sum, euclidean, manhattan, 1−pearson].
    pub weights: [f32; 4],
    /// Weighted-multi: best score must beat the runner-up by this relative
    /// margin or the decision is rejected as ambiguous.
    pub margin: f32,
    /// Nearest-exemplar: number of neighbours in the majority vote.
    pub knn_k: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            z_max: 3.0,
            z_avg: 2.0,
            std_floor: 1e-6,
            metric: DistanceMetric::default(),
            unit_normalize: false,
            weights: [0.4, 0.25, 0.2, 0.15],
            margin: 0.15,
            knn_k: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Streaming recognizer timing and activity-detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Seconds of recent audio retained in the ring buffer.
    pub ring_secs: f32,
    /// Capture chunk size in ms (producer side of the bounded channel).
    pub chunk_ms: u64,
    /// Recognition tick interval in ms.
    pub tick_ms: u64,
    /// EWMA factor for the noise-floor estimate (weight of the old value).
    pub noise_ewma: f32,
    /// Activity requires level > noise_floor × this factor …
    pub activity_noise_factor: f32,
    /// … or level > smoothed previous level × this factor.
    pub activity_rise_factor: f32,
    /// Level in dBFS below which a tick counts as silence.
    pub silence_db: f32,
    /// Continuous silence beyond this duration emits a `Silence` event.
    pub silence_hold_secs: f32,
    /// Minimum spacing between two classification attempts in seconds.
    pub cooldown_secs: f32,
    /// Number of consecutive identical decisions required before a
    /// `Recognized` event is emitted (1 = no debouncing).
    pub debounce_ticks: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ring_secs: 5.0,
            chunk_ms: 100,
            tick_ms: 50,
            noise_ewma: 0.95,
            activity_noise_factor: 1.8,
            activity_rise_factor: 1.25,
            silence_db: -50.0,
            silence_hold_secs: 1.0,
            cooldown_secs: 0.6,
            debounce_ticks: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// TrainingConfig
// ---------------------------------------------------------------------------

/// Training corpus layout and exemplar retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Label → candidate directories, tried in order; the first one that
    /// exists wins.  Each directory is scanned non-recursively for `.wav`
    /// files sorted by name.
    pub commands: BTreeMap<String, Vec<PathBuf>>,
    /// Maximum number of exemplar temporal profiles retained per label for
    /// nearest-exemplar refinement (0 disables retention).
    pub max_patterns: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let base = PathBuf::from("training_data");
        let mut commands = BTreeMap::new();
        for label in ["segment", "encrypt", "compress"] {
            commands.insert(label.to_string(), vec![base.join(label)]);
        }
        Self {
            commands,
            max_patterns: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voicecmd::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Preprocessing settings.
    pub audio: AudioConfig,
    /// Feature-extraction settings.
    pub features: FeatureConfig,
    /// Classifier strategy and thresholds.
    pub classify: ClassifyConfig,
    /// Streaming recognizer settings.
    pub stream: StreamConfig,
    /// Training corpus layout.
    pub training: TrainingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
