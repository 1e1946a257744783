//! Band-energy feature extraction.
//!
//! A preprocessed N-sample clip is reduced to a K-component energy vector
//! ([`FeatureVector`]) by the [`FeatureExtractor`], using either one FFT over
//! the whole clip with the spectrum split into K bands, or K time segments
//! with one FFT each (see [`crate::config::FeatureVariant`]).
//!
//! Every vector carries the [`FeatureParams`] it was computed with; the
//! trained model embeds the same tag, and the two are compared on load so a
//! model can never be scored against incompatible features.

pub mod extractor;
pub mod profile;

pub use extractor::{band_partition, FeatureExtractor};
pub use profile::temporal_profile;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AudioConfig, FeatureConfig, FeatureVariant, Normalization, WindowKind};

// ---------------------------------------------------------------------------
// FeatureParams
// ---------------------------------------------------------------------------

/// The feature-layout parameters a vector (or a trained model) was computed
/// with.  Two vectors are comparable iff their params are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureParams {
    /// Sample rate of the preprocessed clip in Hz.
    pub sample_rate: u32,
    /// Clip length N in samples.
    pub clip_samples: usize,
    /// Number of subbands K.
    pub bands: usize,
    /// Analysis window.
    pub window: WindowKind,
    /// Frequency-subband or time-subband layout.
    pub variant: FeatureVariant,
    /// Whether `log10(E + 1e-10)` compression was applied.
    pub log_compress: bool,
    /// Normalization applied after compression.
    pub normalization: Normalization,
}

impl FeatureParams {
    /// Collect the layout-relevant subset of the configuration.
    pub fn from_config(audio: &AudioConfig, features: &FeatureConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            clip_samples: audio.clip_samples,
            bands: features.bands,
            window: features.window,
            variant: features.variant,
            log_compress: features.log_compress,
            normalization: features.normalization,
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureVector
// ---------------------------------------------------------------------------

/// A K-component band-energy vector tagged with the params that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// One energy value per subband, post-processed per the params.
    pub values: Vec<f32>,
    /// The layout this vector was extracted under.
    pub params: FeatureParams,
}

// ---------------------------------------------------------------------------
// FeatureError
// ---------------------------------------------------------------------------

/// Invalid feature-layout configuration.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("band count must be at least 1")]
    ZeroBands,

    /// K may not exceed the number of usable spectrum bins (N/2 for the
    /// frequency layout) or produce segments too short to analyse (time
    /// layout needs at least 2 samples per segment).
    #[error("band count {bands} does not fit a {clip_samples}-sample clip")]
    TooManyBands { bands: usize, clip_samples: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_equality_tracks_layout() {
        let audio = AudioConfig::default();
        let features = FeatureConfig::default();
        let a = FeatureParams::from_config(&audio, &features);
        let b = FeatureParams::from_config(&audio, &features);
        assert_eq!(a, b);

        let mut other = features.clone();
        other.bands += 1;
        let c = FeatureParams::from_config(&audio, &other);
        assert_ne!(a, c);
    }

    #[test]
    fn params_serde_round_trip() {
        let params = FeatureParams::from_config(&AudioConfig::default(), &FeatureConfig::default());
        let json = serde_json::to_string(&params).expect("serialize");
        let back: FeatureParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(params, back);
    }
}
