//! The band-energy extractor.
//!
//! FFT plans are built once in [`FeatureExtractor::new`] and reused for every
//! clip, so the per-tick cost in the streaming recognizer is just the
//! transform itself.

use std::ops::Range;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::{AudioConfig, FeatureConfig, FeatureVariant, Normalization};

use super::{FeatureError, FeatureParams, FeatureVector};

/// Epsilon added before log compression so silent bands stay finite.
const LOG_EPSILON: f32 = 1e-10;

// ---------------------------------------------------------------------------
// band_partition
// ---------------------------------------------------------------------------

/// Partition `[0, bins)` into `bands` contiguous ranges.
///
/// Each range has `floor(bins / bands)` elements; the final range absorbs the
/// remainder so the union covers every bin exactly once.
pub fn band_partition(bins: usize, bands: usize) -> Vec<Range<usize>> {
    if bands == 0 || bins == 0 {
        return Vec::new();
    }
    let base = bins / bands;
    (0..bands)
        .map(|i| {
            let start = i * base;
            let end = if i == bands - 1 { bins } else { start + base };
            start..end
        })
        .collect()
}

// ---------------------------------------------------------------------------
// FeatureExtractor
// ---------------------------------------------------------------------------

/// Layout-specific FFT plan.
enum Plan {
    /// One FFT over the whole clip; the first N/2 bins are partitioned into
    /// K contiguous bands.
    Frequency {
        fft: Arc<dyn Fft<f32>>,
        window: Vec<f32>,
    },
    /// K time segments of `seg_len` samples, one windowed FFT each; the band
    /// energy sums the first `seg_len / 2` bins of that segment's spectrum.
    Time {
        fft: Arc<dyn Fft<f32>>,
        window: Vec<f32>,
        seg_len: usize,
    },
}

/// Computes a K-band energy vector from an N-sample preprocessed clip.
///
/// Extraction is pure and deterministic: the same samples always produce the
/// same vector.  Inputs shorter than N are zero-padded, longer ones
/// truncated, so the extractor never fails at call time — layout problems are
/// caught in [`FeatureExtractor::new`].
pub struct FeatureExtractor {
    params: FeatureParams,
    plan: Plan,
}

impl FeatureExtractor {
    /// Build the extractor for the given configuration.
    ///
    /// # Errors
    ///
    /// [`FeatureError::ZeroBands`] when K = 0, [`FeatureError::TooManyBands`]
    /// when K exceeds the usable spectrum bins (frequency layout) or leaves
    /// fewer than 2 samples per segment (time layout).
    pub fn new(audio: &AudioConfig, features: &FeatureConfig) -> Result<Self, FeatureError> {
        let params = FeatureParams::from_config(audio, features);
        let n = params.clip_samples;
        let k = params.bands;

        if k == 0 {
            return Err(FeatureError::ZeroBands);
        }

        let mut planner = FftPlanner::new();
        let plan = match params.variant {
            FeatureVariant::Frequency => {
                if k > n / 2 {
                    return Err(FeatureError::TooManyBands {
                        bands: k,
                        clip_samples: n,
                    });
                }
                Plan::Frequency {
                    fft: planner.plan_fft_forward(n),
                    window: params.window.coefficients(n),
                }
            }
            FeatureVariant::Time => {
                let seg_len = n / k;
                if seg_len < 2 {
                    return Err(FeatureError::TooManyBands {
                        bands: k,
                        clip_samples: n,
                    });
                }
                Plan::Time {
                    fft: planner.plan_fft_forward(seg_len),
                    window: params.window.coefficients(seg_len),
                    seg_len,
                }
            }
        };

        Ok(Self { params, plan })
    }

    /// The layout this extractor produces vectors under.
    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    /// Extract the K-band energy vector from `samples`.
    ///
    /// `samples` is fitted to the clip length N (zero-padded or truncated)
    /// before analysis.
    pub fn extract(&self, samples: &[f32]) -> FeatureVector {
        let n = self.params.clip_samples;
        let mut clip = vec![0.0_f32; n];
        let take = samples.len().min(n);
        clip[..take].copy_from_slice(&samples[..take]);

        let mut energies = match &self.plan {
            Plan::Frequency { fft, window } => Self::frequency_energies(
                &clip,
                fft.as_ref(),
                window,
                self.params.bands,
            ),
            Plan::Time {
                fft,
                window,
                seg_len,
            } => Self::time_energies(&clip, fft.as_ref(), window, *seg_len, self.params.bands),
        };

        if self.params.log_compress {
            for e in energies.iter_mut() {
                *e = (*e + LOG_EPSILON).log10();
            }
        }
        normalize(&mut energies, self.params.normalization);

        FeatureVector {
            values: energies,
            params: self.params,
        }
    }

    fn frequency_energies(
        clip: &[f32],
        fft: &dyn Fft<f32>,
        window: &[f32],
        bands: usize,
    ) -> Vec<f32> {
        let mut buf: Vec<Complex<f32>> = clip
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buf);

        let bins = clip.len() / 2;
        band_partition(bins, bands)
            .into_iter()
            .map(|range| {
                let e: f64 = buf[range].iter().map(|c| c.norm_sqr() as f64).sum();
                e as f32
            })
            .collect()
    }

    fn time_energies(
        clip: &[f32],
        fft: &dyn Fft<f32>,
        window: &[f32],
        seg_len: usize,
        bands: usize,
    ) -> Vec<f32> {
        let n = clip.len();
        let mut energies = Vec::with_capacity(bands);
        let mut buf = vec![Complex::new(0.0_f32, 0.0); seg_len];

        for i in 0..bands {
            let start = i * seg_len;
            let end = if i == bands - 1 { n } else { start + seg_len };
            let segment = &clip[start..end];

            // Fit the (possibly longer last) segment to the FFT size.
            for (j, slot) in buf.iter_mut().enumerate() {
                let s = segment.get(j).copied().unwrap_or(0.0);
                *slot = Complex::new(s * window[j], 0.0);
            }
            fft.process(&mut buf);

            let bins = seg_len / 2;
            let e: f64 = buf[..bins].iter().map(|c| c.norm_sqr() as f64).sum();
            energies.push(e as f32);
        }

        energies
    }
}

/// Apply the configured normalization in place.
fn normalize(values: &mut [f32], normalization: Normalization) {
    match normalization {
        Normalization::None => {}
        Normalization::UnitSum => {
            let sum: f32 = values.iter().sum();
            if sum.abs() > f32::EPSILON {
                for v in values.iter_mut() {
                    *v /= sum;
                }
            }
        }
        Normalization::UnitL2 => {
            let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                for v in values.iter_mut() {
                    *v /= norm;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
