//! Waveform conditioning ahead of feature extraction.
//!
//! [`Preprocessor`] turns an arbitrary mono recording into a fixed-length,
//! denoised, amplitude-normalized clip.  Training and live capture run the
//! **same** steps in the same order, because the classifier compares raw
//! band energies — a clip preprocessed differently is a different point in
//! feature space.
//!
//! ## Steps
//!
//! 1. DC removal (subtract the sample mean).
//! 2. Pre-emphasis `y[n] = x[n] − α·x[n−1]`, `y[0] = x[0]`.
//! 3. Resample to the configured rate (duration preserved).
//! 4. Zero-phase Butterworth low-pass ([`filtfilt`]).
//! 5. Silence trim: 25 ms energy windows, threshold relative to the loudest
//!    window in dB, fixed margin either side of the voiced span.
//! 6. Fixed-length alignment to exactly N samples ([`AlignPolicy`]).
//! 7. RMS normalization to the target level (skipped for near-silence).
//!
//! The whole pass is pure; empty input comes back empty.

use crate::config::{AlignPolicy, AudioConfig};

use super::denoise::filtfilt;
use super::resample::resample;
use super::Waveform;

/// Energy window length used by the silence trimmer, in seconds.
const TRIM_WINDOW_SECS: f32 = 0.025;

/// Below this RMS the clip is treated as silence and not amplified.
const RMS_EPSILON: f32 = 1e-6;

// ---------------------------------------------------------------------------
// Preprocessor
// ---------------------------------------------------------------------------

/// Deterministic waveform conditioner.
///
/// # Example
///
/// ```rust
/// use voicecmd::audio::{Preprocessor, Waveform};
/// use voicecmd::config::AudioConfig;
///
/// let cfg = AudioConfig::default();
/// let pre = Preprocessor::new(&cfg);
///
/// let raw = Waveform::new(vec![0.1_f32; 24_000], 16_000);
/// let clip = pre.process(&raw);
/// assert_eq!(clip.samples.len(), cfg.clip_samples);
/// ```
pub struct Preprocessor {
    cfg: AudioConfig,
}

impl Preprocessor {
    pub fn new(cfg: &AudioConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    /// Run the full conditioning pass.
    ///
    /// Returns a clip of exactly `clip_samples` samples at `sample_rate`,
    /// except for empty input which is returned unchanged.
    pub fn process(&self, raw: &Waveform) -> Waveform {
        if raw.samples.is_empty() {
            return raw.clone();
        }

        let fs = self.cfg.sample_rate;

        // 1. DC removal
        let mut x = remove_dc(&raw.samples);

        // 2. Pre-emphasis
        x = preemphasis(&x, self.cfg.preemphasis);

        // 3. Resample to the target rate
        if raw.sample_rate != fs {
            x = resample(&x, raw.sample_rate, fs);
        }

        // 4. Zero-phase low-pass denoise
        x = filtfilt(fs as f32, self.cfg.lowpass_cutoff_hz, &x);

        // 5. Silence trim
        x = trim_silence(
            &x,
            fs,
            self.cfg.trim_threshold_db,
            self.cfg.trim_margin_ms,
        );

        // 6. Fixed-length alignment
        x = align(&x, self.cfg.clip_samples, self.cfg.alignment);

        // 7. RMS normalization
        normalize_rms(&mut x, self.cfg.target_rms);

        Waveform::new(x, fs)
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn remove_dc(x: &[f32]) -> Vec<f32> {
    let mean = x.iter().sum::<f32>() / x.len() as f32;
    x.iter().map(|s| s - mean).collect()
}

fn preemphasis(x: &[f32], alpha: f32) -> Vec<f32> {
    let mut y = Vec::with_capacity(x.len());
    y.push(x[0]);
    for n in 1..x.len() {
        y.push(x[n] - alpha * x[n - 1]);
    }
    y
}

/// Trim leading and trailing silence relative to the loudest energy window.
///
/// The signal is split into 25 ms windows; each window's mean energy is
/// converted to dB and compared against `max_db + threshold_db` (the
/// threshold is negative).  The output spans the first to the last window
/// above the threshold, widened by `margin_ms` on both sides.
fn trim_silence(x: &[f32], fs: u32, threshold_db: f32, margin_ms: f32) -> Vec<f32> {
    let win = ((TRIM_WINDOW_SECS * fs as f32) as usize).max(1);
    if x.len() < win {
        return x.to_vec();
    }

    let energies_db: Vec<f32> = x
        .chunks(win)
        .map(|frame| {
            let e = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
            10.0 * e.max(1e-10).log10()
        })
        .collect();

    let max_db = energies_db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let threshold = max_db + threshold_db;

    let first = energies_db.iter().position(|&db| db > threshold);
    let last = energies_db.iter().rposition(|&db| db > threshold);

    let (first, last) = match (first, last) {
        (Some(f), Some(l)) => (f, l),
        // Nothing crossed the threshold — leave the signal alone.
        _ => return x.to_vec(),
    };

    let margin = (margin_ms / 1_000.0 * fs as f32) as usize;
    let start = (first * win).saturating_sub(margin);
    let end = ((last + 1) * win + margin).min(x.len());

    x[start..end].to_vec()
}

/// Fit `x` to exactly `n` samples under the configured policy.
fn align(x: &[f32], n: usize, policy: AlignPolicy) -> Vec<f32> {
    if x.len() == n {
        return x.to_vec();
    }

    if x.len() < n {
        // Both policies zero-pad short clips at the end.
        let mut out = x.to_vec();
        out.resize(n, 0.0);
        return out;
    }

    match policy {
        AlignPolicy::CenterPad => {
            let start = (x.len() - n) / 2;
            x[start..start + n].to_vec()
        }
        AlignPolicy::MaxEnergyWindow => {
            let stride = (n / 4).max(1);
            let mut best_start = 0;
            let mut best_energy = f32::NEG_INFINITY;
            let mut start = 0;
            while start + n <= x.len() {
                let e: f32 = x[start..start + n].iter().map(|s| s * s).sum();
                if e > best_energy {
                    best_energy = e;
                    best_start = start;
                }
                start += stride;
            }
            x[best_start..best_start + n].to_vec()
        }
    }
}

fn normalize_rms(x: &mut [f32], target: f32) {
    let rms = (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt();
    if rms < RMS_EPSILON {
        return; // near-silence: amplifying would only boost noise
    }
    let gain = target / rms;
    for s in x.iter_mut() {
        *s *= gain;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AudioConfig {
        AudioConfig {
            sample_rate: 16_000,
            clip_samples: 4_096,
            ..AudioConfig::default()
        }
    }

    fn rms_of(x: &[f32]) -> f32 {
        (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt()
    }

    fn tone(freq: f32, fs: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / fs as f32).sin())
            .collect()
    }

    // ---- Whole pipeline ----------------------------------------------------

    #[test]
    fn empty_input_returns_empty() {
        let pre = Preprocessor::new(&test_config());
        let out = pre.process(&Waveform::new(Vec::new(), 16_000));
        assert!(out.samples.is_empty());
    }

    #[test]
    fn output_is_fixed_length() {
        let cfg = test_config();
        let pre = Preprocessor::new(&cfg);

        for len in [100, 4_096, 50_000] {
            let out = pre.process(&Waveform::new(tone(440.0, 16_000, len, 0.5), 16_000));
            assert_eq!(out.samples.len(), cfg.clip_samples, "input len {len}");
            assert_eq!(out.sample_rate, cfg.sample_rate);
        }
    }

    #[test]
    fn output_rms_hits_target() {
        let cfg = test_config();
        let pre = Preprocessor::new(&cfg);
        let out = pre.process(&Waveform::new(tone(440.0, 16_000, 8_000, 0.5), 16_000));
        let r = rms_of(&out.samples);
        // Zero-padding dilutes RMS only when the voiced span is shorter than
        // the clip; a 0.5 s tone trimmed+padded into 4096 samples stays close.
        assert!((r - cfg.target_rms).abs() < 0.05, "rms = {r}");
    }

    #[test]
    fn all_zero_input_stays_silent() {
        let pre = Preprocessor::new(&test_config());
        let out = pre.process(&Waveform::new(vec![0.0; 8_000], 16_000));
        assert_eq!(out.samples.len(), 4_096);
        assert!(out.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn deterministic() {
        let pre = Preprocessor::new(&test_config());
        let raw = Waveform::new(tone(300.0, 16_000, 10_000, 0.3), 16_000);
        let a = pre.process(&raw);
        let b = pre.process(&raw);
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn resamples_foreign_rate() {
        let cfg = test_config();
        let pre = Preprocessor::new(&cfg);
        let raw = Waveform::new(tone(440.0, 44_100, 22_050, 0.5), 44_100);
        let out = pre.process(&raw);
        assert_eq!(out.sample_rate, 16_000);
        assert_eq!(out.samples.len(), cfg.clip_samples);
    }

    // ---- Steps -------------------------------------------------------------

    #[test]
    fn dc_removal_zeroes_mean() {
        let x = vec![1.0_f32; 100];
        let y = remove_dc(&x);
        let mean: f32 = y.iter().sum::<f32>() / y.len() as f32;
        assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn preemphasis_first_sample_unchanged() {
        let x = vec![0.5_f32, 0.5, 0.5];
        let y = preemphasis(&x, 0.97);
        assert!((y[0] - 0.5).abs() < 1e-7);
        assert!((y[1] - (0.5 - 0.97 * 0.5)).abs() < 1e-6);
    }

    #[test]
    fn trim_keeps_voiced_span() {
        let fs = 16_000;
        let mut x = vec![0.0_f32; 8_000]; // 0.5 s silence
        x.extend(tone(440.0, fs, 8_000, 0.5)); // 0.5 s voice
        x.extend(vec![0.0_f32; 8_000]); // 0.5 s silence

        let trimmed = trim_silence(&x, fs, -40.0, 100.0);
        // Voiced span (8000) + 100 ms margin (1600) each side, window rounding.
        assert!(trimmed.len() < 12_500, "trimmed len {}", trimmed.len());
        assert!(trimmed.len() >= 8_000);
    }

    #[test]
    fn trim_pure_silence_unchanged() {
        // All windows share the same floored energy; everything is "voiced"
        // relative to the max, so the signal stays intact.
        let x = vec![0.0_f32; 4_000];
        let trimmed = trim_silence(&x, 16_000, -40.0, 100.0);
        assert_eq!(trimmed.len(), x.len());
    }

    #[test]
    fn align_center_crop() {
        let x: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = align(&x, 10, AlignPolicy::CenterPad);
        assert_eq!(out.len(), 10);
        assert_eq!(out[0], 45.0); // start = (100 − 10) / 2
    }

    #[test]
    fn align_pads_short_input() {
        let x = vec![1.0_f32; 5];
        let out = align(&x, 10, AlignPolicy::CenterPad);
        assert_eq!(out.len(), 10);
        assert_eq!(&out[..5], &[1.0; 5]);
        assert_eq!(&out[5..], &[0.0; 5]);
    }

    #[test]
    fn align_max_energy_picks_loud_window() {
        // 3000 quiet samples, then 1000 loud ones.
        let mut x = vec![0.01_f32; 3_000];
        x.extend(vec![0.9_f32; 1_000]);
        let out = align(&x, 1_000, AlignPolicy::MaxEnergyWindow);
        assert_eq!(out.len(), 1_000);
        // The winning window must contain mostly loud samples.
        let loud = out.iter().filter(|&&s| s > 0.5).count();
        assert!(loud > 500, "only {loud} loud samples kept");
    }

    #[test]
    fn normalize_rms_skips_near_silence() {
        let mut x = vec![1e-9_f32; 100];
        normalize_rms(&mut x, 0.1);
        assert!(x.iter().all(|&s| s < 1e-8)); // untouched
    }
}
