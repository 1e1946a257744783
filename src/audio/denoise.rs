//! Zero-phase low-pass denoising.
//!
//! [`LowPassFilter`] is a second-order Butterworth biquad; [`filtfilt`] runs
//! it forward and then backward over the clip so the net phase response is
//! zero — the voiced span keeps its position, which matters because the
//! silence trimmer and the fixed-length aligner run right after this stage.
//!
//! The cutoff is clamped to 95% of Nyquist so a config written for one
//! sample rate cannot produce an unstable design at a lower one.

use std::f32::consts::PI;

// ---------------------------------------------------------------------------
// LowPassFilter
// ---------------------------------------------------------------------------

/// Second-order Butterworth low-pass biquad (direct form I).
pub struct LowPassFilter {
    // feed-forward
    b0: f32,
    b1: f32,
    b2: f32,
    // feed-back
    a1: f32,
    a2: f32,
    // 2-sample delay line (x[n-k], y[n-k])
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl LowPassFilter {
    /// Design a low-pass with the given cutoff.
    ///
    /// `cutoff_hz` is clamped into `(0, 0.95 × Nyquist]`.
    pub fn new(sample_rate: f32, cutoff_hz: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        let fc = cutoff_hz.clamp(1.0, 0.95 * nyquist);

        // Bilinear transform of the analog Butterworth prototype (Q = 1/√2).
        let k = (PI * fc / sample_rate).tan();
        let q = std::f32::consts::FRAC_1_SQRT_2;
        let norm = 1.0 / (1.0 + k / q + k * k);

        let b0 = k * k * norm;
        Self {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k * k - 1.0) * norm,
            a2: (1.0 - k / q + k * k) * norm,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Reset the delay line to silence.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Filter one sample.
    #[inline]
    pub fn process_sample(&mut self, x0: f32) -> f32 {
        let y0 = self.b0 * x0 + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;
        y0
    }

    /// Filter a block of samples in-place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process_sample(*s);
        }
    }
}

// ---------------------------------------------------------------------------
// filtfilt
// ---------------------------------------------------------------------------

/// Apply a low-pass forward and backward over `samples` (zero-phase).
///
/// Returns a new vector; the input is untouched.  An empty input yields an
/// empty output.
pub fn filtfilt(sample_rate: f32, cutoff_hz: f32, samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut filter = LowPassFilter::new(sample_rate, cutoff_hz);

    let mut out = samples.to_vec();
    filter.process(&mut out);

    // Backward pass with a fresh delay line.
    filter.reset();
    out.reverse();
    filter.process(&mut out);
    out.reverse();

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
