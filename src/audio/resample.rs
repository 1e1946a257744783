//! Audio resampling and channel mixing utilities.
//!
//! The recognition pipeline requires mono `f32` audio at the configured
//! sample rate.  This module provides the two conversion steps:
//!
//! 1. [`downmix_mono`] — average any number of interleaved channels to mono.
//! 2. [`resample`] — linear-interpolation resampling to an arbitrary target
//!    rate, preserving duration.
//!
//! Linear interpolation is plenty for energy features: the subsequent
//! low-pass denoise stage removes anything near the folded band edge anyway.

// ---------------------------------------------------------------------------
// downmix_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec` with no
///   averaging (fast path — avoids an extra allocation when already mono).
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use voicecmd::audio::downmix_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = downmix_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.0).abs() < 1e-6);
/// ```
pub fn downmix_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz using linear
/// interpolation.
///
/// * If `source_rate == target_rate` the input is cloned and returned
///   unchanged (no-op fast path).
/// * If `samples` is empty an empty vector is returned.
///
/// The output length is `ceil(samples.len() × target_rate / source_rate)`,
/// so the duration in seconds is preserved.
///
/// # Example
///
/// ```rust
/// use voicecmd::audio::resample;
///
/// // Downsample from 48 kHz to 16 kHz (ratio = 1/3)
/// let hi = vec![0.5_f32; 480];
/// let lo = resample(&hi, 48_000, 16_000);
/// assert_eq!(lo.len(), 160);
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            // Linear interpolation between adjacent samples
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Chunk-by-chunk counterpart of [`resample`].
///
/// Resampling each capture chunk independently restarts the interpolation at
/// every chunk boundary, which leaves a small seam whenever the device rate
/// differs from the target rate.  `StreamResampler` instead carries the read
/// position and the previous chunk's final sample across calls, so feeding a
/// signal in arbitrary chunk sizes produces the same samples as resampling it
/// whole (a trailing sample or two stays pending until more input arrives).
pub struct StreamResampler {
    source_rate: u32,
    target_rate: u32,
    /// Output samples produced so far; the next read position is
    /// `emitted / ratio` in input-sample units.
    emitted: u64,
    /// Input samples consumed across all previous chunks.
    seen: u64,
    /// Final sample of the previous chunk, for interpolation across the seam.
    carried: Option<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            source_rate,
            target_rate,
            emitted: 0,
            seen: 0,
            carried: None,
        }
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Resample one chunk, continuing where the previous call left off.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }
        if self.source_rate == self.target_rate || self.source_rate == 0 || self.target_rate == 0 {
            self.seen += input.len() as u64;
            self.carried = input.last().copied();
            return input.to_vec();
        }

        let ratio = self.target_rate as f64 / self.source_rate as f64;
        let seen = self.seen;
        let carried = self.carried;
        let last_index = seen + input.len() as u64 - 1;
        // Global stream index → sample; index `seen − 1` is the carried one.
        let sample_at = |i: u64| -> f32 {
            if i >= seen {
                input[(i - seen) as usize]
            } else {
                carried.unwrap_or(0.0)
            }
        };

        let mut output = Vec::new();
        loop {
            let src_pos = self.emitted as f64 / ratio;
            let idx = src_pos as u64;
            if idx > last_index || (idx == last_index && src_pos > idx as f64) {
                break; // needs samples from the next chunk
            }
            let frac = (src_pos - idx as f64) as f32;
            let sample = if idx < last_index {
                sample_at(idx) * (1.0 - frac) + sample_at(idx + 1) * frac
            } else {
                sample_at(idx)
            };
            output.push(sample);
            self.emitted += 1;
        }

        self.seen = seen + input.len() as u64;
        self.carried = input.last().copied();
        output
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- downmix_mono ------------------------------------------------------

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        let out = downmix_mono(&input, 1);
        assert_eq!(out, input);
    }

    #[test]
    fn downmix_two_channel() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.5];
        let out = downmix_mono(&input, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6); // (1.0 + -1.0) / 2
        assert!((out[1] - 0.5).abs() < 1e-6); // (0.5 + 0.5) / 2
    }

    #[test]
    fn downmix_four_channel() {
        let input = vec![0.4_f32; 4];
        let out = downmix_mono(&input, 4);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels() {
        let out = downmix_mono(&[1.0_f32, 2.0], 0);
        assert!(out.is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        let out = resample(&input, 16_000, 16_000);
        assert_eq!(out.len(), input.len());
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-6, "sample mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn resample_empty_input() {
        let out = resample(&[], 48_000, 16_000);
        assert!(out.is_empty());
    }

    #[test]
    fn resample_48k_to_16k_output_length() {
        // 480 samples @ 48 kHz = 10 ms → should become 160 samples @ 16 kHz
        let input = vec![0.5_f32; 480];
        let out = resample(&input, 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_44100_to_16k_output_length() {
        // 44100 samples @ 44.1 kHz = 1 second → ~16000 output samples
        let input = vec![0.0_f32; 44_100];
        let out = resample(&input, 44_100, 16_000);
        // Allow ±1 sample rounding tolerance
        let expected = 16_000usize;
        assert!(
            out.len().abs_diff(expected) <= 1,
            "expected ~{expected}, got {}",
            out.len()
        );
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        // A DC signal (all 0.5) should remain 0.5 after resampling
        let input = vec![0.5_f32; 480];
        let out = resample(&input, 48_000, 16_000);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn resample_upsample_doubles_length() {
        let input = vec![0.0_f32; 80]; // 10 ms @ 8 kHz
        let out = resample(&input, 8_000, 16_000);
        assert_eq!(out.len(), 160); // 10 ms @ 16 kHz
    }

    // ---- StreamResampler ---------------------------------------------------

    /// Feeding a signal chunk by chunk must produce the same samples as
    /// resampling it whole, for any chunk size.
    #[test]
    fn stream_resampler_matches_whole_signal() {
        let signal: Vec<f32> = (0..1_000).map(|i| (i as f32 * 0.013).sin()).collect();
        let whole = resample(&signal, 44_100, 16_000);

        for chunk_size in [1_usize, 7, 160, 333] {
            let mut resampler = StreamResampler::new(44_100, 16_000);
            let mut streamed = Vec::new();
            for chunk in signal.chunks(chunk_size) {
                streamed.extend(resampler.process(chunk));
            }

            // The whole-signal pass also emits held samples past the final
            // input; the streaming pass keeps those pending.
            assert!(
                whole.len() - streamed.len() <= 2,
                "chunk {chunk_size}: {} vs {}",
                whole.len(),
                streamed.len()
            );
            for (i, (a, b)) in whole.iter().zip(streamed.iter()).enumerate() {
                assert!(
                    (a - b).abs() < 1e-5,
                    "chunk {chunk_size}, sample {i}: {a} vs {b}"
                );
            }
        }
    }

    /// A ramp resampled in chunks whose length is not a multiple of the rate
    /// ratio must stay a ramp: no discontinuity at any chunk seam.
    #[test]
    fn stream_resampler_has_no_chunk_seams() {
        let signal: Vec<f32> = (0..800).map(|i| i as f32 / 800.0).collect();
        let mut resampler = StreamResampler::new(48_000, 16_000);
        let mut out = Vec::new();
        for chunk in signal.chunks(100) {
            out.extend(resampler.process(chunk));
        }

        assert!(out.len() > 2);
        let step = out[1] - out[0];
        for (i, pair) in out.windows(2).enumerate() {
            assert!(
                (pair[1] - pair[0] - step).abs() < 1e-5,
                "seam at output sample {i}"
            );
        }
    }

    #[test]
    fn stream_resampler_same_rate_passthrough() {
        let mut resampler = StreamResampler::new(16_000, 16_000);
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(resampler.process(&input), input);
        assert_eq!(resampler.process(&[]), Vec::<f32>::new());
    }
}
