//! Audio capture, decoding, and conditioning.
//!
//! Everything downstream of this module works on one shape of data: a mono
//! [`Waveform`] of `f32` samples in `[-1.0, 1.0]`.  The submodules get audio
//! into that shape and clean it up:
//!
//! - [`capture`] — cpal microphone input (streaming chunks or one-shot record)
//! - [`wav`] — corpus file decoding via `hound`
//! - [`resample`] — channel downmix and linear-interp rate conversion
//! - [`denoise`] — zero-phase Butterworth low-pass
//! - [`preprocess`] — the full conditioning chain producing fixed-length clips
//! - [`buffer`] — the ring buffer the streaming recognizer accumulates into

pub mod buffer;
pub mod capture;
pub mod denoise;
pub mod preprocess;
pub mod resample;
pub mod wav;

pub use buffer::RingBuffer;
pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use denoise::{filtfilt, LowPassFilter};
pub use preprocess::Preprocessor;
pub use resample::{downmix_mono, resample, StreamResampler};
pub use wav::{load_wav_mono, WavError};

// ---------------------------------------------------------------------------
// Waveform
// ---------------------------------------------------------------------------

/// A mono audio clip: `f32` samples in `[-1.0, 1.0]` plus the rate they were
/// sampled at.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Mono PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Root-mean-square level of the clip.  Returns 0.0 for an empty clip.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}
