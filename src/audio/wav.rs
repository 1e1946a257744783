//! WAV decoding for the training corpus.
//!
//! [`load_wav_mono`] reads a `.wav` file with `hound`, scales integer sample
//! formats into `[-1.0, 1.0]` and downmixes multi-channel recordings, so the
//! rest of the pipeline only ever sees mono `f32` at the file's native rate.

use std::path::Path;

use thiserror::Error;

use super::resample::downmix_mono;
use super::Waveform;

// ---------------------------------------------------------------------------
// WavError
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding a corpus file.
#[derive(Debug, Error)]
pub enum WavError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: hound::Error,
    },

    #[error("failed to decode samples from {path}: {source}")]
    Decode {
        path: String,
        source: hound::Error,
    },

    #[error("unsupported bit depth {bits} in {path}")]
    UnsupportedBitDepth { bits: u16, path: String },
}

// ---------------------------------------------------------------------------
// load_wav_mono
// ---------------------------------------------------------------------------

/// Load a WAV file as a mono [`Waveform`] with samples in `[-1.0, 1.0]`.
///
/// Supported sample formats: 16/24/32-bit integer PCM and 32-bit float.
/// Multi-channel files are downmixed by channel averaging.  The sample rate
/// is the file's native rate; resampling happens later in preprocessing.
pub fn load_wav_mono(path: &Path) -> Result<Waveform, WavError> {
    let display = path.display().to_string();

    let mut reader = hound::WavReader::open(path).map_err(|source| WavError::Open {
        path: display.clone(),
        source,
    })?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|source| WavError::Decode {
                path: display.clone(),
                source,
            })?,
        hound::SampleFormat::Int => {
            // Full-scale value for this bit depth, e.g. 32768 for i16.
            let scale = match spec.bits_per_sample {
                16 => 32_768.0,
                24 => 8_388_608.0,
                32 => 2_147_483_648.0,
                bits => {
                    return Err(WavError::UnsupportedBitDepth {
                        bits,
                        path: display,
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|source| WavError::Decode {
                    path: display.clone(),
                    source,
                })?
        }
    };

    let samples = downmix_mono(&interleaved, spec.channels);
    Ok(Waveform::new(samples, spec.sample_rate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
