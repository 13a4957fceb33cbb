//! WAV packaging, decoding and sample-rate normalization

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Rate every STT upload is normalized to
pub const STT_SAMPLE_RATE: u32 = 16_000;

/// Input block size for the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded audio as normalized f32 samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples in -1.0..=1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl DecodedAudio {
    /// First-channel samples only
    ///
    /// Multi-channel audio is averaged down to one channel.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = usize::from(self.channels.max(1));
        if channels == 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// Encode mono i16 PCM as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Decode WAV bytes of any common PCM or float layout
///
/// # Errors
///
/// Returns error if the container is malformed or the sample format is
/// unsupported
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (hound::SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1_i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (format, bits) => {
            return Err(Error::Audio(format!(
                "unsupported WAV sample format {format:?} at {bits} bits"
            )));
        }
    };

    tracing::debug!(
        samples = samples.len(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        "decoded WAV"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Normalize any WAV to 16 kHz mono i16 samples
///
/// # Errors
///
/// Returns error if decoding or resampling fails
pub fn normalize_wav(bytes: &[u8]) -> Result<Vec<i16>> {
    let decoded = decode_wav(bytes)?;
    let mono = decoded.to_mono();
    let resampled = resample(&mono, decoded.sample_rate, STT_SAMPLE_RATE)?;

    Ok(resampled.into_iter().map(super::microphone::f32_to_i16).collect())
}

/// Normalize a WAV to 16 kHz mono and re-encode it
///
/// # Errors
///
/// Returns error if decoding, resampling or encoding fails
pub fn normalize_wav_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let samples = normalize_wav(bytes)?;
    pcm_to_wav(&samples, STT_SAMPLE_RATE)
}

/// Resample mono f32 audio between rates
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails mid-stream
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }
    if from == 0 || to == 0 {
        return Err(Error::Audio("sample rate must be non-zero".to_string()));
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| Error::Audio(format!("failed to create resampler: {e}")))?;

    let expected = (input.len() as u64 * u64::from(to) / u64::from(from)) as usize;
    let delay = resampler.output_delay();
    let chunk = resampler.input_frames_next();
    let mut output = Vec::with_capacity(expected + delay + chunk);

    let mut block = vec![0.0_f32; chunk];
    for piece in input.chunks(chunk) {
        block[..piece.len()].copy_from_slice(piece);
        block[piece.len()..].fill(0.0);
        let processed = resampler
            .process(std::slice::from_ref(&block), None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&processed[0]);
    }

    // Flush the filter delay with silence
    while output.len() < expected + delay {
        block.fill(0.0);
        let processed = resampler
            .process(std::slice::from_ref(&block), None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        if processed[0].is_empty() {
            break;
        }
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    tracing::trace!(from, to, input = input.len(), output = output.len(), "resampled");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_to_wav_header() {
        let wav = pcm_to_wav(&[0, 1000, -1000, 32767], 16000).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 8);
    }

    #[test]
    fn test_normalize_keeps_16k_mono() {
        let samples: Vec<i16> = (0..1600).map(|i| ((i % 100) * 100) as i16).collect();
        let wav = pcm_to_wav(&samples, 16000).unwrap();

        let normalized = normalize_wav(&wav).unwrap();
        assert_eq!(normalized.len(), samples.len());
    }

    #[test]
    fn test_normalize_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..800 {
                writer.write_sample(16384_i16).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let normalized = normalize_wav(&cursor.into_inner()).unwrap();
        assert_eq!(normalized.len(), 800);
        assert!(normalized.iter().all(|&s| (8000..=8200).contains(&s)));
    }

    #[test]
    fn test_resample_length() {
        let input = vec![0.25_f32; 48000];
        let output = resample(&input, 48000, 16000).unwrap();

        assert_eq!(output.len(), 16000);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wav(b"not a wav file").is_err());
    }
}
