//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, StreamConfig};

use super::microphone::f32_to_i16;
use super::wav::{self, STT_SAMPLE_RATE};
use crate::{Error, Result};

/// Container formats a TTS backend may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// RIFF/WAVE container
    Wav,
    /// MPEG layer III stream
    Mp3,
    /// Headerless 16-bit little-endian mono PCM
    RawPcm,
}

impl AudioFormat {
    /// Guess the format from leading bytes
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            Self::Wav
        } else if bytes.starts_with(b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
        {
            Self::Mp3
        } else {
            Self::RawPcm
        }
    }
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
}

impl AudioPlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { device })
    }

    /// Play encoded audio, detecting its container
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_bytes(&self, bytes: &[u8]) -> Result<()> {
        match AudioFormat::sniff(bytes) {
            AudioFormat::Wav => self.play_wav(bytes),
            AudioFormat::Mp3 => self.play_mp3(bytes),
            AudioFormat::RawPcm => {
                let samples: Vec<f32> = bytes
                    .chunks_exact(2)
                    .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
                    .collect();
                self.play(&samples, STT_SAMPLE_RATE)
            }
        }
    }

    /// Play WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_wav(&self, bytes: &[u8]) -> Result<()> {
        let decoded = wav::decode_wav(bytes)?;
        self.play(&decoded.to_mono(), decoded.sample_rate)
    }

    /// Play MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(mp3_data)?;
        self.play(&samples, sample_rate)
    }

    /// Play mono f32 samples, blocking until they finish
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let (config, sample_format, samples) = self.output_config(samples, sample_rate)?;
        let rate = config.sample_rate.0;

        let sample_count = samples.len();
        let finished = Arc::new(AtomicBool::new(false));
        let cursor = PlaybackCursor::new(samples, Arc::clone(&finished));

        let stream = match sample_format {
            SampleFormat::I16 => self.build_stream::<i16>(&config, cursor, f32_to_i16),
            SampleFormat::U16 => self.build_stream::<u16>(&config, cursor, f32_to_u16),
            SampleFormat::F32 => self.build_stream::<f32>(&config, cursor, |s| s),
            other => Err(Error::Audio(format!("unsupported sample format {other}"))),
        }?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(rate.max(1));
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                tracing::warn!(duration_ms, "playback did not finish in time");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, sample_rate = rate, "playback complete");

        Ok(())
    }

    /// Build an output stream for device samples of type `T`, duplicating
    /// each mono sample across channels
    fn build_stream<T>(
        &self,
        config: &StreamConfig,
        mut cursor: PlaybackCursor,
        convert: fn(f32) -> T,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + Send + 'static,
    {
        let channels = usize::from(config.channels.max(1));

        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        frame.fill(convert(cursor.advance()));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))
    }

    /// Choose an output config and sample format, resampling when the device
    /// cannot run the source rate
    fn output_config(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat, Vec<f32>)> {
        let native = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
                    && is_playable(c.sample_format())
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels);

        if let Some(range) = native {
            let sample_format = range.sample_format();
            let config = range.with_sample_rate(SampleRate(sample_rate)).config();
            return Ok((config, sample_format, samples.to_vec()));
        }

        let default = self
            .device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?;
        let sample_format = default.sample_format();
        let fallback = default.config();
        let resampled = wav::resample(samples, sample_rate, fallback.sample_rate.0)?;

        tracing::debug!(
            from = sample_rate,
            to = fallback.sample_rate.0,
            "resampling for output device"
        );

        Ok((fallback, sample_format, resampled))
    }
}

/// Read position over the samples being played
struct PlaybackCursor {
    samples: Vec<f32>,
    position: usize,
    finished: Arc<AtomicBool>,
}

impl PlaybackCursor {
    const fn new(samples: Vec<f32>, finished: Arc<AtomicBool>) -> Self {
        Self {
            samples,
            position: 0,
            finished,
        }
    }

    /// Next sample, or silence once the buffer is exhausted
    fn advance(&mut self) -> f32 {
        if let Some(&sample) = self.samples.get(self.position) {
            self.position += 1;
            sample
        } else {
            self.finished.store(true, Ordering::Relaxed);
            0.0
        }
    }
}

const fn is_playable(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32
    )
}

/// Convert a normalized f32 sample to offset-binary u16
#[allow(clippy::cast_sign_loss)]
fn f32_to_u16(sample: f32) -> u16 {
    (i32::from(f32_to_i16(sample)) + 32768) as u16
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the stream is not valid MP3
#[allow(clippy::cast_sign_loss)]
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let channels = frame.channels.max(1);

                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
                    #[allow(clippy::cast_precision_loss)]
                    let mean = sum / chunk.len() as f32;
                    mean
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 stream contained no frames".to_string()));
    }

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_formats() {
        let wav = wav::pcm_to_wav(&[0, 1, 2], 16000).unwrap();
        assert_eq!(AudioFormat::sniff(&wav), AudioFormat::Wav);
        assert_eq!(AudioFormat::sniff(b"ID3\x04\x00"), AudioFormat::Mp3);
        assert_eq!(AudioFormat::sniff(&[0xFF, 0xFB, 0x90, 0x00]), AudioFormat::Mp3);
        assert_eq!(AudioFormat::sniff(&[0x01, 0x02, 0x03, 0x04]), AudioFormat::RawPcm);
    }

    #[test]
    fn test_f32_to_u16_offsets_and_clamps() {
        assert_eq!(f32_to_u16(0.0), 32768);
        assert_eq!(f32_to_u16(-1.5), 0);
        assert_eq!(f32_to_u16(1.0), u16::MAX);
    }

    #[test]
    fn test_playable_formats() {
        assert!(is_playable(SampleFormat::I16));
        assert!(is_playable(SampleFormat::U16));
        assert!(is_playable(SampleFormat::F32));
        assert!(!is_playable(SampleFormat::I32));
    }

    #[test]
    fn test_cursor_yields_silence_after_end() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut cursor = PlaybackCursor::new(vec![0.25, -0.5], Arc::clone(&finished));

        assert!((cursor.advance() - 0.25).abs() < f32::EPSILON);
        assert!((cursor.advance() + 0.5).abs() < f32::EPSILON);
        assert!(!finished.load(Ordering::Relaxed));
        assert!(cursor.advance().abs() < f32::EPSILON);
        assert!(finished.load(Ordering::Relaxed));
        assert_eq!(cursor.position, 2);
    }

    #[test]
    fn test_decode_mp3_rejects_empty() {
        assert!(decode_mp3(&[]).is_err());
    }
}
