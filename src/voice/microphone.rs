//! Microphone frame source

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::capture::{AudioFrameSource, CaptureConfig, CaptureError};
use super::frame::AudioFrame;

type FrameResult = Result<AudioFrame, CaptureError>;

/// Exclusive handle on the default input device
///
/// The device callback slices incoming audio into exact-length frames and
/// hands them to the owning capture loop through a channel. The stream is
/// stopped and the device released when the source is dropped.
pub struct MicrophoneSource {
    stream: Stream,
    frames: mpsc::UnboundedReceiver<FrameResult>,
    sample_rate: u32,
}

impl MicrophoneSource {
    /// Open the default input device and start streaming frames
    ///
    /// # Errors
    ///
    /// Returns `DeviceFailure` if no device supports the requested rate or
    /// the stream cannot start
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| device_failure("no input device available"))?;

        let sample_rate = config.sample_rate;
        let supported = device
            .supported_input_configs()
            .map_err(device_failure)?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
                    && matches!(
                        c.sample_format(),
                        SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32
                    )
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| device_failure("no suitable audio config found"))?;

        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let frame_len = config.frame_len();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = stream_config.channels,
            %sample_format,
            frame_len,
            "microphone opened"
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, frame_len, tx, |s| s)
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, frame_len, tx, u16_to_i16)
            }
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, frame_len, tx, f32_to_i16)
            }
            other => Err(device_failure(format!("unsupported sample format {other}"))),
        }?;

        stream.play().map_err(device_failure)?;
        tracing::debug!("microphone streaming");

        Ok(Self {
            stream,
            frames: rx,
            sample_rate,
        })
    }

    /// Rate the device is streaming at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[async_trait(?Send)]
impl AudioFrameSource for MicrophoneSource {
    async fn next_frame(&mut self) -> Result<AudioFrame, CaptureError> {
        self.frames
            .recv()
            .await
            .unwrap_or_else(|| Err(device_failure("audio stream ended")))
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!(error = %e, "failed to pause microphone stream");
        }
        self.frames.close();
        tracing::debug!("microphone released");
    }
}

/// Build an input stream for device samples of type `T`
///
/// Samples are converted to i16 and the first channel is kept, then sliced
/// into `frame_len` frames.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    frame_len: usize,
    tx: mpsc::UnboundedSender<FrameResult>,
    convert: fn(T) -> i16,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let err_tx = tx.clone();
    let mut pending: Vec<i16> = Vec::with_capacity(frame_len * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                pending.extend(data.iter().step_by(channels).map(|&s| convert(s)));

                while pending.len() >= frame_len {
                    let frame: Vec<i16> = pending.drain(..frame_len).collect();
                    if tx.send(Ok(AudioFrame::new(frame))).is_err() {
                        pending.clear();
                        return;
                    }
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio capture error");
                let _ = err_tx.send(Err(device_failure(err)));
            },
            None,
        )
        .map_err(device_failure)
}

/// Convert an offset-binary u16 sample to i16
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32768) as i16
}

/// Convert a normalized f32 sample to i16
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

fn device_failure(e: impl ToString) -> CaptureError {
    CaptureError::DeviceFailure(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.5), -32768);
        assert_eq!(f32_to_i16(2.0), 32767);
    }

    #[test]
    fn test_u16_to_i16_recenters() {
        assert_eq!(u16_to_i16(0), i16::MIN);
        assert_eq!(u16_to_i16(32768), 0);
        assert_eq!(u16_to_i16(u16::MAX), i16::MAX);
        assert_eq!(u16_to_i16(32868), 100);
    }
}
