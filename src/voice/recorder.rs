//! Fixed-duration recording without voice activity gating

use tokio_util::sync::CancellationToken;

use super::capture::{AudioFrameSource, CaptureConfig, CaptureError};
use super::frame::{AudioFrame, Utterance};

/// Record frames for a fixed duration, ignoring speech/silence
///
/// The duration is rounded up to whole frames.
///
/// # Errors
///
/// Returns `InvalidConfig` for a zero-length frame, `DeviceFailure` if the
/// source breaks, and `Cancelled` if `cancel` fires first
pub async fn record_for<S>(
    config: &CaptureConfig,
    source: &mut S,
    duration_ms: u64,
    cancel: &CancellationToken,
) -> Result<Utterance, CaptureError>
where
    S: AudioFrameSource + ?Sized,
{
    let frame_len = config.frame_len();
    let frame_ms = u64::from(config.frame_duration_ms);
    if frame_len == 0 || frame_ms == 0 {
        return Err(CaptureError::InvalidConfig(
            "frame holds no samples".to_string(),
        ));
    }

    let frame_count = duration_ms.div_ceil(frame_ms);
    let mut frames: Vec<AudioFrame> = Vec::new();

    tracing::debug!(duration_ms, frame_count, "fixed-duration recording");

    while (frames.len() as u64) < frame_count {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CaptureError::Cancelled),
            frame = source.next_frame() => frame?,
        };

        if frame.len() != frame_len {
            return Err(CaptureError::DeviceFailure(format!(
                "frame of {} samples, expected {frame_len}",
                frame.len()
            )));
        }
        frames.push(frame);
    }

    Ok(Utterance::from_frames(frames, config.sample_rate, frame_len))
}
