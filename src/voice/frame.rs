//! Audio frames and finished utterances

use crate::Result;

/// Channel count of every captured frame and utterance
pub const MONO: u16 = 1;

/// A fixed-length block of mono 16-bit PCM samples
///
/// Frames are immutable once produced; the sample count always equals
/// `sample_rate * frame_duration_ms / 1000` for the capture that made them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Box<[i16]>,
}

impl AudioFrame {
    /// Wrap a block of samples as a frame
    #[must_use]
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    /// A frame of digital silence
    #[must_use]
    pub fn silent(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Samples in capture order
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<i16>> for AudioFrame {
    fn from(samples: Vec<i16>) -> Self {
        Self::new(samples)
    }
}

/// A finished capture: every accepted frame concatenated in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    samples: Vec<i16>,
    sample_rate: u32,
    frame_len: usize,
}

impl Utterance {
    pub(crate) fn from_frames(frames: Vec<AudioFrame>, sample_rate: u32, frame_len: usize) -> Self {
        let mut samples = Vec::with_capacity(frames.len() * frame_len);
        for frame in frames {
            samples.extend_from_slice(frame.samples());
        }

        Self {
            samples,
            sample_rate,
            frame_len,
        }
    }

    /// Concatenated PCM samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Take ownership of the PCM buffer
    #[must_use]
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    /// Sample rate the frames were captured at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count (always mono)
    #[must_use]
    pub const fn channels(&self) -> u16 {
        MONO
    }

    /// Samples per frame at capture time
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Number of frames the utterance was built from
    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.frame_len == 0 {
            return 0;
        }
        self.samples.len() / self.frame_len
    }

    /// Split the buffer back into the frames it was built from
    pub fn frames(&self) -> std::slice::Chunks<'_, i16> {
        self.samples.chunks(self.frame_len.max(1))
    }

    /// Audio length in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// Encode as a 16-bit mono WAV container
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        super::wav::pcm_to_wav(&self.samples, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_preserves_frame_order() {
        let frames = vec![
            AudioFrame::new(vec![1, 2, 3]),
            AudioFrame::new(vec![4, 5, 6]),
            AudioFrame::new(vec![7, 8, 9]),
        ];
        let utterance = Utterance::from_frames(frames.clone(), 16000, 3);

        assert_eq!(utterance.samples(), &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(utterance.frame_count(), 3);

        let split: Vec<&[i16]> = utterance.frames().collect();
        let original: Vec<&[i16]> = frames.iter().map(AudioFrame::samples).collect();
        assert_eq!(split, original);
    }

    #[test]
    fn test_utterance_duration() {
        let frames = vec![AudioFrame::silent(160); 50];
        let utterance = Utterance::from_frames(frames, 16000, 160);

        assert_eq!(utterance.duration_ms(), 500);
        assert_eq!(utterance.channels(), 1);
    }
}
