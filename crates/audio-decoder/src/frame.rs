//! Reusable frame buffers.

use crate::format::AudioFormat;

/// A block of interleaved `f32` audio.
///
/// Frames are owned by the pipeline and reused: [`Frame::unref`] drops the
/// samples but keeps the allocation for the next fill.
#[derive(Clone, Debug)]
pub struct Frame {
    pub format: AudioFormat,
    /// Samples per channel. On output frames this is first the requested
    /// batch size, then the number actually produced.
    pub nb_samples: usize,
    pub data: Vec<f32>,
}

impl Frame {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            nb_samples: 0,
            data: Vec::new(),
        }
    }

    pub fn from_interleaved(format: AudioFormat, data: Vec<f32>) -> Self {
        let channels = format.channels().max(1);
        Self {
            format,
            nb_samples: data.len() / channels,
            data,
        }
    }

    /// Destination frame in the output format.
    pub fn output() -> Self {
        Self::new(AudioFormat::OUTPUT)
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn samples(&self) -> &[f32] {
        let len = (self.nb_samples * self.channels()).min(self.data.len());
        &self.data[..len]
    }

    pub fn is_empty(&self) -> bool {
        self.nb_samples == 0
    }

    pub fn unref(&mut self) {
        self.nb_samples = 0;
        self.data.clear();
    }

    /// Replace contents with a copy of `other`, reusing this allocation.
    pub(crate) fn copy_from(&mut self, other: &Frame) {
        self.format = other.format;
        self.nb_samples = other.nb_samples;
        self.data.clear();
        self.data.extend_from_slice(other.samples());
    }
}

/// Result of pulling from a stage that buffers frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullStatus {
    /// A frame was written into the destination.
    Ready,
    /// Nothing buffered; push more input.
    Again,
    /// End of stream reached and fully drained.
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unref_keeps_capacity() {
        let mut frame = Frame::from_interleaved(AudioFormat::OUTPUT, vec![0.5; 64]);
        assert_eq!(frame.nb_samples, 32);
        let cap = frame.data.capacity();
        frame.unref();
        assert!(frame.is_empty());
        assert!(frame.samples().is_empty());
        assert_eq!(frame.data.capacity(), cap);
    }

    #[test]
    fn samples_respects_nb_samples() {
        let mut frame = Frame::from_interleaved(AudioFormat::OUTPUT, vec![1.0; 8]);
        frame.nb_samples = 2;
        assert_eq!(frame.samples().len(), 4);
    }
}
