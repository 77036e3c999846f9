//! Decode stage.
//!
//! Wraps a Symphonia decoder behind a submit/receive pair: one packet in,
//! zero or one frame out. Decoded audio is converted to interleaved `f32`
//! through a reused [`SampleBuffer`].

use std::mem;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use crate::error::OpenError;
use crate::format::{AudioFormat, ChannelLayout, Rational, SampleFormat};
use crate::frame::{Frame, PullStatus};

pub(crate) struct DecodeStage {
    decoder: Box<dyn Decoder>,
    time_base: Rational,
    format: AudioFormat,
    ready: Frame,
    has_ready: bool,
    scratch: Option<SampleBuffer<f32>>,
    consecutive_errors: u32,
    max_retries: u32,
}

impl DecodeStage {
    pub(crate) fn new(params: &CodecParameters, max_retries: u32) -> Result<Self, OpenError> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(OpenError::Codec)?;
        let rate = params.sample_rate.unwrap_or(0);
        let layout = params
            .channels
            .map(ChannelLayout::from_channels)
            .unwrap_or_else(|| ChannelLayout::default_for(2));
        let format = AudioFormat {
            sample_format: SampleFormat::from_bits(params.bits_per_sample),
            sample_rate: rate,
            channel_layout: layout,
        };
        Ok(Self {
            decoder,
            time_base: Rational::new(1, rate.max(1)),
            format,
            ready: Frame::new(format),
            has_ready: false,
            scratch: None,
            consecutive_errors: 0,
            max_retries,
        })
    }

    /// Decoder output time base: one tick per sample.
    pub(crate) fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Format of the most recent frame, or the codec's declared format before any.
    pub(crate) fn format(&self) -> AudioFormat {
        self.format
    }

    /// Decode one packet into the ready slot.
    ///
    /// Corrupt packets are skipped until more than `max_retries` arrive in a row.
    pub(crate) fn submit(&mut self, packet: &Packet) -> Result<(), SymphoniaError> {
        let decoded = match self.decoder.decode(packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors > self.max_retries {
                    return Err(SymphoniaError::DecodeError(msg));
                }
                tracing::warn!(
                    error = msg,
                    consecutive = self.consecutive_errors,
                    "skipping corrupt packet"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.consecutive_errors = 0;

        let frames = decoded.frames();
        if frames == 0 {
            return Ok(());
        }
        let spec = *decoded.spec();
        let needed = frames * spec.channels.count();
        if self
            .scratch
            .as_ref()
            .is_some_and(|buf| buf.capacity() < needed)
        {
            self.scratch = None;
        }
        let capacity = decoded.capacity().max(frames) as u64;
        let scratch = self
            .scratch
            .get_or_insert_with(|| SampleBuffer::new(capacity, spec));

        let format = AudioFormat {
            sample_format: SampleFormat::of_buffer(&decoded),
            sample_rate: spec.rate,
            channel_layout: ChannelLayout::from_channels(spec.channels),
        };
        scratch.copy_interleaved_ref(decoded);

        self.ready.format = format;
        self.ready.nb_samples = frames;
        self.ready.data.clear();
        self.ready.data.extend_from_slice(scratch.samples());
        self.has_ready = true;
        self.format = format;
        Ok(())
    }

    /// Move the next decoded frame into `dst`.
    ///
    /// `dst` is unreferenced first, so on [`PullStatus::Again`] it holds no samples.
    pub(crate) fn receive(&mut self, dst: &mut Frame) -> PullStatus {
        dst.unref();
        if !self.has_ready {
            return PullStatus::Again;
        }
        mem::swap(dst, &mut self.ready);
        self.has_ready = false;
        PullStatus::Ready
    }

    /// Drop buffered decoder state, e.g. after a seek.
    pub(crate) fn reset(&mut self) {
        self.decoder.reset();
        self.ready.unref();
        self.has_ready = false;
        self.consecutive_errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::Channels;
    use symphonia::core::codecs::{CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16LE};

    fn pcm_params(rate: u32) -> CodecParameters {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_PCM_S16LE)
            .with_sample_rate(rate)
            .with_channels(Channels::FRONT_LEFT | Channels::FRONT_RIGHT)
            .with_bits_per_sample(16)
            .with_bits_per_coded_sample(16)
            .with_max_frames_per_packet(1152);
        params
    }

    fn s16_packet(samples: &[i16]) -> Packet {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Packet::new_from_slice(0, 0, (samples.len() / 2) as u64, &bytes)
    }

    #[test]
    fn declared_format_comes_from_codec_params() {
        let stage = DecodeStage::new(&pcm_params(44_100), 3).unwrap();
        assert_eq!(stage.time_base(), Rational::new(1, 44_100));
        assert_eq!(stage.format().sample_rate, 44_100);
        assert_eq!(stage.format().sample_format, SampleFormat::S16);
        assert_eq!(stage.format().channel_layout, ChannelLayout::STEREO);
    }

    #[test]
    fn unknown_codec_fails_to_open() {
        let mut params = pcm_params(44_100);
        params.codec = CODEC_TYPE_NULL;
        assert!(matches!(
            DecodeStage::new(&params, 3),
            Err(OpenError::Codec(_))
        ));
    }

    #[test]
    fn submit_then_receive_yields_one_frame() {
        let mut stage = DecodeStage::new(&pcm_params(48_000), 3).unwrap();
        let mut frame = Frame::new(stage.format());
        stage
            .submit(&s16_packet(&[16384, -16384, 0, 8192]))
            .unwrap();

        assert_eq!(stage.receive(&mut frame), PullStatus::Ready);
        assert_eq!(frame.nb_samples, 2);
        assert_eq!(frame.format.sample_format, SampleFormat::S16);
        let s = frame.samples();
        assert!((s[0] - 0.5).abs() < 1e-4);
        assert!((s[1] + 0.5).abs() < 1e-4);
        assert!((s[3] - 0.25).abs() < 1e-4);

        assert_eq!(stage.receive(&mut frame), PullStatus::Again);
        assert!(frame.is_empty());
    }

    #[test]
    fn reset_drops_pending_frame() {
        let mut stage = DecodeStage::new(&pcm_params(48_000), 3).unwrap();
        let mut frame = Frame::new(stage.format());
        stage.submit(&s16_packet(&[1, 2, 3, 4])).unwrap();
        stage.reset();
        assert_eq!(stage.receive(&mut frame), PullStatus::Again);
    }
}
