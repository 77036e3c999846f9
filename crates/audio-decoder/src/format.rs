//! Audio format descriptors shared by every stage.

use std::fmt;

use symphonia::core::audio::{AudioBufferRef, Channels};

use crate::config::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// Sample representation reported by the decoder.
///
/// Frame storage is always `f32`; this records what the codec produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    U16,
    U24,
    U32,
    S8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::U16 => "u16",
            SampleFormat::U24 => "u24",
            SampleFormat::U32 => "u32",
            SampleFormat::S8 => "s8",
            SampleFormat::S16 => "s16",
            SampleFormat::S24 => "s24",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "flt",
            SampleFormat::F64 => "dbl",
        }
    }

    pub(crate) fn of_buffer(buf: &AudioBufferRef<'_>) -> Self {
        match buf {
            AudioBufferRef::U8(_) => SampleFormat::U8,
            AudioBufferRef::U16(_) => SampleFormat::U16,
            AudioBufferRef::U24(_) => SampleFormat::U24,
            AudioBufferRef::U32(_) => SampleFormat::U32,
            AudioBufferRef::S8(_) => SampleFormat::S8,
            AudioBufferRef::S16(_) => SampleFormat::S16,
            AudioBufferRef::S24(_) => SampleFormat::S24,
            AudioBufferRef::S32(_) => SampleFormat::S32,
            AudioBufferRef::F32(_) => SampleFormat::F32,
            AudioBufferRef::F64(_) => SampleFormat::F64,
        }
    }

    /// Best guess from codec bit depth, used before the first frame is decoded.
    pub(crate) fn from_bits(bits: Option<u32>) -> Self {
        match bits {
            Some(8) => SampleFormat::U8,
            Some(16) => SampleFormat::S16,
            Some(24) => SampleFormat::S24,
            Some(32) => SampleFormat::S32,
            _ => SampleFormat::F32,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Speaker position bits, WAVE channel mask order.
pub(crate) const FRONT_LEFT: u32 = 0x1;
pub(crate) const FRONT_RIGHT: u32 = 0x2;
pub(crate) const FRONT_CENTRE: u32 = 0x4;
pub(crate) const LFE: u32 = 0x8;
pub(crate) const BACK_LEFT: u32 = 0x10;
pub(crate) const BACK_RIGHT: u32 = 0x20;
pub(crate) const FRONT_LEFT_CENTRE: u32 = 0x40;
pub(crate) const FRONT_RIGHT_CENTRE: u32 = 0x80;
pub(crate) const SIDE_LEFT: u32 = 0x200;
pub(crate) const SIDE_RIGHT: u32 = 0x400;

/// Channel count plus optional speaker mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    pub channels: u16,
    pub mask: Option<u32>,
}

impl ChannelLayout {
    pub const MONO: ChannelLayout = ChannelLayout {
        channels: 1,
        mask: Some(FRONT_CENTRE),
    };
    pub const STEREO: ChannelLayout = ChannelLayout {
        channels: 2,
        mask: Some(FRONT_LEFT | FRONT_RIGHT),
    };

    /// Layout with no known speaker positions.
    pub fn unspecified(channels: u16) -> Self {
        Self {
            channels,
            mask: None,
        }
    }

    /// The conventional layout for a channel count.
    pub fn default_for(channels: u16) -> Self {
        let mask = match channels {
            1 => Some(FRONT_CENTRE),
            2 => Some(FRONT_LEFT | FRONT_RIGHT),
            3 => Some(FRONT_LEFT | FRONT_RIGHT | LFE),
            4 => Some(FRONT_LEFT | FRONT_RIGHT | BACK_LEFT | BACK_RIGHT),
            5 => Some(FRONT_LEFT | FRONT_RIGHT | FRONT_CENTRE | BACK_LEFT | BACK_RIGHT),
            6 => Some(FRONT_LEFT | FRONT_RIGHT | FRONT_CENTRE | LFE | BACK_LEFT | BACK_RIGHT),
            8 => Some(
                FRONT_LEFT
                    | FRONT_RIGHT
                    | FRONT_CENTRE
                    | LFE
                    | BACK_LEFT
                    | BACK_RIGHT
                    | SIDE_LEFT
                    | SIDE_RIGHT,
            ),
            _ => None,
        };
        Self { channels, mask }
    }

    /// Fill in the default mask when none is known.
    pub fn or_default(self) -> Self {
        match self.mask {
            Some(_) => self,
            None => Self::default_for(self.channels),
        }
    }

    pub(crate) fn from_channels(channels: Channels) -> Self {
        let count = channels.count() as u16;
        let bits = channels.bits();
        if bits.count_ones() as u16 == count {
            Self {
                channels: count,
                mask: Some(bits),
            }
        } else {
            Self::unspecified(count)
        }
    }

    /// Speaker bit for each interleaved channel, in order.
    pub(crate) fn positions(&self) -> Vec<Option<u32>> {
        match self.or_default().mask {
            Some(mask) => (0..32)
                .map(|bit| 1u32 << bit)
                .filter(|b| mask & b != 0)
                .map(Some)
                .chain(std::iter::repeat(None))
                .take(self.channels as usize)
                .collect(),
            None => vec![None; self.channels as usize],
        }
    }

    pub fn describe(&self) -> String {
        match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            3 => "2.1".to_string(),
            4 => "quad".to_string(),
            5 => "5.0".to_string(),
            6 => "5.1".to_string(),
            8 => "7.1".to_string(),
            n => format!("{n} channels"),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A rational number, used for time bases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Format, rate and layout of a block of audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
}

impl AudioFormat {
    /// The fixed format every chunk handed to the caller is in.
    pub const OUTPUT: AudioFormat = AudioFormat {
        sample_format: SampleFormat::F32,
        sample_rate: OUTPUT_SAMPLE_RATE,
        channel_layout: ChannelLayout::STEREO,
    };

    pub fn channels(&self) -> usize {
        self.channel_layout.channels as usize
    }

    /// Same rate and channel count; the sample format tag is informational.
    pub(crate) fn same_shape(&self, other: &AudioFormat) -> bool {
        self.sample_rate == other.sample_rate
            && self.channel_layout.channels == other.channel_layout.channels
    }

    pub(crate) fn is_output_shape(&self) -> bool {
        self.sample_rate == OUTPUT_SAMPLE_RATE
            && self.channel_layout.channels as usize == OUTPUT_CHANNELS
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "srate:{}Hz fmt:{} chlayout:{}",
            self.sample_rate, self.sample_format, self.channel_layout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_sink_summary() {
        assert_eq!(
            AudioFormat::OUTPUT.to_string(),
            "srate:48000Hz fmt:flt chlayout:stereo"
        );
    }

    #[test]
    fn unspecified_layout_defaults_from_count() {
        let layout = ChannelLayout::unspecified(6).or_default();
        assert_eq!(layout.mask, Some(0x3F));
        assert_eq!(layout.describe(), "5.1");
    }

    #[test]
    fn positions_follow_mask_order() {
        let layout = ChannelLayout::default_for(6);
        let pos = layout.positions();
        assert_eq!(pos.len(), 6);
        assert_eq!(pos[2], Some(FRONT_CENTRE));
        assert_eq!(pos[3], Some(LFE));
    }

    #[test]
    fn odd_channel_counts_have_no_positions() {
        let layout = ChannelLayout::unspecified(7);
        assert_eq!(layout.positions(), vec![None; 7]);
        assert_eq!(layout.describe(), "7 channels");
    }

    #[test]
    fn from_bits_guesses_sample_format() {
        assert_eq!(SampleFormat::from_bits(Some(16)), SampleFormat::S16);
        assert_eq!(SampleFormat::from_bits(None), SampleFormat::F32);
    }
}
