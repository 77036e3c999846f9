//! Built-in filters.

use std::collections::HashMap;

use crate::error::{FilterError, FilterGraphError};
use crate::filter::parse::{FilterArg, FilterSpec};
use crate::format::{AudioFormat, SampleFormat};
use crate::frame::Frame;
use crate::resample::{Converter, ResampleConfig};

/// One node of a linear filter chain.
pub(crate) trait AudioFilter {
    fn name(&self) -> &'static str;

    /// Accept the upstream format and return this node's output format.
    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError>;

    /// Process one frame, appending zero or more frames to `out`.
    fn filter(&mut self, frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError>;

    /// End of stream: append whatever the node still holds.
    fn finish(&mut self, _out: &mut Vec<Frame>) -> Result<(), FilterError> {
        Ok(())
    }

    /// Emit buffered input early without ending the stream.
    fn drain_buffered(&mut self, _out: &mut Vec<Frame>) -> Result<(), FilterError> {
        Ok(())
    }

    /// Drop all internal state.
    fn reset(&mut self) {}
}

/// Instantiate a filter from its parsed description.
pub(crate) fn create(
    spec: FilterSpec,
    resample: &ResampleConfig,
) -> Result<Box<dyn AudioFilter>, FilterGraphError> {
    let node: Box<dyn AudioFilter> = match spec.name.as_str() {
        "anull" => {
            Options::resolve("anull", spec.args, &[])?;
            Box::new(Anull)
        }
        "volume" => Box::new(Volume::from_options(Options::resolve(
            "volume",
            spec.args,
            &[&["volume"]],
        )?)?),
        "aecho" => Box::new(Aecho::from_options(Options::resolve(
            "aecho",
            spec.args,
            &[&["in_gain"], &["out_gain"], &["delays"], &["decays"]],
        )?)?),
        "alimiter" => Box::new(Alimiter::from_options(Options::resolve(
            "alimiter",
            spec.args,
            &[&["level_in"], &["level_out"], &["limit"], &["attack"], &["release"]],
        )?)?),
        "asetnsamples" => Box::new(Asetnsamples::from_options(Options::resolve(
            "asetnsamples",
            spec.args,
            &[&["nb_out_samples", "n"], &["pad", "p"]],
        )?)?),
        "aresample" => {
            let opts = Options::resolve(
                "aresample",
                spec.args,
                &[&["sample_rate", "osr", "out_sample_rate"]],
            )?;
            let rate = opts.u32_or("sample_rate", 0, 1..=768_000)?;
            Box::new(Aresample::new(
                "aresample",
                (rate > 0).then_some(rate),
                None,
                *resample,
            ))
        }
        _ => return Err(FilterGraphError::UnknownFilter { name: spec.name }),
    };
    Ok(node)
}

/// Conversion node appended when the chain output does not match the sink.
pub(crate) fn auto_resample(target: AudioFormat, resample: &ResampleConfig) -> Box<dyn AudioFilter> {
    Box::new(Aresample::new(
        "auto_aresample",
        Some(target.sample_rate),
        Some(target),
        *resample,
    ))
}

/// Option values keyed by canonical name.
struct Options {
    filter: &'static str,
    values: HashMap<&'static str, String>,
}

impl Options {
    /// Map positional and named args onto `names`; each entry lists the
    /// canonical name first, then aliases.
    fn resolve(
        filter: &'static str,
        args: Vec<FilterArg>,
        names: &[&[&'static str]],
    ) -> Result<Self, FilterGraphError> {
        let mut values = HashMap::new();
        for (idx, arg) in args.into_iter().enumerate() {
            let canonical = match &arg.key {
                Some(key) => names
                    .iter()
                    .find(|aliases| aliases.iter().any(|a| *a == key.as_str()))
                    .map(|aliases| aliases[0])
                    .ok_or_else(|| FilterGraphError::InvalidOption {
                        filter: filter.to_string(),
                        option: key.clone(),
                        message: "unknown option".to_string(),
                    })?,
                None => names.get(idx).map(|aliases| aliases[0]).ok_or_else(|| {
                    FilterGraphError::InvalidOption {
                        filter: filter.to_string(),
                        option: arg.value.clone(),
                        message: "too many arguments".to_string(),
                    }
                })?,
            };
            values.insert(canonical, arg.value);
        }
        Ok(Self { filter, values })
    }

    fn invalid(&self, option: &str, message: impl Into<String>) -> FilterGraphError {
        FilterGraphError::InvalidOption {
            filter: self.filter.to_string(),
            option: option.to_string(),
            message: message.into(),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn f64_or(
        &self,
        name: &str,
        default: f64,
        range: std::ops::RangeInclusive<f64>,
    ) -> Result<f64, FilterGraphError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        let value: f64 = raw
            .parse()
            .map_err(|_| self.invalid(name, format!("'{raw}' is not a number")))?;
        if !range.contains(&value) {
            return Err(self.invalid(
                name,
                format!("{value} out of range [{} - {}]", range.start(), range.end()),
            ));
        }
        Ok(value)
    }

    fn u32_or(
        &self,
        name: &str,
        default: u32,
        range: std::ops::RangeInclusive<u32>,
    ) -> Result<u32, FilterGraphError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        let value: u32 = raw
            .parse()
            .map_err(|_| self.invalid(name, format!("'{raw}' is not an integer")))?;
        if !range.contains(&value) {
            return Err(self.invalid(
                name,
                format!("{value} out of range [{} - {}]", range.start(), range.end()),
            ));
        }
        Ok(value)
    }

    fn bool_or(&self, name: &str, default: bool) -> Result<bool, FilterGraphError> {
        match self.get(name) {
            None => Ok(default),
            Some("1") | Some("true") => Ok(true),
            Some("0") | Some("false") => Ok(false),
            Some(raw) => Err(self.invalid(name, format!("'{raw}' is not a boolean"))),
        }
    }

    /// `|`-separated list of numbers.
    fn list(&self, name: &str, default: &str) -> Result<Vec<f64>, FilterGraphError> {
        let raw = self.get(name).unwrap_or(default);
        raw.split('|')
            .map(|item| {
                item.trim()
                    .parse::<f64>()
                    .map_err(|_| self.invalid(name, format!("'{item}' is not a number")))
            })
            .collect()
    }
}

fn processed(input: AudioFormat) -> AudioFormat {
    AudioFormat {
        sample_format: SampleFormat::F32,
        ..input
    }
}

struct Anull;

impl AudioFilter for Anull {
    fn name(&self) -> &'static str {
        "anull"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError> {
        Ok(input)
    }

    fn filter(&mut self, frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        out.push(frame);
        Ok(())
    }
}

/// Constant gain, given as a factor or in dB (`-6dB`).
struct Volume {
    gain: f32,
    output: Option<AudioFormat>,
}

impl Volume {
    fn from_options(opts: Options) -> Result<Self, FilterGraphError> {
        let raw = opts.get("volume").unwrap_or("1.0").trim();
        let lower = raw.to_ascii_lowercase();
        let gain = match lower.strip_suffix("db") {
            Some(db) => {
                let db: f64 = db
                    .trim()
                    .parse()
                    .map_err(|_| opts.invalid("volume", format!("'{raw}' is not a level")))?;
                10f64.powf(db / 20.0)
            }
            None => lower
                .parse::<f64>()
                .map_err(|_| opts.invalid("volume", format!("'{raw}' is not a level")))?,
        };
        if !gain.is_finite() || gain < 0.0 {
            return Err(opts.invalid("volume", format!("'{raw}' out of range")));
        }
        Ok(Self {
            gain: gain as f32,
            output: None,
        })
    }
}

impl AudioFilter for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError> {
        let output = processed(input);
        self.output = Some(output);
        Ok(output)
    }

    fn filter(&mut self, mut frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        let gain = self.gain;
        frame.data.iter_mut().for_each(|s| *s *= gain);
        if let Some(format) = self.output {
            frame.format = format;
        }
        out.push(frame);
        Ok(())
    }
}

/// Multi-tap echo. Delays in milliseconds, one decay per delay.
struct Aecho {
    in_gain: f32,
    out_gain: f32,
    delays_ms: Vec<f64>,
    decays: Vec<f32>,
    /// Per-tap delay in frames, set by `configure`.
    taps: Vec<usize>,
    channels: usize,
    history: Vec<f32>,
    index: usize,
    seen_input: bool,
    output: Option<AudioFormat>,
}

impl Aecho {
    fn from_options(opts: Options) -> Result<Self, FilterGraphError> {
        let in_gain = opts.f64_or("in_gain", 0.6, 0.0..=1.0)? as f32;
        let out_gain = opts.f64_or("out_gain", 0.3, 0.0..=1.0)? as f32;
        let delays_ms = opts.list("delays", "1000")?;
        let decays: Vec<f32> = opts
            .list("decays", "0.5")?
            .into_iter()
            .map(|d| d as f32)
            .collect();
        if let Some(bad) = delays_ms.iter().find(|d| !(**d > 0.0 && **d <= 90_000.0)) {
            return Err(opts.invalid("delays", format!("{bad} out of range (0 - 90000]")));
        }
        if let Some(bad) = decays.iter().find(|d| !(**d > 0.0 && **d <= 1.0)) {
            return Err(opts.invalid("decays", format!("{bad} out of range (0 - 1]")));
        }
        if delays_ms.len() != decays.len() {
            return Err(opts.invalid(
                "decays",
                format!(
                    "{} delays but {} decays",
                    delays_ms.len(),
                    decays.len()
                ),
            ));
        }
        Ok(Self {
            in_gain,
            out_gain,
            delays_ms,
            decays,
            taps: Vec::new(),
            channels: 0,
            history: Vec::new(),
            index: 0,
            seen_input: false,
            output: None,
        })
    }

    fn max_delay(&self) -> usize {
        self.taps.iter().copied().max().unwrap_or(0)
    }

    fn process(&mut self, data: &mut [f32]) {
        let len = self.max_delay();
        let ch = self.channels;
        for frame in data.chunks_exact_mut(ch) {
            for (c, sample) in frame.iter_mut().enumerate() {
                let input = *sample;
                let mut acc = input * self.in_gain;
                for (tap, decay) in self.taps.iter().zip(&self.decays) {
                    let ix = (self.index + len - tap) % len;
                    acc += self.history[ix * ch + c] * decay;
                }
                *sample = acc * self.out_gain;
                self.history[self.index * ch + c] = input;
            }
            self.index = (self.index + 1) % len;
        }
    }
}

impl AudioFilter for Aecho {
    fn name(&self) -> &'static str {
        "aecho"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError> {
        let rate = input.sample_rate as f64;
        self.taps = self
            .delays_ms
            .iter()
            .map(|ms| ((ms * rate / 1000.0) as usize).max(1))
            .collect();
        self.channels = input.channels();
        self.history = vec![0.0; self.max_delay() * self.channels];
        self.index = 0;
        let output = processed(input);
        self.output = Some(output);
        Ok(output)
    }

    fn filter(&mut self, mut frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        self.seen_input = true;
        let len = frame.nb_samples * self.channels;
        self.process(&mut frame.data[..len]);
        if let Some(format) = self.output {
            frame.format = format;
        }
        out.push(frame);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        let Some(format) = self.output else {
            return Ok(());
        };
        if !self.seen_input {
            return Ok(());
        }
        self.seen_input = false;
        let mut tail = vec![0.0f32; self.max_delay() * self.channels];
        self.process(&mut tail);
        out.push(Frame::from_interleaved(format, tail));
        Ok(())
    }

    fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.index = 0;
        self.seen_input = false;
    }
}

/// Peak limiter: instant attack, exponential release.
struct Alimiter {
    level_in: f32,
    level_out: f32,
    limit: f32,
    release_ms: f64,
    release_coef: f32,
    gain: f32,
    channels: usize,
    output: Option<AudioFormat>,
}

impl Alimiter {
    fn from_options(opts: Options) -> Result<Self, FilterGraphError> {
        let level_in = opts.f64_or("level_in", 1.0, 0.015_625..=64.0)? as f32;
        let level_out = opts.f64_or("level_out", 1.0, 0.015_625..=64.0)? as f32;
        let limit = opts.f64_or("limit", 1.0, 0.0625..=1.0)? as f32;
        // Attack is accepted for compatibility; this limiter reacts instantly.
        opts.f64_or("attack", 5.0, 0.1..=80.0)?;
        let release_ms = opts.f64_or("release", 50.0, 1.0..=8000.0)?;
        Ok(Self {
            level_in,
            level_out,
            limit,
            release_ms,
            release_coef: 0.0,
            gain: 1.0,
            channels: 0,
            output: None,
        })
    }
}

impl AudioFilter for Alimiter {
    fn name(&self) -> &'static str {
        "alimiter"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError> {
        let release_frames = self.release_ms / 1000.0 * input.sample_rate as f64;
        self.release_coef = (-1.0 / release_frames).exp() as f32;
        self.channels = input.channels();
        let output = processed(input);
        self.output = Some(output);
        Ok(output)
    }

    fn filter(&mut self, mut frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        let len = frame.nb_samples * self.channels;
        for samples in frame.data[..len].chunks_exact_mut(self.channels) {
            let mut peak = 0.0f32;
            for s in samples.iter_mut() {
                *s *= self.level_in;
                peak = peak.max(s.abs());
            }
            let target = if peak > self.limit {
                self.limit / peak
            } else {
                1.0
            };
            self.gain = if target < self.gain {
                target
            } else {
                target + (self.gain - target) * self.release_coef
            };
            for s in samples.iter_mut() {
                *s *= self.gain * self.level_out;
            }
        }
        if let Some(format) = self.output {
            frame.format = format;
        }
        out.push(frame);
        Ok(())
    }

    fn reset(&mut self) {
        self.gain = 1.0;
    }
}

/// Largest accepted `asetnsamples` frame size.
const MAX_NB_OUT_SAMPLES: u32 = 1 << 20;

/// Re-chunk into frames of exactly `n` samples.
struct Asetnsamples {
    n: usize,
    pad: bool,
    channels: usize,
    pending: Vec<f32>,
    output: Option<AudioFormat>,
}

impl Asetnsamples {
    fn from_options(opts: Options) -> Result<Self, FilterGraphError> {
        let n = opts.u32_or("nb_out_samples", 1024, 1..=MAX_NB_OUT_SAMPLES)? as usize;
        let pad = opts.bool_or("pad", true)?;
        Ok(Self {
            n,
            pad,
            channels: 0,
            pending: Vec::new(),
            output: None,
        })
    }
}

impl AudioFilter for Asetnsamples {
    fn name(&self) -> &'static str {
        "asetnsamples"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError> {
        self.channels = input.channels();
        self.output = Some(input);
        Ok(input)
    }

    fn filter(&mut self, frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        let Some(format) = self.output else {
            return Ok(());
        };
        self.pending.extend_from_slice(frame.samples());
        let chunk = self.n * self.channels;
        while self.pending.len() >= chunk {
            let data: Vec<f32> = self.pending.drain(..chunk).collect();
            out.push(Frame::from_interleaved(format, data));
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        let Some(format) = self.output else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut data = std::mem::take(&mut self.pending);
        if self.pad {
            data.resize(self.n * self.channels, 0.0);
        }
        out.push(Frame::from_interleaved(format, data));
        Ok(())
    }

    fn drain_buffered(&mut self, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        let Some(format) = self.output else {
            return Ok(());
        };
        if !self.pending.is_empty() {
            let data = std::mem::take(&mut self.pending);
            out.push(Frame::from_interleaved(format, data));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Rate (and, for the automatic sink adapter, layout) conversion.
struct Aresample {
    name: &'static str,
    rate: Option<u32>,
    target: Option<AudioFormat>,
    config: ResampleConfig,
    converter: Option<Converter>,
}

impl Aresample {
    fn new(
        name: &'static str,
        rate: Option<u32>,
        target: Option<AudioFormat>,
        config: ResampleConfig,
    ) -> Self {
        Self {
            name,
            rate,
            target,
            config,
            converter: None,
        }
    }

    fn drain(&mut self, out: &mut Vec<Frame>) {
        let Some(converter) = &mut self.converter else {
            return;
        };
        let mut data = Vec::new();
        if converter.pull(usize::MAX, &mut data) > 0 {
            out.push(Frame::from_interleaved(converter.output(), data));
        }
    }
}

impl AudioFilter for Aresample {
    fn name(&self) -> &'static str {
        self.name
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat, FilterGraphError> {
        let output = match self.target {
            Some(target) => target,
            None => AudioFormat {
                sample_format: SampleFormat::F32,
                sample_rate: self.rate.unwrap_or(input.sample_rate),
                channel_layout: input.channel_layout.or_default(),
            },
        };
        let converter = Converter::new(input, output, &self.config).map_err(|e| {
            FilterGraphError::Negotiation {
                filter: self.name.to_string(),
                message: e.to_string(),
            }
        })?;
        self.converter = Some(converter);
        Ok(output)
    }

    fn filter(&mut self, frame: Frame, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        if let Some(converter) = &mut self.converter {
            converter.push(frame.samples())?;
        }
        self.drain(out);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        if let Some(converter) = &mut self.converter {
            converter.flush()?;
        }
        self.drain(out);
        Ok(())
    }

    fn drain_buffered(&mut self, out: &mut Vec<Frame>) -> Result<(), FilterError> {
        if let Some(converter) = &mut self.converter {
            converter.flush()?;
        }
        self.drain(out);
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(converter) = &mut self.converter {
            converter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse::parse_chain;
    use crate::format::ChannelLayout;

    fn build(desc: &str, input: AudioFormat) -> Box<dyn AudioFilter> {
        let spec = parse_chain(desc).unwrap().remove(0);
        let mut node = create(spec, &ResampleConfig::default()).unwrap();
        node.configure(input).unwrap();
        node
    }

    fn build_err(desc: &str) -> FilterGraphError {
        let spec = parse_chain(desc).unwrap().remove(0);
        match create(spec, &ResampleConfig::default()) {
            Ok(_) => panic!("expected {desc} to be rejected"),
            Err(e) => e,
        }
    }

    fn stereo(rate: u32) -> AudioFormat {
        AudioFormat {
            sample_format: SampleFormat::S16,
            sample_rate: rate,
            channel_layout: ChannelLayout::STEREO,
        }
    }

    fn run(node: &mut dyn AudioFilter, frame: Frame) -> Vec<Frame> {
        let mut out = Vec::new();
        node.filter(frame, &mut out).unwrap();
        out
    }

    #[test]
    fn volume_accepts_factor_and_decibels() {
        let mut node = build("volume=0.5", stereo(48_000));
        let out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.8; 4]));
        assert_eq!(out[0].samples(), &[0.4; 4]);
        assert_eq!(out[0].format.sample_format, SampleFormat::F32);

        let mut node = build("volume=volume=-6.0206dB", stereo(48_000));
        let out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![1.0; 2]));
        assert!((out[0].samples()[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn option_errors_name_the_option() {
        assert!(matches!(
            build_err("volume=loud"),
            FilterGraphError::InvalidOption { option, .. } if option == "volume"
        ));
        assert!(matches!(
            build_err("volume=gain=2"),
            FilterGraphError::InvalidOption { option, .. } if option == "gain"
        ));
        assert!(matches!(
            build_err("alimiter=limit=2"),
            FilterGraphError::InvalidOption { option, .. } if option == "limit"
        ));
        assert!(matches!(
            build_err("aecho=0.8:0.9:1000|500:0.3"),
            FilterGraphError::InvalidOption { option, .. } if option == "decays"
        ));
        assert!(matches!(
            build_err("anull=1"),
            FilterGraphError::InvalidOption { .. }
        ));
        assert!(matches!(
            build_err("equalizer=f=1000"),
            FilterGraphError::UnknownFilter { name } if name == "equalizer"
        ));
    }

    #[test]
    fn aecho_adds_delayed_copy_and_tail() {
        let fmt = AudioFormat {
            sample_format: SampleFormat::F32,
            sample_rate: 1000,
            channel_layout: ChannelLayout::MONO,
        };
        let mut node = build("aecho=1:1:3:0.5", fmt);
        let out = run(node.as_mut(), Frame::from_interleaved(fmt, vec![1.0, 0.0, 0.0, 0.0, 0.0]));
        assert_eq!(out[0].samples(), &[1.0, 0.0, 0.0, 0.5, 0.0]);

        let mut tail = Vec::new();
        node.finish(&mut tail).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].nb_samples, 3);

        let mut again = Vec::new();
        node.finish(&mut again).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn alimiter_caps_peaks() {
        let mut node = build("alimiter=limit=0.5", stereo(48_000));
        let input: Vec<f32> = (0..2000).map(|i| if i % 2 == 0 { 0.9 } else { -0.95 }).collect();
        let out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), input));
        assert!(out[0].samples().iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn alimiter_passes_quiet_signal() {
        let mut node = build("alimiter", stereo(48_000));
        let out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.25; 8]));
        assert_eq!(out[0].samples(), &[0.25; 8]);
    }

    #[test]
    fn asetnsamples_rechunks_and_pads() {
        let mut node = build("asetnsamples=n=4", stereo(48_000));
        let out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.1; 2 * 10]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.nb_samples == 4));

        let mut tail = Vec::new();
        node.finish(&mut tail).unwrap();
        assert_eq!(tail[0].nb_samples, 4);
        assert_eq!(&tail[0].samples()[4..], &[0.0; 4]);
    }

    #[test]
    fn asetnsamples_without_padding_keeps_short_tail() {
        let mut node = build("asetnsamples=4:0", stereo(48_000));
        run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.1; 2 * 5]));
        let mut tail = Vec::new();
        node.finish(&mut tail).unwrap();
        assert_eq!(tail[0].nb_samples, 1);
    }

    #[test]
    fn asetnsamples_rejects_oversized_frames() {
        assert!(matches!(
            build_err("asetnsamples=n=2000000"),
            FilterGraphError::InvalidOption { option, .. } if option == "nb_out_samples"
        ));
        build("asetnsamples=n=1048576", stereo(48_000));
    }

    #[test]
    fn asetnsamples_drains_partial_frame_unpadded() {
        let mut node = build("asetnsamples=n=4", stereo(48_000));
        run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.1; 2 * 6]));
        let mut early = Vec::new();
        node.drain_buffered(&mut early).unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].nb_samples, 2);

        let mut tail = Vec::new();
        node.finish(&mut tail).unwrap();
        assert!(tail.is_empty());
    }

    #[test]
    fn aresample_drain_keeps_the_node_usable() {
        let mut node = build("aresample=24000", stereo(48_000));
        let out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.0; 2 * 1000]));
        assert!(out.is_empty());
        let mut early = Vec::new();
        node.drain_buffered(&mut early).unwrap();
        let drained: usize = early.iter().map(|f| f.nb_samples).sum();
        assert_eq!(drained, 500);

        let mut later = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.0; 2 * 1000]));
        node.finish(&mut later).unwrap();
        let total: usize = later.iter().map(|f| f.nb_samples).sum();
        assert_eq!(total, 500);
    }

    #[test]
    fn aresample_changes_rate() {
        let mut node = build("aresample=24000", stereo(48_000));
        let mut out = run(node.as_mut(), Frame::from_interleaved(stereo(48_000), vec![0.0; 2 * 4800]));
        node.finish(&mut out).unwrap();
        let total: usize = out.iter().map(|f| f.nb_samples).sum();
        assert_eq!(total, 2400);
        assert!(out.iter().all(|f| f.format.sample_rate == 24_000));
    }
}
