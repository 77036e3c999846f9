//! Resample stage.
//!
//! Converts decoded or filtered interleaved `f32` audio to the output format:
//! a channel remix followed by Rubato's sinc resampler. The stage binds lazily
//! to the format of the first frame it sees and must be invalidated before it
//! accepts a differently shaped input.

use std::collections::VecDeque;
use std::f32::consts::FRAC_1_SQRT_2;

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::ResampleError;
use crate::format::{
    AudioFormat, BACK_LEFT, BACK_RIGHT, ChannelLayout, FRONT_CENTRE, FRONT_LEFT,
    FRONT_LEFT_CENTRE, FRONT_RIGHT, FRONT_RIGHT_CENTRE, LFE, SIDE_LEFT, SIDE_RIGHT,
};
use crate::frame::Frame;

/// Configuration for the sinc resampler.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames fed to Rubato per call.
    pub chunk_frames: usize,
    /// Sinc filter length.
    pub sinc_len: usize,
    /// Sinc table oversampling.
    pub oversampling_factor: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            sinc_len: 128,
            oversampling_factor: 256,
        }
    }
}

/// Channel remix matrix, `out_channels x in_channels`.
#[derive(Debug)]
struct Remix {
    in_channels: usize,
    out_channels: usize,
    matrix: Option<Vec<f32>>,
}

impl Remix {
    fn new(input: ChannelLayout, output: ChannelLayout) -> Result<Self, ResampleError> {
        let in_channels = input.channels as usize;
        let out_channels = output.channels as usize;
        if in_channels == 0 || out_channels == 0 {
            return Err(ResampleError::Init("zero channels".to_string()));
        }
        if in_channels == out_channels {
            return Ok(Self {
                in_channels,
                out_channels,
                matrix: None,
            });
        }

        let mut matrix = vec![0.0f32; out_channels * in_channels];
        match (in_channels, out_channels) {
            (_, 1) => {
                let positions = input.positions();
                let used = positions.iter().filter(|p| **p != Some(LFE)).count().max(1);
                for (i, pos) in positions.iter().enumerate() {
                    if *pos != Some(LFE) {
                        matrix[i] = 1.0 / used as f32;
                    }
                }
            }
            (1, 2) => {
                matrix[0] = 1.0;
                matrix[1] = 1.0;
            }
            (_, 2) => {
                for (i, pos) in input.positions().iter().enumerate() {
                    let (l, r) = match *pos {
                        Some(FRONT_LEFT) | Some(FRONT_LEFT_CENTRE) => (1.0, 0.0),
                        Some(FRONT_RIGHT) | Some(FRONT_RIGHT_CENTRE) => (0.0, 1.0),
                        Some(FRONT_CENTRE) => (FRAC_1_SQRT_2, FRAC_1_SQRT_2),
                        Some(LFE) => (0.0, 0.0),
                        Some(BACK_LEFT) | Some(SIDE_LEFT) => (FRAC_1_SQRT_2, 0.0),
                        Some(BACK_RIGHT) | Some(SIDE_RIGHT) => (0.0, FRAC_1_SQRT_2),
                        Some(_) => (0.5, 0.5),
                        None if i % 2 == 0 => (1.0, 0.0),
                        None => (0.0, 1.0),
                    };
                    matrix[i] = l;
                    matrix[in_channels + i] = r;
                }
                let left: f32 = matrix[..in_channels].iter().sum();
                let right: f32 = matrix[in_channels..].iter().sum();
                let peak = left.max(right);
                if peak > 1.0 {
                    matrix.iter_mut().for_each(|c| *c /= peak);
                }
            }
            _ => {
                return Err(ResampleError::Init(format!(
                    "unsupported channel conversion {in_channels} -> {out_channels}"
                )));
            }
        }
        Ok(Self {
            in_channels,
            out_channels,
            matrix: Some(matrix),
        })
    }

    fn apply(&self, input: &[f32], out: &mut Vec<f32>) {
        let Some(matrix) = &self.matrix else {
            out.extend_from_slice(input);
            return;
        };
        for frame in input.chunks_exact(self.in_channels) {
            for o in 0..self.out_channels {
                let row = &matrix[o * self.in_channels..(o + 1) * self.in_channels];
                out.push(row.iter().zip(frame).map(|(c, s)| c * s).sum());
            }
        }
    }
}

/// Rubato wrapper fed in fixed input chunks.
struct RateEngine {
    resampler: Async<f32>,
    channels: usize,
    chunk_frames: usize,
    in_rate: u32,
    out_rate: u32,
    pending: Vec<f32>,
    out_buf: Vec<f32>,
    delay_left: usize,
    frames_in: u64,
    frames_out: u64,
}

impl RateEngine {
    fn new(
        in_rate: u32,
        out_rate: u32,
        channels: usize,
        cfg: &ResampleConfig,
    ) -> Result<Self, ResampleError> {
        let ratio = out_rate as f64 / in_rate as f64;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len: cfg.sinc_len,
            f_cutoff: calculate_cutoff(cfg.sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: cfg.oversampling_factor,
            window,
        };
        let chunk_frames = cfg.chunk_frames.max(1);
        let resampler = Async::<f32>::new_sinc(
            ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| ResampleError::Init(format!("{e:#}")))?;
        let out_buf = vec![0.0f32; resampler.output_frames_max() * channels];
        let delay_left = resampler.output_delay();
        Ok(Self {
            resampler,
            channels,
            chunk_frames,
            in_rate,
            out_rate,
            pending: Vec::with_capacity(chunk_frames * channels),
            out_buf,
            delay_left,
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn push(&mut self, input: &[f32], ready: &mut VecDeque<f32>) -> Result<(), ResampleError> {
        self.frames_in += (input.len() / self.channels) as u64;
        let chunk_len = self.chunk_frames * self.channels;
        let mut rest = input;
        while !rest.is_empty() {
            let take = (chunk_len - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == chunk_len {
                self.process_pending(ready, None)?;
            }
        }
        Ok(())
    }

    /// Drain the filter delay with silence and trim to the exact expected length.
    fn flush(&mut self, ready: &mut VecDeque<f32>) -> Result<(), ResampleError> {
        let out_rate = u128::from(self.out_rate);
        let in_rate = u128::from(self.in_rate);
        let expected = (u128::from(self.frames_in) * out_rate).div_ceil(in_rate) as u64;
        let per_chunk = (self.chunk_frames as u128 * out_rate / in_rate).max(1) as usize;
        let max_rounds = 4 + self.resampler.output_delay() / per_chunk;
        for _ in 0..max_rounds {
            if self.frames_out >= expected {
                break;
            }
            self.pending.resize(self.chunk_frames * self.channels, 0.0);
            self.process_pending(ready, Some(expected))?;
        }
        self.pending.clear();
        Ok(())
    }

    fn process_pending(
        &mut self,
        ready: &mut VecDeque<f32>,
        limit: Option<u64>,
    ) -> Result<(), ResampleError> {
        let input_adapter = InterleavedSlice::new(&self.pending[..], self.channels, self.chunk_frames)
            .map_err(|e| ResampleError::Process(format!("{e:#}")))?;
        let out_capacity_frames = self.out_buf.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out_buf[..], self.channels, out_capacity_frames)
                .map_err(|e| ResampleError::Process(format!("{e:#}")))?;

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, None)
            .map_err(|e| ResampleError::Process(format!("{e:#}")))?;
        self.pending.clear();

        let skip = self.delay_left.min(nbr_out);
        self.delay_left -= skip;
        let mut frames = nbr_out - skip;
        if let Some(limit) = limit {
            frames = frames.min(limit.saturating_sub(self.frames_out) as usize);
        }
        let start = skip * self.channels;
        ready.extend(&self.out_buf[start..start + frames * self.channels]);
        self.frames_out += frames as u64;
        Ok(())
    }

    fn reset(&mut self) {
        self.resampler.reset();
        self.pending.clear();
        self.delay_left = self.resampler.output_delay();
        self.frames_in = 0;
        self.frames_out = 0;
    }
}

/// Remix plus optional rate conversion between two fixed formats.
///
/// Output accumulates in an internal queue and is drained with [`Converter::pull`].
pub(crate) struct Converter {
    output: AudioFormat,
    remix: Remix,
    rate: Option<RateEngine>,
    mixed: Vec<f32>,
    ready: VecDeque<f32>,
    flushed: bool,
}

impl Converter {
    pub(crate) fn new(
        input: AudioFormat,
        output: AudioFormat,
        cfg: &ResampleConfig,
    ) -> Result<Self, ResampleError> {
        if input.sample_rate == 0 || output.sample_rate == 0 {
            return Err(ResampleError::Init("unknown sample rate".to_string()));
        }
        let remix = Remix::new(input.channel_layout, output.channel_layout)?;
        let rate = if input.sample_rate == output.sample_rate {
            None
        } else {
            Some(RateEngine::new(
                input.sample_rate,
                output.sample_rate,
                output.channels(),
                cfg,
            )?)
        };
        Ok(Self {
            output,
            remix,
            rate,
            mixed: Vec::new(),
            ready: VecDeque::new(),
            flushed: false,
        })
    }

    pub(crate) fn output(&self) -> AudioFormat {
        self.output
    }

    pub(crate) fn push(&mut self, input: &[f32]) -> Result<(), ResampleError> {
        self.flushed = false;
        self.mixed.clear();
        self.remix.apply(input, &mut self.mixed);
        match &mut self.rate {
            Some(engine) => engine.push(&self.mixed, &mut self.ready),
            None => {
                self.ready.extend(&self.mixed);
                Ok(())
            }
        }
    }

    /// Emit whatever the resampler still holds. Repeated calls are no-ops.
    pub(crate) fn flush(&mut self) -> Result<(), ResampleError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        match &mut self.rate {
            Some(engine) => engine.flush(&mut self.ready),
            None => Ok(()),
        }
    }

    pub(crate) fn buffered_frames(&self) -> usize {
        self.ready.len() / self.output.channels()
    }

    /// Move up to `max_frames` output frames into `out`; returns frames moved.
    pub(crate) fn pull(&mut self, max_frames: usize, out: &mut Vec<f32>) -> usize {
        let frames = self.buffered_frames().min(max_frames);
        out.extend(self.ready.drain(..frames * self.output.channels()));
        frames
    }

    pub(crate) fn reset(&mut self) {
        if let Some(engine) = &mut self.rate {
            engine.reset();
        }
        self.ready.clear();
        self.mixed.clear();
        self.flushed = false;
    }
}

/// Lazily created binding keyed by the input format.
enum Binding {
    Unbound,
    Bound {
        input: AudioFormat,
        converter: Converter,
    },
}

/// The final conversion to the fixed output format.
///
/// Output drained from a retired binding waits in `carry` and is delivered
/// ahead of anything the next binding produces.
pub(crate) struct ResampleStage {
    config: ResampleConfig,
    binding: Binding,
    bind_count: u64,
    carry: VecDeque<f32>,
    last_request: Option<usize>,
}

impl ResampleStage {
    pub(crate) fn new(config: ResampleConfig) -> Self {
        Self {
            config,
            binding: Binding::Unbound,
            bind_count: 0,
            carry: VecDeque::new(),
            last_request: None,
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        matches!(self.binding, Binding::Bound { .. })
    }

    pub(crate) fn bound_input(&self) -> Option<AudioFormat> {
        match &self.binding {
            Binding::Bound { input, .. } => Some(*input),
            Binding::Unbound => None,
        }
    }

    /// Number of bindings created since construction.
    pub(crate) fn bind_count(&self) -> u64 {
        self.bind_count
    }

    /// Bind to `input` unless already bound.
    pub(crate) fn ensure_bound(&mut self, input: AudioFormat) -> Result<(), ResampleError> {
        if self.is_bound() {
            return Ok(());
        }
        let converter = Converter::new(input, AudioFormat::OUTPUT, &self.config)?;
        tracing::info!(
            in_rate_hz = input.sample_rate,
            in_format = %input.sample_format,
            in_layout = %input.channel_layout,
            out_rate_hz = AudioFormat::OUTPUT.sample_rate,
            "initializing resampler"
        );
        self.binding = Binding::Bound { input, converter };
        self.bind_count += 1;
        Ok(())
    }

    /// Frame count requested by the most recent `convert` call.
    pub(crate) fn last_request(&self) -> Option<usize> {
        self.last_request
    }

    /// Drop the binding and any carried output; returns whether a binding existed.
    pub(crate) fn invalidate(&mut self) -> bool {
        let was_bound = self.is_bound();
        self.binding = Binding::Unbound;
        self.carry.clear();
        was_bound
    }

    /// Convert `frame` through the current binding (binding to its format if
    /// needed) and move all resulting output to the carry queue.
    pub(crate) fn stash(&mut self, frame: &Frame) -> Result<(), ResampleError> {
        self.ensure_bound(frame.format)?;
        let Binding::Bound { input, converter } = &mut self.binding else {
            return Ok(());
        };
        if !frame.format.same_shape(input) {
            return Err(ResampleError::InputChanged {
                bound: *input,
                got: frame.format,
            });
        }
        converter.push(frame.samples())?;
        let mut out = Vec::new();
        converter.pull(usize::MAX, &mut out);
        self.carry.extend(out);
        Ok(())
    }

    /// Flush the binding into the carry queue and unbind.
    ///
    /// The binding is dropped even when the flush fails. Returns whether a
    /// binding existed.
    pub(crate) fn retire(&mut self) -> Result<bool, ResampleError> {
        let Binding::Bound { mut converter, .. } =
            std::mem::replace(&mut self.binding, Binding::Unbound)
        else {
            return Ok(false);
        };
        converter.flush()?;
        let mut tail = Vec::new();
        converter.pull(usize::MAX, &mut tail);
        self.carry.extend(tail);
        Ok(true)
    }

    /// Convert `input` (or flush when `None`) into `out`.
    ///
    /// `out.nb_samples` carries the requested frame count on entry and the
    /// produced count on return. Carried output comes first. An unbound stage
    /// produces only what it carries.
    pub(crate) fn convert(
        &mut self,
        input: Option<&Frame>,
        out: &mut Frame,
    ) -> Result<usize, ResampleError> {
        let requested = out.nb_samples;
        self.last_request = Some(requested);
        out.format = AudioFormat::OUTPUT;
        out.data.clear();
        out.nb_samples = 0;

        if let (Some(frame), Binding::Bound { input: bound, .. }) = (input, &self.binding) {
            if !frame.format.same_shape(bound) {
                return Err(ResampleError::InputChanged {
                    bound: *bound,
                    got: frame.format,
                });
            }
        }

        let channels = AudioFormat::OUTPUT.channels();
        let carried = (self.carry.len() / channels).min(requested);
        out.data.extend(self.carry.drain(..carried * channels));
        let mut produced = carried;

        if let Binding::Bound { converter, .. } = &mut self.binding {
            match input {
                Some(frame) => converter.push(frame.samples())?,
                None => converter.flush()?,
            }
            produced += converter.pull(requested - carried, &mut out.data);
        }
        out.nb_samples = produced;
        Ok(produced)
    }
}
