//! Pull-based decoding pipeline.
//!
//! One [`Pipeline`] owns every stage for a single input:
//! source -> decode -> (optional) filter graph -> resample -> caller.
//!
//! The caller drives it by calling [`Pipeline::step`] until it reports
//! [`StepOutcome::EndOfStream`], then [`Pipeline::flush`] until it reports the
//! same. Each produced chunk is handed to the `on_chunk` callback as
//! interleaved stereo `f32` at 48 kHz.
//!
//! Position tracking is sample based: `in_pts` counts decoded input samples
//! and `pts` counts emitted output samples. Both reset only on seek (or a new
//! `open`).

use crate::config::{DecoderConfig, OUTPUT_BATCH_SAMPLES};
use crate::decode::DecodeStage;
use crate::error::{FilterGraphError, OpenError, PipelineError, SeekError};
use crate::filter::FilterGraph;
use crate::format::AudioFormat;
use crate::frame::{Frame, PullStatus};
use crate::resample::ResampleStage;
use crate::source::{SourceHandle, SourceRead};

/// Non-fatal result of a `step` or `flush` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Work was done; `on_chunk` ran once per non-empty converted chunk,
    /// possibly zero times while the resampler fills up.
    Produced,
    /// The packet belonged to another stream and was dropped.
    Skipped,
    /// The source has nothing right now; call again.
    NeedMoreInput,
    /// Nothing more will be produced by this call type.
    EndOfStream,
}

struct Input {
    source: SourceHandle,
    decode: DecodeStage,
}

pub struct Pipeline {
    config: DecoderConfig,
    input: Option<Input>,
    filters: Option<FilterGraph>,
    filter_enabled: bool,
    filter_eof_sent: bool,
    resample: ResampleStage,
    frame: Frame,
    filt_frame: Frame,
    out_frame: Frame,
    in_pts: u64,
    pts: u64,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        let resample = ResampleStage::new(config.resample);
        Self {
            config,
            input: None,
            filters: None,
            filter_enabled: false,
            filter_eof_sent: false,
            resample,
            frame: Frame::new(AudioFormat::OUTPUT),
            filt_frame: Frame::output(),
            out_frame: Frame::output(),
            in_pts: 0,
            pts: 0,
        }
    }

    /// Open `uri` and prepare its best audio stream for decoding.
    ///
    /// On success any previous input, filter graph and resampler binding are
    /// dropped, filtering is disabled and both counters restart at zero. On
    /// failure the pipeline is left as it was.
    pub fn open(&mut self, uri: &str) -> Result<(), OpenError> {
        let source = SourceHandle::open(uri, &self.config)?;
        let decode = DecodeStage::new(source.codec_params(), self.config.max_decode_retries)?;
        self.input = Some(Input { source, decode });
        self.filters = None;
        self.filter_enabled = false;
        self.filter_eof_sent = false;
        self.resample.invalidate();
        self.frame.unref();
        self.filt_frame.unref();
        self.out_frame.unref();
        self.in_pts = 0;
        self.pts = 0;
        Ok(())
    }

    /// Build the filter graph from `description`.
    ///
    /// The graph input is the decoder's format and time base. On failure no
    /// graph is installed; the caller should keep filtering disabled.
    pub fn init_filters(&mut self, description: &str) -> Result<(), FilterGraphError> {
        let Some(input) = &self.input else {
            return Err(FilterGraphError::NotOpen);
        };
        self.filters = None;
        let graph = FilterGraph::new(
            description,
            input.decode.format(),
            input.decode.time_base(),
            &self.config.resample,
        )?;
        self.filters = Some(graph);
        self.filter_eof_sent = false;
        Ok(())
    }

    /// Route decoded frames through the filter graph or around it.
    ///
    /// A change of value invalidates a bound resampler so the next frame
    /// rebinds against whichever stage now feeds it. Audio still buffered in
    /// the stage being left is converted and delivered ahead of the next
    /// chunk. Enabling clears the graph's buffered state but keeps the graph.
    pub fn set_filter_enabled(&mut self, enabled: bool) {
        if self.filter_enabled == enabled {
            return;
        }
        self.filter_enabled = enabled;
        match self.hand_over(enabled) {
            Ok(true) => tracing::info!(enabled, "filtering toggled; resampler invalidated"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, enabled, "buffered audio dropped on filter toggle");
                self.resample.invalidate();
            }
        }
    }

    fn hand_over(&mut self, enabled: bool) -> Result<bool, PipelineError> {
        if let Some(graph) = self.filters.as_mut() {
            if enabled {
                graph.reset();
                self.filter_eof_sent = false;
            } else {
                graph.drain_buffered()?;
                while graph.pull(&mut self.filt_frame) == PullStatus::Ready {
                    self.resample.stash(&self.filt_frame)?;
                    self.filt_frame.unref();
                }
            }
        }
        Ok(self.resample.retire()?)
    }

    /// Read one packet and push everything it yields through to `on_chunk`.
    pub fn step<F>(&mut self, mut on_chunk: F) -> Result<StepOutcome, PipelineError>
    where
        F: FnMut(&[f32]),
    {
        self.step_inner(&mut on_chunk).inspect_err(|e| {
            tracing::error!(error = %e, code = e.code().raw(), "step failed");
        })
    }

    fn step_inner(&mut self, on_chunk: &mut dyn FnMut(&[f32])) -> Result<StepOutcome, PipelineError> {
        let Some(input) = self.input.as_mut() else {
            return Err(PipelineError::NotOpen);
        };
        if self.filter_enabled && self.filters.is_none() {
            return Err(PipelineError::FiltersNotInitialized);
        }

        let packet = match input.source.read_packet().map_err(PipelineError::Read)? {
            SourceRead::Packet(packet) => packet,
            SourceRead::Again => return Ok(StepOutcome::NeedMoreInput),
            SourceRead::Eof => return Ok(StepOutcome::EndOfStream),
        };
        if !input.source.is_selected(&packet) {
            return Ok(StepOutcome::Skipped);
        }
        input.decode.submit(&packet).map_err(PipelineError::Decode)?;
        drop(packet);

        loop {
            let status = input.decode.receive(&mut self.frame);
            // Counted before the status check; the slot is empty on Again.
            self.in_pts += self.frame.nb_samples as u64;
            if status != PullStatus::Ready {
                break;
            }

            match (self.filter_enabled, self.filters.as_mut()) {
                (true, Some(graph)) => {
                    graph.push(Some(&self.frame))?;
                    while graph.pull(&mut self.filt_frame) == PullStatus::Ready {
                        emit(
                            &mut self.resample,
                            &mut self.out_frame,
                            Some(&self.filt_frame),
                            &mut self.pts,
                            on_chunk,
                        )?;
                        self.filt_frame.unref();
                    }
                }
                (true, None) => return Err(PipelineError::FiltersNotInitialized),
                (false, _) => {
                    emit(
                        &mut self.resample,
                        &mut self.out_frame,
                        Some(&self.frame),
                        &mut self.pts,
                        on_chunk,
                    )?;
                }
            }
            self.frame.unref();
        }
        Ok(StepOutcome::Produced)
    }

    /// Drain buffered audio once the source is exhausted.
    ///
    /// With filtering enabled the graph is sent end of stream first and its
    /// tail delivered; then the resampler is flushed. Returns
    /// [`StepOutcome::EndOfStream`] once nothing is left.
    pub fn flush<F>(&mut self, mut on_chunk: F) -> Result<StepOutcome, PipelineError>
    where
        F: FnMut(&[f32]),
    {
        self.flush_inner(&mut on_chunk).inspect_err(|e| {
            tracing::error!(error = %e, code = e.code().raw(), "flush failed");
        })
    }

    fn flush_inner(&mut self, on_chunk: &mut dyn FnMut(&[f32])) -> Result<StepOutcome, PipelineError> {
        if self.input.is_none() {
            return Err(PipelineError::NotOpen);
        }

        if self.filter_enabled {
            if let Some(graph) = self.filters.as_mut() {
                if !self.filter_eof_sent {
                    graph.push(None)?;
                    self.filter_eof_sent = true;
                }
                if graph.pull(&mut self.filt_frame) == PullStatus::Ready {
                    emit(
                        &mut self.resample,
                        &mut self.out_frame,
                        Some(&self.filt_frame),
                        &mut self.pts,
                        on_chunk,
                    )?;
                    self.filt_frame.unref();
                    return Ok(StepOutcome::Produced);
                }
            }
        }

        let produced = emit(
            &mut self.resample,
            &mut self.out_frame,
            None,
            &mut self.pts,
            on_chunk,
        )?;
        if produced == 0 {
            Ok(StepOutcome::EndOfStream)
        } else {
            Ok(StepOutcome::Produced)
        }
    }

    /// Release the buffer behind the last chunk handed to `on_chunk`.
    pub fn release_last_output(&mut self) {
        self.out_frame.unref();
    }

    /// The last chunk handed to `on_chunk`, until released or overwritten.
    pub fn last_output(&self) -> &[f32] {
        self.out_frame.samples()
    }

    /// Playback position derived from decoded input samples.
    pub fn position_ms(&self) -> u64 {
        match &self.input {
            Some(input) => {
                let rate = u64::from(input.decode.time_base().den.max(1));
                self.in_pts.saturating_mul(1000) / rate
            }
            None => 0,
        }
    }

    /// Denominator of the decoder time base (the input sample rate), or 0
    /// when nothing is open.
    pub fn decoder_time_base_den(&self) -> i32 {
        self.input
            .as_ref()
            .map(|input| i32::try_from(input.decode.time_base().den).unwrap_or(i32::MAX))
            .unwrap_or(0)
    }

    /// Reposition to `target_pts`, in decoder time base units.
    ///
    /// The source seek is coarse. Decoder and filter state are reset, the
    /// resampler is unbound, `in_pts` becomes `target_pts` and `pts` zero.
    pub fn seek(&mut self, target_pts: u64) -> Result<(), SeekError> {
        let Some(input) = self.input.as_mut() else {
            return Err(SeekError::NotOpen);
        };
        let decode_tb = input.decode.time_base();
        let stream_tb = input.source.time_base();
        let ts = u128::from(target_pts) * u128::from(decode_tb.num) * u128::from(stream_tb.den)
            / u128::from(decode_tb.den.max(1))
            / u128::from(stream_tb.num.max(1));
        let ts = u64::try_from(ts).map_err(|_| SeekError::Overflow { target: target_pts })?;

        let landed = input.source.seek(ts).map_err(SeekError::Source)?;
        input.decode.reset();
        if self.resample.invalidate() {
            tracing::debug!("resampler invalidated by seek");
        }
        if let Some(graph) = self.filters.as_mut() {
            graph.reset();
        }
        self.filter_eof_sent = false;
        self.frame.unref();
        self.filt_frame.unref();
        self.out_frame.unref();
        self.in_pts = target_pts;
        self.pts = 0;
        tracing::debug!(target_pts, stream_ts = ts, landed_ts = landed, "seek");
        Ok(())
    }

    /// Decoded input samples observed since open or the last seek target.
    pub fn in_pts(&self) -> u64 {
        self.in_pts
    }

    /// Output samples emitted since open or the last seek.
    pub fn pts(&self) -> u64 {
        self.pts
    }

    pub fn stream_index(&self) -> Option<usize> {
        self.input.as_ref().map(|input| input.source.stream_index())
    }

    /// Format of the decoder output (declared by the codec until the first frame).
    pub fn input_format(&self) -> Option<AudioFormat> {
        self.input.as_ref().map(|input| input.decode.format())
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }

    pub fn filter_output_format(&self) -> Option<AudioFormat> {
        self.filters.as_ref().map(FilterGraph::output_format)
    }

    /// Format the resampler is currently bound to, if any.
    pub fn resampler_input(&self) -> Option<AudioFormat> {
        self.resample.bound_input()
    }

    /// Number of times the resampler has been (re)bound.
    pub fn resampler_bind_count(&self) -> u64 {
        self.resample.bind_count()
    }

    /// Output frame count requested by the most recent conversion.
    pub fn resampler_last_request(&self) -> Option<usize> {
        self.resample.last_request()
    }
}

/// Convert one frame (or flush with `None`) and hand the result to `on_chunk`.
///
/// Always requests a full one-second batch; the output frame's sample count
/// is replaced by what the resampler actually produced.
fn emit(
    resample: &mut ResampleStage,
    out: &mut Frame,
    input: Option<&Frame>,
    pts: &mut u64,
    on_chunk: &mut dyn FnMut(&[f32]),
) -> Result<usize, PipelineError> {
    if let Some(frame) = input {
        resample.ensure_bound(frame.format)?;
    }
    out.unref();
    out.nb_samples = OUTPUT_BATCH_SAMPLES;
    let produced = resample.convert(input, out)?;
    *pts += produced as u64;
    if produced > 0 {
        on_chunk(out.samples());
    }
    Ok(produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};
    use crate::resample::ResampleConfig;

    #[test]
    fn unopened_pipeline_reports_not_open() {
        let mut pipeline = Pipeline::new();
        assert!(matches!(pipeline.step(|_| {}), Err(PipelineError::NotOpen)));
        assert!(matches!(pipeline.flush(|_| {}), Err(PipelineError::NotOpen)));
        assert!(matches!(pipeline.seek(0), Err(SeekError::NotOpen)));
        assert!(matches!(
            pipeline.init_filters("anull"),
            Err(FilterGraphError::NotOpen)
        ));
        assert_eq!(pipeline.position_ms(), 0);
        assert_eq!(pipeline.decoder_time_base_den(), 0);
        assert!(pipeline.stream_index().is_none());
        assert!(pipeline.last_output().is_empty());
    }

    #[test]
    fn every_conversion_requests_one_second() {
        let mut resample = ResampleStage::new(ResampleConfig::default());
        let mut out = Frame::output();
        let mut pts = 0;
        let mut chunks = 0;
        let format = AudioFormat {
            sample_format: SampleFormat::S16,
            sample_rate: 44_100,
            channel_layout: ChannelLayout::MONO,
        };

        for frames in [16, 100_000] {
            let input = Frame::from_interleaved(format, vec![0.1; frames]);
            out.nb_samples = 7;
            emit(&mut resample, &mut out, Some(&input), &mut pts, &mut |_: &[f32]| chunks += 1).unwrap();
            assert_eq!(resample.last_request(), Some(OUTPUT_BATCH_SAMPLES));
        }
        assert!(out.nb_samples <= OUTPUT_BATCH_SAMPLES);

        out.nb_samples = 7;
        emit(&mut resample, &mut out, None, &mut pts, &mut |_: &[f32]| chunks += 1).unwrap();
        assert_eq!(resample.last_request(), Some(OUTPUT_BATCH_SAMPLES));
        assert!(chunks > 0);
    }

    #[test]
    fn toggling_without_binding_is_quiet() {
        let mut pipeline = Pipeline::new();
        pipeline.set_filter_enabled(true);
        assert!(pipeline.filter_enabled());
        pipeline.set_filter_enabled(true);
        pipeline.set_filter_enabled(false);
        assert!(!pipeline.filter_enabled());
        assert_eq!(pipeline.resampler_bind_count(), 0);
        assert!(pipeline.resampler_input().is_none());
        assert!(pipeline.resampler_last_request().is_none());
    }
}
