//! Filter stage.
//!
//! A linear chain of nodes built from a textual description, fed from a
//! source fixed to the decoder's format and drained through a sink that
//! always emits the output format (`f32`, 48 kHz, stereo). When the chain does
//! not already produce that shape an `auto_aresample` node is appended.

mod nodes;
mod parse;

use std::collections::VecDeque;

use crate::error::{FilterError, FilterGraphError};
use crate::format::{AudioFormat, Rational};
use crate::frame::{Frame, PullStatus};
use crate::resample::ResampleConfig;

use nodes::AudioFilter;

pub(crate) struct FilterGraph {
    input: AudioFormat,
    output: AudioFormat,
    nodes: Vec<Box<dyn AudioFilter>>,
    queue: VecDeque<Frame>,
    eof: bool,
}

impl FilterGraph {
    pub(crate) fn new(
        description: &str,
        input: AudioFormat,
        time_base: Rational,
        resample: &ResampleConfig,
    ) -> Result<Self, FilterGraphError> {
        let input = AudioFormat {
            channel_layout: input.channel_layout.or_default(),
            ..input
        };
        let mut nodes = Vec::new();
        let mut current = input;
        for spec in parse::parse_chain(description)? {
            tracing::debug!(name = %spec.name, position = spec.position, "configuring filter");
            let mut node = nodes::create(spec, resample)?;
            current = node.configure(current)?;
            nodes.push(node);
        }
        if !current.is_output_shape() {
            let mut node = nodes::auto_resample(AudioFormat::OUTPUT, resample);
            node.configure(current)?;
            nodes.push(node);
        }
        let output = AudioFormat::OUTPUT;

        let chain: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
        tracing::info!(
            chain = %chain.join(","),
            time_base = %time_base,
            input = %input,
            "filter graph output: {output}"
        );

        Ok(Self {
            input,
            output,
            nodes,
            queue: VecDeque::new(),
            eof: false,
        })
    }

    pub(crate) fn output_format(&self) -> AudioFormat {
        self.output
    }

    /// Feed a frame, or signal end of stream with `None`.
    ///
    /// The frame is copied; the caller keeps ownership of its buffer.
    pub(crate) fn push(&mut self, frame: Option<&Frame>) -> Result<(), FilterError> {
        let Some(frame) = frame else {
            return self.finish();
        };
        if self.eof {
            return Err(FilterError::Finished);
        }
        if !frame.format.same_shape(&self.input) {
            return Err(FilterError::FormatMismatch {
                expected: self.input,
                got: frame.format,
            });
        }
        if frame.is_empty() {
            return Ok(());
        }

        let mut copy = Frame::new(frame.format);
        copy.copy_from(frame);
        let mut carried = vec![copy];
        for node in self.nodes.iter_mut() {
            let mut next = Vec::with_capacity(carried.len());
            for f in carried.drain(..) {
                node.filter(f, &mut next)?;
            }
            carried = next;
        }
        self.enqueue(carried);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FilterError> {
        if self.eof {
            return Ok(());
        }
        self.eof = true;
        let mut carried: Vec<Frame> = Vec::new();
        for node in self.nodes.iter_mut() {
            let mut next = Vec::new();
            for f in carried.drain(..) {
                node.filter(f, &mut next)?;
            }
            node.finish(&mut next)?;
            carried = next;
        }
        self.enqueue(carried);
        Ok(())
    }

    /// Push audio buffered inside the nodes out to the queue without ending
    /// the stream. No-op after end of stream.
    pub(crate) fn drain_buffered(&mut self) -> Result<(), FilterError> {
        if self.eof {
            return Ok(());
        }
        let mut carried: Vec<Frame> = Vec::new();
        for node in self.nodes.iter_mut() {
            let mut next = Vec::new();
            for f in carried.drain(..) {
                node.filter(f, &mut next)?;
            }
            node.drain_buffered(&mut next)?;
            carried = next;
        }
        self.enqueue(carried);
        Ok(())
    }

    fn enqueue(&mut self, frames: Vec<Frame>) {
        let output = self.output;
        self.queue.extend(
            frames
                .into_iter()
                .filter(|f| !f.is_empty())
                .map(|mut f| {
                    f.format = output;
                    f
                }),
        );
    }

    /// Take the next filtered frame into `dst`.
    pub(crate) fn pull(&mut self, dst: &mut Frame) -> PullStatus {
        dst.unref();
        match self.queue.pop_front() {
            Some(frame) => {
                *dst = frame;
                PullStatus::Ready
            }
            None if self.eof => PullStatus::Eof,
            None => PullStatus::Again,
        }
    }

    /// Drop all buffered and node state; the graph accepts input again.
    pub(crate) fn reset(&mut self) {
        self.nodes.iter_mut().for_each(|n| n.reset());
        self.queue.clear();
        self.eof = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};

    fn mono_44k() -> AudioFormat {
        AudioFormat {
            sample_format: SampleFormat::S16,
            sample_rate: 44_100,
            channel_layout: ChannelLayout::unspecified(1),
        }
    }

    fn stereo_48k() -> AudioFormat {
        AudioFormat {
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
            channel_layout: ChannelLayout::STEREO,
        }
    }

    fn graph(desc: &str, input: AudioFormat) -> FilterGraph {
        FilterGraph::new(desc, input, Rational::new(1, input.sample_rate), &ResampleConfig::default())
            .unwrap()
    }

    fn drain(graph: &mut FilterGraph) -> (Vec<Frame>, PullStatus) {
        let mut frames = Vec::new();
        loop {
            let mut frame = Frame::output();
            match graph.pull(&mut frame) {
                PullStatus::Ready => frames.push(frame),
                status => return (frames, status),
            }
        }
    }

    #[test]
    fn sink_converts_to_output_format() {
        let mut g = graph("anull", mono_44k());
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.nodes[1].name(), "auto_aresample");

        let input = Frame::from_interleaved(mono_44k(), vec![0.1; 4410]);
        g.push(Some(&input)).unwrap();
        g.push(None).unwrap();
        let (frames, status) = drain(&mut g);
        assert_eq!(status, PullStatus::Eof);
        assert!(frames.iter().all(|f| f.format == AudioFormat::OUTPUT));
        let total: usize = frames.iter().map(|f| f.nb_samples).sum();
        assert_eq!(total, 4800);
    }

    #[test]
    fn matching_chain_needs_no_conversion() {
        let mut g = graph("volume=2", stereo_48k());
        assert_eq!(g.nodes.len(), 1);
        let input = Frame::from_interleaved(stereo_48k(), vec![0.25; 8]);
        g.push(Some(&input)).unwrap();
        let mut out = Frame::output();
        assert_eq!(g.pull(&mut out), PullStatus::Ready);
        assert_eq!(out.samples(), &[0.5; 8]);
        assert_eq!(out.format, AudioFormat::OUTPUT);
        assert_eq!(input.samples(), &[0.25; 8]);
        assert_eq!(g.pull(&mut out), PullStatus::Again);
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_frames_of_another_shape() {
        let mut g = graph("anull", stereo_48k());
        let input = Frame::from_interleaved(mono_44k(), vec![0.0; 10]);
        assert!(matches!(
            g.push(Some(&input)),
            Err(FilterError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn push_after_eof_fails_until_reset() {
        let mut g = graph("anull", stereo_48k());
        let input = Frame::from_interleaved(stereo_48k(), vec![0.0; 10]);
        g.push(None).unwrap();
        g.push(None).unwrap();
        assert!(matches!(g.push(Some(&input)), Err(FilterError::Finished)));
        let mut out = Frame::output();
        assert_eq!(g.pull(&mut out), PullStatus::Eof);

        g.reset();
        g.push(Some(&input)).unwrap();
        assert_eq!(g.pull(&mut out), PullStatus::Ready);
    }

    #[test]
    fn drain_buffered_flushes_conversion_without_ending() {
        let mut g = graph("anull", mono_44k());
        let input = Frame::from_interleaved(mono_44k(), vec![0.1; 441]);
        g.push(Some(&input)).unwrap();
        let (frames, status) = drain(&mut g);
        assert!(frames.is_empty());
        assert_eq!(status, PullStatus::Again);

        g.drain_buffered().unwrap();
        let (frames, status) = drain(&mut g);
        assert_eq!(status, PullStatus::Again);
        let total: usize = frames.iter().map(|f| f.nb_samples).sum();
        assert_eq!(total, 480);

        g.push(Some(&input)).unwrap();
        g.push(None).unwrap();
        let (frames, status) = drain(&mut g);
        assert_eq!(status, PullStatus::Eof);
        let total: usize = frames.iter().map(|f| f.nb_samples).sum();
        assert_eq!(total, 480);
    }

    #[test]
    fn construction_errors_propagate() {
        let build = |desc: &str| {
            FilterGraph::new(desc, stereo_48k(), Rational::new(1, 48_000), &ResampleConfig::default())
        };
        assert!(matches!(build("nope"), Err(FilterGraphError::UnknownFilter { .. })));
        assert!(matches!(build("volume=;"), Err(FilterGraphError::Parse { .. })));
        assert!(matches!(build("aecho=2"), Err(FilterGraphError::InvalidOption { .. })));
    }
}
