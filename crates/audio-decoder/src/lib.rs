//! Pull-based audio decoding to interleaved `f32` / 48 kHz / stereo.
//!
//! ## Pipeline
//! 1. **Source**: Symphonia probes a local file or HTTP range stream and picks the best audio track.
//! 2. **Decode**: packets are decoded to interleaved `f32` frames.
//! 3. **Filter** (optional): a textual filter chain processes the frames.
//! 4. **Resample**: Rubato converts to the fixed output format.
//!
//! Everything runs on the caller's thread inside [`Pipeline::step`] and [`Pipeline::flush`].

pub mod config;
mod decode;
pub mod error;
mod filter;
pub mod format;
mod frame;
pub mod http_stream;
pub mod pipeline;
pub mod resample;
mod source;

pub use config::{DecoderConfig, OUTPUT_BATCH_SAMPLES, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
pub use error::{
    ErrorCode, FilterError, FilterGraphError, OpenError, PipelineError, ResampleError, SeekError,
    error_to_string,
};
pub use format::{AudioFormat, ChannelLayout, Rational, SampleFormat};
pub use http_stream::HttpRangeConfig;
pub use pipeline::{Pipeline, StepOutcome};
pub use resample::ResampleConfig;
