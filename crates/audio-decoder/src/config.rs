use crate::http_stream::HttpRangeConfig;
use crate::resample::ResampleConfig;

/// Sample rate of every chunk handed to the caller.
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;
/// Channel count of every chunk handed to the caller.
pub const OUTPUT_CHANNELS: usize = 2;
/// Output samples (per channel) requested from the resampler on every conversion.
pub const OUTPUT_BATCH_SAMPLES: usize = 48_000;

/// Tuning parameters shared by the source, decode and resample stages.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Sinc resampler parameters.
    pub resample: ResampleConfig,
    /// Range fetching and reconnect policy for `http(s)://` inputs.
    pub http: HttpRangeConfig,
    /// Consecutive corrupt packets tolerated before decoding is fatal.
    pub max_decode_retries: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            resample: ResampleConfig::default(),
            http: HttpRangeConfig::default(),
            max_decode_retries: 3,
        }
    }
}
