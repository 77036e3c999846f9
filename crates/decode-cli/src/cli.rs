use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "decode-cli", version)]
pub struct Args {
    /// Input path or URI (file://, http://, https://)
    pub input: String,

    /// Filter chain applied before resampling, e.g. "volume=0.5,aecho"
    #[arg(long)]
    pub filters: Option<String>,

    /// Start position in milliseconds
    #[arg(long)]
    pub seek_ms: Option<u64>,

    /// Output file for raw f32le 48 kHz stereo PCM ("-" for stdout)
    #[arg(long, short, default_value = "-")]
    pub output: PathBuf,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Per-request timeout for HTTP range fetches
    #[arg(long, default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Extra attempts per HTTP block before reporting "try again"
    #[arg(long, default_value_t = 3)]
    pub reconnect_attempts: u32,

    /// Fail immediately on HTTP errors instead of retrying
    #[arg(long)]
    pub no_reconnect: bool,
}
