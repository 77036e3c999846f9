//! decode-cli: decode any supported input to raw PCM.
//!
//! Drives an [`audio_decoder::Pipeline`] the way a host application would:
//! open, optionally build and enable a filter chain, optionally seek, then
//! `step` until end of stream and `flush` until end of stream. Output is
//! interleaved little-endian `f32` at 48 kHz stereo, written to a file or
//! stdout. Logs go to stderr.

mod cli;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use audio_decoder::{DecoderConfig, Pipeline, StepOutcome, error_to_string};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Buffered sink for raw `f32le` samples.
struct PcmWriter {
    out: BufWriter<Box<dyn Write>>,
    samples: u64,
    error: Option<io::Error>,
}

impl PcmWriter {
    fn create(path: &Path) -> Result<Self> {
        let out: Box<dyn Write> = if path.as_os_str() == "-" {
            Box::new(io::stdout().lock())
        } else {
            Box::new(File::create(path).with_context(|| format!("create {path:?}"))?)
        };
        Ok(Self {
            out: BufWriter::new(out),
            samples: 0,
            error: None,
        })
    }

    /// Chunk callback; the first write error is kept and reported later.
    fn write(&mut self, chunk: &[f32]) {
        if self.error.is_some() {
            return;
        }
        for sample in chunk {
            if let Err(e) = self.out.write_all(&sample.to_le_bytes()) {
                self.error = Some(e);
                return;
            }
        }
        self.samples += chunk.len() as u64;
    }

    fn check(&mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err(e).context("write output"),
            None => Ok(()),
        }
    }

    fn finish(mut self) -> Result<u64> {
        self.check()?;
        self.out.flush().context("flush output")?;
        Ok(self.samples)
    }
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,audio_decoder=info")),
        )
        .init();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_signal = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || stop_for_signal.store(true, Ordering::Relaxed)) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }

    let mut config = DecoderConfig::default();
    config.resample.chunk_frames = args.chunk_frames.max(1);
    config.http.timeout = Duration::from_secs(args.http_timeout_secs);
    config.http.reconnect = !args.no_reconnect;
    config.http.reconnect_attempts = args.reconnect_attempts;

    let mut pipeline = Pipeline::with_config(config);
    pipeline
        .open(&args.input)
        .with_context(|| format!("open {}", args.input))?;

    if let Some(desc) = args.filters.as_deref() {
        match pipeline.init_filters(desc) {
            Ok(()) => pipeline.set_filter_enabled(true),
            Err(e) => tracing::error!(
                code = e.code().raw(),
                reason = %error_to_string(e.code().raw()),
                "filters disabled: {e}"
            ),
        }
    }

    if let Some(ms) = args.seek_ms {
        let den = u64::try_from(pipeline.decoder_time_base_den()).unwrap_or(0);
        let target = ms.saturating_mul(den) / 1000;
        pipeline
            .seek(target)
            .with_context(|| format!("seek to {ms} ms"))?;
    }

    let mut writer = PcmWriter::create(&args.output)?;

    loop {
        if stop.load(Ordering::Relaxed) {
            tracing::info!("interrupted");
            break;
        }
        match pipeline.step(|chunk| writer.write(chunk)).context("decode")? {
            StepOutcome::EndOfStream => break,
            StepOutcome::NeedMoreInput => thread::sleep(Duration::from_millis(5)),
            StepOutcome::Produced | StepOutcome::Skipped => {}
        }
        writer.check()?;
    }

    while !stop.load(Ordering::Relaxed) {
        if pipeline.flush(|chunk| writer.write(chunk)).context("flush")?
            == StepOutcome::EndOfStream
        {
            break;
        }
    }

    let samples = writer.finish()?;
    tracing::info!(
        frames = samples / 2,
        position_ms = pipeline.position_ms(),
        "done"
    );
    Ok(())
}
