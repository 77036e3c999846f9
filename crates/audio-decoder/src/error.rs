//! Error types and numeric error codes.
//!
//! Every boundary error maps onto an [`ErrorCode`] so hosts that speak in
//! integer status codes can report failures with [`error_to_string`].

use std::fmt;
use std::io;

use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

use crate::format::AudioFormat;

const fn err_tag(a: u8, b: u8, c: u8, d: u8) -> i32 {
    -i32::from_le_bytes([a, b, c, d])
}

/// Numeric status code in the `AVERROR` numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(i32);

impl ErrorCode {
    pub const AGAIN: ErrorCode = ErrorCode(-11);
    pub const EOF: ErrorCode = ErrorCode(err_tag(b'E', b'O', b'F', b' '));
    pub const INVALID_DATA: ErrorCode = ErrorCode(err_tag(b'I', b'N', b'D', b'A'));
    pub const STREAM_NOT_FOUND: ErrorCode = ErrorCode(err_tag(0xF8, b'S', b'T', b'R'));
    pub const DECODER_NOT_FOUND: ErrorCode = ErrorCode(err_tag(0xF8, b'D', b'E', b'C'));
    pub const FILTER_NOT_FOUND: ErrorCode = ErrorCode(err_tag(0xF8, b'F', b'I', b'L'));
    pub const INVALID_ARGUMENT: ErrorCode = ErrorCode(-22);
    pub const IO: ErrorCode = ErrorCode(-5);
    pub const NOT_FOUND: ErrorCode = ErrorCode(-2);
    pub const UNKNOWN: ErrorCode = ErrorCode(err_tag(b'U', b'N', b'K', b'N'));

    pub const fn from_raw(code: i32) -> Self {
        ErrorCode(code)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Fixed description for the codes this crate produces.
    pub fn description(self) -> Option<&'static str> {
        let text = match self {
            ErrorCode::AGAIN => "Resource temporarily unavailable",
            ErrorCode::EOF => "End of file",
            ErrorCode::INVALID_DATA => "Invalid data found when processing input",
            ErrorCode::STREAM_NOT_FOUND => "Stream not found",
            ErrorCode::DECODER_NOT_FOUND => "Decoder not found",
            ErrorCode::FILTER_NOT_FOUND => "Filter not found",
            ErrorCode::INVALID_ARGUMENT => "Invalid argument",
            ErrorCode::IO => "Input/output error",
            ErrorCode::NOT_FOUND => "No such file or directory",
            ErrorCode::UNKNOWN => "Unknown error occurred",
            _ => return None,
        };
        Some(text)
    }

    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NOT_FOUND,
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut => {
                ErrorCode::AGAIN
            }
            io::ErrorKind::UnexpectedEof => ErrorCode::EOF,
            io::ErrorKind::InvalidInput => ErrorCode::INVALID_ARGUMENT,
            _ => ErrorCode::IO,
        }
    }

    fn from_symphonia(err: &SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(e) => ErrorCode::from_io(e),
            SymphoniaError::DecodeError(_) => ErrorCode::INVALID_DATA,
            SymphoniaError::Unsupported(_) => ErrorCode::DECODER_NOT_FOUND,
            SymphoniaError::SeekError(_) => ErrorCode::INVALID_ARGUMENT,
            SymphoniaError::ResetRequired => ErrorCode::EOF,
            _ => ErrorCode::UNKNOWN,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&error_to_string(self.0))
    }
}

/// Render a numeric status code as a human readable message.
///
/// Known codes get their fixed text, small negative values are treated as
/// negated OS error numbers, anything else falls back to a generic message.
pub fn error_to_string(code: i32) -> String {
    if let Some(text) = ErrorCode::from_raw(code).description() {
        return text.to_string();
    }
    if (-4095..0).contains(&code) {
        let os = io::Error::from_raw_os_error(-code).to_string();
        let text = os.split(" (os error").next().unwrap_or(&os);
        if !text.is_empty() && !text.starts_with("Unknown error") {
            return text.to_string();
        }
    }
    format!("Error number {code} occurred")
}

/// Failure to open a resource.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to open {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: io::Error,
    },
    #[error("unsupported URI scheme: {scheme}")]
    UnsupportedScheme { scheme: String },
    #[error("invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("unrecognized input format: {0}")]
    Probe(#[source] SymphoniaError),
    #[error("no decodable audio stream found")]
    NoAudioStream,
    #[error("failed to initialize decoder: {0}")]
    Codec(#[source] SymphoniaError),
}

impl OpenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OpenError::Io { source, .. } => ErrorCode::from_io(source),
            OpenError::UnsupportedScheme { .. } | OpenError::InvalidUri { .. } => {
                ErrorCode::INVALID_ARGUMENT
            }
            OpenError::Probe(e) => match e {
                SymphoniaError::IoError(io) => ErrorCode::from_io(io),
                _ => ErrorCode::INVALID_DATA,
            },
            OpenError::NoAudioStream => ErrorCode::STREAM_NOT_FOUND,
            OpenError::Codec(_) => ErrorCode::DECODER_NOT_FOUND,
        }
    }
}

/// Failure to build the filter graph.
#[derive(Debug, Error)]
pub enum FilterGraphError {
    #[error("no input is open")]
    NotOpen,
    #[error("invalid filter description at byte {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("no such filter: '{name}'")]
    UnknownFilter { name: String },
    #[error("invalid option '{option}' for filter '{filter}': {message}")]
    InvalidOption {
        filter: String,
        option: String,
        message: String,
    },
    #[error("filter '{filter}' cannot be configured: {message}")]
    Negotiation { filter: String, message: String },
}

impl FilterGraphError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FilterGraphError::NotOpen => ErrorCode::STREAM_NOT_FOUND,
            FilterGraphError::UnknownFilter { .. } => ErrorCode::FILTER_NOT_FOUND,
            FilterGraphError::Parse { .. }
            | FilterGraphError::InvalidOption { .. }
            | FilterGraphError::Negotiation { .. } => ErrorCode::INVALID_ARGUMENT,
        }
    }
}

/// Failure to reposition the input.
#[derive(Debug, Error)]
pub enum SeekError {
    #[error("no input is open")]
    NotOpen,
    #[error("seek target {target} is out of range")]
    Overflow { target: u64 },
    #[error("seek failed: {0}")]
    Source(#[source] SymphoniaError),
}

impl SeekError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SeekError::NotOpen => ErrorCode::STREAM_NOT_FOUND,
            SeekError::Overflow { .. } => ErrorCode::INVALID_ARGUMENT,
            SeekError::Source(e) => ErrorCode::from_symphonia(e),
        }
    }
}

/// Failure inside the sample rate / channel converter.
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("resampler init failed: {0}")]
    Init(String),
    #[error("resampler process failed: {0}")]
    Process(String),
    #[error("resampler bound to {bound} but received {got}")]
    InputChanged { bound: AudioFormat, got: AudioFormat },
}

impl ResampleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResampleError::Init(_) | ResampleError::InputChanged { .. } => {
                ErrorCode::INVALID_ARGUMENT
            }
            ResampleError::Process(_) => ErrorCode::UNKNOWN,
        }
    }
}

/// Failure while pushing through or pulling from the filter graph.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter input expects {expected} but received {got}")]
    FormatMismatch { expected: AudioFormat, got: AudioFormat },
    #[error("filter graph already received end of stream")]
    Finished,
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

impl FilterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FilterError::FormatMismatch { .. } => ErrorCode::INVALID_ARGUMENT,
            FilterError::Finished => ErrorCode::EOF,
            FilterError::Resample(e) => e.code(),
        }
    }
}

/// Fatal outcome of a `step` or `flush` call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no input is open")]
    NotOpen,
    #[error("error reading packet: {0}")]
    Read(#[source] SymphoniaError),
    #[error("error decoding packet: {0}")]
    Decode(#[source] SymphoniaError),
    #[error("filtering is enabled but no filter graph was initialized")]
    FiltersNotInitialized,
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
    #[error("resample error: {0}")]
    Resample(#[from] ResampleError),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::NotOpen => ErrorCode::STREAM_NOT_FOUND,
            PipelineError::Read(e) | PipelineError::Decode(e) => ErrorCode::from_symphonia(e),
            PipelineError::FiltersNotInitialized => ErrorCode::INVALID_ARGUMENT,
            PipelineError::Filter(e) => e.code(),
            PipelineError::Resample(e) => e.code(),
        }
    }
}
