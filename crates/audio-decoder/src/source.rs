//! Input demultiplexing.
//!
//! Opens a URI (local path, `file://` or `http(s)://`), probes the container
//! with Symphonia, picks the best audio track and yields its packets.

use std::cmp::Reverse;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::DecoderConfig;
use crate::error::OpenError;
use crate::format::Rational;
use crate::http_stream::HttpRangeSource;

/// Where an input URI points.
#[derive(Debug, PartialEq, Eq)]
enum Location {
    Path(PathBuf),
    Http(String),
}

fn parse_uri(uri: &str) -> Result<Location, OpenError> {
    if uri.trim().is_empty() {
        return Err(OpenError::InvalidUri {
            uri: uri.to_string(),
            reason: "empty URI".to_string(),
        });
    }
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Ok(Location::Path(PathBuf::from(uri)));
    };
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "https" => Ok(Location::Http(uri.to_string())),
        "file" => {
            let rest = rest.strip_prefix("localhost").unwrap_or(rest);
            if !rest.starts_with('/') {
                return Err(OpenError::InvalidUri {
                    uri: uri.to_string(),
                    reason: "file URI must have an absolute path".to_string(),
                });
            }
            let decoded = urlencoding::decode(rest).map_err(|e| OpenError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Location::Path(PathBuf::from(decoded.into_owned())))
        }
        other => Err(OpenError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// Extension of the last path segment of a URL, ignoring query and fragment.
fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() { None } else { Some(ext) }
}

fn path_hint(path: &Path) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    hint
}

fn codec_supported(params: &CodecParameters) -> bool {
    params.codec != CODEC_TYPE_NULL
        && symphonia::default::get_codecs()
            .get_codec(params.codec)
            .is_some()
}

/// Pick the most suitable audio track.
///
/// Only tracks with a registered decoder and a known sample rate qualify.
/// Preference: the container's default track, then more channels, then a
/// higher sample rate, then the lowest index.
pub(crate) fn select_best_audio_stream(tracks: &[Track], default_id: Option<u32>) -> Option<usize> {
    tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| codec_supported(&t.codec_params))
        .filter(|(_, t)| t.codec_params.sample_rate.is_some_and(|r| r > 0))
        .max_by_key(|(idx, t)| {
            let channels = t.codec_params.channels.map(|c| c.count()).unwrap_or(0);
            (
                Some(t.id) == default_id,
                channels,
                t.codec_params.sample_rate.unwrap_or(0),
                Reverse(*idx),
            )
        })
        .map(|(idx, _)| idx)
}

/// Outcome of a single packet read.
pub(crate) enum SourceRead {
    Packet(Packet),
    /// Transient I/O condition; try again.
    Again,
    Eof,
}

/// An opened input with its selected audio stream.
pub(crate) struct SourceHandle {
    reader: Box<dyn FormatReader>,
    stream_index: usize,
    track_id: u32,
    codec_params: CodecParameters,
}

impl SourceHandle {
    pub(crate) fn open(uri: &str, config: &DecoderConfig) -> Result<Self, OpenError> {
        let (source, hint): (Box<dyn MediaSource>, Hint) = match parse_uri(uri)? {
            Location::Path(path) => {
                let file = File::open(&path).map_err(|source| OpenError::Io {
                    uri: uri.to_string(),
                    source,
                })?;
                (Box::new(file) as Box<dyn MediaSource>, path_hint(&path))
            }
            Location::Http(url) => {
                let mut hint = Hint::new();
                if let Some(ext) = url_extension(&url) {
                    hint.with_extension(ext);
                }
                let mut http = HttpRangeSource::new(url, config.http.clone());
                http.connect().map_err(|source| OpenError::Io {
                    uri: uri.to_string(),
                    source,
                })?;
                (Box::new(http) as Box<dyn MediaSource>, hint)
            }
        };

        let mss = MediaSourceStream::new(source, Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(OpenError::Probe)?;
        let reader = probed.format;

        let default_id = reader.default_track().map(|t| t.id);
        let stream_index =
            select_best_audio_stream(reader.tracks(), default_id).ok_or(OpenError::NoAudioStream)?;
        let track = &reader.tracks()[stream_index];
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        tracing::info!(
            uri,
            stream_index,
            codec = codec_name(&codec_params),
            rate_hz = codec_params.sample_rate.unwrap_or(0),
            channels = codec_params.channels.map(|c| c.count()).unwrap_or(0),
            "input opened"
        );

        Ok(Self {
            reader,
            stream_index,
            track_id,
            codec_params,
        })
    }

    pub(crate) fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub(crate) fn codec_params(&self) -> &CodecParameters {
        &self.codec_params
    }

    /// Time base of packet timestamps on the selected stream.
    pub(crate) fn time_base(&self) -> Rational {
        match self.codec_params.time_base {
            Some(tb) => Rational::new(tb.numer, tb.denom),
            None => Rational::new(1, self.codec_params.sample_rate.unwrap_or(1).max(1)),
        }
    }

    pub(crate) fn is_selected(&self, packet: &Packet) -> bool {
        packet.track_id() == self.track_id
    }

    pub(crate) fn read_packet(&mut self) -> Result<SourceRead, SymphoniaError> {
        match self.reader.next_packet() {
            Ok(packet) => Ok(SourceRead::Packet(packet)),
            Err(SymphoniaError::IoError(e)) => match e.kind() {
                io::ErrorKind::UnexpectedEof => Ok(SourceRead::Eof),
                io::ErrorKind::WouldBlock
                | io::ErrorKind::Interrupted
                | io::ErrorKind::TimedOut => Ok(SourceRead::Again),
                _ => Err(SymphoniaError::IoError(e)),
            },
            Err(SymphoniaError::ResetRequired) => {
                tracing::warn!("stream parameters changed mid-stream; treating as end of stream");
                Ok(SourceRead::Eof)
            }
            Err(e) => Err(e),
        }
    }

    /// Coarse seek on the selected stream; returns the timestamp landed on.
    pub(crate) fn seek(&mut self, ts: u64) -> Result<u64, SymphoniaError> {
        let seeked = self.reader.seek(
            SeekMode::Coarse,
            SeekTo::TimeStamp {
                ts,
                track_id: self.track_id,
            },
        )?;
        tracing::debug!(
            target_ts = ts,
            actual_ts = seeked.actual_ts,
            "source seek"
        );
        Ok(seeked.actual_ts)
    }
}

/// Short codec name from the registry, for logs.
fn codec_name(params: &CodecParameters) -> &'static str {
    symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name)
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::Channels;
    use symphonia::core::codecs::{CODEC_TYPE_PCM_S16LE, CodecType};

    fn track(id: u32, codec: CodecType, rate: Option<u32>, channels: Channels) -> Track {
        let mut params = CodecParameters::new();
        params.for_codec(codec).with_channels(channels);
        if let Some(rate) = rate {
            params.with_sample_rate(rate);
        }
        Track::new(id, params)
    }

    fn stereo() -> Channels {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    }

    #[test]
    fn parse_uri_handles_schemes() {
        assert_eq!(
            parse_uri("/tmp/a b.wav").unwrap(),
            Location::Path(PathBuf::from("/tmp/a b.wav"))
        );
        assert_eq!(
            parse_uri("file:///tmp/a%20b.wav").unwrap(),
            Location::Path(PathBuf::from("/tmp/a b.wav"))
        );
        assert_eq!(
            parse_uri("file://localhost/x.flac").unwrap(),
            Location::Path(PathBuf::from("/x.flac"))
        );
        assert_eq!(
            parse_uri("HTTPS://host/x.mp3").unwrap(),
            Location::Http("HTTPS://host/x.mp3".to_string())
        );
    }

    #[test]
    fn parse_uri_rejects_bad_input() {
        assert!(matches!(
            parse_uri("rtsp://cam/stream"),
            Err(OpenError::UnsupportedScheme { scheme }) if scheme == "rtsp"
        ));
        assert!(matches!(parse_uri(""), Err(OpenError::InvalidUri { .. })));
        assert!(matches!(
            parse_uri("file://relative/x.wav"),
            Err(OpenError::InvalidUri { .. })
        ));
    }

    #[test]
    fn url_extension_ignores_query() {
        assert_eq!(url_extension("http://h/a/track.flac?sig=1#t"), Some("flac"));
        assert_eq!(url_extension("http://h/a/stream"), None);
        assert_eq!(url_extension("http://h/a/track."), None);
    }

    #[test]
    fn best_stream_prefers_default_track() {
        let tracks = vec![
            track(1, CODEC_TYPE_PCM_S16LE, Some(96_000), stereo()),
            track(2, CODEC_TYPE_PCM_S16LE, Some(44_100), Channels::FRONT_LEFT),
        ];
        assert_eq!(select_best_audio_stream(&tracks, Some(2)), Some(1));
    }

    #[test]
    fn best_stream_prefers_channels_then_rate() {
        let tracks = vec![
            track(1, CODEC_TYPE_PCM_S16LE, Some(96_000), Channels::FRONT_LEFT),
            track(2, CODEC_TYPE_PCM_S16LE, Some(44_100), stereo()),
            track(3, CODEC_TYPE_PCM_S16LE, Some(48_000), stereo()),
        ];
        assert_eq!(select_best_audio_stream(&tracks, None), Some(2));
    }

    #[test]
    fn best_stream_ties_pick_lowest_index() {
        let tracks = vec![
            track(1, CODEC_TYPE_PCM_S16LE, Some(48_000), stereo()),
            track(2, CODEC_TYPE_PCM_S16LE, Some(48_000), stereo()),
        ];
        assert_eq!(select_best_audio_stream(&tracks, None), Some(0));
    }

    #[test]
    fn best_stream_skips_unusable_tracks() {
        let tracks = vec![
            track(1, CODEC_TYPE_NULL, Some(48_000), stereo()),
            track(2, CODEC_TYPE_PCM_S16LE, None, stereo()),
        ];
        assert_eq!(select_best_audio_stream(&tracks, Some(1)), None);
    }
}
