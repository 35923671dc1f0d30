//! Stem decoder using symphonia
//!
//! Decodes a stem (WAV, MP3, FLAC, AAC, Vorbis) to interleaved stereo f32.
//! Only the span that can be heard in a round is kept: everything before the
//! requested start is decoded and discarded, decoding stops at the end.

use crate::error::{Error, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decoded span of a stem
#[derive(Debug, Clone)]
pub struct DecodedStem {
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    /// Source sample rate
    pub sample_rate: u32,
    /// Track frame index of the first kept frame
    pub first_frame: u64,
}

impl DecodedStem {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Track time of the first kept frame, in seconds
    pub fn start_secs(&self) -> f64 {
        self.first_frame as f64 / self.sample_rate as f64
    }

    /// Track time just past the last kept frame, in seconds
    pub fn end_secs(&self) -> f64 {
        (self.first_frame + self.frames() as u64) as f64 / self.sample_rate as f64
    }
}

/// Decoder entry points
pub struct StemDecoder;

impl StemDecoder {
    /// Decode an in-memory stem.
    ///
    /// `extension` is a format hint (e.g. "wav"); `end_secs = None` decodes
    /// to the end of the media.
    pub fn decode_bytes(
        bytes: Vec<u8>,
        extension: Option<&str>,
        start_secs: f64,
        end_secs: Option<f64>,
    ) -> Result<DecodedStem> {
        Self::decode(Box::new(Cursor::new(bytes)), extension, start_secs, end_secs)
    }

    /// Decode a stem from a local file
    pub fn decode_file(path: &Path, start_secs: f64, end_secs: Option<f64>) -> Result<DecodedStem> {
        debug!("Decoding file: {}", path.display());

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;
        let extension = path.extension().and_then(|e| e.to_str());

        Self::decode(Box::new(file), extension, start_secs, end_secs)
    }

    fn decode(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        start_secs: f64,
        end_secs: Option<f64>,
    ) -> Result<DecodedStem> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let start_frame = (start_secs.max(0.0) * sample_rate as f64).floor() as u64;
        let end_frame = end_secs.map(|end| (end.max(0.0) * sample_rate as f64).ceil() as u64);

        debug!(
            "Stem format: sample_rate={}, keeping frames {}..{:?}",
            sample_rate, start_frame, end_frame
        );

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut frame_index: u64 = 0;

        'packets: loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels == 0 {
                continue;
            }

            let needed = decoded.capacity() * channels;
            if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            for frame in buf.samples().chunks(channels) {
                if end_frame.is_some_and(|end| frame_index >= end) {
                    break 'packets;
                }
                if frame_index >= start_frame {
                    let left = frame[0];
                    let right = if channels > 1 { frame[1] } else { left };
                    samples.push(left);
                    samples.push(right);
                }
                frame_index += 1;
            }
        }

        if samples.is_empty() {
            return Err(Error::Decode(format!(
                "No audio at {:.2}s (media has {} frames)",
                start_secs, frame_index
            )));
        }

        debug!("Decoded {} frames", samples.len() / 2);

        Ok(DecodedStem {
            samples,
            sample_rate,
            first_frame: start_frame,
        })
    }
}

/// Format hint from the last path segment of a URL or file path
pub fn extension_hint(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < segment.len() => Some(&segment[dot + 1..]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("http://h/stems/song-drum.wav"), Some("wav"));
        assert_eq!(extension_hint("http://h/a.b/song?x=1.mp3"), None);
        assert_eq!(extension_hint("/tmp/track.flac#t=3"), Some("flac"));
        assert_eq!(extension_hint(".hidden"), None);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = StemDecoder::decode_bytes(vec![0u8; 64], Some("wav"), 0.0, None);
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
