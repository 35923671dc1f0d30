//! Integration tests for stem decoding
//!
//! Generates WAV stems with hound and decodes them through symphonia.

mod helpers;

use helpers::audio_generator::{write_mono_constant, write_stereo_ramp, TEST_SAMPLE_RATE};
use stemdle_player::audio::decoder::StemDecoder;
use stemdle_player::Error;
use tempfile::TempDir;

#[test]
fn test_full_decode_keeps_every_frame() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track-drums.wav");
    let frames = write_stereo_ramp(&path, 2.0).unwrap();

    let decoded = StemDecoder::decode_file(&path, 0.0, None).unwrap();

    assert_eq!(decoded.sample_rate, TEST_SAMPLE_RATE);
    assert_eq!(decoded.frames() as u64, frames);
    assert_eq!(decoded.first_frame, 0);
    assert_eq!(decoded.start_secs(), 0.0);
    assert!((decoded.end_secs() - 2.0).abs() < 1e-9);

    // Channels stay in order
    let last = decoded.frames() - 1;
    assert!(decoded.samples[last * 2] > 0.99);
    assert!(decoded.samples[last * 2 + 1] < -0.99);
}

#[test]
fn test_range_decode_keeps_only_the_window() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track-bass.wav");
    let frames = write_stereo_ramp(&path, 4.0).unwrap();

    let decoded = StemDecoder::decode_file(&path, 1.0, Some(2.5)).unwrap();

    let rate = TEST_SAMPLE_RATE as u64;
    assert_eq!(decoded.first_frame, rate);
    assert_eq!(decoded.frames() as u64, rate * 3 / 2);
    assert!((decoded.start_secs() - 1.0).abs() < 1e-9);
    assert!((decoded.end_secs() - 2.5).abs() < 1e-9);

    // First kept frame is track frame `rate` of the ramp
    let expected = rate as f32 / frames as f32;
    assert!((decoded.samples[0] - expected).abs() < 1e-6);
}

#[test]
fn test_range_past_the_media_end_is_truncated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track-piano.wav");
    write_stereo_ramp(&path, 2.0).unwrap();

    let decoded = StemDecoder::decode_file(&path, 1.5, Some(10.0)).unwrap();
    assert!((decoded.end_secs() - 2.0).abs() < 1e-9);
    assert_eq!(decoded.frames() as u32, TEST_SAMPLE_RATE / 2);
}

#[test]
fn test_start_beyond_media_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track-other.wav");
    write_stereo_ramp(&path, 1.0).unwrap();

    let result = StemDecoder::decode_file(&path, 5.0, Some(6.0));
    assert!(matches!(result, Err(Error::Decode(_))));
}

#[test]
fn test_mono_is_duplicated_to_stereo() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track-vocals.wav");
    let frames = write_mono_constant(&path, 0.5, i16::MAX / 2).unwrap();

    let decoded = StemDecoder::decode_file(&path, 0.0, None).unwrap();

    assert_eq!(decoded.frames() as u64, frames);
    assert_eq!(decoded.samples.len() as u64, frames * 2);
    for frame in decoded.samples.chunks(2) {
        assert_eq!(frame[0], frame[1]);
        assert!((frame[0] - 0.5).abs() < 0.01);
    }
}

#[test]
fn test_decode_bytes_with_extension_hint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track-guitar.wav");
    let frames = write_stereo_ramp(&path, 1.0).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let decoded = StemDecoder::decode_bytes(bytes, Some("wav"), 0.0, None).unwrap();
    assert_eq!(decoded.frames() as u64, frames);
}

#[test]
fn test_missing_file_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let result = StemDecoder::decode_file(&dir.path().join("absent.wav"), 0.0, None);
    assert!(matches!(result, Err(Error::Decode(_))));
}
