//! Audio test file generation
//!
//! Deterministic WAV stems with a known frame count, so decode tests can
//! check exact sample positions.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Sample rate of generated stems
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Write a stereo ramp: frame `n` holds `n / frames` on the left channel
/// and its negation on the right
pub fn write_stereo_ramp<P: AsRef<Path>>(path: P, seconds: f64) -> Result<u64, hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as u64;

    let mut writer = WavWriter::create(path, spec)?;
    for n in 0..frames {
        let value = n as f32 / frames as f32;
        writer.write_sample(value)?;
        writer.write_sample(-value)?;
    }
    writer.finalize()?;
    Ok(frames)
}

/// Write a constant-level mono stem
pub fn write_mono_constant<P: AsRef<Path>>(
    path: P,
    seconds: f64,
    level: i16,
) -> Result<u64, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as u64;

    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames {
        writer.write_sample(level)?;
    }
    writer.finalize()?;
    Ok(frames)
}
