//! Sample buffer helpers and WAV I/O
//!
//! The editing core works on mono `f32` buffers at a fixed sample rate.
//! Multichannel input is reduced once at the boundary with [`downmix`];
//! everything downstream owns plain `Vec<f32>` data.

use std::path::Path;

use crate::error::{Result, RetakeError};

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `-f32::INFINITY` for zero or negative input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Peak absolute sample value of a buffer.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// True if every sample is within `eps` of zero.
pub fn is_silent(samples: &[f32], eps: f32) -> bool {
    samples.iter().all(|s| s.abs() <= eps)
}

/// Downmix non-interleaved channels to a single mono buffer by averaging.
///
/// A single channel is copied through unchanged. Returns an empty buffer
/// for empty input.
pub fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels.len() {
        0 => Vec::new(),
        1 => channels[0].clone(),
        n => {
            let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
            let scale = 1.0 / n as f32;
            (0..len)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                .collect()
        }
    }
}

/// Read a WAV file into non-interleaved channels plus the sample rate.
///
/// Integer formats are normalized to [-1.0, 1.0]; float WAVs are passed
/// through.
pub fn read_wav(path: &Path) -> Result<(Vec<Vec<f32>>, u32)> {
    let reader = hound::WavReader::open(path).map_err(|e| RetakeError::InvalidAudio {
        reason: format!("cannot open {}", path.display()),
        source: Some(Box::new(e)),
    })?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        return Err(RetakeError::InvalidAudio {
            reason: "WAV file declares zero channels".to_string(),
            source: None,
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(frames); num_channels];
    for frame in interleaved.chunks_exact(num_channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            channels[ch].push(sample);
        }
    }

    Ok((channels, spec.sample_rate))
}

/// Write a mono f32 buffer as a 32-bit float WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_db_to_linear() {
        assert_relative_eq!(db_to_linear(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(db_to_linear(-20.0), 0.1, epsilon = 1e-6);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_linear_to_db_zero() {
        let db = linear_to_db(0.0);
        assert!(db.is_infinite() && db.is_sign_negative());
    }

    #[test]
    fn test_db_linear_roundtrip() {
        for &v in &[0.001_f32, 0.1, 0.5, 1.0] {
            assert_relative_eq!(db_to_linear(linear_to_db(v)), v, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let channels = vec![vec![0.1, 0.2, 0.3]];
        assert_eq!(downmix(&channels), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_downmix_stereo_average() {
        let channels = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let mono = downmix(&channels);
        assert_relative_eq!(mono[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(mono[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_downmix_empty() {
        assert!(downmix(&[]).is_empty());
    }

    #[test]
    fn test_is_silent() {
        assert!(is_silent(&[0.0, 1e-7, -1e-7], 1e-6));
        assert!(!is_silent(&[0.0, 0.5], 1e-6));
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wav");
        let samples: Vec<f32> = (0..128).map(|i| (i as f32 / 128.0) - 0.5).collect();

        write_wav(&path, &samples, 44100).unwrap();
        let (channels, sr) = read_wav(&path).unwrap();

        assert_eq!(sr, 44100);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0], samples);
    }
}
