//! Voice conversion seam
//!
//! The editing session is agnostic about how converted audio is produced;
//! it hands a source excerpt to a [`Converter`] and stores whatever comes
//! back as a new version. Real backends wrap an external inference engine
//! behind this trait; [`MockConverter`] provides a deterministic stand-in
//! for tests and offline use.

use tracing::debug;

use crate::error::{Result, RetakeError};
use crate::part::ConvertParams;

/// A voice conversion backend.
///
/// Implementations must return audio at the session's sample rate. The
/// output may be shorter or longer than the input; the session truncates
/// or base-fills as needed.
pub trait Converter: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Convert a mono excerpt.
    fn convert(&self, source: &[f32], sample_rate: u32, params: &ConvertParams) -> Result<Vec<f32>>;
}

/// Deterministic converter for tests and dry runs.
///
/// Applies an optional linear `gain` parameter and polarity `invert` flag
/// so converted output is distinguishable from its source. Honors a
/// `fail` parameter to exercise error paths.
#[derive(Debug, Default)]
pub struct MockConverter;

impl MockConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn convert(&self, source: &[f32], sample_rate: u32, params: &ConvertParams) -> Result<Vec<f32>> {
        if params.get::<bool>("fail").unwrap_or(false) {
            return Err(RetakeError::ConversionFailed {
                reason: "mock failure requested".to_string(),
            });
        }

        let gain = params.get::<f32>("gain").unwrap_or(1.0);
        let sign = if params.get::<bool>("invert").unwrap_or(false) {
            -1.0
        } else {
            1.0
        };

        debug!(
            backend = self.name(),
            samples = source.len(),
            sample_rate,
            params = %params.summary(),
            "mock conversion"
        );

        Ok(source.iter().map(|&s| s * gain * sign).collect())
    }
}
