//! Rough savings preview shown before a batch starts. Purely presentational;
//! the runner never consults it.

use crate::quality::Quality;

/// Expected output size as a fraction of the input, falling 5% per quality
/// step above 17 and clamped to [0.1, 0.9].
pub fn output_ratio(quality: Quality) -> f64 {
    let ratio = 1.0 - (quality.value() as f64 - 17.0) * 0.05;
    ratio.clamp(0.1, 0.9)
}

pub fn estimated_savings(total_input_bytes: u64, quality: Quality) -> u64 {
    (total_input_bytes as f64 * (1.0 - output_ratio(quality))).round() as u64
}
