//! Hann window construction and application.

use std::f32::consts::PI;

/// Value of a Hann window of length `size` at position `n`.
pub fn hann_value(n: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * n as f32) / (size as f32 - 1.0)).cos())
}

/// Build a Hann window of the given length.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size).map(|n| hann_value(n, size)).collect()
}

/// Multiply a signal by a window, in place.
///
/// # Panics
/// Panics if the signal and window lengths differ.
pub fn apply_window(signal: &mut [f32], window: &[f32]) {
    assert_eq!(
        signal.len(),
        window.len(),
        "signal length {} does not match window length {}",
        signal.len(),
        window.len()
    );

    for (s, w) in signal.iter_mut().zip(window) {
        *s *= w;
    }
}
