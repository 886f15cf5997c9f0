//! # RhythmTool DSP
//!
//! Spectral building blocks for the RhythmTool analysis pipeline:
//!
//! - **Packed real FFT**: real-input transform via a half-length complex
//!   FFT, producing the packed spectrum layout the analyzers consume
//! - **Windowing**: Hann window construction and in-place application
//! - **Statistics**: sub-range mean/min/max, weighted sums, kernel
//!   smoothing and linear interpolation
//! - **Downmix**: interleaved multi-channel to mono conversion
//!
//! All functions operate on raw `&[f32]` sample buffers - no framework
//! dependencies. Sizing mistakes (non-power-of-two FFT input, mismatched
//! buffer lengths) are programmer errors and panic; see the `# Panics`
//! sections.

pub mod downmix;
pub mod fft;
pub mod stats;
pub mod window;

pub use downmix::downmix_mono;
pub use fft::{spectrum_magnitude, spectrum_phase, RealFft};
pub use stats::{
    interpolate, lerp, max, max_index, mean, min, min_index, smooth, weighted_sum,
};
pub use window::{apply_window, hann_value, hann_window};
