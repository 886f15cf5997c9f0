//! Packed real FFT on top of rustfft.
//!
//! A real signal of power-of-two length `n` is transformed with a complex
//! FFT of length `n/2` plus an untangling pass. The forward transform
//! leaves the spectrum in packed layout: `data[0]` holds the DC
//! component, `data[1]` the Nyquist component, and the remaining pairs
//! hold (re, im) of ascending positive frequencies. The inverse transform
//! undoes the forward one exactly (up to floating point), carrying the
//! `2/n` normalization.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Real-input FFT for a fixed power-of-two length.
///
/// Holds the rustfft plans and a packing scratch buffer so repeated
/// transforms allocate nothing.
pub struct RealFft {
    len: usize,
    plan_forward: Arc<dyn Fft<f32>>,
    plan_inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl RealFft {
    /// Create a transform for signals of length `len`.
    ///
    /// # Panics
    /// Panics if `len` is not a power of two, or is smaller than 4.
    pub fn new(len: usize) -> Self {
        assert!(
            len.is_power_of_two() && len >= 4,
            "real FFT length {} is not a power of two >= 4",
            len
        );

        let mut planner = FftPlanner::new();

        Self {
            len,
            plan_forward: planner.plan_fft_forward(len / 2),
            plan_inverse: planner.plan_fft_inverse(len / 2),
            scratch: vec![Complex::default(); len / 2],
        }
    }

    /// The signal length this transform was planned for.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Transform `data` in place, forward or inverse.
    ///
    /// # Panics
    /// Panics if `data.len()` differs from the planned length.
    pub fn process(&mut self, data: &mut [f32], forward: bool) {
        if forward {
            self.forward(data);
        } else {
            self.inverse(data);
        }
    }

    /// Forward transform: real signal to packed spectrum, in place.
    ///
    /// # Panics
    /// Panics if `data.len()` differs from the planned length.
    pub fn forward(&mut self, data: &mut [f32]) {
        self.check(data);

        let n = self.len;
        let m = n / 2;

        // Pack adjacent sample pairs as complex values and transform.
        for k in 0..m {
            self.scratch[k] = Complex::new(data[2 * k], data[2 * k + 1]);
        }

        let plan = Arc::clone(&self.plan_forward);
        plan.process(&mut self.scratch);

        let z = &self.scratch;

        // Untangle the even/odd spectra into the packed layout.
        let e0 = z[0].re;
        let o0 = z[0].im;
        data[0] = e0 + o0;
        data[1] = e0 - o0;

        // The self-paired middle bin only needs conjugation.
        data[m] = z[m / 2].re;
        data[m + 1] = -z[m / 2].im;

        for k in 1..m / 2 {
            let b = m - k;
            let (zk, zb) = (z[k], z[b]);

            let h1r = 0.5 * (zk.re + zb.re);
            let h1i = 0.5 * (zk.im - zb.im);
            let h2r = 0.5 * (zk.im + zb.im);
            let h2i = -0.5 * (zk.re - zb.re);

            let angle = 2.0 * PI * k as f32 / n as f32;
            let (wr, wi) = (angle.cos(), -angle.sin());

            data[2 * k] = h1r + wr * h2r - wi * h2i;
            data[2 * k + 1] = h1i + wr * h2i + wi * h2r;
            data[2 * b] = h1r - wr * h2r + wi * h2i;
            data[2 * b + 1] = -h1i + wr * h2i + wi * h2r;
        }
    }

    /// Inverse transform: packed spectrum back to the real signal, in
    /// place. Round-trips with [`RealFft::forward`] up to floating point
    /// tolerance.
    ///
    /// # Panics
    /// Panics if `data.len()` differs from the planned length.
    pub fn inverse(&mut self, data: &mut [f32]) {
        self.check(data);

        let n = self.len;
        let m = n / 2;

        self.scratch[0] = Complex::new(0.5 * (data[0] + data[1]), 0.5 * (data[0] - data[1]));
        self.scratch[m / 2] = Complex::new(data[m], -data[m + 1]);

        for k in 1..m / 2 {
            let b = m - k;
            let (xkr, xki) = (data[2 * k], data[2 * k + 1]);
            let (xbr, xbi) = (data[2 * b], data[2 * b + 1]);

            let er = 0.5 * (xkr + xbr);
            let ei = 0.5 * (xki - xbi);
            let ar = 0.5 * (xkr - xbr);
            let ai = 0.5 * (xki + xbi);

            let angle = 2.0 * PI * k as f32 / n as f32;
            let (wr, ws) = (angle.cos(), angle.sin());

            // Rotate back by the forward twiddle to recover the odd part.
            let or = wr * ar - ws * ai;
            let oi = wr * ai + ws * ar;

            self.scratch[k] = Complex::new(er - oi, ei + or);
            self.scratch[b] = Complex::new(er + oi, -ei + or);
        }

        let plan = Arc::clone(&self.plan_inverse);
        plan.process(&mut self.scratch);

        let scale = 1.0 / m as f32;
        for k in 0..m {
            data[2 * k] = self.scratch[k].re * scale;
            data[2 * k + 1] = self.scratch[k].im * scale;
        }
    }

    fn check(&self, data: &[f32]) {
        assert_eq!(
            data.len(),
            self.len,
            "signal length {} does not match FFT length {}",
            data.len(),
            self.len
        );
    }
}

/// Derive the magnitude spectrum from a packed frequency spectrum.
///
/// `magnitude[i]` holds the magnitude of positive frequency bin `i + 1`;
/// the last two entries carry the raw DC and Nyquist components.
///
/// # Panics
/// Panics if `magnitude.len()` is not half of `spectrum.len()`.
pub fn spectrum_magnitude(spectrum: &[f32], magnitude: &mut [f32]) {
    assert_eq!(
        magnitude.len() * 2,
        spectrum.len(),
        "magnitude length {} has to be half of spectrum length {}",
        magnitude.len(),
        spectrum.len()
    );

    let n = magnitude.len();

    for i in 0..n - 2 {
        let re = spectrum[2 * i + 2];
        let im = spectrum[2 * i + 3];
        magnitude[i] = (re * re + im * im).sqrt();
    }

    magnitude[n - 2] = spectrum[0];
    magnitude[n - 1] = spectrum[1];
}

/// Derive the phase spectrum from a packed frequency spectrum, with the
/// same layout as [`spectrum_magnitude`].
///
/// # Panics
/// Panics if `phase.len()` is not half of `spectrum.len()`.
pub fn spectrum_phase(spectrum: &[f32], phase: &mut [f32]) {
    assert_eq!(
        phase.len() * 2,
        spectrum.len(),
        "phase length {} has to be half of spectrum length {}",
        phase.len(),
        spectrum.len()
    );

    let n = phase.len();

    for i in 0..n - 2 {
        phase[i] = spectrum[2 * i + 3].atan2(spectrum[2 * i + 2]);
    }

    phase[n - 2] = spectrum[0];
    phase[n - 1] = spectrum[1];
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(len: usize, cycles: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * cycles * i as f32 / len as f32).sin())
            .collect()
    }

    #[test]
    fn test_impulse_spectrum_is_flat() {
        let mut data = vec![0.0f32; 8];
        data[0] = 1.0;

        let mut fft = RealFft::new(8);
        fft.forward(&mut data);

        // Every bin of an impulse has unit magnitude.
        assert_relative_eq!(data[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(data[1], 1.0, epsilon = 1e-5);
        for k in 1..4 {
            let re = data[2 * k];
            let im = data[2 * k + 1];
            assert_relative_eq!((re * re + im * im).sqrt(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_dc_component() {
        let mut data = vec![0.5f32; 16];

        let mut fft = RealFft::new(16);
        fft.forward(&mut data);

        assert_relative_eq!(data[0], 8.0, epsilon = 1e-4);
        assert_relative_eq!(data[1], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let len = 256;
        let mut data = sine(len, 16.0);

        let mut fft = RealFft::new(len);
        fft.forward(&mut data);

        let mut magnitude = vec![0.0f32; len / 2];
        spectrum_magnitude(&data, &mut magnitude);

        // Bin 16 lives at magnitude index 15 in the packed layout.
        let peak = magnitude[..len / 2 - 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 15);
        assert_relative_eq!(magnitude[15], len as f32 / 2.0, epsilon = 0.1);
    }

    #[test]
    fn test_round_trip_identity() {
        for cycles in [1.0, 3.0, 7.5] {
            let len = 128;
            let original = sine(len, cycles);
            let mut data = original.clone();

            let mut fft = RealFft::new(len);
            fft.forward(&mut data);
            fft.inverse(&mut data);

            for (a, b) in original.iter().zip(&data) {
                assert_relative_eq!(*a, *b, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_round_trip_smallest_size() {
        let original = vec![0.25, -1.0, 0.5, 2.0];
        let mut data = original.clone();

        let mut fft = RealFft::new(4);
        fft.forward(&mut data);
        fft.inverse(&mut data);

        for (a, b) in original.iter().zip(&data) {
            assert_relative_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    #[should_panic]
    fn test_non_power_of_two_rejected() {
        let _ = RealFft::new(100);
    }

    #[test]
    #[should_panic]
    fn test_length_mismatch_rejected() {
        let mut fft = RealFft::new(64);
        let mut data = vec![0.0f32; 32];
        fft.forward(&mut data);
    }

    #[test]
    #[should_panic]
    fn test_magnitude_size_mismatch_rejected() {
        let spectrum = vec![0.0f32; 64];
        let mut magnitude = vec![0.0f32; 16];
        spectrum_magnitude(&spectrum, &mut magnitude);
    }

    #[test]
    fn test_phase_layout_matches_magnitude() {
        let len = 64;
        let mut data = sine(len, 4.0);

        let mut fft = RealFft::new(len);
        fft.forward(&mut data);

        let mut phase = vec![0.0f32; len / 2];
        spectrum_phase(&data, &mut phase);

        assert_relative_eq!(phase[len / 2 - 2], data[0], epsilon = 1e-6);
        assert_relative_eq!(phase[len / 2 - 1], data[1], epsilon = 1e-6);
    }
}
