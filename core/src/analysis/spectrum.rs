//! Single-sided magnitude spectra and short-time Fourier transforms.

use crate::math::FftHelper;
use crate::prelude::{SignalError, SignalResult};
use crate::trace::validate_sample_rate;
use ndarray::Array2;
use std::f64::consts::PI;

/// Default STFT segment length.
pub const DEFAULT_STFT_WINDOW: usize = 256;

/// One-sided magnitude spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    /// Frequency resolution `fs / N`.
    pub fn resolution(&self) -> f64 {
        self.frequencies.get(1).copied().unwrap_or(0.0)
    }

    /// Bin with the largest magnitude as (frequency, magnitude).
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, &mag)| (self.frequencies[idx], mag))
    }

    /// Magnitude of the bin closest to `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64) -> Option<f64> {
        self.frequencies
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - freq_hz).abs().total_cmp(&(b.1 - freq_hz).abs()))
            .map(|(idx, _)| self.magnitudes[idx])
    }
}

/// Magnitude surface of a short-time Fourier transform, shaped (frequency, time).
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub frequencies: Vec<f64>,
    pub times: Vec<f64>,
    pub magnitudes: Array2<f64>,
}

/// Single-sided spectrum of `samples`.
///
/// Reports the `(N + 1) / 2` non-negative frequency bins with magnitudes
/// scaled by `2/N`, so a sinusoid of amplitude A reads as A. A single sample
/// yields one DC bin holding `|x[0]|` without the factor of two.
pub fn compute_fft(samples: &[f64], sample_rate: f64) -> SignalResult<Spectrum> {
    validate_sample_rate(sample_rate)?;
    let n = samples.len();
    match n {
        0 => Err(SignalError::invalid("cannot transform an empty trace")),
        1 => Ok(Spectrum {
            frequencies: vec![0.0],
            magnitudes: vec![samples[0].abs()],
        }),
        _ => {
            let mut fft = FftHelper::new(n);
            let spectrum = fft.forward(samples);
            let bins = (n + 1) / 2;
            let scale = 2.0 / n as f64;
            let resolution = sample_rate / n as f64;
            Ok(Spectrum {
                frequencies: (0..bins).map(|k| k as f64 * resolution).collect(),
                magnitudes: spectrum[..bins].iter().map(|c| c.norm() * scale).collect(),
            })
        }
    }
}

/// Short-time Fourier transform magnitude.
///
/// Segments of `window_length` samples step by `window_length - overlap`
/// (overlap defaults to half a window). A periodic Hann window is applied,
/// the signal is extended by half a window of zeros at both ends and
/// zero-padded to a whole number of steps, and magnitudes are scaled by the
/// window sum.
pub fn compute_stft(
    samples: &[f64],
    sample_rate: f64,
    window_length: usize,
    overlap: Option<usize>,
) -> SignalResult<Spectrogram> {
    validate_sample_rate(sample_rate)?;
    if window_length == 0 {
        return Err(SignalError::invalid("STFT window length must be positive"));
    }
    if window_length > samples.len() {
        return Err(SignalError::invalid(format!(
            "STFT window length {window_length} exceeds trace length {}",
            samples.len()
        )));
    }
    let overlap = overlap.unwrap_or(window_length / 2);
    if overlap >= window_length {
        return Err(SignalError::invalid(format!(
            "STFT overlap {overlap} must be smaller than window length {window_length}"
        )));
    }
    let step = window_length - overlap;
    let boundary = window_length / 2;

    let mut padded = vec![0.0; boundary];
    padded.extend_from_slice(samples);
    padded.resize(padded.len() + boundary, 0.0);
    let remainder = (padded.len() - window_length) % step;
    if remainder != 0 {
        padded.resize(padded.len() + step - remainder, 0.0);
    }
    let segments = (padded.len() - window_length) / step + 1;

    let window = hann_periodic(window_length);
    let window_sum: f64 = window.iter().sum();
    let scale = if window_sum > 0.0 { 1.0 / window_sum } else { 1.0 };
    let bins = window_length / 2 + 1;

    let mut fft = FftHelper::new(window_length);
    let mut magnitudes = Array2::<f64>::zeros((bins, segments));
    let mut segment = vec![0.0; window_length];
    for (col, start) in (0..segments).map(|s| (s, s * step)) {
        for (dst, (sample, w)) in segment
            .iter_mut()
            .zip(padded[start..start + window_length].iter().zip(&window))
        {
            *dst = sample * w;
        }
        let spectrum = fft.forward(&segment);
        for (row, value) in spectrum[..bins].iter().enumerate() {
            magnitudes[[row, col]] = value.norm() * scale;
        }
    }

    // The half-window centre and the boundary shift cancel, odd windows included.
    Ok(Spectrogram {
        frequencies: (0..bins)
            .map(|k| k as f64 * sample_rate / window_length as f64)
            .collect(),
        times: (0..segments)
            .map(|s| (s * step) as f64 / sample_rate)
            .collect(),
        magnitudes,
    })
}

fn hann_periodic(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, fs: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn fft_peak_lands_within_one_bin_of_tone() {
        let fs = 1000.0;
        for f0 in [50.0, 123.0, 333.3] {
            let spectrum = compute_fft(&sine(f0, 1.0, fs, 1000), fs).unwrap();
            let (freq, _) = spectrum.peak().unwrap();
            assert!((freq - f0).abs() <= spectrum.resolution());
        }
    }

    #[test]
    fn fft_reports_amplitude_of_bin_centred_tone() {
        let spectrum = compute_fft(&sine(50.0, 3.0, 1000.0, 1000), 1000.0).unwrap();
        let magnitude = spectrum.magnitude_at(50.0).unwrap();
        assert!((magnitude - 3.0).abs() < 1e-9);
    }

    #[test]
    fn fft_bin_count_and_resolution() {
        let even = compute_fft(&[1.0; 8], 16.0).unwrap();
        assert_eq!(even.frequencies.len(), 4);
        assert_eq!(even.resolution(), 2.0);
        let odd = compute_fft(&[1.0; 7], 14.0).unwrap();
        assert_eq!(odd.frequencies.len(), 4);
    }

    #[test]
    fn fft_single_sample_is_plain_dc() {
        let spectrum = compute_fft(&[-2.5], 10.0).unwrap();
        assert_eq!(spectrum.frequencies, vec![0.0]);
        assert_eq!(spectrum.magnitudes, vec![2.5]);
    }

    #[test]
    fn stft_shape_and_axes() {
        let fs = 1000.0;
        let samples = sine(100.0, 1.0, fs, 1000);
        let stft = compute_stft(&samples, fs, 256, None).unwrap();
        // 1000 + 256 boundary samples, padded to a whole number of 128-sample hops.
        assert_eq!(stft.frequencies.len(), 129);
        assert_eq!(stft.times.len(), 9);
        assert_eq!(stft.magnitudes.dim(), (129, 9));
        assert_eq!(stft.times[1], 0.128);
    }

    #[test]
    fn stft_times_are_whole_hops_for_odd_windows() {
        let stft = compute_stft(&[1.0; 50], 10.0, 7, Some(4)).unwrap();
        assert_eq!(stft.times[0], 0.0);
        assert!((stft.times[1] - 0.3).abs() < 1e-12);
        assert!((stft.times[4] - 1.2).abs() < 1e-12);
    }

    #[test]
    fn stft_tracks_tone_frequency() {
        let fs = 1024.0;
        let samples = sine(128.0, 1.0, fs, 2048);
        let stft = compute_stft(&samples, fs, 256, Some(192)).unwrap();
        let middle = stft.times.len() / 2;
        let column = stft.magnitudes.column(middle);
        let (row, magnitude) = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(stft.frequencies[row], 128.0);
        // Hann-windowed tone on a bin centre reads half its amplitude.
        assert!((magnitude - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stft_rejects_window_longer_than_trace() {
        assert!(matches!(
            compute_stft(&[0.0; 100], 1000.0, 256, None),
            Err(SignalError::InvalidParameter(_))
        ));
        assert!(compute_stft(&[0.0; 100], 1000.0, 32, Some(32)).is_err());
    }
}
