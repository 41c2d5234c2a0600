//! Instantaneous-amplitude envelopes.

use super::peaks::find_local_maxima;
use crate::math::FftHelper;
use crate::prelude::{EnvelopeMethod, SignalError, SignalResult};
use num_complex::Complex64;

pub fn compute_envelope(samples: &[f64], method: EnvelopeMethod) -> SignalResult<Vec<f64>> {
    if samples.is_empty() {
        return Err(SignalError::invalid("cannot take the envelope of an empty trace"));
    }
    Ok(match method {
        EnvelopeMethod::Hilbert => hilbert_envelope(samples),
        EnvelopeMethod::Peak => peak_envelope(samples),
    })
}

/// Analytic signal `x + j·H{x}` built in the frequency domain.
pub fn analytic_signal(samples: &[f64]) -> Vec<Complex64> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let mut fft = FftHelper::new(n);
    let mut spectrum = fft.forward(samples);

    // Keep DC (and Nyquist for even N), double positive bins, drop negative bins.
    let positive_end = n.div_ceil(2);
    for bin in spectrum.iter_mut().take(positive_end).skip(1) {
        *bin *= 2.0;
    }
    let negative_start = if n % 2 == 0 { n / 2 + 1 } else { positive_end };
    for bin in spectrum.iter_mut().skip(negative_start) {
        *bin = Complex64::new(0.0, 0.0);
    }

    fft.inverse(&mut spectrum);
    spectrum
}

/// Magnitude of the analytic signal.
pub fn hilbert_envelope(samples: &[f64]) -> Vec<f64> {
    analytic_signal(samples).iter().map(|c| c.norm()).collect()
}

/// Piecewise-linear interpolation through the local maxima of `|x|`, held
/// flat before the first and after the last peak. With fewer than two peaks
/// the envelope is `|x|` itself.
pub fn peak_envelope(samples: &[f64]) -> Vec<f64> {
    let magnitude: Vec<f64> = samples.iter().map(|v| v.abs()).collect();
    let peaks = find_local_maxima(&magnitude);
    if peaks.len() < 2 {
        return magnitude;
    }

    let first = peaks[0];
    let last = peaks[peaks.len() - 1];
    let mut envelope = vec![0.0; magnitude.len()];
    envelope[..first].fill(magnitude[first]);
    envelope[last..].fill(magnitude[last]);

    for pair in peaks.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        let (left_value, right_value) = (magnitude[left], magnitude[right]);
        let span = (right - left) as f64;
        for (offset, slot) in envelope[left..right].iter_mut().enumerate() {
            *slot = left_value + (right_value - left_value) * offset as f64 / span;
        }
    }
    envelope
}
