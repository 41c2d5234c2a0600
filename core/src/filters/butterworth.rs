//! Butterworth IIR design and zero-phase application.
//!
//! Filters are realised as a cascade of second-order sections designed with
//! the bilinear transform (cutoffs pre-warped). Band-pass designs apply the
//! low-pass to band-pass transform to the analog prototype, giving `order`
//! sections with unit gain at the geometric centre and -3 dB at both edges.

use crate::prelude::{SignalError, SignalResult};
use crate::trace::validate_sample_rate;
use num_complex::Complex64;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    Lowpass,
    Highpass,
}

/// One second-order section, Direct Form II Transposed.
///
/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    /// Poles inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    /// Gain at z = 1.
    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// State that makes a constant input `x` produce a constant output.
    fn steady_state(&self, x: f64) -> [f64; 2] {
        let y = self.dc_gain() * x;
        let s1 = self.b[2] * x - self.a[1] * y;
        let s0 = self.b[1] * x - self.a[0] * y + s1;
        [s0, s1]
    }

    /// Filters `buffer` in place starting from the steady state of its first sample.
    fn run(&self, buffer: &mut [f64]) {
        let Some(&first) = buffer.first() else {
            return;
        };
        let mut state = self.steady_state(first);
        for value in buffer.iter_mut() {
            let input = *value;
            let output = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[0] * output + state[1];
            state[1] = self.b[2] * input - self.a[1] * output;
            *value = output;
        }
    }
}

/// A designed Butterworth filter ready to be applied to any number of traces.
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthFilter {
    sections: Vec<Biquad>,
}

impl ButterworthFilter {
    pub fn lowpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> SignalResult<Self> {
        validate_design(order, cutoff_hz, sample_rate)?;
        Ok(Self {
            sections: design(order, cutoff_hz, sample_rate, Response::Lowpass),
        })
    }

    pub fn highpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> SignalResult<Self> {
        validate_design(order, cutoff_hz, sample_rate)?;
        Ok(Self {
            sections: design(order, cutoff_hz, sample_rate, Response::Highpass),
        })
    }

    pub fn bandpass(
        order: usize,
        lowcut_hz: f64,
        highcut_hz: f64,
        sample_rate: f64,
    ) -> SignalResult<Self> {
        validate_design(order, lowcut_hz, sample_rate)?;
        validate_design(order, highcut_hz, sample_rate)?;
        if lowcut_hz >= highcut_hz {
            return Err(SignalError::invalid(format!(
                "band-pass lowcut {lowcut_hz} Hz must be below highcut {highcut_hz} Hz"
            )));
        }
        Ok(Self {
            sections: design_bandpass(order, lowcut_hz, highcut_hz, sample_rate),
        })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Single forward pass, as a causal filter would run.
    pub fn filter(&self, samples: &[f64]) -> Vec<f64> {
        let mut buffer = samples.to_vec();
        for section in &self.sections {
            section.run(&mut buffer);
        }
        buffer
    }

    /// Zero-phase forward-backward filtering. Output length equals input length.
    pub fn filtfilt(&self, samples: &[f64]) -> Vec<f64> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let extended = odd_extension(samples, pad);

        let mut forward = self.filter(&extended);
        forward.reverse();
        let mut backward = self.filter(&forward);
        backward.reverse();

        backward[pad..pad + n].to_vec()
    }

    /// Complex response at `freq_hz`, for inspection and tests.
    pub fn frequency_response(&self, freq_hz: f64, sample_rate: f64) -> Complex64 {
        let omega = 2.0 * PI * freq_hz / sample_rate;
        let z_inv = Complex64::from_polar(1.0, -omega);
        let z_inv2 = z_inv * z_inv;
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, section| {
                let num = section.b[0] + section.b[1] * z_inv + section.b[2] * z_inv2;
                let den = 1.0 + section.a[0] * z_inv + section.a[1] * z_inv2;
                acc * num / den
            })
    }
}

fn validate_design(order: usize, cutoff_hz: f64, sample_rate: f64) -> SignalResult<()> {
    validate_sample_rate(sample_rate)?;
    if order < 1 {
        return Err(SignalError::invalid("filter order must be at least 1"));
    }
    let nyquist = sample_rate / 2.0;
    if !(cutoff_hz.is_finite() && cutoff_hz > 0.0) {
        return Err(SignalError::invalid(format!(
            "cutoff must be positive, got {cutoff_hz} Hz"
        )));
    }
    if cutoff_hz >= nyquist {
        return Err(SignalError::invalid(format!(
            "cutoff {cutoff_hz} Hz must be below the Nyquist frequency {nyquist} Hz"
        )));
    }
    Ok(())
}

/// `pad` samples on each side, reflected through the end points.
fn odd_extension(samples: &[f64], pad: usize) -> Vec<f64> {
    let n = samples.len();
    let first = samples[0];
    let last = samples[n - 1];
    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - samples[i]));
    extended.extend_from_slice(samples);
    extended.extend((1..=pad).map(|i| 2.0 * last - samples[n - 1 - i]));
    extended
}

fn prewarp(freq_hz: f64, sample_rate: f64) -> f64 {
    2.0 * sample_rate * (PI * freq_hz / sample_rate).tan()
}

fn design(order: usize, cutoff_hz: f64, sample_rate: f64, response: Response) -> Vec<Biquad> {
    let wc = prewarp(cutoff_hz, sample_rate);
    let k = 2.0 * sample_rate;
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    // Upper-half-plane member of each conjugate pair on the unit circle.
    for idx in 0..order / 2 {
        let theta = PI * (2 * idx + order + 1) as f64 / (2 * order) as f64;
        let pole = Complex64::from_polar(wc, theta);
        sections.push(bilinear_pair(pole, k, response));
    }
    if order % 2 == 1 {
        sections.push(bilinear_real(-wc, k, response));
    }
    sections
}

/// Each prototype pole `p` becomes the two roots of `s^2 - p*B*s + W0^2`,
/// every resulting analog section carrying the numerator `B*s`.
fn design_bandpass(order: usize, lowcut_hz: f64, highcut_hz: f64, sample_rate: f64) -> Vec<Biquad> {
    let wl = prewarp(lowcut_hz, sample_rate);
    let wh = prewarp(highcut_hz, sample_rate);
    let w0_sq = wl * wh;
    let bw = wh - wl;
    let k = 2.0 * sample_rate;
    let numerator = [0.0, bw, 0.0];
    let mut sections = Vec::with_capacity(order);

    for idx in 0..order / 2 {
        let theta = PI * (2 * idx + order + 1) as f64 / (2 * order) as f64;
        let p = Complex64::from_polar(1.0, theta);
        let half_pb = p * bw / 2.0;
        let root = (half_pb * half_pb - w0_sq).sqrt();
        for q in [half_pb + root, half_pb - root] {
            let denominator = [q.norm_sqr(), -2.0 * q.re, 1.0];
            sections.push(bilinear_section(numerator, denominator, k));
        }
    }
    if order % 2 == 1 {
        // Real prototype pole at -1.
        let denominator = [w0_sq, bw, 1.0];
        sections.push(bilinear_section(numerator, denominator, k));
    }
    sections
}

/// Bilinear transform of `(n0 + n1*s + n2*s^2) / (d0 + d1*s + d2*s^2)`.
fn bilinear_section(num: [f64; 3], den: [f64; 3], k: f64) -> Biquad {
    let k2 = k * k;
    let map = |c: [f64; 3]| {
        [
            c[2] * k2 + c[1] * k + c[0],
            2.0 * (c[0] - c[2] * k2),
            c[2] * k2 - c[1] * k + c[0],
        ]
    };
    let b = map(num);
    let a = map(den);
    Biquad::new(
        [b[0] / a[0], b[1] / a[0], b[2] / a[0]],
        [a[1] / a[0], a[2] / a[0]],
    )
}

fn bilinear_real(p: f64, k: f64, response: Response) -> Biquad {
    let alpha = k - p;
    let beta = k + p;
    let a1 = -beta / alpha;
    match response {
        Response::Lowpass => Biquad::new([-p / alpha, -p / alpha, 0.0], [a1, 0.0]),
        Response::Highpass => Biquad::new([k / alpha, -k / alpha, 0.0], [a1, 0.0]),
    }
}

fn bilinear_pair(p: Complex64, k: f64, response: Response) -> Biquad {
    let mag_sq = p.norm_sqr();
    let k2 = k * k;
    let d = k2 - 2.0 * k * p.re + mag_sq;
    let a1 = 2.0 * (mag_sq - k2) / d;
    let a2 = (k2 + 2.0 * k * p.re + mag_sq) / d;
    match response {
        Response::Lowpass => Biquad::new([mag_sq / d, 2.0 * mag_sq / d, mag_sq / d], [a1, a2]),
        Response::Highpass => Biquad::new([k2 / d, -2.0 * k2 / d, k2 / d], [a1, a2]),
    }
}
