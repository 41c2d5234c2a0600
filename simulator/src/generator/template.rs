use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Single-point test waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Chirp,
    DampedSine,
    NoisySine,
    TwoTone,
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Chirp,
        Waveform::DampedSine,
        Waveform::NoisySine,
        Waveform::TwoTone,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine_wave",
            Waveform::Chirp => "chirp",
            Waveform::DampedSine => "damped_sine",
            Waveform::NoisySine => "noisy_sine",
            Waveform::TwoTone => "multi_component",
        }
    }

    /// Samples the waveform on `time`; `noise` is the half-width of the
    /// uniform jitter added to the noisy variant.
    pub fn render<R: Rng>(&self, time: &[f64], noise: f64, rng: &mut R) -> Vec<f64> {
        let duration = time.last().copied().unwrap_or(0.0).max(f64::EPSILON);
        time.iter()
            .map(|&t| match self {
                Waveform::Sine => sine(50.0, t),
                Waveform::Chirp => {
                    // Linear sweep 10 Hz -> 150 Hz over the record.
                    let (f0, f1) = (10.0, 150.0);
                    (2.0 * PI * (f0 * t + 0.5 * (f1 - f0) / duration * t * t)).cos()
                }
                Waveform::DampedSine => sine(50.0, t) * (-3.0 * t).exp(),
                Waveform::NoisySine => sine(50.0, t) + jitter(rng, noise),
                Waveform::TwoTone => sine(30.0, t) + 0.5 * sine(90.0, t),
            })
            .collect()
    }
}

pub fn sine(frequency: f64, t: f64) -> f64 {
    (2.0 * PI * frequency * t).sin()
}

pub fn jitter<R: Rng>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..amplitude)
    } else {
        0.0
    }
}
