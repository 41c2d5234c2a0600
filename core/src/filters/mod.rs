//! Filter Bank: length-preserving filters over one sample sequence.

pub mod butterworth;
pub mod median;
pub mod savgol;

pub use butterworth::{Biquad, ButterworthFilter};
pub use median::median_filter;
pub use savgol::{savgol_filter, SavgolKernel};

use crate::math::StatsHelper;
use crate::prelude::{FilterSpec, SignalError, SignalResult};

/// A validated filter, designed once and applied to any number of traces
/// sharing a sample rate.
#[derive(Debug, Clone)]
pub enum FilterPlan {
    Iir(ButterworthFilter),
    Median(usize),
    SavitzkyGolay(SavgolKernel),
}

impl FilterPlan {
    /// Validates `spec` against the sample rate and the shortest trace it will see.
    pub fn prepare(spec: &FilterSpec, sample_rate: f64, min_len: usize) -> SignalResult<Self> {
        if min_len == 0 {
            return Err(SignalError::invalid("cannot filter an empty trace"));
        }
        let plan = match *spec {
            FilterSpec::BandPass {
                lowcut,
                highcut,
                order,
            } => Self::Iir(ButterworthFilter::bandpass(order, lowcut, highcut, sample_rate)?),
            FilterSpec::LowPass { cutoff, order } => {
                Self::Iir(ButterworthFilter::lowpass(order, cutoff, sample_rate)?)
            }
            FilterSpec::HighPass { cutoff, order } => {
                Self::Iir(ButterworthFilter::highpass(order, cutoff, sample_rate)?)
            }
            FilterSpec::Median { kernel_size } => {
                median::validate_kernel(kernel_size, min_len)?;
                Self::Median(kernel_size)
            }
            FilterSpec::SavitzkyGolay {
                window_length,
                polyorder,
            } => {
                let kernel = SavgolKernel::new(window_length, polyorder)?;
                if window_length > min_len {
                    return Err(SignalError::invalid(format!(
                        "savitzky-golay window {window_length} exceeds signal length {min_len}"
                    )));
                }
                Self::SavitzkyGolay(kernel)
            }
        };
        Ok(plan)
    }

    pub fn run(&self, samples: &[f64]) -> SignalResult<Vec<f64>> {
        match self {
            Self::Iir(filter) => {
                if samples.is_empty() {
                    return Err(SignalError::invalid("cannot filter an empty trace"));
                }
                Ok(filter.filtfilt(samples))
            }
            Self::Median(kernel_size) => median_filter(samples, *kernel_size),
            Self::SavitzkyGolay(kernel) => kernel.smooth(samples),
        }
    }
}

/// Applies one Filter Bank operation to a single sequence.
pub fn apply(spec: &FilterSpec, samples: &[f64], sample_rate: f64) -> SignalResult<Vec<f64>> {
    FilterPlan::prepare(spec, sample_rate, samples.len())?.run(samples)
}

/// Divides by the largest absolute value. An all-zero input is returned unchanged.
pub fn normalize(samples: &[f64]) -> Vec<f64> {
    let peak = StatsHelper::max_abs(samples);
    if peak > 0.0 {
        samples.iter().map(|v| v / peak).collect()
    } else {
        samples.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn chirp(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 1000.0;
                (2.0 * PI * (10.0 + 70.0 * t) * t).sin() + 0.1 * (i % 7) as f64
            })
            .collect()
    }

    #[test]
    fn every_filter_preserves_length() {
        let specs = [
            FilterSpec::BandPass {
                lowcut: 5.0,
                highcut: 120.0,
                order: 4,
            },
            FilterSpec::LowPass {
                cutoff: 40.0,
                order: 4,
            },
            FilterSpec::HighPass {
                cutoff: 3.0,
                order: 2,
            },
            FilterSpec::Median { kernel_size: 5 },
            FilterSpec::SavitzkyGolay {
                window_length: 11,
                polyorder: 3,
            },
        ];
        for len in [11, 64, 1000] {
            let input = chirp(len);
            for spec in &specs {
                assert_eq!(apply(spec, &input, 1000.0).unwrap().len(), len, "{spec}");
            }
        }
    }

    #[test]
    fn prepare_validates_against_shortest_trace() {
        let spec = FilterSpec::Median { kernel_size: 9 };
        assert!(FilterPlan::prepare(&spec, 100.0, 8).is_err());
        assert!(FilterPlan::prepare(&spec, 100.0, 9).is_ok());
    }

    #[test]
    fn normalize_scales_peak_to_one() {
        let output = normalize(&[0.5, -2.0, 1.0]);
        assert_eq!(output, vec![0.25, -1.0, 0.5]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize(&chirp(200));
        let twice = normalize(&once);
        assert_eq!(once, twice);
        assert!((StatsHelper::max_abs(&once) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn normalize_leaves_all_zero_input() {
        assert_eq!(normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }
}
