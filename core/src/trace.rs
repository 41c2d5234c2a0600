use crate::prelude::{SignalError, SignalResult};

/// One time-ordered sequence of samples with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    samples: Vec<f64>,
    sample_rate: f64,
}

impl Trace {
    pub fn new(samples: Vec<f64>, sample_rate: f64) -> SignalResult<Self> {
        validate_sample_rate(sample_rate)?;
        if samples.is_empty() {
            return Err(SignalError::invalid("trace must hold at least one sample"));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    /// `t[i] = i / sample_rate`.
    pub fn time_axis(&self) -> Vec<f64> {
        time_axis(self.samples.len(), self.sample_rate)
    }

    pub fn is_compatible(&self, other: &Trace) -> bool {
        self.sample_rate == other.sample_rate
    }

    /// Same sample rate, new samples.
    pub(crate) fn with_samples(&self, samples: Vec<f64>) -> Trace {
        Trace {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

pub fn time_axis(len: usize, sample_rate: f64) -> Vec<f64> {
    (0..len).map(|i| i as f64 / sample_rate).collect()
}

pub(crate) fn validate_sample_rate(sample_rate: f64) -> SignalResult<()> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(SignalError::invalid(format!(
            "sample rate must be positive, got {sample_rate}"
        )))
    }
}
