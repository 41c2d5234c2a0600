use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default Butterworth order used when a filter spec omits one.
pub const DEFAULT_ORDER: usize = 4;

/// Common error type for every core operation.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("no data loaded")]
    NotLoaded,
    #[error("empty collection")]
    Empty,
    #[error("inconsistent sample rate: expected {expected} Hz, found {found} Hz")]
    InconsistentSampleRate { expected: f64, found: f64 },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("{operation} {}: {message}", path.display())]
    IoFailure {
        path: PathBuf,
        operation: &'static str,
        message: String,
    },
}

impl SignalError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn io(path: &Path, operation: &'static str, message: impl fmt::Display) -> Self {
        Self::IoFailure {
            path: path.to_path_buf(),
            operation,
            message: message.to_string(),
        }
    }
}

pub type SignalResult<T> = Result<T, SignalError>;

fn default_order() -> usize {
    DEFAULT_ORDER
}

fn default_kernel() -> usize {
    5
}

fn default_window() -> usize {
    11
}

fn default_polyorder() -> usize {
    3
}

/// Closed set of Filter Bank operations. Cutoffs are in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    BandPass {
        lowcut: f64,
        highcut: f64,
        #[serde(default = "default_order")]
        order: usize,
    },
    LowPass {
        cutoff: f64,
        #[serde(default = "default_order")]
        order: usize,
    },
    HighPass {
        cutoff: f64,
        #[serde(default = "default_order")]
        order: usize,
    },
    Median {
        #[serde(default = "default_kernel")]
        kernel_size: usize,
    },
    SavitzkyGolay {
        #[serde(default = "default_window")]
        window_length: usize,
        #[serde(default = "default_polyorder")]
        polyorder: usize,
    },
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BandPass {
                lowcut,
                highcut,
                order,
            } => write!(f, "band-pass {lowcut}-{highcut} Hz (order {order})"),
            Self::LowPass { cutoff, order } => write!(f, "low-pass {cutoff} Hz (order {order})"),
            Self::HighPass { cutoff, order } => write!(f, "high-pass {cutoff} Hz (order {order})"),
            Self::Median { kernel_size } => write!(f, "median (kernel {kernel_size})"),
            Self::SavitzkyGolay {
                window_length,
                polyorder,
            } => write!(f, "savitzky-golay (window {window_length}, order {polyorder})"),
        }
    }
}

/// Envelope extraction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeMethod {
    #[default]
    Hilbert,
    Peak,
}

impl FromStr for EnvelopeMethod {
    type Err = SignalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hilbert" => Ok(Self::Hilbert),
            "peak" => Ok(Self::Peak),
            other => Err(SignalError::invalid(format!(
                "unsupported envelope method '{other}', expected 'hilbert' or 'peak'"
            ))),
        }
    }
}

/// Collaborator contract shared by the single-trace, scan and wavefield
/// pipelines.
pub trait Pipeline {
    fn is_loaded(&self) -> bool;
    fn sample_rate(&self) -> SignalResult<f64>;
    fn apply_filter(&mut self, spec: &FilterSpec) -> SignalResult<()>;
    fn normalize(&mut self) -> SignalResult<()>;
    fn reset(&mut self) -> SignalResult<()>;
    fn save(&self, path: &Path) -> SignalResult<()>;

    fn bandpass(&mut self, lowcut: f64, highcut: f64, order: usize) -> SignalResult<()> {
        self.apply_filter(&FilterSpec::BandPass {
            lowcut,
            highcut,
            order,
        })
    }

    fn lowpass(&mut self, cutoff: f64, order: usize) -> SignalResult<()> {
        self.apply_filter(&FilterSpec::LowPass { cutoff, order })
    }

    fn highpass(&mut self, cutoff: f64, order: usize) -> SignalResult<()> {
        self.apply_filter(&FilterSpec::HighPass { cutoff, order })
    }

    fn median(&mut self, kernel_size: usize) -> SignalResult<()> {
        self.apply_filter(&FilterSpec::Median { kernel_size })
    }

    fn savgol(&mut self, window_length: usize, polyorder: usize) -> SignalResult<()> {
        self.apply_filter(&FilterSpec::SavitzkyGolay {
            window_length,
            polyorder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_method_parses_known_names() {
        assert_eq!("hilbert".parse::<EnvelopeMethod>().unwrap(), EnvelopeMethod::Hilbert);
        assert_eq!(" Peak ".parse::<EnvelopeMethod>().unwrap(), EnvelopeMethod::Peak);
    }

    #[test]
    fn envelope_method_rejects_unknown_name() {
        let err = "rms".parse::<EnvelopeMethod>().unwrap_err();
        assert!(matches!(err, SignalError::InvalidParameter(_)));
    }

    #[test]
    fn filter_spec_fills_default_order() {
        let spec: FilterSpec = serde_json::from_str(r#"{"kind":"low_pass","cutoff":40.0}"#).unwrap();
        assert_eq!(
            spec,
            FilterSpec::LowPass {
                cutoff: 40.0,
                order: DEFAULT_ORDER
            }
        );
    }

    #[test]
    fn io_error_mentions_path_and_operation() {
        let err = SignalError::io(Path::new("/tmp/a.mat"), "reading", "boom");
        assert_eq!(err.to_string(), "reading /tmp/a.mat: boom");
    }
}
