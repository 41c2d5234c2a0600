use crate::workflow::config::Mode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summary of one workflow run, printed as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowReport {
    pub mode: Mode,
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub sample_rate: f64,
    pub filters: Vec<String>,
    pub normalized: bool,
    /// Data dimensions: samples, (traces, samples) or (nx, ny, nt).
    pub shape: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single: Option<SingleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wavefield: Option<WavefieldSummary>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleSummary {
    pub peak_frequency: f64,
    pub peak_magnitude: f64,
    pub envelope_max: f64,
    pub rms: f64,
    /// Processed power over the power of what the filters removed.
    pub snr_db: Option<f64>,
    pub spectrogram_shape: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSummary {
    pub matrix_shape: (usize, usize),
    pub position_range: (f64, f64),
    pub truncated_from: Option<usize>,
    pub processed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WavefieldSummary {
    pub total_energy: f64,
    pub max_amplitude: f64,
    pub earliest_arrival: f64,
    pub latest_arrival: f64,
    pub processed: usize,
    pub errors: usize,
}
