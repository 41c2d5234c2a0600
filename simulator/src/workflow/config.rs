use anyhow::Context;
use scancore::analysis::DEFAULT_STFT_WINDOW;
use scancore::processing::{MatrixOptions, DEFAULT_ARRIVAL_THRESHOLD, WAVE_DATA_KEY};
use scancore::{EnvelopeMethod, FilterSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Single,
    Scan,
    Wavefield,
}

/// One offline processing run: what to load, which filters to apply in
/// order, and where to save the result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub mode: Mode,
    pub input: PathBuf,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Sample rate for text traces that do not encode one.
    #[serde(default)]
    pub sample_rate: Option<f64>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub envelope: EnvelopeMethod,
    #[serde(default = "default_stft_window")]
    pub stft_window: usize,
    #[serde(default)]
    pub matrix: MatrixOptions,
    /// File-name filter when a scan is loaded from a folder.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default = "default_data_key")]
    pub data_key: String,
    #[serde(default = "default_fs_key")]
    pub fs_key: String,
    #[serde(default = "default_threshold")]
    pub arrival_threshold: f64,
    #[serde(default = "default_true")]
    pub arrival_normalize: bool,
}

fn default_stft_window() -> usize {
    DEFAULT_STFT_WINDOW
}

fn default_data_key() -> String {
    WAVE_DATA_KEY.into()
}

fn default_fs_key() -> String {
    "fs".into()
}

fn default_threshold() -> f64 {
    DEFAULT_ARRIVAL_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn new(mode: Mode, input: PathBuf) -> Self {
        Self {
            mode,
            input,
            output: None,
            sample_rate: None,
            filters: Vec::new(),
            normalize: false,
            envelope: EnvelopeMethod::default(),
            stft_window: DEFAULT_STFT_WINDOW,
            matrix: MatrixOptions::default(),
            pattern: None,
            data_key: default_data_key(),
            fs_key: default_fs_key(),
            arrival_threshold: DEFAULT_ARRIVAL_THRESHOLD,
            arrival_normalize: true,
        }
    }
}
