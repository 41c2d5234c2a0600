use crate::generator::template::{jitter, sine, Waveform};
use anyhow::Context;
use ndarray::{Array1, Array2, Array3};
use rand::{rngs::StdRng, SeedableRng};
use scancore::io::{matfile, text, NamedArrays, ScanRecord, SingleTraceRecord};
use scancore::trace::{time_axis, Trace};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for generating synthetic test data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub sample_rate: f64,
    pub duration: f64,
    pub positions: usize,
    /// Scan extent in millimetres.
    pub scan_length: f64,
    pub nx: usize,
    pub ny: usize,
    pub time_steps: usize,
    pub noise: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1000.0,
            duration: 1.0,
            positions: 20,
            scan_length: 100.0,
            nx: 50,
            ny: 50,
            time_steps: 100,
            noise: 0.05,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    fn sample_count(&self) -> usize {
        ((self.duration * self.sample_rate).round() as usize).max(1)
    }

    fn time(&self) -> Vec<f64> {
        time_axis(self.sample_count(), self.sample_rate)
    }

    fn scan_positions(&self) -> Vec<f64> {
        let count = self.positions.max(1);
        if count == 1 {
            return vec![0.0];
        }
        let step = self.scan_length / (count - 1) as f64;
        (0..count).map(|i| i as f64 * step).collect()
    }
}

/// Paths written by one generator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratedFiles {
    pub single_point: Vec<PathBuf>,
    pub bscan: Vec<PathBuf>,
    pub wavefield: Vec<PathBuf>,
}

fn create_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating directory {}", dir.display()))
}

/// Writes each waveform as `<name>.txt` and `<name>.mat`.
pub fn generate_single_point(config: &GeneratorConfig, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    create_dir(dir)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let time = config.time();
    let mut written = Vec::new();
    for waveform in Waveform::ALL {
        let samples = waveform.render(&time, 4.0 * config.noise, &mut rng);
        let trace = Trace::new(samples.clone(), config.sample_rate)
            .with_context(|| format!("building {} trace", waveform.name()))?;

        let txt = dir.join(format!("{}.txt", waveform.name()));
        text::write_trace(&txt, &trace)?;
        let mat = dir.join(format!("{}.mat", waveform.name()));
        let record = SingleTraceRecord {
            signal: samples,
            sample_rate: config.sample_rate,
            original_signal: None,
            time: None,
            envelope: None,
        };
        matfile::save(&mat, &record.to_arrays())?;
        log::info!("wrote {} and {}", txt.display(), mat.display());
        written.extend([txt, mat]);
    }
    Ok(written)
}

/// A decaying 50 Hz burst whose onset moves later along the scan, as one
/// `txt_files/signal_<pos>.txt` per position plus `bscan_data.mat`.
pub fn generate_bscan(config: &GeneratorConfig, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let txt_dir = dir.join("txt_files");
    create_dir(&txt_dir)?;
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let time = config.time();
    let positions = config.scan_positions();
    let max_delay = config.sample_count() / 5;

    let mut signals = Array2::zeros((positions.len(), time.len()));
    let mut written = Vec::new();
    for (mut row, &pos) in signals.outer_iter_mut().zip(&positions) {
        let delay = ((pos / config.scan_length.max(f64::EPSILON)) * max_delay as f64) as usize;
        for (idx, value) in row.iter_mut().enumerate() {
            let burst = match idx.checked_sub(delay) {
                Some(offset) => {
                    let t = time[offset];
                    sine(50.0, t) * (-5.0 * t).exp()
                }
                None => 0.0,
            };
            *value = burst + jitter(&mut rng, config.noise);
        }
        let path = txt_dir.join(format!("signal_{pos:.1}.txt"));
        let trace = Trace::new(row.to_vec(), config.sample_rate)?;
        text::write_trace(&path, &trace)?;
        written.push(path);
    }

    let mat = dir.join("bscan_data.mat");
    let record = ScanRecord {
        signals,
        positions: Some(positions),
        sample_rate: Some(config.sample_rate),
        original_signals: None,
        time: Some(time),
        bscan_data: None,
    };
    matfile::save(&mat, &record.to_arrays())?;
    log::info!("wrote {} scan traces to {}", written.len(), txt_dir.display());
    written.push(mat);
    Ok(written)
}

/// Variable the generated wavefield is stored under; readers must name it.
pub const GENERATED_WAVEFIELD_KEY: &str = "wavefield_data";

/// Circular wave spreading from the grid centre, stored (nx, ny, nt) as
/// [`GENERATED_WAVEFIELD_KEY`] in `wavefield_data.mat`.
pub fn generate_wavefield(config: &GeneratorConfig, dir: &Path) -> anyhow::Result<PathBuf> {
    create_dir(dir)?;
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(2));
    let (nx, ny, nt) = (config.nx.max(1), config.ny.max(1), config.time_steps.max(1));
    let (cx, cy) = ((nx / 2) as f64, (ny / 2) as f64);

    let mut volume = Array3::zeros((nx, ny, nt));
    for ((i, j, t), value) in volume.indexed_iter_mut() {
        let dist = ((i as f64 - cx).powi(2) + (j as f64 - cy).powi(2)).sqrt();
        let wave = if dist > 0.0 {
            (dist - 0.8 * t as f64).sin() * (-0.01 * dist).exp() / dist.sqrt()
        } else {
            0.0
        };
        *value = wave + jitter(&mut rng, config.noise);
    }

    let scalar = |v: f64| Array1::from(vec![v]).into_dyn();
    let mut arrays = NamedArrays::new();
    arrays.insert(GENERATED_WAVEFIELD_KEY.into(), volume.into_dyn());
    arrays.insert("dx".into(), scalar(1.0));
    arrays.insert("dy".into(), scalar(1.0));
    arrays.insert("nx".into(), scalar(nx as f64));
    arrays.insert("ny".into(), scalar(ny as f64));
    arrays.insert("nt".into(), scalar(nt as f64));

    let path = dir.join("wavefield_data.mat");
    matfile::save(&path, &arrays)?;
    log::info!("wrote {nx}x{ny}x{nt} wavefield to {}", path.display());
    Ok(path)
}

/// Generates every dataset under `root/{single_point,bscan,wavefield}`.
pub fn generate_all(config: &GeneratorConfig, root: &Path) -> anyhow::Result<GeneratedFiles> {
    Ok(GeneratedFiles {
        single_point: generate_single_point(config, &root.join("single_point"))
            .context("generating single-point data")?,
        bscan: generate_bscan(config, &root.join("bscan")).context("generating B-scan data")?,
        wavefield: vec![generate_wavefield(config, &root.join("wavefield"))
            .context("generating wavefield data")?],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scancore::prelude::Pipeline;
    use scancore::{ScanCollection, SingleTracePipeline, WavefieldPipeline};

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            sample_rate: 500.0,
            duration: 0.4,
            positions: 5,
            nx: 6,
            ny: 4,
            time_steps: 12,
            seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn single_point_files_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let files = generate_single_point(&small_config(), dir.path()).unwrap();
        assert_eq!(files.len(), 2 * Waveform::ALL.len());

        let mut pipeline = SingleTracePipeline::new();
        pipeline
            .load_from_text(&dir.path().join("chirp.txt"), None)
            .unwrap();
        assert!((pipeline.sample_rate().unwrap() - 500.0).abs() < 1e-6);
        assert_eq!(pipeline.processed().unwrap().len(), 200);

        pipeline
            .load_from_mat(&dir.path().join("sine_wave.mat"))
            .unwrap();
        assert_eq!(pipeline.sample_rate().unwrap(), 500.0);
    }

    #[test]
    fn bscan_positions_span_scan_length() {
        let dir = tempfile::tempdir().unwrap();
        let files = generate_bscan(&small_config(), dir.path()).unwrap();
        assert_eq!(files.len(), 6);

        let mut scan = ScanCollection::new();
        scan.load_from_folder(&dir.path().join("txt_files"), Some("signal_*.txt"), None)
            .unwrap();
        assert_eq!(scan.positions(), &[0.0, 25.0, 50.0, 75.0, 100.0]);

        let mut from_mat = ScanCollection::new();
        from_mat
            .load_from_mat(&dir.path().join("bscan_data.mat"))
            .unwrap();
        assert_eq!(from_mat.len(), 5);
        assert_eq!(from_mat.sample_rate().unwrap(), 500.0);
    }

    #[test]
    fn wavefield_is_stored_grid_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate_wavefield(&small_config(), dir.path()).unwrap();
        let mut wave = WavefieldPipeline::new();
        wave.load_from_mat(&path, GENERATED_WAVEFIELD_KEY, "fs").unwrap();
        assert_eq!(wave.shape().unwrap(), (6, 4, 12));
        assert_eq!(wave.sample_rate().unwrap(), 1.0);
    }

    #[test]
    fn generation_is_reproducible() {
        let config = small_config();
        let mut a = StdRng::seed_from_u64(config.seed);
        let mut b = StdRng::seed_from_u64(config.seed);
        let time = config.time();
        assert_eq!(
            Waveform::NoisySine.render(&time, 0.2, &mut a),
            Waveform::NoisySine.render(&time, 0.2, &mut b)
        );
    }
}
