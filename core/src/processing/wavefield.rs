//! Wavefield volumes indexed (x, y, time) and the spatial maps reduced from them.

use super::grid::infer_grid;
use crate::analysis::hilbert_envelope;
use crate::filters::{self, FilterPlan};
use crate::io::{matfile, NamedArrays, WavefieldRecord};
use crate::prelude::{FilterSpec, Pipeline, SignalError, SignalResult};
use crate::telemetry::{BatchMetrics, LogManager, Metrics};
use crate::trace::{time_axis, validate_sample_rate};
use ndarray::{arr0, Array1, Array2, Array3, ArrayD, Axis, Zip};
use rayon::prelude::*;
use std::path::Path;

/// Default envelope threshold for arrival picking.
pub const DEFAULT_ARRIVAL_THRESHOLD: f64 = 0.1;

/// Variable the processed volume is saved under.
pub const WAVE_DATA_KEY: &str = "wave_data";

#[derive(Debug, Clone)]
struct VolumeState {
    original: Array3<f64>,
    data: Array3<f64>,
    sample_rate: f64,
}

#[derive(Debug, Clone, Default)]
struct MapCache {
    energy: Option<Array2<f64>>,
    max_amplitude: Option<Array2<f64>>,
    arrival: Option<((f64, bool), Array2<f64>)>,
}

#[derive(Debug)]
pub struct WavefieldPipeline {
    state: Option<VolumeState>,
    dx: f64,
    dy: f64,
    maps: MapCache,
    logger: LogManager,
    metrics: BatchMetrics,
}

impl Default for WavefieldPipeline {
    fn default() -> Self {
        Self {
            state: None,
            dx: 1.0,
            dy: 1.0,
            maps: MapCache::default(),
            logger: LogManager::new(),
            metrics: BatchMetrics::new(),
        }
    }
}

impl WavefieldPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a (nx, ny, nt) volume, or a (positions, nt) array that is
    /// reshaped row-major onto `grid_shape` or the inferred near-square grid.
    pub fn load(
        &mut self,
        volume: ArrayD<f64>,
        sample_rate: f64,
        grid_shape: Option<(usize, usize)>,
    ) -> SignalResult<()> {
        validate_sample_rate(sample_rate)?;
        let data = shape_volume(volume, grid_shape)?;
        self.install(data.clone(), data, sample_rate);
        Ok(())
    }

    /// Reads the volume under `data_key` and the sample rate under `fs_key`
    /// (1 Hz when absent). Stored `dx`/`dy` and `original_wave_data` are
    /// picked up when present. Nothing changes unless the whole file is valid.
    pub fn load_from_mat(&mut self, path: &Path, data_key: &str, fs_key: &str) -> SignalResult<()> {
        let record = WavefieldRecord::from_arrays(&matfile::load(path)?, data_key, fs_key)?;
        let sample_rate = record.sample_rate.unwrap_or(1.0);
        validate_sample_rate(sample_rate)?;
        let data = shape_volume(record.data, None)?;
        let original = match record.original_data {
            Some(original) => {
                let original = shape_volume(original, None)?;
                if original.dim() != data.dim() {
                    return Err(SignalError::InvalidShape(format!(
                        "original_wave_data shape {:?} differs from {:?}",
                        original.dim(),
                        data.dim()
                    )));
                }
                original
            }
            None => data.clone(),
        };
        let (dx, dy) = (record.dx.unwrap_or(self.dx), record.dy.unwrap_or(self.dy));
        validate_spacing(dx, dy)?;

        self.install(original, data, sample_rate);
        self.dx = dx;
        self.dy = dy;
        Ok(())
    }

    fn install(&mut self, original: Array3<f64>, data: Array3<f64>, sample_rate: f64) {
        let (nx, ny, nt) = data.dim();
        self.logger.clear();
        self.logger.record(&format!(
            "loaded wavefield {nx}x{ny} with {nt} samples at {sample_rate} Hz"
        ));
        self.state = Some(VolumeState {
            original,
            data,
            sample_rate,
        });
        self.maps = MapCache::default();
        self.metrics.reset();
    }

    fn state(&self) -> SignalResult<&VolumeState> {
        self.state.as_ref().ok_or(SignalError::NotLoaded)
    }

    pub fn data(&self) -> SignalResult<&Array3<f64>> {
        Ok(&self.state()?.data)
    }

    pub fn original(&self) -> SignalResult<&Array3<f64>> {
        Ok(&self.state()?.original)
    }

    pub fn shape(&self) -> SignalResult<(usize, usize, usize)> {
        Ok(self.state()?.data.dim())
    }

    pub fn grid_spacing(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }

    pub fn set_grid_spacing(&mut self, dx: f64, dy: f64) -> SignalResult<()> {
        validate_spacing(dx, dy)?;
        self.dx = dx;
        self.dy = dy;
        Ok(())
    }

    pub fn x_axis(&self) -> SignalResult<Vec<f64>> {
        let (nx, _, _) = self.shape()?;
        Ok((0..nx).map(|i| i as f64 * self.dx).collect())
    }

    pub fn y_axis(&self) -> SignalResult<Vec<f64>> {
        let (_, ny, _) = self.shape()?;
        Ok((0..ny).map(|i| i as f64 * self.dy).collect())
    }

    pub fn time_axis(&self) -> SignalResult<Vec<f64>> {
        let state = self.state()?;
        Ok(time_axis(state.data.len_of(Axis(2)), state.sample_rate))
    }

    pub fn notes(&self) -> &[String] {
        self.logger.notes()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Time series of grid cell (ix, iy).
    pub fn trace_at(&self, ix: usize, iy: usize) -> SignalResult<Vec<f64>> {
        let (nx, ny, _) = self.shape()?;
        if ix >= nx {
            return Err(SignalError::IndexOutOfRange { index: ix, len: nx });
        }
        if iy >= ny {
            return Err(SignalError::IndexOutOfRange { index: iy, len: ny });
        }
        Ok(self.state()?.data.slice(ndarray::s![ix, iy, ..]).to_vec())
    }

    /// (nx, ny) snapshot at one time index.
    pub fn time_slice(&self, index: usize) -> SignalResult<Array2<f64>> {
        let data = &self.state()?.data;
        let nt = data.len_of(Axis(2));
        if index >= nt {
            return Err(SignalError::IndexOutOfRange { index, len: nt });
        }
        Ok(data.index_axis(Axis(2), index).to_owned())
    }

    /// Sum of squared samples per cell.
    pub fn energy_map(&mut self) -> SignalResult<&Array2<f64>> {
        let data = &self.state.as_ref().ok_or(SignalError::NotLoaded)?.data;
        let map = self
            .maps
            .energy
            .get_or_insert_with(|| data.map_axis(Axis(2), |lane| lane.iter().map(|v| v * v).sum::<f64>()));
        Ok(map)
    }

    /// Largest absolute sample per cell.
    pub fn max_amplitude_map(&mut self) -> SignalResult<&Array2<f64>> {
        let data = &self.state.as_ref().ok_or(SignalError::NotLoaded)?.data;
        let map = self.maps.max_amplitude.get_or_insert_with(|| {
            data.map_axis(Axis(2), |lane| lane.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())))
        });
        Ok(map)
    }

    /// Time at which each cell's Hilbert envelope first exceeds `threshold`,
    /// optionally after scaling the cell by its own peak. Cells that never
    /// cross report the last time-axis value.
    pub fn arrival_time_map(
        &mut self,
        threshold: f64,
        normalize_each: bool,
    ) -> SignalResult<&Array2<f64>> {
        if !threshold.is_finite() {
            return Err(SignalError::invalid(format!(
                "arrival threshold must be finite, got {threshold}"
            )));
        }
        let state = self.state.as_ref().ok_or(SignalError::NotLoaded)?;
        let key = (threshold, normalize_each);
        let stale = !matches!(&self.maps.arrival, Some((cached, _)) if *cached == key);
        if stale {
            let (nx, ny, nt) = state.data.dim();
            let last = nt.saturating_sub(1) as f64 / state.sample_rate;
            let sample_rate = state.sample_rate;
            let mut map = Array2::zeros((nx, ny));
            Zip::from(&mut map)
                .and(state.data.lanes(Axis(2)))
                .par_for_each(|arrival, lane| {
                    let mut samples = lane.to_vec();
                    if normalize_each {
                        samples = filters::normalize(&samples);
                    }
                    *arrival = hilbert_envelope(&samples)
                        .iter()
                        .position(|&value| value > threshold)
                        .map_or(last, |idx| idx as f64 / sample_rate);
                });
            self.maps.arrival = Some((key, map));
        }
        match &self.maps.arrival {
            Some((_, map)) => Ok(map),
            None => Err(SignalError::NotLoaded),
        }
    }

    fn replace_data(&mut self, data: Array3<f64>) -> SignalResult<()> {
        let state = self.state.as_mut().ok_or(SignalError::NotLoaded)?;
        state.data = data;
        self.maps = MapCache::default();
        Ok(())
    }
}

impl Pipeline for WavefieldPipeline {
    fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    fn sample_rate(&self) -> SignalResult<f64> {
        Ok(self.state()?.sample_rate)
    }

    /// Filters every cell's time series in parallel into a working copy.
    fn apply_filter(&mut self, spec: &FilterSpec) -> SignalResult<()> {
        let state = self.state()?;
        let plan = FilterPlan::prepare(spec, state.sample_rate, state.data.len_of(Axis(2)))?;
        let mut working = state.data.clone();
        let metrics = &self.metrics;
        working
            .outer_iter_mut()
            .into_par_iter()
            .try_for_each(|mut plane| -> SignalResult<()> {
                for mut lane in plane.outer_iter_mut() {
                    match plan.run(&lane.to_vec()) {
                        Ok(filtered) => {
                            lane.assign(&Array1::from(filtered));
                            metrics.record_processed();
                        }
                        Err(err) => {
                            metrics.record_error();
                            return Err(err);
                        }
                    }
                }
                Ok(())
            })?;
        self.replace_data(working)?;
        self.logger.record(&format!("applied {spec} to wavefield"));
        Ok(())
    }

    /// Scales the whole volume by its largest absolute sample.
    fn normalize(&mut self) -> SignalResult<()> {
        let data = &self.state()?.data;
        let peak = data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if peak > 0.0 {
            let scaled = data / peak;
            self.replace_data(scaled)?;
        }
        Ok(())
    }

    fn reset(&mut self) -> SignalResult<()> {
        let state = self.state.as_mut().ok_or(SignalError::NotLoaded)?;
        state.data = state.original.clone();
        self.maps = MapCache::default();
        self.metrics.reset();
        self.logger.record("reset to original wavefield");
        Ok(())
    }

    /// Writes the processed and original volumes with their axes and grid
    /// metadata, plus every map computed so far.
    fn save(&self, path: &Path) -> SignalResult<()> {
        let state = self.state()?;
        let (nx, ny, nt) = state.data.dim();
        let vector = |values: Vec<f64>| Array1::from(values).into_dyn();
        let scalar = |value: f64| arr0(value).into_dyn();

        let mut arrays = NamedArrays::new();
        arrays.insert(WAVE_DATA_KEY.into(), state.data.clone().into_dyn());
        arrays.insert("original_wave_data".into(), state.original.clone().into_dyn());
        arrays.insert("time".into(), vector(self.time_axis()?));
        arrays.insert("x".into(), vector(self.x_axis()?));
        arrays.insert("y".into(), vector(self.y_axis()?));
        arrays.insert("fs".into(), scalar(state.sample_rate));
        arrays.insert("nx".into(), scalar(nx as f64));
        arrays.insert("ny".into(), scalar(ny as f64));
        arrays.insert("nt".into(), scalar(nt as f64));
        arrays.insert("dx".into(), scalar(self.dx));
        arrays.insert("dy".into(), scalar(self.dy));
        if let Some(map) = &self.maps.energy {
            arrays.insert("energy_map".into(), map.clone().into_dyn());
        }
        if let Some(map) = &self.maps.max_amplitude {
            arrays.insert("max_amplitude_map".into(), map.clone().into_dyn());
        }
        if let Some((_, map)) = &self.maps.arrival {
            arrays.insert("arrival_time_map".into(), map.clone().into_dyn());
        }
        matfile::save(path, &arrays)
    }
}

fn validate_spacing(dx: f64, dy: f64) -> SignalResult<()> {
    for (name, value) in [("dx", dx), ("dy", dy)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(SignalError::invalid(format!(
                "grid spacing {name} must be positive, got {value}"
            )));
        }
    }
    Ok(())
}

fn shape_volume(volume: ArrayD<f64>, grid_shape: Option<(usize, usize)>) -> SignalResult<Array3<f64>> {
    let shape = volume.shape().to_vec();
    let data = match *shape.as_slice() {
        [nx, ny, nt] => {
            if let Some(grid) = grid_shape {
                if grid != (nx, ny) {
                    return Err(SignalError::InvalidShape(format!(
                        "grid {grid:?} does not match volume {shape:?}"
                    )));
                }
            }
            Array3::from_shape_vec((nx, ny, nt), volume.iter().copied().collect())
        }
        [positions, nt] => {
            let (nx, ny) = match grid_shape {
                Some(grid) => grid,
                None => infer_grid(positions)?,
            };
            if nx * ny != positions {
                return Err(SignalError::InvalidShape(format!(
                    "grid {nx}x{ny} cannot hold {positions} positions"
                )));
            }
            Array3::from_shape_vec((nx, ny, nt), volume.iter().copied().collect())
        }
        _ => {
            return Err(SignalError::InvalidShape(format!(
                "wavefield must be 2-D or 3-D, got shape {shape:?}"
            )))
        }
    }
    .map_err(|err| SignalError::InvalidShape(err.to_string()))?;

    if data.is_empty() {
        return Err(SignalError::InvalidShape(format!(
            "wavefield has no samples, shape {shape:?}"
        )));
    }
    Ok(data)
}
