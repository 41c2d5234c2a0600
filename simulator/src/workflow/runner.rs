use crate::report::model::{ScanSummary, SingleSummary, WavefieldSummary, WorkflowReport};
use crate::workflow::config::{Mode, WorkflowConfig};
use anyhow::Context;
use scancore::math::StatsHelper;
use scancore::prelude::Pipeline;
use scancore::{ScanCollection, SingleTracePipeline, WavefieldPipeline};
use std::path::Path;

fn is_mat(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("mat"))
}

fn array_extent<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn execute(&self) -> anyhow::Result<WorkflowReport> {
        match self.config.mode {
            Mode::Single => self.run_single(),
            Mode::Scan => self.run_scan(),
            Mode::Wavefield => self.run_wavefield(),
        }
    }

    /// Applies the configured filters and optional normalization, then saves.
    fn process<P: Pipeline>(&self, pipeline: &mut P) -> anyhow::Result<()> {
        for spec in &self.config.filters {
            pipeline
                .apply_filter(spec)
                .with_context(|| format!("applying {spec}"))?;
        }
        if self.config.normalize {
            pipeline.normalize().context("normalizing")?;
        }
        Ok(())
    }

    fn save<P: Pipeline>(&self, pipeline: &P) -> anyhow::Result<()> {
        if let Some(output) = &self.config.output {
            pipeline
                .save(output)
                .with_context(|| format!("saving results to {}", output.display()))?;
            log::info!("saved results to {}", output.display());
        }
        Ok(())
    }

    fn report(&self, sample_rate: f64, shape: Vec<usize>, notes: &[String]) -> WorkflowReport {
        WorkflowReport {
            mode: self.config.mode,
            input: self.config.input.clone(),
            output: self.config.output.clone(),
            sample_rate,
            filters: self.config.filters.iter().map(ToString::to_string).collect(),
            normalized: self.config.normalize,
            shape,
            single: None,
            scan: None,
            wavefield: None,
            notes: notes.to_vec(),
        }
    }

    fn run_single(&self) -> anyhow::Result<WorkflowReport> {
        let input = &self.config.input;
        let mut pipeline = SingleTracePipeline::new();
        let loaded = if is_mat(input) {
            pipeline.load_from_mat(input)
        } else {
            pipeline.load_from_text(input, self.config.sample_rate)
        };
        loaded.with_context(|| format!("loading trace {}", input.display()))?;
        self.process(&mut pipeline)?;

        let (peak_frequency, peak_magnitude) = pipeline
            .compute_fft()
            .context("computing spectrum")?
            .peak()
            .unwrap_or_default();
        let envelope_max = StatsHelper::max_abs(
            pipeline
                .compute_envelope(self.config.envelope)
                .context("computing envelope")?,
        );
        // Traces shorter than one STFT window simply report no spectrogram.
        let spectrogram_shape = pipeline
            .compute_stft(self.config.stft_window, None)
            .ok()
            .map(|s| s.magnitudes.dim());
        let processed = pipeline.processed()?;
        let removed: Vec<f64> = pipeline
            .original()?
            .samples()
            .iter()
            .zip(processed.samples())
            .map(|(original, kept)| original - kept)
            .collect();
        let summary = SingleSummary {
            peak_frequency,
            peak_magnitude,
            envelope_max,
            rms: StatsHelper::rms(processed.samples()),
            snr_db: (StatsHelper::energy(&removed) > 0.0)
                .then(|| StatsHelper::snr_db(processed.samples(), &removed)),
            spectrogram_shape,
        };
        let shape = vec![processed.len()];
        self.save(&pipeline)?;

        let mut report = self.report(pipeline.sample_rate()?, shape, pipeline.notes());
        report.single = Some(summary);
        Ok(report)
    }

    fn run_scan(&self) -> anyhow::Result<WorkflowReport> {
        let input = &self.config.input;
        let mut scan = ScanCollection::new();
        let loaded = if input.is_dir() {
            scan.load_from_folder(input, self.config.pattern.as_deref(), self.config.sample_rate)
        } else {
            scan.load_from_mat(input)
        };
        loaded.with_context(|| format!("loading scan {}", input.display()))?;
        self.process(&mut scan)?;

        let matrix = scan
            .build_matrix(self.config.matrix)
            .context("building scan matrix")?;
        let matrix_shape = matrix.data.dim();
        let position_range = array_extent(&matrix.positions);
        let truncated_from = matrix.truncated_from;
        self.save(&scan)?;

        let metrics = scan.metrics();
        let mut report = self.report(
            scan.sample_rate()?,
            vec![matrix_shape.0, matrix_shape.1],
            scan.notes(),
        );
        report.scan = Some(ScanSummary {
            matrix_shape,
            position_range,
            truncated_from,
            processed: metrics.processed,
            errors: metrics.errors,
        });
        Ok(report)
    }

    fn run_wavefield(&self) -> anyhow::Result<WorkflowReport> {
        let input = &self.config.input;
        let mut wave = WavefieldPipeline::new();
        wave.load_from_mat(input, &self.config.data_key, &self.config.fs_key)
            .with_context(|| format!("loading wavefield {}", input.display()))?;
        self.process(&mut wave)?;

        let total_energy = wave.energy_map().context("computing energy map")?.sum();
        let max_amplitude = wave
            .max_amplitude_map()
            .context("computing amplitude map")?
            .fold(0.0_f64, |acc, v| acc.max(*v));
        let (earliest_arrival, latest_arrival) = array_extent(
            wave.arrival_time_map(self.config.arrival_threshold, self.config.arrival_normalize)
                .context("computing arrival map")?,
        );
        let (nx, ny, nt) = wave.shape()?;
        self.save(&wave)?;

        let metrics = wave.metrics();
        let mut report = self.report(wave.sample_rate()?, vec![nx, ny, nt], wave.notes());
        report.wavefield = Some(WavefieldSummary {
            total_energy,
            max_amplitude,
            earliest_arrival,
            latest_arrival,
            processed: metrics.processed,
            errors: metrics.errors,
        });
        Ok(report)
    }
}
