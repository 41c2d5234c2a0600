use crate::analysis::{compute_envelope, compute_fft, compute_stft, Spectrogram, Spectrum};
use crate::filters::{self, FilterPlan};
use crate::io::{matfile, text, SingleTraceRecord};
use crate::prelude::{EnvelopeMethod, FilterSpec, Pipeline, SignalError, SignalResult};
use crate::telemetry::LogManager;
use crate::trace::Trace;
use std::path::Path;

/// Original and processed copies of one trace.
#[derive(Debug, Clone)]
struct TraceState {
    original: Trace,
    processed: Trace,
}

/// Results derived from the processed trace; dropped on every mutation.
#[derive(Debug, Clone, Default)]
struct AnalysisCache {
    envelope: Option<(EnvelopeMethod, Vec<f64>)>,
    spectrum: Option<Spectrum>,
    spectrogram: Option<((usize, Option<usize>), Spectrogram)>,
}

/// Filtering and analysis over one trace, with reset back to the loaded data.
#[derive(Debug, Default)]
pub struct SingleTracePipeline {
    state: Option<TraceState>,
    cache: AnalysisCache,
    logger: LogManager,
}

impl SingleTracePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, trace: Trace) {
        self.logger.clear();
        self.logger.record(&format!(
            "loaded trace of {} samples at {} Hz",
            trace.len(),
            trace.sample_rate()
        ));
        self.state = Some(TraceState {
            processed: trace.clone(),
            original: trace,
        });
        self.cache = AnalysisCache::default();
    }

    /// Reads a delimited-text trace; `default_rate` applies when the file
    /// encodes no sample rate.
    pub fn load_from_text(&mut self, path: &Path, default_rate: Option<f64>) -> SignalResult<()> {
        let trace = text::read_trace(path, default_rate)?.into_trace()?;
        self.load(trace);
        Ok(())
    }

    /// Reads `signal` and `fs`, plus `original_signal` when present.
    pub fn load_from_mat(&mut self, path: &Path) -> SignalResult<()> {
        let record = SingleTraceRecord::from_arrays(&matfile::load(path)?)?;
        let processed = Trace::new(record.signal, record.sample_rate)?;
        let original = match record.original_signal {
            Some(original) if original.len() != processed.len() => {
                return Err(SignalError::InvalidShape(format!(
                    "original_signal has {} samples, signal has {}",
                    original.len(),
                    processed.len()
                )))
            }
            Some(original) => processed.with_samples(original),
            None => processed.clone(),
        };
        self.logger.clear();
        self.logger
            .record(&format!("loaded trace from {}", path.display()));
        self.state = Some(TraceState {
            original,
            processed,
        });
        self.cache = AnalysisCache::default();
        Ok(())
    }

    fn state(&self) -> SignalResult<&TraceState> {
        self.state.as_ref().ok_or(SignalError::NotLoaded)
    }

    pub fn original(&self) -> SignalResult<&Trace> {
        Ok(&self.state()?.original)
    }

    pub fn processed(&self) -> SignalResult<&Trace> {
        Ok(&self.state()?.processed)
    }

    pub fn time_axis(&self) -> SignalResult<Vec<f64>> {
        Ok(self.state()?.processed.time_axis())
    }

    pub fn notes(&self) -> &[String] {
        self.logger.notes()
    }

    pub fn compute_envelope(&mut self, method: EnvelopeMethod) -> SignalResult<&[f64]> {
        let processed = &self.state.as_ref().ok_or(SignalError::NotLoaded)?.processed;
        let stale = !matches!(&self.cache.envelope, Some((cached, _)) if *cached == method);
        if stale {
            let envelope = compute_envelope(processed.samples(), method)?;
            self.cache.envelope = Some((method, envelope));
        }
        match &self.cache.envelope {
            Some((_, envelope)) => Ok(envelope),
            None => Err(SignalError::NotLoaded),
        }
    }

    pub fn compute_fft(&mut self) -> SignalResult<&Spectrum> {
        let processed = &self.state.as_ref().ok_or(SignalError::NotLoaded)?.processed;
        if self.cache.spectrum.is_none() {
            self.cache.spectrum = Some(compute_fft(processed.samples(), processed.sample_rate())?);
        }
        self.cache.spectrum.as_ref().ok_or(SignalError::NotLoaded)
    }

    pub fn compute_stft(
        &mut self,
        window_length: usize,
        overlap: Option<usize>,
    ) -> SignalResult<&Spectrogram> {
        let processed = &self.state.as_ref().ok_or(SignalError::NotLoaded)?.processed;
        let key = (window_length, overlap);
        let stale = !matches!(&self.cache.spectrogram, Some((cached, _)) if *cached == key);
        if stale {
            let spectrogram = compute_stft(
                processed.samples(),
                processed.sample_rate(),
                window_length,
                overlap,
            )?;
            self.cache.spectrogram = Some((key, spectrogram));
        }
        match &self.cache.spectrogram {
            Some((_, spectrogram)) => Ok(spectrogram),
            None => Err(SignalError::NotLoaded),
        }
    }

    fn replace_processed(&mut self, samples: Vec<f64>) -> SignalResult<()> {
        let state = self.state.as_mut().ok_or(SignalError::NotLoaded)?;
        state.processed = state.processed.with_samples(samples);
        self.cache = AnalysisCache::default();
        Ok(())
    }
}

impl Pipeline for SingleTracePipeline {
    fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    fn sample_rate(&self) -> SignalResult<f64> {
        Ok(self.state()?.processed.sample_rate())
    }

    fn apply_filter(&mut self, spec: &FilterSpec) -> SignalResult<()> {
        let processed = &self.state()?.processed;
        let plan = FilterPlan::prepare(spec, processed.sample_rate(), processed.len())?;
        let filtered = plan.run(processed.samples())?;
        self.replace_processed(filtered)?;
        self.logger.record(&format!("applied {spec}"));
        Ok(())
    }

    fn normalize(&mut self) -> SignalResult<()> {
        let normalized = filters::normalize(self.state()?.processed.samples());
        self.replace_processed(normalized)
    }

    fn reset(&mut self) -> SignalResult<()> {
        let state = self.state.as_mut().ok_or(SignalError::NotLoaded)?;
        state.processed = state.original.clone();
        self.cache = AnalysisCache::default();
        self.logger.record("reset to original trace");
        Ok(())
    }

    /// Writes `signal`, `time`, `fs` and `original_signal`, plus the cached
    /// envelope when one has been computed.
    fn save(&self, path: &Path) -> SignalResult<()> {
        let state = self.state()?;
        let record = SingleTraceRecord {
            signal: state.processed.samples().to_vec(),
            sample_rate: state.processed.sample_rate(),
            original_signal: Some(state.original.samples().to_vec()),
            time: Some(state.processed.time_axis()),
            envelope: self.cache.envelope.as_ref().map(|(_, env)| env.clone()),
        };
        matfile::save(path, &record.to_arrays())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, fs: f64, len: usize) -> Trace {
        let samples = (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect();
        Trace::new(samples, fs).unwrap()
    }

    #[test]
    fn queries_before_load_fail() {
        let mut pipeline = SingleTracePipeline::new();
        assert!(!pipeline.is_loaded());
        assert!(matches!(pipeline.compute_fft(), Err(SignalError::NotLoaded)));
        assert!(matches!(
            pipeline.compute_envelope(EnvelopeMethod::Hilbert),
            Err(SignalError::NotLoaded)
        ));
        assert!(matches!(pipeline.normalize(), Err(SignalError::NotLoaded)));
        assert!(matches!(pipeline.sample_rate(), Err(SignalError::NotLoaded)));
    }

    #[test]
    fn lowpass_attenuates_tone_above_cutoff() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(sine(50.0, 1000.0, 1000));
        let before = pipeline.compute_fft().unwrap().magnitude_at(50.0).unwrap();

        pipeline.lowpass(40.0, 4).unwrap();
        let after = pipeline.compute_fft().unwrap().magnitude_at(50.0).unwrap();

        assert!(before > 0.9, "original peak {before}");
        assert!(after <= 0.5 * before, "before {before}, after {after}");
    }

    #[test]
    fn fft_peak_matches_tone() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(sine(120.0, 1000.0, 500));
        let spectrum = pipeline.compute_fft().unwrap();
        let (freq, _) = spectrum.peak().unwrap();
        assert!((freq - 120.0).abs() <= spectrum.resolution());
    }

    #[test]
    fn reset_restores_original_exactly() {
        let trace = sine(30.0, 500.0, 400);
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(trace.clone());
        pipeline.bandpass(10.0, 60.0, 4).unwrap();
        pipeline.median(5).unwrap();
        pipeline.savgol(11, 3).unwrap();
        pipeline.normalize().unwrap();
        assert_ne!(pipeline.processed().unwrap(), &trace);

        pipeline.reset().unwrap();
        assert_eq!(pipeline.processed().unwrap(), &trace);
        assert_eq!(pipeline.original().unwrap(), &trace);
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = vec![0.5, -2.0, 1.0, 0.25];
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(Trace::new(samples, 10.0).unwrap());
        pipeline.normalize().unwrap();
        let once = pipeline.processed().unwrap().clone();
        pipeline.normalize().unwrap();
        assert_eq!(pipeline.processed().unwrap(), &once);
        assert_eq!(once.samples(), &[0.25, -1.0, 0.5, 0.125]);
    }

    #[test]
    fn normalize_leaves_zero_trace_alone() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(Trace::new(vec![0.0; 8], 10.0).unwrap());
        pipeline.normalize().unwrap();
        assert_eq!(pipeline.processed().unwrap().samples(), &[0.0; 8]);
    }

    #[test]
    fn nan_samples_are_skipped_by_normalize_and_carried_by_transforms() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(Trace::new(vec![0.5, f64::NAN, -2.0, 1.0], 100.0).unwrap());
        pipeline.normalize().unwrap();
        let normalized = pipeline.processed().unwrap().samples();
        assert_eq!(normalized[0], 0.25);
        assert!(normalized[1].is_nan());
        assert_eq!(&normalized[2..], &[-1.0, 0.5]);

        pipeline.load(Trace::new(vec![f64::NAN; 3], 100.0).unwrap());
        pipeline.normalize().unwrap();
        assert!(pipeline.processed().unwrap().samples().iter().all(|v| v.is_nan()));

        let mut samples = sine(10.0, 1000.0, 200).into_samples();
        samples[100] = f64::NAN;
        pipeline.load(Trace::new(samples, 1000.0).unwrap());
        let spectrum = pipeline.compute_fft().unwrap();
        assert!(spectrum.magnitudes.iter().all(|m| m.is_nan()));
        pipeline.lowpass(50.0, 2).unwrap();
        assert!(pipeline.processed().unwrap().samples().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn peak_envelope_with_a_single_peak_is_the_magnitude() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(Trace::new(vec![0.0, -3.0, 1.0, 0.5], 10.0).unwrap());
        let envelope = pipeline.compute_envelope(EnvelopeMethod::Peak).unwrap();
        assert_eq!(envelope, &[0.0, 3.0, 1.0, 0.5]);
    }

    #[test]
    fn each_load_starts_a_fresh_note_list() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(sine(50.0, 1000.0, 400));
        pipeline.lowpass(100.0, 2).unwrap();
        pipeline.highpass(10.0, 2).unwrap();
        assert_eq!(pipeline.notes().len(), 3);

        pipeline.load(sine(50.0, 1000.0, 400));
        assert_eq!(pipeline.notes().len(), 1);
        assert!(pipeline.notes()[0].starts_with("loaded trace"));
    }

    #[test]
    fn rejected_filter_leaves_state_untouched() {
        let trace = sine(30.0, 500.0, 100);
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(trace.clone());
        assert!(matches!(
            pipeline.lowpass(300.0, 4),
            Err(SignalError::InvalidParameter(_))
        ));
        assert!(pipeline.median(4).is_err());
        assert_eq!(pipeline.processed().unwrap(), &trace);
    }

    #[test]
    fn mutation_invalidates_cached_envelope() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(Trace::new(vec![0.0, 2.0, 0.0, -4.0, 0.0, 2.0, 0.0], 10.0).unwrap());
        let before = pipeline.compute_envelope(EnvelopeMethod::Peak).unwrap().to_vec();
        pipeline.normalize().unwrap();
        let after = pipeline.compute_envelope(EnvelopeMethod::Peak).unwrap().to_vec();
        for (b, a) in before.iter().zip(&after) {
            assert!((b / 4.0 - a).abs() < 1e-12);
        }
    }

    #[test]
    fn stft_respects_window_limit() {
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(sine(10.0, 100.0, 100));
        assert!(pipeline.compute_stft(256, None).is_err());
        let spectrogram = pipeline.compute_stft(32, Some(16)).unwrap();
        assert_eq!(spectrogram.magnitudes.nrows(), spectrogram.frequencies.len());
        assert_eq!(spectrogram.magnitudes.ncols(), spectrogram.times.len());
    }

    #[test]
    fn save_and_reload_through_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.mat");
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load(sine(5.0, 100.0, 64));
        pipeline.normalize().unwrap();
        pipeline.highpass(2.0, 2).unwrap();
        pipeline.save(&path).unwrap();

        let mut reloaded = SingleTracePipeline::new();
        reloaded.load_from_mat(&path).unwrap();
        assert_eq!(reloaded.sample_rate().unwrap(), 100.0);
        assert_eq!(reloaded.processed().unwrap(), pipeline.processed().unwrap());
        assert_eq!(reloaded.original().unwrap(), pipeline.original().unwrap());
    }

    #[test]
    fn loads_text_trace_with_default_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        std::fs::write(&path, "0.0\n1.0\n0.0\n-1.0\n").unwrap();
        let mut pipeline = SingleTracePipeline::new();
        pipeline.load_from_text(&path, None).unwrap();
        assert_eq!(pipeline.sample_rate().unwrap(), text::DEFAULT_SAMPLE_RATE);
        assert_eq!(pipeline.processed().unwrap().len(), 4);
    }
}
