//! Position-indexed collections of traces and the scan matrix built from them.

use crate::analysis::compute_envelope;
use crate::filters::{self, FilterPlan};
use crate::io::{matfile, text, ScanRecord};
use crate::prelude::{EnvelopeMethod, FilterSpec, Pipeline, SignalError, SignalResult};
use crate::telemetry::{BatchMetrics, LogManager, Metrics};
use crate::trace::{time_axis, Trace};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How rows are prepared when the scan matrix is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixOptions {
    pub normalize_each: bool,
    pub envelope: bool,
    pub envelope_method: EnvelopeMethod,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            normalize_each: true,
            envelope: false,
            envelope_method: EnvelopeMethod::Hilbert,
        }
    }
}

/// Traces stacked as rows in ascending position order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanMatrix {
    pub data: Array2<f64>,
    pub positions: Vec<f64>,
    pub time_axis: Vec<f64>,
    /// Longest trace length when rows had to be cut to the shortest one.
    pub truncated_from: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScanCollection {
    positions: Vec<f64>,
    original: Vec<Trace>,
    traces: Vec<Trace>,
    sample_rate: Option<f64>,
    matrix: Option<ScanMatrix>,
    matrix_options: MatrixOptions,
    logger: LogManager,
    metrics: BatchMetrics,
}

impl ScanCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the collection with `entries`, sorted by position. Equal
    /// positions keep their input order.
    pub fn load(&mut self, mut entries: Vec<(f64, Trace)>) -> SignalResult<()> {
        let first = &entries.first().ok_or(SignalError::Empty)?.1;
        let expected = first.sample_rate();
        if let Some((_, odd)) = entries.iter().find(|(_, t)| !t.is_compatible(first)) {
            return Err(SignalError::InconsistentSampleRate {
                expected,
                found: odd.sample_rate(),
            });
        }
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (positions, traces): (Vec<f64>, Vec<Trace>) = entries.into_iter().unzip();

        self.logger.clear();
        self.logger.record(&format!(
            "loaded {} traces at {} Hz",
            traces.len(),
            expected
        ));
        self.positions = positions;
        self.original = traces.clone();
        self.traces = traces;
        self.sample_rate = Some(expected);
        self.matrix = None;
        self.metrics.reset();
        Ok(())
    }

    /// Loads every `.txt` trace in `dir` whose file name matches `pattern`
    /// (`*` wildcards only). The position is the first number in the file
    /// name, or the trace's index in name order when there is none.
    pub fn load_from_folder(
        &mut self,
        dir: &Path,
        pattern: Option<&str>,
        default_rate: Option<f64>,
    ) -> SignalResult<()> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|err| SignalError::io(dir, "listing", err))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("txt"))
                    && file_name(path).map_or(false, |name| {
                        pattern.map_or(true, |pattern| wildcard_match(pattern, name))
                    })
            })
            .collect();
        paths.sort();

        let entries = paths
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let trace = text::read_trace(path, default_rate)?.into_trace()?;
                let position = file_name(path)
                    .and_then(position_from_name)
                    .unwrap_or(index as f64);
                Ok((position, trace))
            })
            .collect::<SignalResult<Vec<_>>>()?;
        self.load(entries)
    }

    /// Reads `signals` (one trace per row) with optional `positions`, `fs`
    /// and `original_signals`. A missing `fs` means 1 Hz.
    pub fn load_from_mat(&mut self, path: &Path) -> SignalResult<()> {
        let record = ScanRecord::from_arrays(&matfile::load(path)?)?;
        let sample_rate = record.sample_rate.unwrap_or(1.0);
        let count = record.signals.nrows();
        let positions = record
            .positions
            .unwrap_or_else(|| (0..count).map(|i| i as f64).collect());

        let rows_to_traces = |matrix: &Array2<f64>| {
            matrix
                .outer_iter()
                .map(|row| Trace::new(row.to_vec(), sample_rate))
                .collect::<SignalResult<Vec<_>>>()
        };
        let processed = rows_to_traces(&record.signals)?;
        let original = match &record.original_signals {
            Some(matrix) => Some(rows_to_traces(matrix)?),
            None => None,
        };

        // Sort once through `load`, carrying each original along with its row.
        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by(|&a, &b| positions[a].total_cmp(&positions[b]));
        self.load(
            positions
                .iter()
                .copied()
                .zip(processed)
                .collect(),
        )?;
        if let Some(original) = original {
            self.original = order.iter().map(|&i| original[i].clone()).collect();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn trace_at(&self, index: usize) -> SignalResult<&Trace> {
        self.traces.get(index).ok_or(SignalError::IndexOutOfRange {
            index,
            len: self.traces.len(),
        })
    }

    /// Length every row is cut to in the scan matrix.
    pub fn common_length(&self) -> SignalResult<usize> {
        self.traces
            .iter()
            .map(Trace::len)
            .min()
            .ok_or(SignalError::NotLoaded)
    }

    pub fn time_axis(&self) -> SignalResult<Vec<f64>> {
        Ok(time_axis(self.common_length()?, self.sample_rate()?))
    }

    pub fn matrix(&self) -> Option<&ScanMatrix> {
        self.matrix.as_ref()
    }

    pub fn notes(&self) -> &[String] {
        self.logger.notes()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Stacks the processed traces into a (positions x time) matrix and caches
    /// it. Unequal lengths are cut to the shortest trace and noted as a warning.
    pub fn build_matrix(&mut self, options: MatrixOptions) -> SignalResult<&ScanMatrix> {
        let width = self.common_length()?;
        let longest = self.traces.iter().map(Trace::len).max().unwrap_or(width);
        let rows = self
            .traces
            .par_iter()
            .map(|trace| {
                let mut row = if options.envelope {
                    compute_envelope(trace.samples(), options.envelope_method)?
                } else {
                    trace.samples().to_vec()
                };
                if options.normalize_each {
                    row = filters::normalize(&row);
                }
                row.truncate(width);
                Ok(row)
            })
            .collect::<SignalResult<Vec<_>>>()?;

        let mut data = Array2::zeros((rows.len(), width));
        for (mut target, row) in data.outer_iter_mut().zip(&rows) {
            target.assign(&ndarray::ArrayView1::from(row.as_slice()));
        }

        let truncated_from = (longest > width).then_some(longest);
        if let Some(longest) = truncated_from {
            self.logger.warn(&format!(
                "scan matrix rows truncated from {longest} to {width} samples"
            ));
        }
        self.matrix_options = options;
        let matrix = ScanMatrix {
            data,
            positions: self.positions.clone(),
            time_axis: time_axis(width, self.sample_rate()?),
            truncated_from,
        };
        Ok(self.matrix.insert(matrix))
    }

    /// Time axis and processed samples of the trace at `index`.
    pub fn slice_by_position(&self, index: usize) -> SignalResult<(Vec<f64>, Vec<f64>)> {
        let trace = self.trace_at(index)?;
        Ok((trace.time_axis(), trace.samples().to_vec()))
    }

    /// Position axis and one scan-matrix column. Rebuilds the matrix with the
    /// most recent options when it has been invalidated.
    pub fn slice_by_time(&mut self, index: usize) -> SignalResult<(Vec<f64>, Vec<f64>)> {
        if self.matrix.is_none() {
            self.build_matrix(self.matrix_options)?;
        }
        let matrix = self.matrix.as_ref().ok_or(SignalError::NotLoaded)?;
        let width = matrix.data.ncols();
        if index >= width {
            return Err(SignalError::IndexOutOfRange { index, len: width });
        }
        Ok((
            matrix.positions.clone(),
            matrix.data.column(index).to_vec(),
        ))
    }

    /// Runs `op` over every trace in parallel and swaps the results in only
    /// when all of them succeeded.
    fn broadcast<F>(&mut self, op: F) -> SignalResult<()>
    where
        F: Fn(&Trace) -> SignalResult<Vec<f64>> + Sync,
    {
        if self.traces.is_empty() {
            return Err(SignalError::NotLoaded);
        }
        let metrics = &self.metrics;
        let updated = self
            .traces
            .par_iter()
            .map(|trace| match op(trace) {
                Ok(samples) => {
                    metrics.record_processed();
                    Ok(trace.with_samples(samples))
                }
                Err(err) => {
                    metrics.record_error();
                    Err(err)
                }
            })
            .collect::<SignalResult<Vec<_>>>()?;
        self.traces = updated;
        self.matrix = None;
        Ok(())
    }

    fn stacked(traces: &[Trace], width: usize) -> Array2<f64> {
        let mut data = Array2::zeros((traces.len(), width));
        for (mut row, trace) in data.outer_iter_mut().zip(traces) {
            for (target, value) in row.iter_mut().zip(trace.samples()) {
                *target = *value;
            }
        }
        data
    }
}

impl Pipeline for ScanCollection {
    fn is_loaded(&self) -> bool {
        !self.traces.is_empty()
    }

    fn sample_rate(&self) -> SignalResult<f64> {
        self.sample_rate.ok_or(SignalError::NotLoaded)
    }

    fn apply_filter(&mut self, spec: &FilterSpec) -> SignalResult<()> {
        let plan = FilterPlan::prepare(spec, self.sample_rate()?, self.common_length()?)?;
        self.broadcast(|trace| plan.run(trace.samples()))?;
        self.logger
            .record(&format!("applied {spec} to {} traces", self.traces.len()));
        Ok(())
    }

    /// Each trace is scaled by its own peak.
    fn normalize(&mut self) -> SignalResult<()> {
        self.broadcast(|trace| Ok(filters::normalize(trace.samples())))
    }

    fn reset(&mut self) -> SignalResult<()> {
        if self.original.is_empty() {
            return Err(SignalError::NotLoaded);
        }
        self.traces = self.original.clone();
        self.matrix = None;
        self.metrics.reset();
        self.logger.record("reset to original traces");
        Ok(())
    }

    /// Writes `signals`, `original_signals`, `positions`, `time`, `fs`, and
    /// `bscan_data` when a matrix is cached. Traces are cut to the common length.
    fn save(&self, path: &Path) -> SignalResult<()> {
        let width = self.common_length()?;
        let record = ScanRecord {
            signals: Self::stacked(&self.traces, width),
            positions: Some(self.positions.clone()),
            sample_rate: Some(self.sample_rate()?),
            original_signals: Some(Self::stacked(&self.original, width)),
            time: Some(self.time_axis()?),
            bscan_data: self.matrix.as_ref().map(|m| m.data.clone()),
        };
        matfile::save(path, &record.to_arrays())
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// First decimal number embedded in a file name, e.g. `signal_12.5.txt` -> 12.5.
fn position_from_name(name: &str) -> Option<f64> {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let start = stem.find(|c: char| c.is_ascii_digit())?;
    let digits = &stem[start..];
    let mut end = 0;
    let mut seen_dot = false;
    for (idx, c) in digits.char_indices() {
        match c {
            '0'..='9' => end = idx + 1,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
    }
    digits[..end].parse().ok()
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if name.len() < first.len() + last.len() || !name.starts_with(first) || !name.ends_with(last)
    {
        return false;
    }
    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn burst(len: usize, amplitude: f64, fs: f64) -> Trace {
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * PI * 50.0 * i as f64 / fs).sin())
            .collect();
        Trace::new(samples, fs).unwrap()
    }

    fn collection(count: usize) -> ScanCollection {
        let mut scan = ScanCollection::new();
        let entries = (0..count)
            .map(|i| ((count - i) as f64, burst(100, 1.0 + i as f64, 1000.0)))
            .collect();
        scan.load(entries).unwrap();
        scan
    }

    #[test]
    fn load_sorts_by_position() {
        let scan = collection(4);
        assert_eq!(scan.positions(), &[1.0, 2.0, 3.0, 4.0]);
        // Largest amplitude was given the smallest position.
        let peak = crate::math::StatsHelper::max_abs(scan.trace_at(0).unwrap().samples());
        assert!(peak > 3.5);
    }

    #[test]
    fn load_rejects_empty_and_mixed_rates() {
        let mut scan = ScanCollection::new();
        assert!(matches!(scan.load(Vec::new()), Err(SignalError::Empty)));

        let entries = vec![(0.0, burst(10, 1.0, 100.0)), (1.0, burst(10, 1.0, 200.0))];
        assert!(matches!(
            scan.load(entries),
            Err(SignalError::InconsistentSampleRate { .. })
        ));
        assert!(!scan.is_loaded());
    }

    #[test]
    fn matrix_truncates_to_shortest_trace() {
        let mut scan = ScanCollection::new();
        let entries = (0..10)
            .map(|i| {
                let len = if i == 3 { 80 } else { 100 };
                (i as f64, burst(len, 1.0, 1000.0))
            })
            .collect();
        scan.load(entries).unwrap();
        let matrix = scan.build_matrix(MatrixOptions::default()).unwrap();
        assert_eq!(matrix.data.dim(), (10, 80));
        assert_eq!(matrix.time_axis.len(), 80);
        assert_eq!(matrix.truncated_from, Some(100));
        assert!(scan.notes().iter().any(|note| note.contains("truncated")));
    }

    #[test]
    fn matrix_rows_are_normalized_per_trace() {
        let mut scan = collection(3);
        let matrix = scan.build_matrix(MatrixOptions::default()).unwrap();
        for row in matrix.data.outer_iter() {
            let peak = row.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            assert!((peak - 1.0).abs() < 1e-12);
        }
        assert_eq!(matrix.truncated_from, None);
    }

    #[test]
    fn envelope_rows_are_non_negative() {
        let mut scan = collection(2);
        let options = MatrixOptions {
            normalize_each: false,
            envelope: true,
            envelope_method: EnvelopeMethod::Peak,
        };
        let matrix = scan.build_matrix(options).unwrap();
        assert!(matrix.data.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn filtering_invalidates_matrix() {
        let mut scan = collection(5);
        scan.build_matrix(MatrixOptions::default()).unwrap();
        scan.lowpass(100.0, 4).unwrap();
        assert!(scan.matrix().is_none());
        assert_eq!(scan.metrics().processed, 5);
        assert!(scan.traces().iter().all(|t| t.len() == 100));
    }

    #[test]
    fn invalid_filter_changes_nothing() {
        let mut scan = collection(3);
        let before = scan.traces().to_vec();
        scan.build_matrix(MatrixOptions::default()).unwrap();
        assert!(scan.median(101).is_err());
        assert_eq!(scan.traces(), before.as_slice());
        assert!(scan.matrix().is_some());
    }

    #[test]
    fn slices_check_bounds() {
        let mut scan = collection(4);
        let (time, row) = scan.slice_by_position(2).unwrap();
        assert_eq!((time.len(), row.len()), (100, 100));
        assert!(matches!(
            scan.slice_by_position(4),
            Err(SignalError::IndexOutOfRange { index: 4, len: 4 })
        ));

        let (positions, column) = scan.slice_by_time(10).unwrap();
        assert_eq!(positions, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(column.len(), 4);
        assert!(matches!(
            scan.slice_by_time(100),
            Err(SignalError::IndexOutOfRange { index: 100, len: 100 })
        ));
    }

    #[test]
    fn reset_restores_loaded_traces() {
        let mut scan = collection(3);
        let before = scan.traces().to_vec();
        scan.normalize().unwrap();
        scan.highpass(5.0, 2).unwrap();
        scan.reset().unwrap();
        assert_eq!(scan.traces(), before.as_slice());
    }

    #[test]
    fn folder_load_reads_positions_from_names() {
        let dir = tempfile::tempdir().unwrap();
        for pos in [20.0, 5.0, 12.5] {
            let trace = burst(50, 1.0, 1000.0);
            text::write_trace(&dir.path().join(format!("signal_{pos}.txt")), &trace).unwrap();
        }
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let mut scan = ScanCollection::new();
        scan.load_from_folder(dir.path(), Some("signal_*.txt"), None)
            .unwrap();
        assert_eq!(scan.positions(), &[5.0, 12.5, 20.0]);
        assert!((scan.sample_rate().unwrap() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn container_round_trip_keeps_order_and_originals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.mat");
        let mut scan = collection(4);
        scan.normalize().unwrap();
        scan.build_matrix(MatrixOptions::default()).unwrap();
        scan.save(&path).unwrap();

        let mut reloaded = ScanCollection::new();
        reloaded.load_from_mat(&path).unwrap();
        assert_eq!(reloaded.positions(), scan.positions());
        assert_eq!(reloaded.traces(), scan.traces());
        reloaded.reset().unwrap();
        scan.reset().unwrap();
        assert_eq!(reloaded.traces(), scan.traces());
    }

    #[test]
    fn container_positions_reorder_originals_with_their_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unsorted.mat");
        let signals = ndarray::array![[3.0, 3.0, 3.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        let mut arrays = crate::io::NamedArrays::new();
        arrays.insert("signals".into(), signals.clone().into_dyn());
        arrays.insert("original_signals".into(), (signals * 100.0).into_dyn());
        arrays.insert(
            "positions".into(),
            ndarray::Array1::from(vec![30.0, 10.0, 20.0]).into_dyn(),
        );
        arrays.insert("fs".into(), ndarray::arr0(8.0).into_dyn());
        matfile::save(&path, &arrays).unwrap();

        let mut scan = ScanCollection::new();
        scan.load_from_mat(&path).unwrap();
        assert_eq!(scan.positions(), &[10.0, 20.0, 30.0]);
        let firsts = |scan: &ScanCollection| -> Vec<f64> {
            scan.traces().iter().map(|t| t.samples()[0]).collect()
        };
        assert_eq!(firsts(&scan), vec![1.0, 2.0, 3.0]);

        scan.reset().unwrap();
        assert_eq!(firsts(&scan), vec![100.0, 200.0, 300.0]);
        assert_eq!(scan.positions(), &[10.0, 20.0, 30.0]);
    }

    #[test]
    fn position_parsing() {
        assert_eq!(position_from_name("signal_12.5.txt"), Some(12.5));
        assert_eq!(position_from_name("pos-3_a.txt"), Some(3.0));
        assert_eq!(position_from_name("scan-10.txt"), Some(10.0));
        assert_eq!(position_from_name("x7y8.txt"), Some(7.0));
        assert_eq!(position_from_name("trace.txt"), None);
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("signal_*.txt", "signal_10.txt"));
        assert!(wildcard_match("*", "anything.txt"));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("signal_*.txt", "bscan.txt"));
        assert!(!wildcard_match("ab*ba", "aba"));
    }
}
