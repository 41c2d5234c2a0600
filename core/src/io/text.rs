//! Delimited-text trace files.
//!
//! Two layouts are recognised. In the single-column layout every data line is
//! one sample; the sample rate comes from a `sampling rate: <hz>` / `fs: <hz>`
//! header line when present, else from the caller, else
//! [`DEFAULT_SAMPLE_RATE`]. In the two-column layout a header precedes rows of
//! `time amplitude` (whitespace, tab, comma or semicolon separated) and the
//! sample rate is `1 / (t[1] - t[0])`.

use crate::prelude::{SignalError, SignalResult};
use crate::trace::Trace;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Sample rate assumed when a single-column file encodes none.
pub const DEFAULT_SAMPLE_RATE: f64 = 1_000_000.0;

const HEADER_SCAN_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLayout {
    SingleColumn,
    TimeAmplitude,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextTrace {
    pub samples: Vec<f64>,
    pub sample_rate: f64,
    pub time: Option<Vec<f64>>,
    pub layout: TextLayout,
}

impl TextTrace {
    pub fn into_trace(self) -> SignalResult<Trace> {
        Trace::new(self.samples, self.sample_rate)
    }
}

pub fn read_trace(path: &Path, default_rate: Option<f64>) -> SignalResult<TextTrace> {
    let contents =
        fs::read_to_string(path).map_err(|err| SignalError::io(path, "reading", err))?;
    parse_trace(&contents, default_rate).map_err(|message| SignalError::io(path, "parsing", message))
}

/// Writes the two-column layout so the sample rate survives a round trip.
pub fn write_trace(path: &Path, trace: &Trace) -> SignalResult<()> {
    let mut out = String::from("time\tamplitude\n");
    for (t, value) in trace.time_axis().iter().zip(trace.samples()) {
        let _ = writeln!(out, "{t:e}\t{value:e}");
    }
    fs::write(path, out).map_err(|err| SignalError::io(path, "writing", err))
}

pub fn parse_trace(contents: &str, default_rate: Option<f64>) -> Result<TextTrace, String> {
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    let first = lines.first().ok_or("file holds no data lines")?;
    let header_rate = header_sample_rate(&lines);
    let fallback_rate = header_rate.or(default_rate).unwrap_or(DEFAULT_SAMPLE_RATE);

    if first.parse::<f64>().is_ok() {
        let samples = single_column_block(&lines);
        return Ok(TextTrace {
            samples,
            sample_rate: fallback_rate,
            time: None,
            layout: TextLayout::SingleColumn,
        });
    }

    let block_start = lines.iter().position(|line| parse_row(line).is_some());
    let Some(start) = block_start else {
        // Header followed by a single column of samples.
        let start = lines
            .iter()
            .position(|line| line.parse::<f64>().is_ok())
            .ok_or("no numeric samples found")?;
        return Ok(TextTrace {
            samples: single_column_block(&lines[start..]),
            sample_rate: fallback_rate,
            time: None,
            layout: TextLayout::SingleColumn,
        });
    };

    let (time, samples): (Vec<f64>, Vec<f64>) = lines[start..]
        .iter()
        .map_while(|line| parse_row(line))
        .unzip();
    let sample_rate = match time.as_slice() {
        [t0, t1, ..] => {
            let dt = t1 - t0;
            if !(dt.is_finite() && dt > 0.0) {
                return Err(format!("time column must increase, got step {dt}"));
            }
            1.0 / dt
        }
        _ => fallback_rate,
    };
    Ok(TextTrace {
        samples,
        sample_rate,
        time: Some(time),
        layout: TextLayout::TimeAmplitude,
    })
}

fn single_column_block(lines: &[&str]) -> Vec<f64> {
    lines
        .iter()
        .map_while(|line| line.parse::<f64>().ok())
        .collect()
}

fn parse_row(line: &str) -> Option<(f64, f64)> {
    let mut fields = line
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|field| !field.is_empty());
    let time = fields.next()?.parse().ok()?;
    let value = fields.next()?.parse().ok()?;
    match fields.next() {
        None => Some((time, value)),
        Some(_) => None,
    }
}

fn header_sample_rate(lines: &[&str]) -> Option<f64> {
    lines.iter().take(HEADER_SCAN_LINES).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        if key.contains("sampling rate") || key == "fs" || key.contains("sample rate") {
            value
                .trim()
                .trim_end_matches(|c: char| c.is_alphabetic())
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|rate| rate.is_finite() && *rate > 0.0)
        } else {
            None
        }
    })
}
