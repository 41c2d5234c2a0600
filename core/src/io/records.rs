//! Typed views over container contents, with required and optional fields
//! checked when the container is read.

use super::matfile::{as_scalar, as_vector, NamedArrays};
use crate::prelude::{SignalError, SignalResult};
use ndarray::{arr0, Array1, Array2, ArrayD, Ix2};

fn required<'a>(arrays: &'a NamedArrays, key: &str) -> SignalResult<&'a ArrayD<f64>> {
    arrays
        .get(key)
        .ok_or_else(|| SignalError::MissingField(key.to_string()))
}

fn optional_vector(arrays: &NamedArrays, key: &str) -> SignalResult<Option<Vec<f64>>> {
    arrays.get(key).map(|a| as_vector(key, a)).transpose()
}

fn optional_scalar(arrays: &NamedArrays, key: &str) -> SignalResult<Option<f64>> {
    arrays.get(key).map(|a| as_scalar(key, a)).transpose()
}

fn as_matrix(key: &str, array: &ArrayD<f64>) -> SignalResult<Array2<f64>> {
    array
        .clone()
        .into_dimensionality::<Ix2>()
        .map_err(|_| {
            SignalError::InvalidShape(format!(
                "'{key}' must be two-dimensional, got shape {:?}",
                array.shape()
            ))
        })
}

fn optional_matrix(arrays: &NamedArrays, key: &str) -> SignalResult<Option<Array2<f64>>> {
    arrays.get(key).map(|a| as_matrix(key, a)).transpose()
}

fn vector(values: &[f64]) -> ArrayD<f64> {
    Array1::from(values.to_vec()).into_dyn()
}

fn scalar(value: f64) -> ArrayD<f64> {
    arr0(value).into_dyn()
}

/// Single-trace container: `signal` and `fs` required; `original_signal`,
/// `time` and `envelope` optional.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTraceRecord {
    pub signal: Vec<f64>,
    pub sample_rate: f64,
    pub original_signal: Option<Vec<f64>>,
    pub time: Option<Vec<f64>>,
    pub envelope: Option<Vec<f64>>,
}

impl SingleTraceRecord {
    pub fn from_arrays(arrays: &NamedArrays) -> SignalResult<Self> {
        Ok(Self {
            signal: as_vector("signal", required(arrays, "signal")?)?,
            sample_rate: as_scalar("fs", required(arrays, "fs")?)?,
            original_signal: optional_vector(arrays, "original_signal")?,
            time: optional_vector(arrays, "time")?,
            envelope: optional_vector(arrays, "envelope")?,
        })
    }

    pub fn to_arrays(&self) -> NamedArrays {
        let mut arrays = NamedArrays::new();
        arrays.insert("signal".into(), vector(&self.signal));
        arrays.insert("fs".into(), scalar(self.sample_rate));
        if let Some(original) = &self.original_signal {
            arrays.insert("original_signal".into(), vector(original));
        }
        if let Some(time) = &self.time {
            arrays.insert("time".into(), vector(time));
        }
        if let Some(envelope) = &self.envelope {
            arrays.insert("envelope".into(), vector(envelope));
        }
        arrays
    }
}

/// Scan-collection container: `signals` (traces as rows) required; the rest
/// optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub signals: Array2<f64>,
    pub positions: Option<Vec<f64>>,
    pub sample_rate: Option<f64>,
    pub original_signals: Option<Array2<f64>>,
    pub time: Option<Vec<f64>>,
    pub bscan_data: Option<Array2<f64>>,
}

impl ScanRecord {
    pub fn from_arrays(arrays: &NamedArrays) -> SignalResult<Self> {
        let signals = as_matrix("signals", required(arrays, "signals")?)?;
        let positions = optional_vector(arrays, "positions")?;
        if let Some(positions) = &positions {
            if positions.len() != signals.nrows() {
                return Err(SignalError::InvalidShape(format!(
                    "{} positions for {} signals",
                    positions.len(),
                    signals.nrows()
                )));
            }
        }
        let original_signals = optional_matrix(arrays, "original_signals")?;
        if let Some(original) = &original_signals {
            if original.dim() != signals.dim() {
                return Err(SignalError::InvalidShape(format!(
                    "original_signals shape {:?} differs from signals shape {:?}",
                    original.dim(),
                    signals.dim()
                )));
            }
        }
        Ok(Self {
            signals,
            positions,
            sample_rate: optional_scalar(arrays, "fs")?,
            original_signals,
            time: optional_vector(arrays, "time")?,
            bscan_data: optional_matrix(arrays, "bscan_data")?,
        })
    }

    pub fn to_arrays(&self) -> NamedArrays {
        let mut arrays = NamedArrays::new();
        arrays.insert("signals".into(), self.signals.clone().into_dyn());
        if let Some(positions) = &self.positions {
            arrays.insert("positions".into(), vector(positions));
        }
        if let Some(rate) = self.sample_rate {
            arrays.insert("fs".into(), scalar(rate));
        }
        if let Some(original) = &self.original_signals {
            arrays.insert("original_signals".into(), original.clone().into_dyn());
        }
        if let Some(time) = &self.time {
            arrays.insert("time".into(), vector(time));
        }
        if let Some(bscan) = &self.bscan_data {
            arrays.insert("bscan_data".into(), bscan.clone().into_dyn());
        }
        arrays
    }
}

/// Wavefield container: the data array under a caller-chosen key is required;
/// the unprocessed copy, sample rate and grid spacing are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct WavefieldRecord {
    pub data: ArrayD<f64>,
    pub original_data: Option<ArrayD<f64>>,
    pub sample_rate: Option<f64>,
    pub dx: Option<f64>,
    pub dy: Option<f64>,
}

impl WavefieldRecord {
    pub fn from_arrays(arrays: &NamedArrays, data_key: &str, fs_key: &str) -> SignalResult<Self> {
        Ok(Self {
            data: required(arrays, data_key)?.clone(),
            original_data: arrays.get("original_wave_data").cloned(),
            sample_rate: optional_scalar(arrays, fs_key)?,
            dx: optional_scalar(arrays, "dx")?,
            dy: optional_scalar(arrays, "dy")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_record_requires_signal_and_rate() {
        let mut arrays = NamedArrays::new();
        arrays.insert("signal".into(), vector(&[1.0, 2.0]));
        let err = SingleTraceRecord::from_arrays(&arrays).unwrap_err();
        assert!(matches!(err, SignalError::MissingField(ref key) if key == "fs"));

        arrays.insert("fs".into(), scalar(10.0));
        let record = SingleTraceRecord::from_arrays(&arrays).unwrap();
        assert_eq!(record.signal, vec![1.0, 2.0]);
        assert!(record.original_signal.is_none());
    }

    #[test]
    fn single_record_round_trips_optional_fields() {
        let record = SingleTraceRecord {
            signal: vec![0.5, 0.25],
            sample_rate: 4.0,
            original_signal: Some(vec![1.0, 0.5]),
            time: Some(vec![0.0, 0.25]),
            envelope: None,
        };
        assert_eq!(SingleTraceRecord::from_arrays(&record.to_arrays()).unwrap(), record);
    }

    #[test]
    fn scan_record_checks_position_count() {
        let mut arrays = NamedArrays::new();
        arrays.insert("signals".into(), Array2::<f64>::zeros((3, 4)).into_dyn());
        arrays.insert("positions".into(), vector(&[0.0, 1.0]));
        assert!(matches!(
            ScanRecord::from_arrays(&arrays),
            Err(SignalError::InvalidShape(_))
        ));
    }

    #[test]
    fn scan_record_rejects_vector_signals() {
        let mut arrays = NamedArrays::new();
        arrays.insert("signals".into(), Array1::<f64>::zeros(4).into_dyn());
        assert!(ScanRecord::from_arrays(&arrays).is_err());
    }

    #[test]
    fn wavefield_record_uses_custom_keys() {
        let mut arrays = NamedArrays::new();
        arrays.insert("volume".into(), ArrayD::zeros(vec![2, 2, 3]));
        arrays.insert("rate".into(), scalar(50.0));
        let record = WavefieldRecord::from_arrays(&arrays, "volume", "rate").unwrap();
        assert_eq!(record.sample_rate, Some(50.0));
        assert_eq!(record.dx, None);
        assert!(WavefieldRecord::from_arrays(&arrays, "wave_data", "fs").is_err());
    }
}
