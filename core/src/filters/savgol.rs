//! Savitzky-Golay polynomial smoothing.
//!
//! A polynomial of degree `polyorder` is least-squares fitted over a sliding
//! window of `window_length` samples. Interior samples take the fitted value at
//! the window centre; the first and last half-windows take the values of the
//! polynomial fitted to the first and last full window.

use crate::math::MatrixHelper;
use crate::prelude::{SignalError, SignalResult};
use ndarray::{Array2, ArrayView1};

/// Precomputed projection weights for one (window, order) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SavgolKernel {
    window_length: usize,
    /// Hat matrix `J (JᵀJ)⁻¹ Jᵀ`; row `r` gives the fitted value at window position `r`.
    projection: Array2<f64>,
}

impl SavgolKernel {
    pub fn new(window_length: usize, polyorder: usize) -> SignalResult<Self> {
        if window_length == 0 || window_length % 2 == 0 {
            return Err(SignalError::invalid(format!(
                "savitzky-golay window must be odd and positive, got {window_length}"
            )));
        }
        if polyorder >= window_length {
            return Err(SignalError::invalid(format!(
                "polyorder {polyorder} must be less than window length {window_length}"
            )));
        }

        let half = (window_length / 2) as f64;
        let scale = if half > 0.0 { half } else { 1.0 };
        let vandermonde = Array2::from_shape_fn((window_length, polyorder + 1), |(row, power)| {
            ((row as f64 - half) / scale).powi(power as i32)
        });
        let normal = MatrixHelper::multiply(vandermonde.t(), vandermonde.view());
        let inverse = MatrixHelper::invert(normal.view()).ok_or_else(|| {
            SignalError::invalid(format!(
                "savitzky-golay system is singular for window {window_length}, order {polyorder}"
            ))
        })?;
        let projection = MatrixHelper::multiply(
            MatrixHelper::multiply(vandermonde.view(), inverse.view()).view(),
            vandermonde.t(),
        );

        Ok(Self {
            window_length,
            projection,
        })
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn smooth(&self, samples: &[f64]) -> SignalResult<Vec<f64>> {
        let n = samples.len();
        let w = self.window_length;
        if w > n {
            return Err(SignalError::invalid(format!(
                "savitzky-golay window {w} exceeds signal length {n}"
            )));
        }
        let half = w / 2;
        let centre = self.projection.row(half);
        let mut output = vec![0.0; n];

        for (idx, slot) in output.iter_mut().enumerate().take(n - half).skip(half) {
            *slot = centre.dot(&ArrayView1::from(&samples[idx - half..=idx + half]));
        }

        let head = ArrayView1::from(&samples[..w]);
        for (row, slot) in output.iter_mut().enumerate().take(half) {
            *slot = self.projection.row(row).dot(&head);
        }

        let tail = ArrayView1::from(&samples[n - w..]);
        for row in (half + 1)..w {
            output[n - w + row] = self.projection.row(row).dot(&tail);
        }

        Ok(output)
    }
}

pub fn savgol_filter(
    samples: &[f64],
    window_length: usize,
    polyorder: usize,
) -> SignalResult<Vec<f64>> {
    SavgolKernel::new(window_length, polyorder)?.smooth(samples)
}
