use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse.
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let scratch = vec![Complex64::zero(); scratch_len];
        Self {
            forward,
            inverse,
            scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward transform of a real sequence, zero-padded or truncated to the plan size.
    pub fn forward(&mut self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.len())
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.len(), Complex64::zero());
        self.forward
            .process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// In-place inverse transform, scaled by `1/N`.
    pub fn inverse(&mut self, spectrum: &mut [Complex64]) {
        self.inverse.process_with_scratch(spectrum, &mut self.scratch);
        let scale = 1.0 / self.len() as f64;
        for value in spectrum.iter_mut() {
            *value *= scale;
        }
    }
}
