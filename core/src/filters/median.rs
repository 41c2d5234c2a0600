use crate::prelude::{SignalError, SignalResult};

/// Sliding-window median. The window is centred on each sample and positions
/// beyond either end read as zero, so the output length equals the input length.
pub fn median_filter(samples: &[f64], kernel_size: usize) -> SignalResult<Vec<f64>> {
    validate_kernel(kernel_size, samples.len())?;
    let half = kernel_size / 2;
    let n = samples.len();
    let mut window = Vec::with_capacity(kernel_size);

    let output = (0..n)
        .map(|center| {
            window.clear();
            for offset in 0..kernel_size {
                let value = (center + offset)
                    .checked_sub(half)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                window.push(value);
            }
            window.sort_by(f64::total_cmp);
            window[half]
        })
        .collect();
    Ok(output)
}

pub(crate) fn validate_kernel(kernel_size: usize, len: usize) -> SignalResult<()> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(SignalError::invalid(format!(
            "median kernel size must be odd and positive, got {kernel_size}"
        )));
    }
    if kernel_size > len {
        return Err(SignalError::invalid(format!(
            "median kernel size {kernel_size} exceeds signal length {len}"
        )));
    }
    Ok(())
}
