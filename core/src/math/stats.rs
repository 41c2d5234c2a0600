pub struct StatsHelper;

impl StatsHelper {
    /// Largest absolute value, ignoring NaN. Zero for an empty or all-NaN input.
    pub fn max_abs(samples: &[f64]) -> f64 {
        samples
            .iter()
            .filter(|v| !v.is_nan())
            .fold(0.0_f64, |acc, &v| acc.max(v.abs()))
    }

    /// Sum of squared samples.
    pub fn energy(samples: &[f64]) -> f64 {
        samples.iter().map(|&v| v * v).sum()
    }

    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        (Self::energy(samples) / samples.len() as f64).sqrt()
    }

    /// Signal-to-noise ratio in dB from mean powers.
    pub fn snr_db(signal: &[f64], noise: &[f64]) -> f64 {
        let signal_power = Self::mean_power(signal);
        let noise_power = Self::mean_power(noise);
        10.0 * (signal_power / noise_power).log10()
    }

    fn mean_power(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        Self::energy(samples) / samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[4.0]), 4.0);
    }

    #[test]
    fn max_abs_skips_nan() {
        assert_eq!(StatsHelper::max_abs(&[1.0, f64::NAN, -3.0]), 3.0);
        assert_eq!(StatsHelper::max_abs(&[f64::NAN]), 0.0);
    }

    #[test]
    fn snr_of_tenfold_amplitude_is_twenty_db() {
        let snr = StatsHelper::snr_db(&[10.0, -10.0], &[1.0, -1.0]);
        assert!((snr - 20.0).abs() < 1e-12);
    }
}
