/// Indices of local maxima.
///
/// A sample is a peak when its left neighbour is strictly smaller and the
/// first differing sample to its right is strictly smaller. Flat tops report
/// their middle index (rounded down). The first and last samples are never
/// peaks.
pub fn find_local_maxima(samples: &[f64]) -> Vec<usize> {
    let n = samples.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    while i < n - 1 {
        if samples[i - 1] < samples[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && samples[ahead] == samples[i] {
                ahead += 1;
            }
            if samples[ahead] < samples[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}
