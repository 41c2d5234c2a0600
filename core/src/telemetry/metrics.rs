use std::sync::Mutex;

/// Trace counters shared by the workers of one batch operation.
#[derive(Debug)]
pub struct BatchMetrics {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub processed: usize,
    pub errors: usize,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processed += 1;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics = Metrics::default();
        }
    }
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn counts_across_worker_threads() {
        let metrics = BatchMetrics::new();
        (0..100).into_par_iter().for_each(|i| {
            if i % 10 == 0 {
                metrics.record_error();
            } else {
                metrics.record_processed();
            }
        });
        assert_eq!(
            metrics.snapshot(),
            Metrics {
                processed: 90,
                errors: 10
            }
        );
        metrics.reset();
        assert_eq!(metrics.snapshot(), Metrics::default());
    }
}
