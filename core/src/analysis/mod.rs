//! Spectral Analyzer and Envelope Extractor.

pub mod envelope;
pub mod peaks;
pub mod spectrum;

pub use envelope::{analytic_signal, compute_envelope, hilbert_envelope, peak_envelope};
pub use peaks::find_local_maxima;
pub use spectrum::{compute_fft, compute_stft, Spectrogram, Spectrum, DEFAULT_STFT_WINDOW};
