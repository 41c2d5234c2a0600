//! Core signal processing for ultrasonic scan data.
//!
//! Filters, spectra and envelopes operate on single traces; the processing
//! module lifts them over one trace, a position-indexed scan collection, or a
//! gridded (x, y, time) wavefield, each keeping its original data for reset.

pub mod analysis;
pub mod filters;
pub mod io;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;
pub mod trace;

pub use prelude::{EnvelopeMethod, FilterSpec, Pipeline, SignalError, SignalResult};
pub use processing::{MatrixOptions, ScanCollection, SingleTracePipeline, WavefieldPipeline};
pub use trace::Trace;
