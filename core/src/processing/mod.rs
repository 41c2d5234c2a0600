//! The three processing modes: one trace, a position-indexed scan, and a
//! gridded wavefield.

pub mod grid;
pub mod scan;
pub mod single;
pub mod wavefield;

pub use grid::infer_grid;
pub use scan::{MatrixOptions, ScanCollection, ScanMatrix};
pub use single::SingleTracePipeline;
pub use wavefield::{WavefieldPipeline, DEFAULT_ARRIVAL_THRESHOLD, WAVE_DATA_KEY};
