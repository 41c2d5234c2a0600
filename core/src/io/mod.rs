//! External interfaces: delimited-text traces and the named-array container.

pub mod matfile;
pub mod records;
pub mod text;

pub use matfile::NamedArrays;
pub use records::{ScanRecord, SingleTraceRecord, WavefieldRecord};
pub use text::{read_trace, write_trace, TextLayout, TextTrace, DEFAULT_SAMPLE_RATE};
