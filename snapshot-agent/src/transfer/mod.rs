//! Transfer accounting.

pub mod progress;

pub use progress::{percent_of, ProgressTally};
