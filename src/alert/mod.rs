/// Data-quality checks layered over resolved readings.

pub mod staleness;
