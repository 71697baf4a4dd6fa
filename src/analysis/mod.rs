/// Pure analysis over parsed series: no I/O, no clock reads.
///
/// Submodules:
/// - `resolver`  — current value, direction and risk for one time series.
/// - `aggregate` — folds per-source risk into one overall level.
/// - `events`    — finds the next predicted tide high/low after a moment.

pub mod aggregate;
pub mod events;
pub mod resolver;
