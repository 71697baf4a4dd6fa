/// Overall watershed risk from per-source classifications.

use crate::model::RiskLevel;

/// Combines per-source levels into one.
///
/// `Unknown` entries are ignored. The most severe remaining level wins;
/// with nothing remaining (empty input, or every source unknown) the result
/// is `Unknown`.
pub fn aggregate(levels: &[RiskLevel]) -> RiskLevel {
    levels
        .iter()
        .copied()
        .filter(|level| *level != RiskLevel::Unknown)
        .max()
        .unwrap_or(RiskLevel::Unknown)
}
