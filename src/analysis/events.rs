/// Next predicted tide extremum after a given instant.

use crate::hst::{format_hst_clock, HstDateTime};
use crate::model::TideEvent;

/// Returns the earliest event strictly after `after`, or `None`.
///
/// Ties on timestamp go to the first event encountered.
pub fn find_next(events: &[TideEvent], after: HstDateTime) -> Option<TideEvent> {
    events
        .iter()
        .filter(|e| e.timestamp > after && e.height_ft.is_finite())
        .fold(None::<&TideEvent>, |best, e| match best {
            Some(b) if b.timestamp <= e.timestamp => Some(b),
            _ => Some(e),
        })
        .cloned()
}

/// Display text for a tide event, e.g. `"High, 3:45 PM HST"`.
pub fn describe(event: &TideEvent) -> String {
    format!("{}, {}", event.kind, format_hst_clock(&event.timestamp))
}
