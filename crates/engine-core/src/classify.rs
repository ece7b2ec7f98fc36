use std::error::Error;

/// Message fragments that signal systemic unavailability rather than a
/// problem with one record. Matched case-insensitively.
pub const CRITICAL_MARKERS: [&str; 5] = [
    "connection refused",
    "no such host",
    "failed to lookup address",
    "connection reset",
    "database error",
];

/// Classifies an error as critical (halt the whole run) or recoverable.
///
/// Every message in the `source()` chain is inspected, so a critical cause
/// wrapped in a generic error is still recognised.
pub fn is_critical(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if is_critical_message(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}

pub fn is_critical_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CRITICAL_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
