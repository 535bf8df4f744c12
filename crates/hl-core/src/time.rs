//! Time utilities for hpc-link
//!
//! Provides common time-related operations used across crates.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// # Panics
/// Panics if the system time is before the Unix epoch (1970-01-01),
/// which would indicate a severely misconfigured system.
///
/// # Examples
/// ```
/// use hl_core::time::current_time_millis;
///
/// let now = current_time_millis();
/// assert!(now > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as u64
}

/// Format a millisecond timestamp as a UTC wall-clock label (`HH:MM:SS`).
pub fn clock_label(millis: u64) -> String {
    let secs_of_day = (millis / 1000) % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_millis_is_positive() {
        let now = current_time_millis();
        assert!(now > 0);
    }

    #[test]
    fn test_clock_label() {
        assert_eq!(clock_label(0), "00:00:00");
        // 1970-01-02 13:05:09.250 UTC
        let millis = ((24 * 3600 + 13 * 3600 + 5 * 60 + 9) * 1000 + 250) as u64;
        assert_eq!(clock_label(millis), "13:05:09");
    }
}
