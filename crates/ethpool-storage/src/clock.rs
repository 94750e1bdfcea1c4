//! Wall-clock helpers.
//!
//! Timestamps are UNIX seconds everywhere except hashrate stream members,
//! which carry milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Seconds since the UNIX epoch.
pub fn now_sec() -> i64 {
    now_ms() / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_resolution_matches_ms() {
        let ms = now_ms();
        let sec = now_sec();
        assert!((ms / 1000 - sec).abs() <= 1);
    }
}
