//! Timestamp utilities

use chrono::{DateTime, NaiveDateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current Unix time in whole seconds
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Format a stored timestamp as a calendar date (`YYYY-MM-DD`)
///
/// Accepts both RFC 3339 strings and SQLite's `CURRENT_TIMESTAMP` layout.
/// Unparseable input is returned unchanged.
pub fn format_date(stored: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(stored) {
        return dt.format("%Y-%m-%d").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(stored, "%Y-%m-%d %H:%M:%S") {
        return dt.format("%Y-%m-%d").to_string();
    }
    stored.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_now_secs_matches_now() {
        let a = now_secs();
        let b = now().timestamp();
        assert!((b - a).abs() <= 1);
    }

    #[test]
    fn test_format_date_rfc3339() {
        assert_eq!(format_date("2024-03-09T17:45:00+00:00"), "2024-03-09");
    }

    #[test]
    fn test_format_date_sqlite_layout() {
        assert_eq!(format_date("2023-12-31 23:59:59"), "2023-12-31");
    }

    #[test]
    fn test_format_date_passthrough() {
        assert_eq!(format_date("yesterday"), "yesterday");
    }
}
