//! Timestamp encoding.
//!
//! Every persisted instant is RFC 3339 in UTC with millisecond precision and
//! a `Z` suffix (`2024-05-01T12:00:00.000Z`). The fixed width keeps string
//! comparison in SQL consistent with chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format an instant in the persisted encoding.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current instant in the persisted encoding.
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Parse any RFC 3339 string into a UTC instant.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_fixed_width_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn parse_accepts_offsets() {
        let parsed = parse_timestamp("2024-05-01T14:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn string_order_matches_time_order() {
        let a = format_timestamp(&Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let b = format_timestamp(
            &(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + chrono::Duration::milliseconds(500)),
        );
        assert!(a < b);
    }
}
