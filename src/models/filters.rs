use chrono::{NaiveDate, NaiveDateTime};

/// Inclusive creation-time window for dashboard and export queries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub after: Option<NaiveDateTime>,
    pub before: Option<NaiveDateTime>,
}

impl DateRange {
    pub fn new(after: Option<NaiveDateTime>, before: Option<NaiveDateTime>) -> Self {
        Self { after, before }
    }

    /// Parse a boundary from RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`.
    ///
    /// A bare date used as the upper bound covers the whole day.
    pub fn parse_bound(value: &str, upper: bool) -> Option<NaiveDateTime> {
        let value = value.trim();
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
            return Some(dt.naive_utc());
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Some(dt);
            }
        }
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
        if upper {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_date_as_day_bounds() {
        let lower = DateRange::parse_bound("2025-03-01", false).unwrap();
        let upper = DateRange::parse_bound("2025-03-01", true).unwrap();
        assert_eq!(lower.to_string(), "2025-03-01 00:00:00");
        assert_eq!(upper.to_string(), "2025-03-01 23:59:59");
    }

    #[test]
    fn parses_rfc3339_into_utc() {
        let dt = DateRange::parse_bound("2025-03-01T12:00:00+03:00", false).unwrap();
        assert_eq!(dt.to_string(), "2025-03-01 09:00:00");
    }

    #[test]
    fn parses_naive_iso_datetime() {
        let dt = DateRange::parse_bound("2025-03-01T08:30:00", false).unwrap();
        assert_eq!(dt.to_string(), "2025-03-01 08:30:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(DateRange::parse_bound("yesterday", false).is_none());
    }
}
