use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Milliseconds since the Unix epoch for an RFC 3339 timestamp.
pub fn parse_rfc3339_ms(s: &str) -> Option<u64> {
    let dt = OffsetDateTime::parse(s.trim(), &Rfc3339).ok()?;
    u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok()
}

/// Like [`parse_rfc3339_ms`], falling back to `now_ms` when the value is
/// missing or malformed.
pub fn start_ms_or(raw: Option<&str>, now_ms: u64) -> u64 {
    raw.and_then(parse_rfc3339_ms).unwrap_or(now_ms)
}

pub fn now_ms() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
}

/// Compact age label such as `42s`, `5m`, `3h`.
pub fn format_age(since_ms: u64, now_ms: u64) -> String {
    let secs = now_ms.saturating_sub(since_ms) / 1000;
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        _ => format!("{}h", secs / 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_and_offsets() {
        assert_eq!(parse_rfc3339_ms("1970-01-01T00:00:01Z"), Some(1000));
        assert_eq!(
            parse_rfc3339_ms("1970-01-01T01:00:00.250+01:00"),
            Some(250)
        );
    }

    #[test]
    fn malformed_or_missing_falls_back() {
        assert_eq!(start_ms_or(Some("yesterday"), 77), 77);
        assert_eq!(start_ms_or(None, 77), 77);
        assert_eq!(start_ms_or(Some("1970-01-01T00:00:02Z"), 77), 2000);
    }

    #[test]
    fn age_labels() {
        assert_eq!(format_age(0, 5_000), "5s");
        assert_eq!(format_age(0, 120_000), "2m");
        assert_eq!(format_age(0, 7_200_000), "2h");
        assert_eq!(format_age(10_000, 5_000), "0s");
    }
}
