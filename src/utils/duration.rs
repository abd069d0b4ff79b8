use chrono::Duration;

/// 解析时长字符串，如 `10s`、`5m`、`1.5h`、`2d`（大小写不敏感，忽略首尾空白）
///
/// The leading run of digits / `.` is the magnitude and everything after it is
/// the unit, so compound input such as `1h30m` is rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let normalized = input.trim().to_ascii_lowercase();
    let split = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(normalized.len());
    let (magnitude, unit) = normalized.split_at(split);
    if magnitude.is_empty() || unit.is_empty() {
        return None;
    }

    let value: f64 = magnitude.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let unit_secs = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3_600.0,
        "d" => 86_400.0,
        _ => return None,
    };

    let micros = (value * unit_secs * 1_000_000.0).round();
    if micros >= i64::MAX as f64 {
        return None;
    }
    Some(Duration::microseconds(micros as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10s"), Some(Duration::seconds(10)));
        assert_eq!(parse_duration("5m"), Some(Duration::minutes(5)));
        assert_eq!(parse_duration("1h"), Some(Duration::hours(1)));
        assert_eq!(parse_duration("2d"), Some(Duration::days(2)));
    }

    #[test]
    fn test_parse_duration_decimal_case_and_whitespace() {
        assert_eq!(parse_duration("1.5h"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("  30M "), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("0.5S"), Some(Duration::milliseconds(500)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration("bogus"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10w"), None);
        assert_eq!(parse_duration("1h30m"), None);
        assert_eq!(parse_duration("10 s"), None);
        assert_eq!(parse_duration("1.2.3m"), None);
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("-5m"), None);
        assert_eq!(parse_duration("."), None);
    }
}
