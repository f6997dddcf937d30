//! Human-readable durations.
//!
//! Accepted forms are a single number with an optional unit: `10t`
//! (ticks of 50 ms), `500ms`, `5s`, `2m`, `1h`. A bare number is read as
//! milliseconds.

use std::time::Duration;

/// Milliseconds per tick (20 ticks per second).
pub const MILLIS_PER_TICK: u64 = 50;

/// Failure to parse a duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("duration must not be empty")]
    Empty,

    #[error("invalid duration '{0}', expected <number>[t|ms|s|m|h]")]
    Invalid(String),
}

/// Parse a duration string such as `"5s"` or `"500"`.
///
/// # Errors
///
/// Returns [`DurationError`] when the input is blank, has no leading
/// digits, uses an unknown unit or overflows.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }

    let invalid = || DurationError::Invalid(input.to_string());
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let millis = match unit.to_ascii_lowercase().as_str() {
        "" | "ms" => Some(value),
        "t" => value.checked_mul(MILLIS_PER_TICK),
        "s" => value.checked_mul(1_000),
        "m" => value.checked_mul(60_000),
        "h" => value.checked_mul(3_600_000),
        _ => None,
    }
    .ok_or_else(invalid)?;

    Ok(Duration::from_millis(millis))
}

/// Parse an optional duration string, falling back to `default` when the
/// input is absent, blank or invalid.
#[must_use]
pub fn parse_duration_or(input: Option<&str>, default: Duration) -> Duration {
    input
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| parse_duration(s).ok())
        .unwrap_or(default)
}

/// Render a duration for logs and context variables: `45s`, `2m 5s`, `1h 30m`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_every_supported_unit() {
        assert_eq!(parse_duration("10t"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3_600)));
    }

    #[test]
    fn should_read_bare_number_as_milliseconds() {
        assert_eq!(parse_duration("250"), Ok(Duration::from_millis(250)));
    }

    #[test]
    fn should_ignore_case_and_surrounding_whitespace() {
        assert_eq!(parse_duration("  3S "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2MS"), Ok(Duration::from_millis(2)));
    }

    #[test]
    fn should_reject_blank_input() {
        assert_eq!(parse_duration("   "), Err(DurationError::Empty));
    }

    #[test]
    fn should_reject_unknown_unit_or_missing_digits() {
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn should_fall_back_to_default_when_input_is_invalid() {
        let default = Duration::from_secs(7);
        assert_eq!(parse_duration_or(Some("nope"), default), default);
        assert_eq!(parse_duration_or(None, default), default);
        assert_eq!(
            parse_duration_or(Some("1s"), default),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn should_format_seconds_minutes_and_hours() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(5_400)), "1h 30m");
    }
}
