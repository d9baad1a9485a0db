//! SQL date and time text in the formats listed in [`DbConfig`](crate::DbConfig).
//!
//! Dates are days since 1970-01-01; times are microseconds since midnight;
//! datetimes are microseconds since the Unix epoch. No time zones.

use crate::error::{Error, Result, TypeError};

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Parse a `YYYY-MM-DD` date into days since the Unix epoch.
pub fn parse_date(s: &str) -> Result<i32> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return Err(type_error("date", s));
    }

    let year: i32 = parts[0].parse().map_err(|_| type_error("date", s))?;
    let month: u32 = parts[1].parse().map_err(|_| type_error("date", s))?;
    let day: u32 = parts[2].parse().map_err(|_| type_error("date", s))?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(type_error("date", s));
    }

    Ok(days_from_civil(year, month, day))
}

/// Parse a `HH:MM[:SS[.ffffff]]` time into microseconds since midnight.
pub fn parse_time(s: &str) -> Result<i64> {
    let (time_part, micros_part) = match s.split_once('.') {
        Some((time, frac)) => (time, Some(frac)),
        None => (s, None),
    };

    let parts: Vec<&str> = time_part.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(type_error("time", s));
    }

    let hours: i64 = parts[0].parse().map_err(|_| type_error("time", s))?;
    let mins: i64 = parts[1].parse().map_err(|_| type_error("time", s))?;
    let secs: i64 = if parts.len() == 3 {
        parts[2].parse().map_err(|_| type_error("time", s))?
    } else {
        0
    };

    let mut micros = (hours * 3600 + mins * 60 + secs) * MICROS_PER_SECOND;

    if let Some(frac) = micros_part {
        let frac = if frac.len() > 6 { &frac[..6] } else { frac };
        let frac_micros: i64 = frac.parse().map_err(|_| type_error("time", s))?;
        micros += frac_micros * 10_i64.pow(6 - frac.len() as u32);
    }

    Ok(micros)
}

/// Parse `YYYY-MM-DD HH:MM:SS` (or a bare date, or the `T` separated form)
/// into microseconds since the Unix epoch.
pub fn parse_datetime(s: &str) -> Result<i64> {
    let s = s.trim();
    let (date, time) = match s.split_once([' ', 'T']) {
        Some((date, time)) => (date, Some(time)),
        None => (s, None),
    };

    let days = parse_date(date)?;
    let time_micros = match time {
        Some(time) => parse_time(time)?,
        None => 0,
    };

    Ok(i64::from(days) * MICROS_PER_DAY + time_micros)
}

/// Format days since the epoch as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    let (year, month, day) = civil_from_days(days);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Format microseconds since midnight as `HH:MM:SS`.
pub fn format_time(micros: i64) -> String {
    let secs = micros.rem_euclid(MICROS_PER_DAY) / MICROS_PER_SECOND;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Format microseconds since the epoch as `YYYY-MM-DD HH:MM:SS`.
#[allow(clippy::cast_possible_truncation)]
pub fn format_datetime(micros: i64) -> String {
    let days = micros.div_euclid(MICROS_PER_DAY) as i32;
    format!(
        "{} {}",
        format_date(days),
        format_time(micros.rem_euclid(MICROS_PER_DAY))
    )
}

fn type_error(expected: &'static str, value: &str) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("invalid value: {}", value),
        column: None,
        rust_type: None,
    })
}

// https://howardhinnant.github.io/date_algorithms.html
fn days_from_civil(year: i32, month: u32, day: u32) -> i32 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u32;
    let doy = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i32 - 719_468
}

fn civil_from_days(days: i32) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i32 + era * 400 + i32::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("1970-01-01").unwrap(), 0);
        assert_eq!(parse_date("2000-01-01").unwrap(), 10_957);
        assert!(parse_date("2000-13-01").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_parse_datetime() {
        assert_eq!(parse_datetime("1970-01-02 00:00:01").unwrap(), 86_401_000_000);
        assert_eq!(parse_datetime("1970-01-02").unwrap(), 86_400_000_000);
        assert_eq!(
            parse_datetime("2024-03-05T10:20:30").unwrap(),
            parse_datetime("2024-03-05 10:20:30").unwrap()
        );
    }

    #[test]
    fn test_parse_time_fraction() {
        assert_eq!(parse_time("00:00:01.5").unwrap(), 1_500_000);
        assert_eq!(parse_time("01:02").unwrap(), 3_720_000_000);
    }

    #[test]
    fn test_format_round_trip() {
        let micros = parse_datetime("2024-02-29 23:59:58").unwrap();
        assert_eq!(format_datetime(micros), "2024-02-29 23:59:58");
        assert_eq!(format_date(parse_date("1969-12-31").unwrap()), "1969-12-31");
    }
}
