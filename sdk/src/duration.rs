//! Duration strings with calendar-aware units.
//!
//! Extends the usual `<number><unit>` grammar (`ns`, `us`/`µs`, `ms`, `s`,
//! `m`, `h`) with `D`/`d` (day), `W`/`w` (week), `M` (month) and `Y`/`y`
//! (year). Calendar units are resolved against *now*: the next calendar
//! anchor is constructed and the difference taken, so `1Y` is 365 or 366
//! days depending on the current date.
//!
//! Terms must appear in strictly decreasing unit magnitude (`1h30m`, never
//! `30m1h`), and the separators `-`, ` ` and `:` between terms are ignored.

use {
    chrono::{DateTime, Duration, Months, Utc},
    thiserror::Error,
};

/// Errors raised while parsing a duration string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(char),
    #[error("number without a unit")]
    MissingUnit,
    #[error("duplicate or unordered unit")]
    Ordering,
    #[error("duration out of range")]
    Overflow,
}

// Unit ranks; terms must strictly decrease.
const RANK_NANOSECOND: u8 = 7;
const RANK_MICROSECOND: u8 = 8;
const RANK_MILLISECOND: u8 = 9;
const RANK_SECOND: u8 = 10;
const RANK_MINUTE: u8 = 11;
const RANK_HOUR: u8 = 12;
const RANK_DAY: u8 = 13;
const RANK_WEEK: u8 = 14;
const RANK_MONTH: u8 = 15;
const RANK_YEAR: u8 = 16;

/// Parse a duration string, resolving calendar units against the current
/// time. An empty string parses as the zero duration.
pub fn parse(s: &str) -> Result<Duration, DurationParseError> {
    parse_at(s, Utc::now())
}

/// Like [`parse`], with an explicit reference time for calendar units.
pub fn parse_at(s: &str, now: DateTime<Utc>) -> Result<Duration, DurationParseError> {
    let mut total = Duration::zero();
    let mut last_rank = u8::MAX;
    let mut chars = s.chars().peekable();
    let mut value: i64 = 0;
    let mut have_digits = false;

    while let Some(c) = chars.next() {
        match c {
            '-' | ' ' | ':' => continue,
            '0'..='9' => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(c as i64 - '0' as i64))
                    .ok_or(DurationParseError::Overflow)?;
                have_digits = true;
            }
            _ => {
                let (rank, dur) = match c {
                    'n' if chars.peek() == Some(&'s') => {
                        chars.next();
                        (RANK_NANOSECOND, Duration::nanoseconds(value))
                    }
                    'u' | 'µ' if chars.peek() == Some(&'s') => {
                        chars.next();
                        (RANK_MICROSECOND, Duration::microseconds(value))
                    }
                    'm' if chars.peek() == Some(&'s') => {
                        chars.next();
                        (RANK_MILLISECOND, Duration::milliseconds(value))
                    }
                    's' => (RANK_SECOND, Duration::seconds(value)),
                    'm' => (RANK_MINUTE, Duration::minutes(value)),
                    'h' => (RANK_HOUR, Duration::hours(value)),
                    'D' | 'd' => (RANK_DAY, calendar_distance(0, 0, value, now)?),
                    'W' | 'w' => {
                        let days = value.checked_mul(7).ok_or(DurationParseError::Overflow)?;
                        (RANK_WEEK, calendar_distance(0, 0, days, now)?)
                    }
                    'M' => (RANK_MONTH, calendar_distance(0, value, 0, now)?),
                    'Y' | 'y' => (RANK_YEAR, calendar_distance(value, 0, 0, now)?),
                    other => return Err(DurationParseError::UnknownUnit(other)),
                };
                if rank >= last_rank {
                    return Err(DurationParseError::Ordering);
                }
                last_rank = rank;
                total = total
                    .checked_add(&dur)
                    .ok_or(DurationParseError::Overflow)?;
                value = 0;
                have_digits = false;
            }
        }
    }
    if have_digits {
        return Err(DurationParseError::MissingUnit);
    }
    Ok(total)
}

/// Duration between `now` and the calendar anchor `years`/`months`/`days`
/// ahead of it.
fn calendar_distance(
    years: i64,
    months: i64,
    days: i64,
    now: DateTime<Utc>,
) -> Result<Duration, DurationParseError> {
    let total_months = years
        .checked_mul(12)
        .and_then(|m| m.checked_add(months))
        .and_then(|m| u32::try_from(m).ok())
        .ok_or(DurationParseError::Overflow)?;
    let mut next = now;
    if total_months > 0 {
        next = next
            .checked_add_months(Months::new(total_months))
            .ok_or(DurationParseError::Overflow)?;
    }
    if days != 0 {
        next = next
            .checked_add_signed(Duration::days(days))
            .ok_or(DurationParseError::Overflow)?;
    }
    Ok(next - now)
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, rstest::rstest};

    fn reference() -> DateTime<Utc> {
        // 2024 is a leap year; Feb 29 sits between this date and +1Y.
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case("90s", Duration::seconds(90))]
    #[case("1h30m", Duration::minutes(90))]
    #[case("1h-30m", Duration::minutes(90))]
    #[case("1h 30m", Duration::minutes(90))]
    #[case("1h:30m:10s", Duration::seconds(5410))]
    #[case("250ms", Duration::milliseconds(250))]
    #[case("10us", Duration::microseconds(10))]
    #[case("10µs", Duration::microseconds(10))]
    #[case("500ns", Duration::nanoseconds(500))]
    #[case("", Duration::zero())]
    fn fixed_units(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_at(input, reference()), Ok(expected));
    }

    #[test]
    fn calendar_day_and_week() {
        assert_eq!(parse_at("1D", reference()), Ok(Duration::days(1)));
        assert_eq!(parse_at("2d", reference()), Ok(Duration::days(2)));
        assert_eq!(parse_at("1W", reference()), Ok(Duration::days(7)));
    }

    #[test]
    fn calendar_month_and_year() {
        // Jan 15 -> Feb 15 is 31 days.
        assert_eq!(parse_at("1M", reference()), Ok(Duration::days(31)));
        // Jan 15 2024 -> Jan 15 2025 crosses Feb 29.
        assert_eq!(parse_at("1Y", reference()), Ok(Duration::days(366)));
        let non_leap = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(parse_at("1Y", non_leap), Ok(Duration::days(365)));
    }

    #[test]
    fn compound_calendar() {
        let expected = Duration::days(366) + Duration::minutes(90);
        assert_eq!(parse_at("1Y1h30m", reference()), Ok(expected));
    }

    #[rstest]
    #[case("30m1h")]
    #[case("1h1h")]
    #[case("1D1Y")]
    fn ordering_violations(#[case] input: &str) {
        assert_eq!(
            parse_at(input, reference()),
            Err(DurationParseError::Ordering)
        );
    }

    #[test]
    fn unknown_unit() {
        assert_eq!(
            parse_at("10x", reference()),
            Err(DurationParseError::UnknownUnit('x'))
        );
        // 'n' and 'u' are only units when followed by 's'.
        assert_eq!(
            parse_at("10n", reference()),
            Err(DurationParseError::UnknownUnit('n'))
        );
    }

    #[test]
    fn trailing_number_is_rejected() {
        assert_eq!(
            parse_at("10", reference()),
            Err(DurationParseError::MissingUnit)
        );
    }
}
