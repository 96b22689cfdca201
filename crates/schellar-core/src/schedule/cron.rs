use chrono::{DateTime, Duration, SubsecRound, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use thiserror::Error;

/// A parsed standard (5-field) cron expression or `@every` interval.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    /// The expression as written by the user.
    expression: String,
    plan: Plan,
}

#[derive(Debug, Clone)]
enum Plan {
    /// Fires when any of the schedules matches. Two entries when both
    /// day-of-month and day-of-week are restricted.
    Calendar(Vec<Schedule>),
    /// Fixed delay, whole seconds, counted from the previous fire.
    Every(Duration),
}

impl CronSchedule {
    /// Parse a standard cron expression.
    ///
    /// Accepts the classic `minute hour day-of-month month day-of-week` form
    /// (day-of-week numbered 0-7 with both 0 and 7 meaning Sunday), the
    /// `@yearly`, `@monthly`, `@weekly`, `@daily` and `@hourly` descriptors,
    /// and `@every <duration>` (e.g. `@every 1h30m`).
    ///
    /// When both day fields are restricted, a day matching either one fires.
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(CronParseError::Empty);
        }

        let plan = match trimmed.strip_prefix("@every") {
            Some(interval) => Plan::Every(parse_interval(interval.trim())?),
            None => Plan::Calendar(
                normalize_cron_expression(trimmed)?
                    .iter()
                    .map(|normalized| {
                        Schedule::from_str(normalized)
                            .map_err(|e| CronParseError::InvalidExpression(e.to_string()))
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(Self {
            expression: trimmed.to_string(),
            plan,
        })
    }

    /// Get the cron expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the next scheduled time strictly after the given time, evaluating
    /// calendar fields in `timezone`.
    pub fn next_after_in_tz(&self, after: DateTime<Utc>, timezone: Tz) -> Option<DateTime<Utc>> {
        match &self.plan {
            Plan::Every(delay) => Some(after.trunc_subsecs(0) + *delay),
            Plan::Calendar(schedules) => {
                let local_time = after.with_timezone(&timezone);
                schedules
                    .iter()
                    .filter_map(|schedule| schedule.after(&local_time).next())
                    .map(|dt| dt.with_timezone(&Utc))
                    .min()
            }
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Convert a standard cron expression to seconds-first forms, one per
/// alternative.
fn normalize_cron_expression(expr: &str) -> Result<Vec<String>, CronParseError> {
    if expr.starts_with('@') {
        return match expr {
            "@yearly" | "@annually" | "@monthly" | "@weekly" | "@daily" | "@midnight"
            | "@hourly" => Ok(vec![expr.replace("@midnight", "@daily")]),
            other => Err(CronParseError::InvalidExpression(format!(
                "unsupported descriptor '{}'",
                other
            ))),
        };
    }

    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(CronParseError::FieldCount(parts.len()));
    }

    let (minute, hour, day_of_month, month) = (parts[0], parts[1], parts[2], parts[3]);
    let day_of_week = translate_day_of_week(parts[4])?;

    if is_restricted(day_of_month) && is_restricted(parts[4]) {
        return Ok(vec![
            format!("0 {} {} {} {} *", minute, hour, day_of_month, month),
            format!("0 {} {} * {} {}", minute, hour, month, day_of_week),
        ]);
    }
    Ok(vec![format!(
        "0 {} {} {} {} {}",
        minute, hour, day_of_month, month, day_of_week
    )])
}

fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field.starts_with('?'))
}

/// Parse a duration such as `90s`, `15m` or `1h30m`.
///
/// Sub-second parts are dropped and the result is at least one second.
fn parse_interval(spec: &str) -> Result<Duration, CronParseError> {
    let invalid = || CronParseError::InvalidExpression(format!("invalid interval '{}'", spec));
    if spec.is_empty() {
        return Err(invalid());
    }

    let mut total_ms: i64 = 0;
    let mut rest = spec;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: i64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit_ms = match &rest[..unit_len] {
            "h" => 3_600_000,
            "m" => 60_000,
            "s" => 1_000,
            "ms" => 1,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        total_ms = value
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::seconds((total_ms / 1_000).max(1)))
}

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Rewrite numeric day-of-week values (0-7, Sunday = 0 or 7) as day names,
/// since the parser numbers days from 1.
fn translate_day_of_week(field: &str) -> Result<String, CronParseError> {
    let mut items = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };

        let translated = match base.split_once('-') {
            Some((start, end)) => {
                let start = day_name(start)?;
                let end_is_seven = end.trim() == "7";
                let end = if end_is_seven { "SAT" } else { day_name(end)? };
                if end_is_seven && step.is_none() && start != "SUN" {
                    // `x-7` covers Saturday and wraps to Sunday.
                    format!("{}-{},SUN", start, end)
                } else {
                    format!("{}-{}", start, end)
                }
            }
            None => day_name(base)?.to_string(),
        };

        match step {
            Some(step) => items.push(format!("{}/{}", translated, step)),
            None => items.push(translated),
        }
    }

    Ok(items.join(","))
}

fn day_name(value: &str) -> Result<&str, CronParseError> {
    if value == "*" || value.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(value);
    }

    value
        .parse::<usize>()
        .ok()
        .and_then(|n| DAY_NAMES.get(n).copied())
        .ok_or_else(|| {
            CronParseError::InvalidExpression(format!("invalid day of week '{}'", value))
        })
}

/// Cron parsing error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CronParseError {
    #[error("cron expression is empty")]
    Empty,

    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn next_utc(expression: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        CronSchedule::parse(expression)
            .unwrap()
            .next_after_in_tz(after, chrono_tz::UTC)
            .unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_parse_five_part_cron() {
        let schedule = CronSchedule::parse(" */5 * * * * ").unwrap();
        assert_eq!(schedule.expression(), "*/5 * * * *");
        assert_eq!(next_utc("*/5 * * * *", at(1, 10, 2)), at(1, 10, 5));
    }

    #[test]
    fn test_six_part_cron_rejected() {
        let result = CronSchedule::parse("30 */5 * * * *");
        assert_eq!(result.unwrap_err(), CronParseError::FieldCount(6));
    }

    #[test]
    fn test_invalid_cron() {
        assert!(CronSchedule::parse("invalid").is_err());
        assert!(CronSchedule::parse("").is_err());
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("* * * * 9").is_err());
        assert!(CronSchedule::parse("@fortnightly").is_err());
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(next_utc("@daily", at(1, 10, 0)), at(2, 0, 0));
        assert_eq!(next_utc("@hourly", at(1, 10, 15)), at(1, 11, 0));
    }

    #[test]
    fn test_midnight_every_day() {
        assert_eq!(next_utc("0 0 * * *", at(1, 10, 30)), at(2, 0, 0));
    }

    #[test]
    fn test_day_of_week_numbering() {
        // 2024-03-01 is a Friday.
        let start = at(1, 12, 0);
        assert_eq!(next_utc("0 9 * * 0", start), at(3, 9, 0));
        assert_eq!(next_utc("0 9 * * 7", start), at(3, 9, 0));
        assert_eq!(next_utc("0 9 * * 1-5", start), at(4, 9, 0));
    }

    #[test]
    fn test_restricted_day_fields_match_either() {
        // Every Monday plus the 1st of the month.
        let schedule = "0 0 1 * 1";
        assert_eq!(next_utc(schedule, at(1, 12, 0)), at(4, 0, 0));
        assert_eq!(
            next_utc(schedule, at(25, 12, 0)),
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            next_utc(schedule, Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()),
            Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_starred_day_of_week_keeps_day_of_month() {
        // A starred day-of-week leaves the day-of-month in charge.
        assert_eq!(next_utc("0 0 15 * *", at(1, 0, 0)), at(15, 0, 0));
    }

    #[test]
    fn test_every_interval() {
        assert_eq!(parse_interval("1h30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_interval("90s").unwrap(), Duration::seconds(90));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::seconds(1));
        assert!(parse_interval("").is_err());
        assert!(parse_interval("1d").is_err());
        assert!(parse_interval("h").is_err());

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
            + Duration::milliseconds(250);
        assert_eq!(next_utc("@every 1h", start), at(1, 11, 0));
        assert!(CronSchedule::parse("@every").is_err());
        assert!(CronSchedule::parse("@every soon").is_err());
    }

    #[test]
    fn test_translate_day_of_week() {
        assert_eq!(translate_day_of_week("*").unwrap(), "*");
        assert_eq!(translate_day_of_week("0,3").unwrap(), "SUN,WED");
        assert_eq!(translate_day_of_week("5-7").unwrap(), "FRI-SAT,SUN");
        assert_eq!(translate_day_of_week("*/2").unwrap(), "*/2");
        assert_eq!(translate_day_of_week("MON-FRI").unwrap(), "MON-FRI");
    }

    #[test]
    fn test_next_after_in_tz() {
        let schedule = CronSchedule::parse("0 0 * * *").unwrap();
        let next = schedule
            .next_after_in_tz(at(1, 12, 0), chrono_tz::Europe::Bratislava)
            .unwrap();
        // Midnight in Bratislava (UTC+1 in March) is 23:00 UTC.
        assert_eq!(next, at(1, 23, 0));
    }
}
