//! Relative and absolute date resolution for extracted date phrases.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Utc, Weekday};

const ABSOLUTE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d %Y", "%b %d %Y"];
const MONTH_DAY_FORMATS: [&str; 2] = ["%B %d %Y", "%b %d %Y"];

/// Longest `in N days` offset accepted, in days.
const MAX_OFFSET_DAYS: i64 = 3660;

/// Resolve a date phrase against `reference`.
///
/// Relative phrases keep the reference time of day:
///
/// - `today` is the reference itself, `tomorrow` one day later;
/// - a weekday name, optionally after `next`, resolves to its next
///   occurrence strictly after the reference day, so naming the
///   reference's own weekday means one week later;
/// - `in N days` / `in N weeks` adds the offset.
///
/// Absolute dates resolve to midnight UTC. A month and day without a year
/// takes the reference year, or the next year when that day has already
/// passed.
///
/// Returns `None` for anything that does not parse.
pub fn parse_relative_date(candidate: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = normalize(candidate);
    if normalized.is_empty() {
        return None;
    }

    match normalized.as_str() {
        "today" => return Some(reference),
        "tomorrow" => return reference.checked_add_signed(TimeDelta::days(1)),
        _ => {}
    }
    if let Some(days) = parse_offset_days(&normalized) {
        return reference.checked_add_signed(TimeDelta::try_days(days)?);
    }

    let weekday_text = normalized.strip_prefix("next ").unwrap_or(&normalized);
    if let Some(weekday) = parse_weekday(weekday_text) {
        return next_weekday(weekday, reference);
    }

    let date = parse_absolute(&normalized).or_else(|| parse_month_day(&normalized, reference))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Next occurrence of `weekday` strictly after `reference`'s day.
fn next_weekday(weekday: Weekday, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let target = weekday.num_days_from_monday();
    let today = reference.weekday().num_days_from_monday();
    let ahead = match target.saturating_add(7).saturating_sub(today) % 7 {
        0 => 7,
        n => n,
    };
    reference.checked_add_signed(TimeDelta::days(i64::from(ahead)))
}

/// Days in `in N day(s)` or `in N week(s)`.
fn parse_offset_days(text: &str) -> Option<i64> {
    let mut tokens = text.split_whitespace();
    let (Some("in"), Some(count), Some(unit), None) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return None;
    };
    let count: i64 = count.parse().ok()?;
    let days = match unit {
        "day" | "days" => Some(count),
        "week" | "weeks" => count.checked_mul(7),
        _ => None,
    }?;
    (0..=MAX_OFFSET_DAYS).contains(&days).then_some(days)
}

fn parse_weekday(text: &str) -> Option<Weekday> {
    text.parse::<Weekday>().ok()
}

fn parse_absolute(text: &str) -> Option<NaiveDate> {
    ABSOLUTE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_month_day(text: &str, reference: DateTime<Utc>) -> Option<NaiveDate> {
    let year = reference.year();
    let in_year = |y: i32| {
        let with_year = format!("{text} {y}");
        MONTH_DAY_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())
    };
    let date = in_year(year)?;
    if date < reference.date_naive() {
        return in_year(year.saturating_add(1));
    }
    Some(date)
}

/// Lowercase, drop commas and dots, strip ordinal suffixes and map
/// `sept` to `sep`.
fn normalize(candidate: &str) -> String {
    candidate
        .to_lowercase()
        .replace([',', '.'], " ")
        .split_whitespace()
        .map(|token| {
            if token == "sept" {
                return "sep".to_owned();
            }
            strip_ordinal(token).to_owned()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_ordinal(token: &str) -> &str {
    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        return token;
    }
    ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .filter(|digits| digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(token)
}
