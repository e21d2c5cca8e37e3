//! Relative date resolution.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use mailsift::extractors::dates::parse_relative_date;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn monday() -> DateTime<Utc> {
    match "2026-10-12T09:00:00Z".parse::<DateTime<Utc>>() {
        Ok(t) => t,
        Err(err) => panic!("reference date: {err}"),
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(y, m, d) {
        Some(date) => date,
        None => panic!("invalid test date {y}-{m}-{d}"),
    }
}

#[test]
fn same_weekday_is_one_week_later() {
    for (offset, name) in (0_i64..).zip(WEEKDAYS) {
        let reference = monday() + TimeDelta::days(offset);
        let resolved = parse_relative_date(name, reference);
        assert_eq!(
            resolved,
            Some(reference + TimeDelta::days(7)),
            "{name} from a {name}"
        );
    }
}

#[test]
fn weekday_resolves_to_next_occurrence() {
    let resolved = parse_relative_date("Tuesday", monday());
    assert_eq!(resolved.map(|d| d.date_naive()), Some(day(2026, 10, 13)));

    let resolved = parse_relative_date("sunday", monday());
    assert_eq!(resolved.map(|d| d.date_naive()), Some(day(2026, 10, 18)));
}

#[test]
fn weekday_is_never_zero_days_ahead() {
    let reference = monday();
    for name in WEEKDAYS {
        let resolved = match parse_relative_date(name, reference) {
            Some(resolved) => resolved,
            None => panic!("{name} should resolve"),
        };
        let ahead = resolved - reference;
        assert!(ahead >= TimeDelta::days(1), "{name} resolved {ahead} ahead");
        assert!(ahead <= TimeDelta::days(7), "{name} resolved {ahead} ahead");
    }
}

#[test]
fn absolute_formats_resolve_to_midnight() {
    for candidate in ["2026-12-25", "12/25/2026", "December 25, 2026", "Dec 25th 2026"] {
        let resolved = parse_relative_date(candidate, monday());
        assert_eq!(
            resolved.map(|d| d.to_rfc3339()),
            Some("2026-12-25T00:00:00+00:00".to_owned()),
            "{candidate}"
        );
    }
}

#[test]
fn month_day_without_year_rolls_forward() {
    let resolved = parse_relative_date("March 3", monday());
    assert_eq!(resolved.map(|d| d.date_naive()), Some(day(2027, 3, 3)));

    let resolved = parse_relative_date("Nov 2nd", monday());
    assert_eq!(resolved.map(|d| d.date_naive()), Some(day(2026, 11, 2)));
}

#[test]
fn unparseable_candidates_are_none() {
    assert_eq!(parse_relative_date("next blue moon", monday()), None);
    assert_eq!(parse_relative_date("13/45/2026", monday()), None);
}

#[test]
fn today_and_tomorrow_keep_reference_time() {
    assert_eq!(parse_relative_date("today", monday()), Some(monday()));
    assert_eq!(
        parse_relative_date("Tomorrow", monday()),
        Some(monday() + TimeDelta::days(1))
    );
}

#[test]
fn next_weekday_matches_the_bare_weekday() {
    assert_eq!(
        parse_relative_date("next Friday", monday()),
        parse_relative_date("Friday", monday())
    );
    let resolved = parse_relative_date("next Monday", monday());
    assert_eq!(resolved.map(|d| d.date_naive()), Some(day(2026, 10, 19)));
}

#[test]
fn in_n_days_and_weeks_add_the_offset() {
    assert_eq!(
        parse_relative_date("in 3 days", monday()),
        Some(monday() + TimeDelta::days(3))
    );
    assert_eq!(
        parse_relative_date("in 1 day", monday()),
        Some(monday() + TimeDelta::days(1))
    );
    let resolved = parse_relative_date("in 2 weeks", monday());
    assert_eq!(resolved.map(|d| d.date_naive()), Some(day(2026, 10, 26)));
}

#[test]
fn malformed_offsets_are_none() {
    assert_eq!(parse_relative_date("in many days", monday()), None);
    assert_eq!(parse_relative_date("in 3 months", monday()), None);
    assert_eq!(parse_relative_date("in 99999 weeks", monday()), None);
}
