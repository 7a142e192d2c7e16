//! Japanese holiday calendar.
//!
//! Current rules only (post-2020 fixed dates and Happy Monday days);
//! equinox days use the usual approximation, valid for 1980–2099.

use chrono::{Datelike, Local, NaiveDate, Weekday};

/// Weekend or national holiday.
pub fn is_holiday(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        || is_national_holiday(date)
        || is_substitute_holiday(date)
        || is_citizens_holiday(date)
}

/// Today's date in the server's local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn is_national_holiday(date: NaiveDate) -> bool {
    let (month, day) = (date.month(), date.day());
    let fixed = matches!(
        (month, day),
        (1, 1) | (2, 11) | (2, 23) | (4, 29) | (5, 3) | (5, 4) | (5, 5) | (8, 11) | (11, 3) | (11, 23)
    );
    if fixed {
        return true;
    }

    let happy_monday = match month {
        1 | 10 => nth_monday(date, 2),
        7 | 9 => nth_monday(date, 3),
        _ => false,
    };
    if happy_monday {
        return true;
    }

    match month {
        3 => day == vernal_equinox_day(date.year()),
        9 => day == autumnal_equinox_day(date.year()),
        _ => false,
    }
}

/// Holiday falling on a Sunday moves to the next day that is not a holiday.
fn is_substitute_holiday(date: NaiveDate) -> bool {
    if is_national_holiday(date) || date.weekday() == Weekday::Sun {
        return false;
    }
    let mut prev = date.pred_opt();
    while let Some(d) = prev {
        if !is_national_holiday(d) {
            return false;
        }
        if d.weekday() == Weekday::Sun {
            return true;
        }
        prev = d.pred_opt();
    }
    false
}

/// A plain day sandwiched between two national holidays.
fn is_citizens_holiday(date: NaiveDate) -> bool {
    if is_national_holiday(date) {
        return false;
    }
    match (date.pred_opt(), date.succ_opt()) {
        (Some(prev), Some(next)) => is_national_holiday(prev) && is_national_holiday(next),
        _ => false,
    }
}

fn nth_monday(date: NaiveDate, n: u32) -> bool {
    date.weekday() == Weekday::Mon && (date.day() - 1) / 7 + 1 == n
}

fn equinox_day(base: f64, year: i32) -> u32 {
    let y = f64::from(year - 1980);
    (base + 0.242194 * y - (y / 4.0).floor()).floor() as u32
}

fn vernal_equinox_day(year: i32) -> u32 {
    equinox_day(20.8431, year)
}

fn autumnal_equinox_day(year: i32) -> u32 {
    equinox_day(23.2488, year)
}
