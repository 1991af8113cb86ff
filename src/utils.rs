use crate::error::{EngineError, Result};
use chrono::{Datelike, Days, NaiveDate};
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Amounts closer to zero than half a cent are treated as zero.
pub const ZERO_EPSILON: f64 = 0.005;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn is_zero_amount(value: f64) -> bool {
    value.abs() < ZERO_EPSILON
}

pub fn validate_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(EngineError::InvalidMonth(month));
    }
    Ok(())
}

pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get((month as usize).checked_sub(1)?).copied()
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// First and last day of a calendar year.
pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = last_day_of_month(year, 12)?;
    Some((start, end))
}

/// Returns the 1-based month of `date` if it falls in `year`.
pub fn month_in_year(date: NaiveDate, year: i32) -> Option<u32> {
    (date.year() == year).then(|| date.month())
}

/// Lowercased with accents stripped, so "Énergie" sorts among the e's.
fn fold_name(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Case- and accent-insensitive ordering. Ties fall back to the lowercased
/// name and then the exact name, so "abc" and "ABC" always come out in the
/// same order.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    fold_name(a)
        .cmp(&fold_name(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}
