//! Number and date formatting for chart labels.

use chrono::{Datelike, NaiveDate};

/// Whole percentage from a 0-100 value with halves rounded up, so `-12.5`
/// gives `-12%` and `12.5` gives `13%`.
pub fn percent0(value: f64) -> String {
    format!("{}%", (value + 0.5).floor() as i64)
}

/// Percentage with one decimal from a 0-100 value, e.g. `42.0%`.
pub fn percent1(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Integer with thousands separators.
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Parse an integer that may contain thousands separators.
pub fn parse_count(text: &str) -> Option<u64> {
    text.replace(',', "").trim().parse().ok()
}

/// `M/d/yy` without zero padding on month and day.
pub fn short_date(date: NaiveDate) -> String {
    format!("{}/{}/{:02}", date.month(), date.day(), date.year().rem_euclid(100))
}
