//! This module defines [CellValue], the tagged value stored in every cell of a table,
//! together with the parsing functions that turn raw input into cells.
//!
//! Parsing never fails: input that cannot be interpreted as the declared type
//! becomes [CellValue::Missing] with a [MissingReason] describing the problem.

use std::{cmp::Ordering, fmt};

use strum_macros::Display;

/// A concrete point in time, i.e. a year or a day number.
pub type Time = i64;

/// Reason why a cell does not hold a usable value.
///
/// Invalid cells are kept as row placeholders so that rows stay aligned across
/// columns, but they are excluded from every numeric computation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MissingReason {
    /// Blank input in a numeric column
    BlankButShouldBeNumber,
    /// Input in a numeric column that does not parse as a number
    NotAParseableNumberButShouldBeNumber,
    /// Input that parsed to NaN
    NaNButShouldBeNumber,
    /// Explicit null in a numeric column
    NullButShouldBeNumber,
    /// Blank input in a string column
    BlankButShouldBeString,
    /// Explicit null in a string column
    NullButShouldBeString,
    /// Input in a boolean column that is not a boolean literal
    NotAParseableBoolean,
    /// Input in a date column that is not of the form `YYYY-MM-DD`
    NotAParseableDate,
    /// Placeholder for a row that was added to complete a table
    MissingValuePlaceholder,
    /// No observation was found within the time tolerance
    NoValueWithinTolerance,
    /// A joined row had no counterpart on the other side
    NoMatchingRowInJoin,
    /// A computation rule could not produce a value for this row
    InvalidComputation,
    /// A share or growth rate was computed against a zero total
    DivideByZero,
}

/// A single cell of a table.
#[allow(variant_size_differences)]
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// A finite floating point number
    Number(f64),
    /// A string
    Text(String),
    /// A boolean
    Boolean(bool),
    /// No usable value, see [MissingReason]
    Missing(MissingReason),
}

impl CellValue {
    /// Return `true` if the cell holds no usable value.
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing(_))
    }

    /// Return `true` if the cell holds a usable value.
    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    /// Return the numeric content of this cell, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Return the content of this cell interpreted as a [Time].
    ///
    /// Only integral numbers are valid times.
    pub fn as_time(&self) -> Option<Time> {
        match self {
            CellValue::Number(number) if number.fract() == 0.0 => number_to_time(*number),
            _ => None,
        }
    }

    /// Return the string content of this cell, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Return the boolean content of this cell, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Return the [MissingReason] of this cell, if it is missing.
    pub fn missing_reason(&self) -> Option<MissingReason> {
        match self {
            CellValue::Missing(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Total order used for sorting rows.
    ///
    /// Numbers come first, then strings, then booleans; missing cells always sort last.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        fn rank(value: &CellValue) -> u8 {
            match value {
                CellValue::Number(_) => 0,
                CellValue::Text(_) => 1,
                CellValue::Boolean(_) => 2,
                CellValue::Missing(_) => 3,
            }
        }

        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
            (CellValue::Missing(_), CellValue::Missing(_)) => Ordering::Equal,
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Key under which this cell is grouped, e.g. in the entity index or in joins.
    ///
    /// Missing cells have no key.
    pub fn group_key(&self) -> Option<String> {
        match self {
            CellValue::Missing(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    /// Missing cells are displayed as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(number) => write!(f, "{}", format_number(*number)),
            CellValue::Text(text) => write!(f, "{text}"),
            CellValue::Boolean(value) => write!(f, "{value}"),
            CellValue::Missing(_) => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            CellValue::Missing(MissingReason::NaNButShouldBeNumber)
        } else {
            CellValue::Number(value)
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(time_to_number(value))
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl<T> From<Option<T>> for CellValue
where
    T: Into<CellValue>,
{
    fn from(value: Option<T>) -> Self {
        value
            .map(Into::into)
            .unwrap_or(CellValue::Missing(MissingReason::MissingValuePlaceholder))
    }
}

/// Convert an integral float into a [Time], if it is in range.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn number_to_time(number: f64) -> Option<Time> {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53

    if number.is_finite() && number.abs() <= LIMIT {
        Some(number.trunc() as Time)
    } else {
        None
    }
}

/// Convert a [Time] into a float.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn time_to_number(time: Time) -> f64 {
    time as f64
}

/// Render a number the way it would be written in a spreadsheet:
/// integral values without a fractional part.
pub fn format_number(number: f64) -> String {
    match number_to_time(number) {
        Some(integer) if number.fract() == 0.0 => integer.to_string(),
        _ => number.to_string(),
    }
}

/// Parse raw input of a numeric column.
pub fn parse_number(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Missing(MissingReason::BlankButShouldBeNumber);
    }

    match trimmed.parse::<f64>() {
        Ok(number) if number.is_nan() => CellValue::Missing(MissingReason::NaNButShouldBeNumber),
        Ok(number) if number.is_finite() => CellValue::Number(number),
        _ => CellValue::Missing(MissingReason::NotAParseableNumberButShouldBeNumber),
    }
}

/// Return `true` if `raw` does not prevent a column from being numeric,
/// i.e. it is blank, NaN or a finite number.
pub fn is_numeric_or_blank(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed.parse::<f64>().is_ok_and(|number| !number.is_infinite())
}

/// Parse raw input of a string column.
pub fn parse_string(raw: &str) -> CellValue {
    if raw.trim().is_empty() {
        CellValue::Missing(MissingReason::BlankButShouldBeString)
    } else {
        CellValue::Text(raw.to_string())
    }
}

/// Parse raw input of a boolean column.
pub fn parse_boolean(raw: &str) -> CellValue {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => CellValue::Boolean(true),
        "false" | "no" | "0" => CellValue::Boolean(false),
        _ => CellValue::Missing(MissingReason::NotAParseableBoolean),
    }
}

/// Parse raw input of a date column into a day number,
/// counted from 1970-01-01.
///
/// Integral numbers are taken to be day numbers already.
pub fn parse_date(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Missing(MissingReason::BlankButShouldBeNumber);
    }
    if let Ok(day) = trimmed.parse::<Time>() {
        return CellValue::from(day);
    }

    let mut parts = trimmed.splitn(3, '-');
    let parsed = match (parts.next(), parts.next(), parts.next()) {
        (Some(year), Some(month), Some(day)) => {
            match (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>()) {
                (Ok(year), Ok(month), Ok(day))
                    if (1..=12).contains(&month) && (1..=days_in_month(year, month)).contains(&day) =>
                {
                    Some(days_from_civil(year, month, day))
                }
                _ => None,
            }
        }
        _ => None,
    };

    parsed
        .map(CellValue::from)
        .unwrap_or(CellValue::Missing(MissingReason::NotAParseableDate))
}

/// Render a day number, counted from 1970-01-01, as `YYYY-MM-DD`.
pub fn format_date(day: Time) -> String {
    let (year, month, day) = civil_from_days(day);
    format!("{year:04}-{month:02}-{day:02}")
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 of the given proleptic Gregorian date.
///
/// Years are bounded by `i32`, so the intermediate values cannot overflow.
fn days_from_civil(year: i32, month: u32, day: u32) -> Time {
    let year = i64::from(year) - i64::from(month <= 2);
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month = i64::from(month);
    let day = i64::from(day);
    let day_of_year = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

/// Inverse of [days_from_civil].
fn civil_from_days(days: Time) -> (i64, u32, u32) {
    let shifted = days + 719_468;
    let era = shifted.div_euclid(146_097);
    let day_of_era = shifted - era * 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = year_of_era + era * 400 + i64::from(month <= 2);

    (
        year,
        u32::try_from(month).unwrap_or(1),
        u32::try_from(day).unwrap_or(1),
    )
}
