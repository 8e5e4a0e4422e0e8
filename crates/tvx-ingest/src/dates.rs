//! Date cell parsing.

use chrono::{Days, NaiveDate};

use crate::options::FractionalDays;

const ISO_FORMAT: &str = "%Y-%m-%d";
const STATA_FORMAT: &str = "%d%b%Y";

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Outcome of reading one date cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCell {
    Missing,
    Date(NaiveDate),
    Invalid,
}

/// Parse a date cell: ISO `2020-01-31`, `31jan2020`, or a number of days
/// since 1970-01-01.
pub fn parse_date(raw: &str, fractional: FractionalDays) -> DateCell {
    let raw = raw.trim();
    if raw.is_empty() || raw == "." {
        return DateCell::Missing;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, ISO_FORMAT) {
        return DateCell::Date(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, STATA_FORMAT) {
        return DateCell::Date(date);
    }
    match raw.parse::<f64>() {
        Ok(days) if days.is_finite() => from_day_number(days, fractional),
        _ => DateCell::Invalid,
    }
}

fn from_day_number(days: f64, fractional: FractionalDays) -> DateCell {
    let whole = match fractional {
        FractionalDays::Floor => days.floor(),
        FractionalDays::Round => days.round(),
        FractionalDays::Reject if days.fract() != 0.0 => return DateCell::Invalid,
        FractionalDays::Reject => days,
    };
    if whole.abs() > 3_000_000.0 {
        return DateCell::Invalid;
    }
    let offset = Days::new(whole.abs() as u64);
    let date = if whole >= 0.0 {
        epoch().checked_add_days(offset)
    } else {
        epoch().checked_sub_days(offset)
    };
    date.map_or(DateCell::Invalid, DateCell::Date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> DateCell {
        DateCell::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_formats() {
        assert_eq!(parse_date("2020-01-31", FractionalDays::Floor), date(2020, 1, 31));
        assert_eq!(parse_date("31jan2020", FractionalDays::Floor), date(2020, 1, 31));
        assert_eq!(parse_date("31JAN2020", FractionalDays::Floor), date(2020, 1, 31));
        assert_eq!(parse_date("0", FractionalDays::Floor), date(1970, 1, 1));
        assert_eq!(parse_date("-1", FractionalDays::Floor), date(1969, 12, 31));
        assert_eq!(parse_date("18262", FractionalDays::Floor), date(2020, 1, 1));
    }

    #[test]
    fn test_missing_and_invalid() {
        assert_eq!(parse_date("", FractionalDays::Floor), DateCell::Missing);
        assert_eq!(parse_date(" . ", FractionalDays::Floor), DateCell::Missing);
        assert_eq!(parse_date("2020-02-30", FractionalDays::Floor), DateCell::Invalid);
        assert_eq!(parse_date("soon", FractionalDays::Floor), DateCell::Invalid);
        assert_eq!(parse_date("1e300", FractionalDays::Floor), DateCell::Invalid);
    }

    #[test]
    fn test_fractional_policies() {
        assert_eq!(parse_date("18262.6", FractionalDays::Floor), date(2020, 1, 1));
        assert_eq!(parse_date("18262.5", FractionalDays::Round), date(2020, 1, 2));
        assert_eq!(parse_date("18262.4", FractionalDays::Round), date(2020, 1, 1));
        assert_eq!(parse_date("18262.5", FractionalDays::Reject), DateCell::Invalid);
        assert_eq!(parse_date("18262.0", FractionalDays::Reject), date(2020, 1, 1));
    }
}
