use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A calendar month, stored as `(year, month-of-year)`.
///
/// Every table in the pipeline is keyed on this truncated `(year, month)` value. In
/// polars frames it travels as the integer [`Month::period_index`] in a `period` column
/// next to a `date` column holding the first day of the month.
///
/// # Examples
///
/// ```
/// use border_flows::Month;
///
/// let oct = Month::new(10, 2019);
/// assert_eq!(oct.to_string(), "2019-10");
/// assert_eq!(oct.add_months(3), Month::new(1, 2020));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Month(pub i32, pub u32);

impl Month {
    pub fn year(self) -> i32 {
        self.0
    }
    pub fn month(self) -> u32 {
        self.1
    }
    pub fn new(month: u32, year: i32) -> Self {
        Self(year, month)
    }

    /// Calendar quarter (1-4).
    pub fn quarter(self) -> u32 {
        (self.1 - 1) / 3 + 1
    }

    /// Number of months since January of year 0. Consecutive months differ by exactly one.
    pub fn period_index(self) -> i32 {
        self.0 * 12 + self.1 as i32 - 1
    }

    pub fn from_period_index(index: i32) -> Self {
        Self(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
    }

    pub fn add_months(self, months: i32) -> Self {
        Self::from_period_index(self.period_index() + months)
    }

    /// Months elapsed from `earlier` to `self`. Negative if `earlier` is later.
    pub fn months_since(self, earlier: Month) -> i32 {
        self.period_index() - earlier.period_index()
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0, self.1, 1)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.year(), date.month())
    }

    /// Parses a spreadsheet period header.
    ///
    /// Accepted shapes are a month name followed by a four digit year (`"Oct 2019"`,
    /// `"October 2019"`) and an abbreviated month followed by a two digit year
    /// (`"Oct-19"`), where the two digit year is read as `20xx`. Month names are matched
    /// case-insensitively.
    ///
    /// Returns `None` for anything else.
    pub fn parse_label(label: &str) -> Option<Month> {
        let trimmed = label.trim();
        let (name, year) = trimmed
            .split_once(|c: char| c == ' ' || c == '-')
            .map(|(name, year)| (name.trim(), year.trim()))?;

        let month = chrono::Month::from_str(name).ok()?.number_from_month();
        if !year.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year = match year.len() {
            4 => year.parse::<i32>().ok()?,
            2 => 2000 + year.parse::<i32>().ok()?,
            _ => return None,
        };
        Some(Month(year, month))
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.0, self.1)
    }
}

impl From<NaiveDate> for Month {
    fn from(date: NaiveDate) -> Self {
        Month::from_date(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_abbreviated_four_digit_year() {
        assert_eq!(Month::parse_label("Oct 2019"), Some(Month::new(10, 2019)));
        assert_eq!(Month::parse_label("  jan 2020 "), Some(Month::new(1, 2020)));
    }

    #[test]
    fn test_parse_full_month_name() {
        assert_eq!(Month::parse_label("October 2019"), Some(Month::new(10, 2019)));
        assert_eq!(Month::parse_label("February 2021"), Some(Month::new(2, 2021)));
    }

    #[test]
    fn test_parse_two_digit_year_is_twenty_first_century() {
        assert_eq!(Month::parse_label("Oct-19"), Some(Month::new(10, 2019)));
        assert_eq!(Month::parse_label("Mar-24"), Some(Month::new(3, 2024)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Month::parse_label("Citizenship"), None);
        assert_eq!(Month::parse_label("Smarch 2020"), None);
        assert_eq!(Month::parse_label("Oct 19x9"), None);
        assert_eq!(Month::parse_label("Oct 201"), None);
        assert_eq!(Month::parse_label(""), None);
    }

    #[test]
    fn test_period_index_round_trip_across_year_boundary() {
        let dec = Month::new(12, 2019);
        let jan = Month::new(1, 2020);
        assert_eq!(jan.period_index() - dec.period_index(), 1);
        assert_eq!(Month::from_period_index(dec.period_index()), dec);
        assert_eq!(dec.add_months(14), Month::new(2, 2021));
        assert_eq!(jan.add_months(-1), dec);
        assert_eq!(Month::new(2, 2021).months_since(dec), 14);
    }

    #[test]
    fn test_quarter_and_first_day() {
        assert_eq!(Month::new(1, 2020).quarter(), 1);
        assert_eq!(Month::new(6, 2020).quarter(), 2);
        assert_eq!(Month::new(12, 2020).quarter(), 4);
        assert_eq!(
            Month::new(7, 2024).first_day(),
            NaiveDate::from_ymd_opt(2024, 7, 1)
        );
    }
}
