use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A calendar month, written `YYYY-MM` on the wire and in the database.
///
/// Held as the first day of the month so every accessor is infallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(NaiveDate);

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        let next = self.next().0;
        next.pred_opt().filter(|_| next > self.0).unwrap_or(self.0)
    }

    pub fn days(&self) -> u32 {
        self.last_day().day()
    }

    pub fn next(&self) -> Self {
        self.offset(1)
    }

    /// Shift by a signed number of months.
    pub fn offset(&self, months: i32) -> Self {
        let shifted = if months >= 0 {
            self.0.checked_add_months(Months::new(months as u32))
        } else {
            self.0.checked_sub_months(Months::new(months.unsigned_abs()))
        };
        shifted.map(Self).unwrap_or(*self)
    }

    /// Inclusive range of periods from `self - back` to `self + forward`.
    pub fn window(&self, back: u32, forward: u32) -> Vec<Period> {
        (-(back as i32)..=forward as i32)
            .map(|delta| self.offset(delta))
            .collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePeriodError(String);

impl fmt::Display for ParsePeriodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid period '{}', expected YYYY-MM", self.0)
    }
}

impl std::error::Error for ParsePeriodError {}

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePeriodError(s.to_string());
        let (y, m) = s.split_once('-').ok_or_else(err)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(err());
        }
        let year: i32 = y.parse().map_err(|_| err())?;
        let month: u32 = m.parse().map_err(|_| err())?;
        Period::new(year, month).ok_or_else(err)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Add calendar months, clamping to the last day of the target month
/// (31 Jan + 1 month = 28/29 Feb).
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_and_formats() {
        let p: Period = "2026-03".parse().unwrap();
        assert_eq!(p.year(), 2026);
        assert_eq!(p.month(), 3);
        assert_eq!(p.to_string(), "2026-03");
    }

    #[test]
    fn rejects_malformed_periods() {
        for bad in ["2026-13", "2026-00", "26-03", "2026/03", "2026-3", "abcd-ef", ""] {
            assert!(bad.parse::<Period>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn month_bounds() {
        let feb = Period::new(2028, 2).unwrap();
        assert_eq!(feb.first_day(), d(2028, 2, 1));
        assert_eq!(feb.last_day(), d(2028, 2, 29));
        assert_eq!(feb.days(), 29);
        assert_eq!(Period::new(2026, 12).unwrap().last_day(), d(2026, 12, 31));
    }

    #[test]
    fn offsets_cross_year_boundaries() {
        let jan = Period::new(2026, 1).unwrap();
        assert_eq!(jan.offset(-1), Period::new(2025, 12).unwrap());
        assert_eq!(jan.offset(-13), Period::new(2024, 12).unwrap());
        assert_eq!(jan.offset(23), Period::new(2027, 12).unwrap());
    }

    #[test]
    fn window_is_inclusive_and_ordered() {
        let now = Period::new(2026, 10).unwrap();
        let w = now.window(2, 1);
        let labels: Vec<String> = w.iter().map(|p| p.to_string()).collect();
        assert_eq!(labels, ["2026-08", "2026-09", "2026-10", "2026-11"]);
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        assert_eq!(add_months(d(2026, 1, 31), 1), d(2026, 2, 28));
        assert_eq!(add_months(d(2026, 1, 15), 12), d(2027, 1, 15));
    }

    #[test]
    fn serde_uses_string_form() {
        let p = Period::new(2026, 7).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"2026-07\"");
        let back: Period = serde_json::from_str("\"2026-07\"").unwrap();
        assert_eq!(back, p);
    }
}
