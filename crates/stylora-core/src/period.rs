//! # Payment Period
//!
//! The `"YYYY-MM"` key that groups calculations, payments and usage invoices.
//! Parsed once at the edge so the rest of the code never handles a raw
//! string that might read `"2025-3"` or `"March"`.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// A calendar month, displayed and stored as `"YYYY-MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[ts(export, type = "string")]
pub struct PaymentPeriod {
    year: i32,
    month: u32,
}

impl PaymentPeriod {
    /// Builds a period, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return Err(invalid("month must be 01-12 and year 1970-9999"));
        }
        Ok(Self { year, month })
    }

    /// The period a date falls into.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First calendar day of the period.
    pub fn first_day(&self) -> NaiveDate {
        // year/month validated at construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the period.
    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day() - Duration::days(1)
    }

    /// The following month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month (used by the billing run: bill last month).
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// True when `date` falls inside this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Compact form used in invoice numbers (`202503`).
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

fn invalid(reason: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: "payment_period".to_string(),
        reason: reason.to_string(),
    }
}

impl fmt::Display for PaymentPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PaymentPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected YYYY-MM"))?;

        if year.len() != 4 || month.len() != 2 {
            return Err(invalid("expected YYYY-MM"));
        }

        let year: i32 = year.parse().map_err(|_| invalid("year is not a number"))?;
        let month: u32 = month.parse().map_err(|_| invalid("month is not a number"))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for PaymentPeriod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for PaymentPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PaymentPeriod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p: PaymentPeriod = "2025-03".parse().unwrap();
        assert_eq!(p.year(), 2025);
        assert_eq!(p.month(), 3);
        assert_eq!(p.to_string(), "2025-03");
        assert_eq!(p.compact(), "202503");

        assert!("2025-3".parse::<PaymentPeriod>().is_err());
        assert!("2025-13".parse::<PaymentPeriod>().is_err());
        assert!("March".parse::<PaymentPeriod>().is_err());
    }

    #[test]
    fn test_bounds() {
        let feb: PaymentPeriod = "2024-02".parse().unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec: PaymentPeriod = "2024-12".parse().unwrap();
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(dec.next().to_string(), "2025-01");
        assert_eq!(dec.next().previous(), dec);
    }

    #[test]
    fn test_of_and_contains() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let p = PaymentPeriod::of(date);
        assert_eq!(p.to_string(), "2025-06");
        assert!(p.contains(date));
        assert!(!p.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }
}
