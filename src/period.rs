use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::meter::MeterNode;

/// A calendar month. Orders chronologically (year, then month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidInput(format!("month {} out of range", month)));
        }
        // Both the month and the one after it must be representable dates.
        if NaiveDate::from_ymd_opt(year, month, 1).is_none()
            || (month == 12 && NaiveDate::from_ymd_opt(year.saturating_add(1), 1, 1).is_none())
        {
            return Err(Error::InvalidInput(format!("year {} out of range", year)));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following month, wrapping December into January of the next year.
    pub fn next(self) -> Self {
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

    fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days_in_month(self) -> u32 {
        match (self.first_day(), self.next().first_day()) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 31,
        }
    }

    /// Parse a `YYYY-MM` range boundary.
    pub fn parse_iso(raw: &str) -> Option<Self> {
        NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
            .ok()
            .map(Self::from)
    }

    /// Parse a `Mon-YY` reading column such as `Jan-25`.
    pub fn parse_label(raw: &str) -> Option<Self> {
        NaiveDate::parse_from_str(&format!("01-{}", raw.trim()), "%d-%b-%y")
            .ok()
            .map(Self::from)
    }

    /// The `Mon-YY` key readings are stored under.
    pub fn label(&self) -> String {
        match self.first_day() {
            Some(day) => day.format("%b-%y").to_string(),
            None => format!("{:02}-{}", self.month, self.year),
        }
    }

    pub fn iso(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl From<NaiveDate> for MonthKey {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl FromStr for MonthKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse_iso(raw)
            .or_else(|| Self::parse_label(raw))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "'{}' is not a month (expected YYYY-MM or Mon-YY)",
                    raw
                ))
            })
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Canonical form of a reading key: month columns become `Mon-YY`, day
/// columns become the bare day number, anything else is kept trimmed.
pub fn canonical_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(month) = MonthKey::parse_label(trimmed).or_else(|| MonthKey::parse_iso(trimmed)) {
        return month.label();
    }
    match trimmed.parse::<u32>() {
        Ok(day) if (1..=31).contains(&day) => day.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Inclusive span of periods a reading sum runs over. Month ranges step one
/// calendar month at a time; day ranges step one day inside a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodRange {
    Months { start: MonthKey, end: MonthKey },
    Days { month: MonthKey, first: u32, last: u32 },
}

impl PeriodRange {
    pub fn months(start: MonthKey, end: MonthKey) -> Self {
        PeriodRange::Months { start, end }
    }

    pub fn single_month(month: MonthKey) -> Self {
        PeriodRange::Months {
            start: month,
            end: month,
        }
    }

    /// A day range inside `month`. `last` is clamped to the month length.
    pub fn days(month: MonthKey, first: u32, last: u32) -> Self {
        PeriodRange::Days {
            month,
            first: first.max(1),
            last: last.min(month.days_in_month()),
        }
    }

    pub fn whole_month_days(month: MonthKey) -> Self {
        Self::days(month, 1, month.days_in_month())
    }

    /// Reading keys covered by the range, in chronological order. A range
    /// whose start lies after its end covers nothing.
    pub fn keys(&self) -> Vec<String> {
        match *self {
            PeriodRange::Months { .. } => self.month_keys().iter().map(|m| m.label()).collect(),
            PeriodRange::Days { first, last, .. } => {
                if first > last {
                    return Vec::new();
                }
                (first..=last).map(|d| d.to_string()).collect()
            }
        }
    }

    /// Months covered by a month range; a day range covers its one month.
    pub fn month_keys(&self) -> Vec<MonthKey> {
        match *self {
            PeriodRange::Months { start, end } => {
                let mut out = Vec::new();
                let mut cur = start;
                while cur <= end {
                    out.push(cur);
                    cur = cur.next();
                }
                out
            }
            PeriodRange::Days { month, first, last } => {
                if first > last {
                    Vec::new()
                } else {
                    vec![month]
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match *self {
            PeriodRange::Months { start, end } => start > end,
            PeriodRange::Days { first, last, .. } => first > last,
        }
    }

    pub fn label(&self) -> String {
        match *self {
            PeriodRange::Months { start, end } if start == end => start.label(),
            PeriodRange::Months { start, end } => format!("{} to {}", start, end),
            PeriodRange::Days { month, first, last } => {
                format!("{} days {}-{}", month, first, last)
            }
        }
    }
}

/// Sum of a meter's readings over every key in `range`. Missing keys read as 0.
pub fn sum_in_range(node: &MeterNode, range: &PeriodRange) -> f64 {
    range.keys().iter().map(|key| node.reading(key)).sum()
}

/// Every month that appears as a reading key on at least one node.
pub fn available_months(nodes: &[MeterNode]) -> Vec<MonthKey> {
    let months: BTreeSet<MonthKey> = nodes
        .iter()
        .flat_map(|n| n.readings.keys())
        .filter_map(|k| MonthKey::parse_label(k))
        .collect();
    months.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::{Level, MeterNode};
    use std::collections::BTreeMap;

    fn month(raw: &str) -> MonthKey {
        raw.parse().unwrap()
    }

    fn node_with(readings: &[(&str, f64)]) -> MeterNode {
        MeterNode {
            readings: readings
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            ..MeterNode::placeholder("m", Level::L3)
        }
    }

    #[test]
    fn parses_both_month_formats() {
        assert_eq!(month("2025-01"), month("Jan-25"));
        assert_eq!(month("2024-12").label(), "Dec-24");
        assert_eq!(month("Feb-25").iso(), "2025-02");
        assert!("January".parse::<MonthKey>().is_err());
        assert!("2025-13".parse::<MonthKey>().is_err());
    }

    #[test]
    fn rejects_years_outside_the_calendar() {
        assert!(MonthKey::new(i32::MAX, 12).is_err());
        assert!(MonthKey::new(i32::MIN, 1).is_err());
        assert!("99999999-12".parse::<MonthKey>().is_err());
        assert_eq!(MonthKey::new(2024, 12).unwrap().next(), month("2025-01"));
    }

    #[test]
    fn month_stepping_wraps_year() {
        let range = PeriodRange::months(month("2024-11"), month("2025-02"));
        assert_eq!(range.keys(), vec!["Nov-24", "Dec-24", "Jan-25", "Feb-25"]);
    }

    #[test]
    fn reversed_range_is_empty() {
        let range = PeriodRange::months(month("2025-03"), month("2025-01"));
        assert!(range.is_empty());
        assert!(range.keys().is_empty());
        assert_eq!(sum_in_range(&node_with(&[("Jan-25", 5.0)]), &range), 0.0);
    }

    #[test]
    fn day_stepping_clamps_to_month_length() {
        let range = PeriodRange::days(month("2025-02"), 27, 31);
        assert_eq!(range.keys(), vec!["27", "28"]);
        let leap = PeriodRange::whole_month_days(month("2024-02"));
        assert_eq!(leap.keys().len(), 29);
    }

    #[test]
    fn sums_month_range_with_gaps() {
        let node = node_with(&[("Jan-25", 100.0), ("Mar-25", 50.5), ("Apr-25", 7.0)]);
        let range = PeriodRange::months(month("2025-01"), month("2025-03"));
        assert!((sum_in_range(&node, &range) - 150.5).abs() < 1e-9);
    }

    #[test]
    fn single_period_equals_reading() {
        let node = node_with(&[("Jan-25", 1892.0)]);
        for raw in ["2025-01", "2025-02"] {
            let m = month(raw);
            let expected = node.readings.get(&m.label()).copied().unwrap_or(0.0);
            assert_eq!(sum_in_range(&node, &PeriodRange::single_month(m)), expected);
        }
    }

    #[test]
    fn sums_day_range() {
        let node = node_with(&[("1", 10.0), ("2", 20.0), ("3", 30.0)]);
        let range = PeriodRange::days(month("2025-01"), 2, 3);
        assert_eq!(sum_in_range(&node, &range), 50.0);
    }

    #[test]
    fn canonical_keys() {
        assert_eq!(canonical_key(" 2025-01 "), "Jan-25");
        assert_eq!(canonical_key("jan-25"), "Jan-25");
        assert_eq!(canonical_key("07"), "7");
        assert_eq!(canonical_key("Total"), "Total");
    }

    #[test]
    fn lists_available_months_in_order() {
        let a = node_with(&[("Feb-25", 1.0), ("Total", 3.0)]);
        let b = node_with(&[("Dec-24", 1.0), ("Feb-25", 2.0)]);
        let months = available_months(&[a, b]);
        assert_eq!(months, vec![month("2024-12"), month("2025-02")]);
    }
}
