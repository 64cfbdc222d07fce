//! Pure next-occurrence stepping for recurring templates.
//!
//! No side effects and no reads of the ambient clock: the sweep relies on
//! identical inputs producing identical outputs when it re-runs after an
//! interruption.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Fixed recurrence interval units.
///
/// Unknown units are rejected where untrusted strings enter (serde on the
/// wire, [`FromStr`] for query params), so a template can never hold an
/// interval the calculator does not understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            "yearly" => Ok(Interval::Yearly),
            other => Err(LedgerError::InvalidInterval(other.to_string())),
        }
    }
}

/// Compute the occurrence that follows `anchor` for the given interval.
///
/// Monthly steps clamp the day-of-month to the target month's last valid
/// day (Jan 31 + 1 month → Feb 28/29). Yearly steps clamp Feb 29 → Feb 28
/// on non-leap targets. The time of day is preserved.
pub fn next_occurrence(anchor: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    match interval {
        Interval::Daily => anchor + Duration::days(1),
        Interval::Weekly => anchor + Duration::days(7),
        Interval::Monthly => step_months(anchor, 1),
        Interval::Yearly => step_months(anchor, 12),
    }
}

/// Add `months` calendar months, clamping the day to the target month.
fn step_months(anchor: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let date = anchor.date_naive();
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(last_day_of_month(year, month));

    let stepped = NaiveDate::from_ymd_opt(year, month, day)
        .expect("clamped day is valid for target month");
    stepped.and_time(anchor.time()).and_utc()
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    // -- daily / weekly ----------------------------------------------------

    #[test]
    fn daily_adds_one_day() {
        assert_eq!(next_occurrence(at(2024, 3, 10), Interval::Daily), at(2024, 3, 11));
    }

    #[test]
    fn weekly_adds_seven_days() {
        assert_eq!(next_occurrence(at(2024, 3, 10), Interval::Weekly), at(2024, 3, 17));
    }

    #[test]
    fn daily_crosses_month_boundary() {
        assert_eq!(next_occurrence(at(2024, 1, 31), Interval::Daily), at(2024, 2, 1));
    }

    // -- monthly clamping --------------------------------------------------

    #[test]
    fn monthly_clamps_jan_31_to_leap_feb_29() {
        assert_eq!(next_occurrence(at(2024, 1, 31), Interval::Monthly), at(2024, 2, 29));
    }

    #[test]
    fn monthly_clamps_jan_31_to_feb_28_off_leap() {
        assert_eq!(next_occurrence(at(2023, 1, 31), Interval::Monthly), at(2023, 2, 28));
    }

    #[test]
    fn monthly_clamps_mar_31_to_apr_30() {
        assert_eq!(next_occurrence(at(2024, 3, 31), Interval::Monthly), at(2024, 4, 30));
    }

    #[test]
    fn monthly_mid_month_is_plain_step() {
        assert_eq!(next_occurrence(at(2024, 3, 15), Interval::Monthly), at(2024, 4, 15));
    }

    #[test]
    fn monthly_crosses_year_boundary() {
        assert_eq!(next_occurrence(at(2024, 12, 31), Interval::Monthly), at(2025, 1, 31));
    }

    // -- yearly clamping ---------------------------------------------------

    #[test]
    fn yearly_clamps_feb_29_to_feb_28() {
        assert_eq!(next_occurrence(at(2024, 2, 29), Interval::Yearly), at(2025, 2, 28));
    }

    #[test]
    fn yearly_plain_step() {
        assert_eq!(next_occurrence(at(2024, 3, 10), Interval::Yearly), at(2025, 3, 10));
    }

    // -- misc --------------------------------------------------------------

    #[test]
    fn preserves_time_of_day() {
        let anchor = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let next = next_occurrence(anchor, Interval::Monthly);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
    }

    #[test]
    fn interval_parses_wire_strings() {
        assert_eq!("monthly".parse::<Interval>().unwrap(), Interval::Monthly);
        assert!(matches!(
            "fortnightly".parse::<Interval>(),
            Err(LedgerError::InvalidInterval(_))
        ));
    }

    #[test]
    fn interval_rejected_in_json_payloads() {
        assert!(serde_json::from_str::<Interval>("\"hourly\"").is_err());
    }
}
