//! Persistence contract for ledger records, plus the bundled backends.
//!
//! The scheduler and API layers talk to [`LedgerStore`] only; the concrete
//! backend is chosen at startup. All template mutations go through the
//! compare-and-set [`LedgerStore::update_template`] so a user stopping a
//! recurrence mid-sweep and the sweep advancing `next_run` resolve to
//! exactly one winner instead of a blind last-write.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use centime_core::{LedgerError, LedgerRecord, OwnerId, RecordId, RecurringTemplate};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// The template fields a caller read before mutating. The update applies
/// only while they still hold, otherwise it reports a conflict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateExpectation {
    pub active: bool,
    pub next_run: Option<DateTime<Utc>>,
}

/// Fields a conditional template update may change. `None` leaves the
/// field as-is; the outer `Some` on `next_run` distinguishes "set to this
/// date" from "clear it" (`Some(None)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateChanges {
    pub active: Option<bool>,
    pub next_run: Option<Option<DateTime<Utc>>>,
}

/// Income total for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub year: i32,
    pub month: u32,
    pub total: Decimal,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new record, returning its id.
    async fn insert(&self, record: LedgerRecord) -> Result<RecordId, LedgerError>;

    /// All active templates whose `next_run` is strictly before `before`,
    /// oldest due first.
    async fn find_due_templates(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<RecurringTemplate>, LedgerError>;

    /// Look up a template by id, scoped to its owner. Rows belonging to
    /// other owners are indistinguishable from absent ones.
    async fn find_template(
        &self,
        id: RecordId,
        owner_id: OwnerId,
    ) -> Result<Option<RecurringTemplate>, LedgerError>;

    /// Conditionally update a template. Returns `false` when the
    /// expectation no longer holds or the row is gone — the caller must
    /// re-read before retrying.
    async fn update_template(
        &self,
        id: RecordId,
        expected: &TemplateExpectation,
        changes: TemplateChanges,
    ) -> Result<bool, LedgerError>;

    /// Every record owned by `owner_id`, newest first.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<LedgerRecord>, LedgerError>;

    /// Income totals per calendar month for the trailing `months` months
    /// ending at `now`'s month, oldest first. Months without income are
    /// present with a zero total.
    async fn monthly_income_totals(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
        months: u32,
    ) -> Result<Vec<MonthlyTotal>, LedgerError>;
}

/// The `(year, month)` buckets for the trailing `months` months ending at
/// `now`'s month, oldest first.
pub(crate) fn trailing_months(now: DateTime<Utc>, months: u32) -> Vec<(i32, u32)> {
    let mut out = Vec::with_capacity(months as usize);
    let mut year = now.year();
    let mut month = now.month() as i32;
    for _ in 0..months {
        out.push((year, month as u32));
        month -= 1;
        if month == 0 {
            month = 12;
            year -= 1;
        }
    }
    out.reverse();
    out
}

/// Expand sparse `(year, month) -> total` sums into the full trailing
/// window, zero-filling empty months.
pub(crate) fn fill_months(
    window: &[(i32, u32)],
    sums: &std::collections::HashMap<(i32, u32), Decimal>,
) -> Vec<MonthlyTotal> {
    window
        .iter()
        .map(|&(year, month)| MonthlyTotal {
            year,
            month,
            total: sums.get(&(year, month)).copied().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trailing_months_spans_year_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();
        let window = trailing_months(now, 4);
        assert_eq!(window, vec![(2023, 11), (2023, 12), (2024, 1), (2024, 2)]);
    }

    #[test]
    fn trailing_months_single() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(trailing_months(now, 1), vec![(2024, 7)]);
    }

    #[test]
    fn fill_months_zero_fills_gaps() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let window = trailing_months(now, 3);
        let mut sums = std::collections::HashMap::new();
        sums.insert((2024, 2), Decimal::new(5000, 2));

        let totals = fill_months(&window, &sums);
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].total, Decimal::ZERO);
        assert_eq!(totals[1].total, Decimal::new(5000, 2));
        assert_eq!(totals[2].total, Decimal::ZERO);
    }
}
