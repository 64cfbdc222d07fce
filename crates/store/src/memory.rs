//! In-memory [`LedgerStore`] backend.
//!
//! Backs the test suites and dev mode when Postgres is not configured.
//! Conditional updates take the write lock for the whole compare-and-set,
//! so they are atomic with respect to every other mutation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use centime_core::{
    LedgerError, LedgerRecord, OwnerId, RecordId, RecurringTemplate, TransactionKind,
};

use crate::{
    fill_months, trailing_months, LedgerStore, MonthlyTotal, TemplateChanges, TemplateExpectation,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<RecordId, LedgerRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (all owners, both kinds).
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert(&self, record: LedgerRecord) -> Result<RecordId, LedgerError> {
        let id = record.id();
        let mut map = self.records.write().await;
        if map.contains_key(&id) {
            return Err(LedgerError::Persistence(format!(
                "record {id} already exists"
            )));
        }
        map.insert(id, record);
        Ok(id)
    }

    async fn find_due_templates(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<RecurringTemplate>, LedgerError> {
        let map = self.records.read().await;
        let mut due: Vec<RecurringTemplate> = map
            .values()
            .filter_map(LedgerRecord::as_template)
            .filter(|t| t.active && t.next_run.is_some_and(|run| run < before))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run);
        Ok(due)
    }

    async fn find_template(
        &self,
        id: RecordId,
        owner_id: OwnerId,
    ) -> Result<Option<RecurringTemplate>, LedgerError> {
        let map = self.records.read().await;
        Ok(map
            .get(&id)
            .and_then(LedgerRecord::as_template)
            .filter(|t| t.owner_id == owner_id)
            .cloned())
    }

    async fn update_template(
        &self,
        id: RecordId,
        expected: &TemplateExpectation,
        changes: TemplateChanges,
    ) -> Result<bool, LedgerError> {
        let mut map = self.records.write().await;
        let Some(LedgerRecord::Template(template)) = map.get_mut(&id) else {
            return Ok(false);
        };

        if template.active != expected.active || template.next_run != expected.next_run {
            debug!(template_id = %id, "conditional update expectation no longer holds");
            return Ok(false);
        }

        if let Some(active) = changes.active {
            template.active = active;
        }
        if let Some(next_run) = changes.next_run {
            template.next_run = next_run;
        }
        Ok(true)
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<LedgerRecord>, LedgerError> {
        let map = self.records.read().await;
        let mut records: Vec<LedgerRecord> = map
            .values()
            .filter(|r| r.owner_id() == owner_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.effective_time()));
        Ok(records)
    }

    async fn monthly_income_totals(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
        months: u32,
    ) -> Result<Vec<MonthlyTotal>, LedgerError> {
        let window = trailing_months(now, months);
        let map = self.records.read().await;

        // A template's anchor row counts once, matching how the list view
        // shows it alongside the realized occurrences it spawned.
        let mut sums: HashMap<(i32, u32), Decimal> = HashMap::new();
        for record in map.values() {
            if record.owner_id() != owner_id
                || record.details().kind != TransactionKind::Income
            {
                continue;
            }
            let at = record.effective_time();
            *sums.entry((at.year(), at.month())).or_default() += record.details().amount;
        }

        Ok(fill_months(&window, &sums))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use centime_core::{Interval, TransactionDetails};
    use uuid::Uuid;

    fn details(kind: TransactionKind, amount: Decimal) -> TransactionDetails {
        TransactionDetails {
            description: "salary".to_string(),
            amount,
            category: "work".to_string(),
            kind,
        }
    }

    fn template(owner_id: OwnerId, next_run: DateTime<Utc>) -> RecurringTemplate {
        RecurringTemplate {
            id: Uuid::new_v4(),
            owner_id,
            details: details(TransactionKind::Expense, Decimal::new(-4999, 2)),
            anchored_at: next_run - chrono::Duration::days(30),
            interval: Interval::Monthly,
            next_run: Some(next_run),
            active: true,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let t = template(Uuid::new_v4(), at(2024, 2, 1));
        store.insert(LedgerRecord::Template(t.clone())).await.unwrap();

        let dup = store.insert(LedgerRecord::Template(t)).await;
        assert!(matches!(dup, Err(LedgerError::Persistence(_))));
    }

    #[tokio::test]
    async fn due_selection_is_strictly_before() {
        let store = MemoryStore::new();
        let boundary = at(2024, 2, 1);
        let due = template(Uuid::new_v4(), at(2024, 1, 31));
        let not_due = template(Uuid::new_v4(), boundary);
        store.insert(LedgerRecord::Template(due.clone())).await.unwrap();
        store.insert(LedgerRecord::Template(not_due)).await.unwrap();

        let selected = store.find_due_templates(boundary).await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, due.id);
    }

    #[tokio::test]
    async fn inactive_templates_are_never_due() {
        let store = MemoryStore::new();
        let mut t = template(Uuid::new_v4(), at(2024, 1, 31));
        t.active = false;
        t.next_run = None;
        store.insert(LedgerRecord::Template(t)).await.unwrap();

        let selected = store.find_due_templates(at(2024, 6, 1)).await.unwrap();
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn find_template_is_owner_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let t = template(owner, at(2024, 2, 1));
        store.insert(LedgerRecord::Template(t.clone())).await.unwrap();

        assert!(store.find_template(t.id, owner).await.unwrap().is_some());
        assert!(store
            .find_template(t.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_template_applies_when_expectation_holds() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let run = at(2024, 1, 31);
        let t = template(owner, run);
        store.insert(LedgerRecord::Template(t.clone())).await.unwrap();

        let applied = store
            .update_template(
                t.id,
                &TemplateExpectation { active: true, next_run: Some(run) },
                TemplateChanges {
                    next_run: Some(Some(at(2024, 2, 29))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(applied);

        let updated = store.find_template(t.id, owner).await.unwrap().unwrap();
        assert_eq!(updated.next_run, Some(at(2024, 2, 29)));
        assert!(updated.active);
    }

    #[tokio::test]
    async fn update_template_refuses_stale_expectation() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let run = at(2024, 1, 31);
        let t = template(owner, run);
        store.insert(LedgerRecord::Template(t.clone())).await.unwrap();

        // Someone else advanced next_run first.
        let applied = store
            .update_template(
                t.id,
                &TemplateExpectation { active: true, next_run: Some(at(2023, 12, 31)) },
                TemplateChanges { active: Some(false), next_run: Some(None) },
            )
            .await
            .unwrap();
        assert!(!applied);

        let unchanged = store.find_template(t.id, owner).await.unwrap().unwrap();
        assert_eq!(unchanged.next_run, Some(run));
        assert!(unchanged.active);
    }

    #[tokio::test]
    async fn update_template_missing_row_is_conflict_not_error() {
        let store = MemoryStore::new();
        let applied = store
            .update_template(
                Uuid::new_v4(),
                &TemplateExpectation { active: true, next_run: None },
                TemplateChanges::default(),
            )
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn monthly_totals_sum_income_only() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let now = at(2024, 3, 15);

        store
            .insert(LedgerRecord::Occurrence(centime_core::RealizedOccurrence {
                id: Uuid::new_v4(),
                owner_id: owner,
                details: details(TransactionKind::Income, Decimal::new(300000, 2)),
                occurred_at: at(2024, 3, 1),
            }))
            .await
            .unwrap();
        store
            .insert(LedgerRecord::Occurrence(centime_core::RealizedOccurrence {
                id: Uuid::new_v4(),
                owner_id: owner,
                details: details(TransactionKind::Expense, Decimal::new(-5000, 2)),
                occurred_at: at(2024, 3, 2),
            }))
            .await
            .unwrap();
        // Another user's income must not bleed in.
        store
            .insert(LedgerRecord::Occurrence(centime_core::RealizedOccurrence {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                details: details(TransactionKind::Income, Decimal::new(100000, 2)),
                occurred_at: at(2024, 3, 3),
            }))
            .await
            .unwrap();

        let totals = store.monthly_income_totals(owner, now, 2).await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].total, Decimal::ZERO);
        assert_eq!(totals[1].total, Decimal::new(300000, 2));
    }
}
