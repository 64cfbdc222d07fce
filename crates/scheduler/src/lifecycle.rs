//! User-initiated stop of a recurring template.

use std::sync::Arc;

use tracing::{debug, info};

use centime_core::{LedgerError, OwnerId, RecordId, RecurringTemplate};
use centime_store::{LedgerStore, TemplateChanges, TemplateExpectation};

/// Attempts before giving up on a template that keeps changing under us.
const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct LifecycleController {
    store: Arc<dyn LedgerStore>,
}

impl LifecycleController {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Halt a recurrence: `active = false`, `next_run = None`.
    ///
    /// The lookup is owner-scoped — a template belonging to someone else
    /// is indistinguishable from a missing one. Stopping an already
    /// stopped template succeeds without touching state. A concurrent
    /// sweep advancing `next_run` costs a re-read and retry; the stop
    /// still lands because the sweep never flips `active` back.
    pub async fn stop(
        &self,
        template_id: RecordId,
        owner_id: OwnerId,
    ) -> Result<RecurringTemplate, LedgerError> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let template = self
                .store
                .find_template(template_id, owner_id)
                .await?
                .ok_or(LedgerError::NotFound)?;

            if !template.active {
                return Ok(template);
            }

            let expected = TemplateExpectation {
                active: true,
                next_run: template.next_run,
            };
            let changes = TemplateChanges {
                active: Some(false),
                next_run: Some(None),
            };

            if self
                .store
                .update_template(template_id, &expected, changes)
                .await?
            {
                info!(template_id = %template_id, "recurring transaction stopped");
                return Ok(RecurringTemplate {
                    active: false,
                    next_run: None,
                    ..template
                });
            }

            debug!(
                template_id = %template_id,
                attempt,
                "stop lost a concurrent update; re-reading"
            );
        }

        Err(LedgerError::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use centime_core::{
        Interval, LedgerRecord, TransactionDetails, TransactionKind,
    };
    use centime_store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn seeded_template() -> (RecurringTemplate, OwnerId) {
        let owner = Uuid::new_v4();
        let template = RecurringTemplate {
            id: Uuid::new_v4(),
            owner_id: owner,
            details: TransactionDetails {
                description: "gym".to_string(),
                amount: Decimal::new(-3500, 2),
                category: "health".to_string(),
                kind: TransactionKind::Expense,
            },
            anchored_at: Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap(),
            interval: Interval::Monthly,
            next_run: Some(Utc.with_ymd_and_hms(2024, 2, 5, 8, 0, 0).unwrap()),
            active: true,
        };
        (template, owner)
    }

    #[tokio::test]
    async fn stop_clears_recurrence_state() {
        let store = MemoryStore::new();
        let (template, owner) = seeded_template();
        store
            .insert(LedgerRecord::Template(template.clone()))
            .await
            .unwrap();

        let controller = LifecycleController::new(Arc::new(store.clone()));
        let stopped = controller.stop(template.id, owner).await.unwrap();

        assert!(!stopped.active);
        assert_eq!(stopped.next_run, None);

        let stored = store.find_template(template.id, owner).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.next_run, None);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let store = MemoryStore::new();
        let (template, owner) = seeded_template();
        store
            .insert(LedgerRecord::Template(template.clone()))
            .await
            .unwrap();

        let controller = LifecycleController::new(Arc::new(store));
        controller.stop(template.id, owner).await.unwrap();
        let again = controller.stop(template.id, owner).await.unwrap();

        assert!(!again.active);
        assert_eq!(again.next_run, None);
    }

    #[tokio::test]
    async fn stop_rejects_foreign_owner_without_mutating() {
        let store = MemoryStore::new();
        let (template, owner) = seeded_template();
        store
            .insert(LedgerRecord::Template(template.clone()))
            .await
            .unwrap();

        let controller = LifecycleController::new(Arc::new(store.clone()));
        let result = controller.stop(template.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(LedgerError::NotFound)));

        let untouched = store.find_template(template.id, owner).await.unwrap().unwrap();
        assert!(untouched.active);
        assert_eq!(untouched.next_run, template.next_run);
    }

    #[tokio::test]
    async fn stop_unknown_template_is_not_found() {
        let store = MemoryStore::new();
        let controller = LifecycleController::new(Arc::new(store));
        let result = controller.stop(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(LedgerError::NotFound)));
    }
}
