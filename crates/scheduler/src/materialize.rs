//! Turns a due template into a realized ledger entry.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use centime_core::{LedgerError, LedgerRecord, RealizedOccurrence, RecurringTemplate};
use centime_store::LedgerStore;

/// Build the realized occurrence for a template due at `due_at`.
/// Pure; the store write happens in [`materialize`].
pub fn build_occurrence(
    template: &RecurringTemplate,
    due_at: DateTime<Utc>,
) -> RealizedOccurrence {
    RealizedOccurrence {
        id: Uuid::new_v4(),
        owner_id: template.owner_id,
        details: template.details.clone(),
        occurred_at: due_at,
    }
}

/// Persist the realized occurrence for a due template.
///
/// The template itself is never touched here. On a failed write the caller
/// must leave `next_run` unchanged so the occurrence is retried by the
/// next sweep instead of being silently skipped.
pub async fn materialize(
    store: &dyn LedgerStore,
    template: &RecurringTemplate,
) -> Result<RealizedOccurrence, LedgerError> {
    // A template without a due date was stopped between selection and
    // processing; report the lost race.
    let due_at = template.next_run.ok_or(LedgerError::Conflict)?;

    let occurrence = build_occurrence(template, due_at);
    store
        .insert(LedgerRecord::Occurrence(occurrence.clone()))
        .await?;
    Ok(occurrence)
}
