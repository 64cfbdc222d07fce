//! One selection-and-materialization cycle over due templates.
//!
//! Templates are processed in isolation: a failure is logged, carried in
//! the report, and skipped — it never aborts the rest of the cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use centime_core::{next_occurrence, LedgerError, RecordId, RecurringTemplate};
use centime_store::{LedgerStore, TemplateChanges, TemplateExpectation};

use crate::clock::Clock;
use crate::materialize::materialize;

/// Outcome of processing one due template.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// Occurrence written and the template advanced.
    Materialized {
        occurrence_id: RecordId,
        next_run: DateTime<Utc>,
    },
    /// The advance lost a concurrent update, usually a user stop. The
    /// occurrence may already exist; surfaced rather than absorbed.
    Conflict,
    /// Materialization or the advance write failed; `next_run` was left
    /// unchanged so the next sweep retries.
    Failed { error: String },
    /// Processing exceeded the per-template budget.
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepItem {
    pub template_id: RecordId,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

/// Summary of one sweep cycle. Per-template errors are carried here;
/// nothing in a sweep is fatal to the host process.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub selected: usize,
    pub materialized: usize,
    pub conflicts: usize,
    pub failures: usize,
    /// Set when the due-template query itself failed; the next scheduled
    /// sweep retries selection.
    pub selection_error: Option<String>,
    pub items: Vec<SweepItem>,
}

impl SweepReport {
    fn empty(started_at: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            started_at,
            window_end,
            selected: 0,
            materialized: 0,
            conflicts: 0,
            failures: 0,
            selection_error: None,
            items: Vec::new(),
        }
    }
}

pub struct SweepDriver {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    item_timeout: Duration,
}

impl SweepDriver {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, item_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            item_timeout,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Run one sweep: select everything due before the start of the next
    /// calendar day, then materialize-and-advance each template.
    pub async fn run_sweep(&self) -> SweepReport {
        let started_at = self.clock.now();
        let window_end = start_of_next_day(started_at);

        let due = match self.store.find_due_templates(window_end).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "due-template selection failed; sweep skipped");
                let mut report = SweepReport::empty(started_at, window_end);
                report.selection_error = Some(e.to_string());
                return report;
            }
        };

        let mut report = SweepReport::empty(started_at, window_end);
        report.selected = due.len();
        report.items.reserve(due.len());

        for template in &due {
            let outcome =
                match tokio::time::timeout(self.item_timeout, self.process(template)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(template_id = %template.id, "template processing timed out");
                        SweepOutcome::TimedOut
                    }
                };
            match &outcome {
                SweepOutcome::Materialized { .. } => report.materialized += 1,
                SweepOutcome::Conflict => report.conflicts += 1,
                SweepOutcome::Failed { .. } | SweepOutcome::TimedOut => report.failures += 1,
            }
            report.items.push(SweepItem {
                template_id: template.id,
                outcome,
            });
        }

        info!(
            selected = report.selected,
            materialized = report.materialized,
            conflicts = report.conflicts,
            failures = report.failures,
            "sweep complete"
        );
        report
    }

    /// Materialize-then-advance for a single template, treated as a unit.
    async fn process(&self, template: &RecurringTemplate) -> SweepOutcome {
        let Some(due_at) = template.next_run else {
            return SweepOutcome::Conflict;
        };

        let occurrence = match materialize(self.store.as_ref(), template).await {
            Ok(o) => o,
            Err(LedgerError::Conflict) => return SweepOutcome::Conflict,
            Err(e) => {
                warn!(
                    template_id = %template.id,
                    error = %e,
                    "materialization failed; next_run left unchanged for retry"
                );
                return SweepOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        // Advance from the due date just consumed, not from the clock, so
        // an overdue template steps through each missed occurrence in turn.
        let advanced = next_occurrence(due_at, template.interval);
        let expected = TemplateExpectation {
            active: true,
            next_run: Some(due_at),
        };
        let changes = TemplateChanges {
            next_run: Some(Some(advanced)),
            active: None,
        };

        match self.store.update_template(template.id, &expected, changes).await {
            Ok(true) => {
                info!(
                    template_id = %template.id,
                    occurrence_id = %occurrence.id,
                    next_run = %advanced,
                    "occurrence materialized"
                );
                SweepOutcome::Materialized {
                    occurrence_id: occurrence.id,
                    next_run: advanced,
                }
            }
            Ok(false) => {
                // The occurrence exists but the template changed under us.
                warn!(
                    template_id = %template.id,
                    occurrence_id = %occurrence.id,
                    "advance lost a concurrent update; occurrence already written"
                );
                SweepOutcome::Conflict
            }
            Err(e) => {
                warn!(
                    template_id = %template.id,
                    error = %e,
                    "failed to advance template after materializing"
                );
                SweepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Midnight at the start of the day after `now` — the sweep window
/// boundary. Everything strictly before it is due now or overdue.
fn start_of_next_day(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + chrono::Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}
