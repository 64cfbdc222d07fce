//! PostgreSQL [`LedgerStore`] backend on sqlx.
//!
//! Conditional updates are expressed as `UPDATE ... WHERE` with the
//! expectation in the predicate; `rows_affected` tells the caller whether
//! the compare-and-set won. The pool's acquire timeout bounds every call
//! so a slow database surfaces as `Persistence` instead of hanging a sweep.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use centime_core::config::PostgresConfig;
use centime_core::{
    LedgerError, LedgerRecord, OwnerId, RealizedOccurrence, RecordId, RecurringTemplate,
    TransactionDetails,
};

use crate::{
    fill_months, trailing_months, LedgerStore, MonthlyTotal, TemplateChanges, TemplateExpectation,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, bound the pool, and apply migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.connection_string())
            .await
            .map_err(pg_err)?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| LedgerError::Persistence(format!("migration failed: {e}")))?;

        info!("PostgreSQL connected: {}", config.host);
        Ok(Self { pool })
    }
}

fn pg_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Persistence(e.to_string())
}

fn record_from_row(row: &PgRow) -> Result<LedgerRecord, LedgerError> {
    let details = TransactionDetails {
        description: row.try_get("description").map_err(pg_err)?,
        amount: row.try_get("amount").map_err(pg_err)?,
        category: row.try_get("category").map_err(pg_err)?,
        kind: row
            .try_get::<String, _>("kind")
            .map_err(pg_err)?
            .parse()
            .map_err(LedgerError::Persistence)?,
    };
    let id: RecordId = row.try_get("id").map_err(pg_err)?;
    let owner_id: OwnerId = row.try_get("owner_id").map_err(pg_err)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(pg_err)?;

    if row.try_get::<bool, _>("is_recurring").map_err(pg_err)? {
        let interval_raw: Option<String> = row.try_get("interval_unit").map_err(pg_err)?;
        let interval = interval_raw
            .ok_or_else(|| LedgerError::Persistence(format!("template {id} has no interval")))?
            .parse()
            .map_err(|_| LedgerError::Persistence(format!("template {id} has a corrupt interval")))?;
        Ok(LedgerRecord::Template(RecurringTemplate {
            id,
            owner_id,
            details,
            anchored_at: occurred_at,
            interval,
            next_run: row.try_get("next_run").map_err(pg_err)?,
            active: row
                .try_get::<Option<bool>, _>("active")
                .map_err(pg_err)?
                .unwrap_or(false),
        }))
    } else {
        Ok(LedgerRecord::Occurrence(RealizedOccurrence {
            id,
            owner_id,
            details,
            occurred_at,
        }))
    }
}

fn template_from_row(row: &PgRow) -> Result<RecurringTemplate, LedgerError> {
    match record_from_row(row)? {
        LedgerRecord::Template(t) => Ok(t),
        LedgerRecord::Occurrence(o) => Err(LedgerError::Persistence(format!(
            "expected a template row, got occurrence {}",
            o.id
        ))),
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert(&self, record: LedgerRecord) -> Result<RecordId, LedgerError> {
        let id = record.id();
        let query = sqlx::query(
            r#"INSERT INTO ledger_records
                   (id, owner_id, description, amount, category, kind,
                    is_recurring, occurred_at, interval_unit, next_run, active)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        );

        let query = match &record {
            LedgerRecord::Template(t) => query
                .bind(t.id)
                .bind(t.owner_id)
                .bind(&t.details.description)
                .bind(t.details.amount)
                .bind(&t.details.category)
                .bind(t.details.kind.as_str())
                .bind(true)
                .bind(t.anchored_at)
                .bind(t.interval.as_str())
                .bind(t.next_run)
                .bind(t.active),
            LedgerRecord::Occurrence(o) => query
                .bind(o.id)
                .bind(o.owner_id)
                .bind(&o.details.description)
                .bind(o.details.amount)
                .bind(&o.details.category)
                .bind(o.details.kind.as_str())
                .bind(false)
                .bind(o.occurred_at)
                .bind(None::<String>)
                .bind(None::<DateTime<Utc>>)
                .bind(None::<bool>),
        };

        query.execute(&self.pool).await.map_err(pg_err)?;
        Ok(id)
    }

    async fn find_due_templates(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<RecurringTemplate>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT * FROM ledger_records
               WHERE is_recurring AND active AND next_run < $1
               ORDER BY next_run"#,
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        rows.iter().map(template_from_row).collect()
    }

    async fn find_template(
        &self,
        id: RecordId,
        owner_id: OwnerId,
    ) -> Result<Option<RecurringTemplate>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT * FROM ledger_records
               WHERE id = $1 AND owner_id = $2 AND is_recurring"#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        row.as_ref().map(template_from_row).transpose()
    }

    async fn update_template(
        &self,
        id: RecordId,
        expected: &TemplateExpectation,
        changes: TemplateChanges,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE ledger_records
               SET active   = CASE WHEN $4 THEN $5 ELSE active END,
                   next_run = CASE WHEN $6 THEN $7 ELSE next_run END
               WHERE id = $1
                 AND is_recurring
                 AND active = $2
                 AND next_run IS NOT DISTINCT FROM $3"#,
        )
        .bind(id)
        .bind(expected.active)
        .bind(expected.next_run)
        .bind(changes.active.is_some())
        .bind(changes.active.unwrap_or(false))
        .bind(changes.next_run.is_some())
        .bind(changes.next_run.flatten())
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<LedgerRecord>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT * FROM ledger_records
               WHERE owner_id = $1
               ORDER BY occurred_at DESC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn monthly_income_totals(
        &self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
        months: u32,
    ) -> Result<Vec<MonthlyTotal>, LedgerError> {
        let window = trailing_months(now, months);
        let Some(&(start_year, start_month)) = window.first() else {
            return Ok(Vec::new());
        };
        let window_start = NaiveDate::from_ymd_opt(start_year, start_month, 1)
            .ok_or_else(|| LedgerError::Persistence("invalid window start".to_string()))?
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();

        let rows = sqlx::query(
            r#"SELECT date_part('year', occurred_at)::INT  AS year,
                      date_part('month', occurred_at)::INT AS month,
                      SUM(amount)                          AS total
               FROM ledger_records
               WHERE owner_id = $1 AND kind = 'income' AND occurred_at >= $2
               GROUP BY 1, 2"#,
        )
        .bind(owner_id)
        .bind(window_start)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        let mut sums = std::collections::HashMap::new();
        for row in &rows {
            let year: i32 = row.try_get("year").map_err(pg_err)?;
            let month: i32 = row.try_get("month").map_err(pg_err)?;
            let total: Decimal = row.try_get("total").map_err(pg_err)?;
            sums.insert((year, month as u32), total);
        }

        Ok(fill_months(&window, &sums))
    }
}
