use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use centime_core::{
    next_occurrence, Interval, LedgerError, LedgerRecord, RealizedOccurrence, RecurringTemplate,
    TransactionDetails, TransactionKind,
};
use centime_scheduler::RunNow;

use crate::auth::AuthenticatedUser;
use crate::state::AppState;

// ── Error mapping ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(e: LedgerError) -> ApiError {
    let status = match &e {
        LedgerError::NotFound => StatusCode::NOT_FOUND,
        LedgerError::InvalidInterval(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Conflict => StatusCode::CONFLICT,
        LedgerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

// ── Routes ────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/transactions", post(add_transaction).get(list_transactions))
        .route("/transactions/summary/monthly", get(monthly_summary))
        .route("/transactions/{id}/stop", put(stop_recurring))
        .route("/recurrence/preview", get(preview_next))
        .route("/admin/sweep", post(trigger_sweep))
        .with_state(state)
}

// ── Health ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_backend,
    })
}

// ── Transactions ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTransactionRequest {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// When the entry happened; for a recurring template, the anchor the
    /// first computed due date steps from.
    pub date_time: DateTime<Utc>,
    #[serde(default)]
    pub is_recurring: bool,
    pub interval: Option<String>,
}

pub async fn add_transaction(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(owner_id): AuthenticatedUser,
    Json(req): Json<AddTransactionRequest>,
) -> Result<(StatusCode, Json<LedgerRecord>), ApiError> {
    let details = TransactionDetails {
        description: req.description,
        amount: req.amount,
        category: req.category,
        kind: req.kind,
    };

    let record = if req.is_recurring {
        let interval: Interval = req
            .interval
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(api_error)?;
        LedgerRecord::Template(RecurringTemplate {
            id: Uuid::new_v4(),
            owner_id,
            details,
            anchored_at: req.date_time,
            interval,
            next_run: Some(next_occurrence(req.date_time, interval)),
            active: true,
        })
    } else {
        LedgerRecord::Occurrence(RealizedOccurrence {
            id: Uuid::new_v4(),
            owner_id,
            details,
            occurred_at: req.date_time,
        })
    };

    state.store.insert(record.clone()).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(owner_id): AuthenticatedUser,
) -> Result<Json<Vec<LedgerRecord>>, ApiError> {
    let records = state
        .store
        .list_for_owner(owner_id)
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}

// ── Monthly summary ───────────────────────────────────────────────

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Serialize)]
pub struct MonthlySummaryEntry {
    pub year: i32,
    pub month: u32,
    pub name: &'static str,
    pub total: Decimal,
}

pub async fn monthly_summary(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(owner_id): AuthenticatedUser,
) -> Result<Json<Vec<MonthlySummaryEntry>>, ApiError> {
    let totals = state
        .store
        .monthly_income_totals(owner_id, Utc::now(), 12)
        .await
        .map_err(api_error)?;

    let entries = totals
        .into_iter()
        .map(|t| MonthlySummaryEntry {
            year: t.year,
            month: t.month,
            name: MONTH_NAMES[(t.month - 1) as usize],
            total: t.total,
        })
        .collect();
    Ok(Json(entries))
}

// ── Recurrence lifecycle ──────────────────────────────────────────

pub async fn stop_recurring(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(owner_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringTemplate>, ApiError> {
    let stopped = state
        .lifecycle
        .stop(id, owner_id)
        .await
        .map_err(api_error)?;
    Ok(Json(stopped))
}

// ── Recurrence preview ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PreviewParams {
    pub anchor: DateTime<Utc>,
    pub interval: String,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub anchor: DateTime<Utc>,
    pub interval: Interval,
    pub next: DateTime<Utc>,
}

/// Pure calculator preview for form validation — no store access.
pub async fn preview_next(
    AuthenticatedUser(_owner_id): AuthenticatedUser,
    Query(params): Query<PreviewParams>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let interval: Interval = params.interval.parse().map_err(api_error)?;
    Ok(Json(PreviewResponse {
        anchor: params.anchor,
        interval,
        next: next_occurrence(params.anchor, interval),
    }))
}

// ── Operator hooks ────────────────────────────────────────────────

pub async fn trigger_sweep(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state.sweep_trigger.send(RunNow).await.map_err(|_| {
        api_error(LedgerError::Persistence(
            "sweep loop is not running".to_string(),
        ))
    })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "sweep scheduled" })),
    ))
}
