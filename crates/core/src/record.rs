use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recurrence::Interval;

/// Unique ledger record identifier.
pub type RecordId = Uuid;

/// Identifies the owning user. Issued and verified by the surrounding
/// auth layer; the ledger only ever compares it.
pub type OwnerId = Uuid;

/// Direction of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}

/// Descriptive payload shared by templates and realized occurrences.
/// Opaque to the scheduler — it is copied, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

/// A transaction configured to repeat on a fixed interval.
///
/// While `active`, `next_run` is always `Some` — the next due date derived
/// from the anchor (or the previously computed due date) and the interval.
/// Stopping clears both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTemplate {
    pub id: RecordId,
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub details: TransactionDetails,
    /// The occurrence time the user entered when creating the template.
    pub anchored_at: DateTime<Utc>,
    pub interval: Interval,
    pub next_run: Option<DateTime<Utc>>,
    pub active: bool,
}

/// A concrete, one-time ledger entry — either entered directly by the user
/// or produced when a template fell due. Append-only as far as the
/// scheduler is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedOccurrence {
    pub id: RecordId,
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub details: TransactionDetails,
    pub occurred_at: DateTime<Utc>,
}

/// A row in the ledger.
///
/// The variant split makes "an occurrence never carries
/// interval/next_run/active" unrepresentable instead of a documented
/// invariant on optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "lowercase")]
pub enum LedgerRecord {
    Template(RecurringTemplate),
    Occurrence(RealizedOccurrence),
}

impl LedgerRecord {
    pub fn id(&self) -> RecordId {
        match self {
            LedgerRecord::Template(t) => t.id,
            LedgerRecord::Occurrence(o) => o.id,
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        match self {
            LedgerRecord::Template(t) => t.owner_id,
            LedgerRecord::Occurrence(o) => o.owner_id,
        }
    }

    pub fn details(&self) -> &TransactionDetails {
        match self {
            LedgerRecord::Template(t) => &t.details,
            LedgerRecord::Occurrence(o) => &o.details,
        }
    }

    /// The date/time this row represents: `occurred_at` for occurrences,
    /// the user-entered anchor for templates.
    pub fn effective_time(&self) -> DateTime<Utc> {
        match self {
            LedgerRecord::Template(t) => t.anchored_at,
            LedgerRecord::Occurrence(o) => o.occurred_at,
        }
    }

    pub fn as_template(&self) -> Option<&RecurringTemplate> {
        match self {
            LedgerRecord::Template(t) => Some(t),
            LedgerRecord::Occurrence(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn details() -> TransactionDetails {
        TransactionDetails {
            description: "rent".to_string(),
            amount: Decimal::new(-120000, 2),
            category: "housing".to_string(),
            kind: TransactionKind::Expense,
        }
    }

    #[test]
    fn occurrence_json_has_no_recurrence_fields() {
        let record = LedgerRecord::Occurrence(RealizedOccurrence {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            details: details(),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["record"], "occurrence");
        assert!(json.get("interval").is_none());
        assert!(json.get("nextRun").is_none());
        assert!(json.get("active").is_none());
    }

    #[test]
    fn template_json_roundtrip() {
        let record = LedgerRecord::Template(RecurringTemplate {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            details: details(),
            anchored_at: Utc.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap(),
            interval: Interval::Monthly,
            next_run: Some(Utc.with_ymd_and_hms(2024, 2, 29, 9, 0, 0).unwrap()),
            active: true,
        });

        let json = serde_json::to_string(&record).unwrap();
        let back: LedgerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn kind_parses_wire_strings() {
        assert_eq!("income".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        assert!("transfer".parse::<TransactionKind>().is_err());
    }
}
