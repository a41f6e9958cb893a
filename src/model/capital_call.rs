//! Capital call entity and its owned breakdowns.
//!
//! A capital call is a request for funds. It moves through an approval
//! workflow (`WorkflowStatus`), sits in an operational triage `Queue`,
//! and splits its total across spending categories by percentage.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result, ValidationKind};

// ---------------------------------------------------------------------------
// Capital Call
// ---------------------------------------------------------------------------

/// A persisted capital call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalCall {
    /// Assigned on insert, never changes.
    pub id: CapitalCallId,

    /// Business correlation key, `ALE-` followed by six digits.
    pub batch_id: String,

    /// Optional inclusive date range.
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub day_type: Option<String>,

    /// Strictly positive currency amount.
    pub total_amount: Decimal,

    pub workflow_status: WorkflowStatus,

    /// Triage classification. Independent of `workflow_status`.
    pub queue: Queue,

    /// Advisory edit lock. `None` means unlocked.
    pub lock: Option<Lock>,

    pub client_name: Option<String>,
    pub asset_description: Option<String>,
    /// External reference used by the queue-count filters.
    pub reference_id: Option<String>,
    pub is_sensitive: bool,

    /// Owned exclusively by this call. Replaced wholesale on update.
    pub breakdowns: Vec<Breakdown>,

    /// Optimistic-concurrency token. Bumped by the store on every update.
    pub version: i64,

    pub audit: Audit,
}

impl CapitalCall {
    pub fn locked_by(&self) -> Option<&str> {
        self.lock.as_ref().map(|l| l.holder.as_str())
    }

    pub fn is_locked_by(&self, actor: &Actor) -> bool {
        self.locked_by() == Some(actor.as_str())
    }
}

/// Newtype for capital call IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapitalCallId(pub Uuid);

impl CapitalCallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CapitalCallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CapitalCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CapitalCallId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(CapitalCallId)
            .map_err(|e| {
                Error::validation(
                    ValidationKind::MalformedId,
                    format!("malformed capital call id {s:?}: {e}"),
                )
            })
    }
}

/// The identity of whoever is acting. Supplied by the calling boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who holds the exclusive edit reservation, and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

impl Lock {
    pub fn acquire(actor: &Actor, now: DateTime<Utc>) -> Self {
        Self {
            holder: actor.as_str().to_string(),
            acquired_at: now,
        }
    }
}

/// Creation and last-modification stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl Audit {
    pub fn created(actor: &Actor, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            created_by: actor.as_str().to_string(),
            modified_at: None,
            modified_by: None,
        }
    }

    pub fn touch(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.modified_at = Some(now);
        self.modified_by = Some(actor.as_str().to_string());
    }
}

// ---------------------------------------------------------------------------
// Breakdown
// ---------------------------------------------------------------------------

/// One category's share of a capital call's total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub category: BreakdownCategory,
    /// In `[0.00, 100.00]`.
    pub percentage: Decimal,
    /// Derived from the total and the percentage; `None` when either was absent.
    pub calculated_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakdownCategory {
    ManagementFees,
    PerformanceFees,
    OperatingExpenses,
    Distributions,
    Other,
}

impl BreakdownCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakdownCategory::ManagementFees => "MANAGEMENT_FEES",
            BreakdownCategory::PerformanceFees => "PERFORMANCE_FEES",
            BreakdownCategory::OperatingExpenses => "OPERATING_EXPENSES",
            BreakdownCategory::Distributions => "DISTRIBUTIONS",
            BreakdownCategory::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for BreakdownCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BreakdownCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MANAGEMENT_FEES" => Ok(BreakdownCategory::ManagementFees),
            "PERFORMANCE_FEES" => Ok(BreakdownCategory::PerformanceFees),
            "OPERATING_EXPENSES" => Ok(BreakdownCategory::OperatingExpenses),
            "DISTRIBUTIONS" => Ok(BreakdownCategory::Distributions),
            "OTHER" => Ok(BreakdownCategory::Other),
            _ => Err(Error::validation(
                ValidationKind::InvalidFilter,
                format!("unknown breakdown category: {s}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow status
// ---------------------------------------------------------------------------

/// Lifecycle status of a capital call. Transitions live in [`crate::workflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Being prepared by the lock holder.
    Draft,
    /// Waiting on an approver.
    Submitted,
    /// Terminal.
    Approved,
    /// Sent back; the rejecting actor holds the lock.
    Rejected,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 4] = [
        WorkflowStatus::Draft,
        WorkflowStatus::Submitted,
        WorkflowStatus::Approved,
        WorkflowStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "DRAFT",
            WorkflowStatus::Submitted => "SUBMITTED",
            WorkflowStatus::Approved => "APPROVED",
            WorkflowStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Approved)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(WorkflowStatus::Draft),
            "SUBMITTED" => Ok(WorkflowStatus::Submitted),
            "APPROVED" => Ok(WorkflowStatus::Approved),
            "REJECTED" => Ok(WorkflowStatus::Rejected),
            _ => Err(Error::validation(
                ValidationKind::InvalidFilter,
                format!("unknown workflow status: {s}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Operational triage queue, used for dashboard counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Queue {
    #[default]
    SsiVerification,
    Review,
    Approval,
    Completed,
    Rejected,
}

impl Queue {
    pub const ALL: [Queue; 5] = [
        Queue::SsiVerification,
        Queue::Review,
        Queue::Approval,
        Queue::Completed,
        Queue::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Queue::SsiVerification => "SSI_VERIFICATION",
            Queue::Review => "REVIEW",
            Queue::Approval => "APPROVAL",
            Queue::Completed => "COMPLETED",
            Queue::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Queue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SSI_VERIFICATION" => Ok(Queue::SsiVerification),
            "REVIEW" => Ok(Queue::Review),
            "APPROVAL" => Ok(Queue::Approval),
            "COMPLETED" => Ok(Queue::Completed),
            "REJECTED" => Ok(Queue::Rejected),
            _ => Err(Error::validation(
                ValidationKind::InvalidFilter,
                format!("unknown queue: {s}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Insert record
// ---------------------------------------------------------------------------

/// Everything the store needs to insert a new capital call. The store
/// assigns the id and the initial version.
#[derive(Debug, Clone)]
pub struct NewCapitalCallRecord {
    pub batch_id: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub day_type: Option<String>,
    pub total_amount: Decimal,
    pub workflow_status: WorkflowStatus,
    pub queue: Queue,
    pub lock: Option<Lock>,
    pub client_name: Option<String>,
    pub asset_description: Option<String>,
    pub reference_id: Option<String>,
    pub is_sensitive: bool,
    pub breakdowns: Vec<Breakdown>,
    pub audit: Audit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_their_wire_names() {
        for status in WorkflowStatus::ALL {
            assert_eq!(status.as_str().parse::<WorkflowStatus>().unwrap(), status);
        }
        for queue in Queue::ALL {
            assert_eq!(queue.as_str().parse::<Queue>().unwrap(), queue);
        }
        assert_eq!(
            serde_json::to_string(&Queue::SsiVerification).unwrap(),
            "\"SSI_VERIFICATION\""
        );
    }

    #[test]
    fn unknown_queue_is_a_filter_error() {
        let err = "BACKLOG".parse::<Queue>().unwrap_err();
        assert_eq!(err.code(), "VAL_009");
    }

    #[test]
    fn malformed_id_is_bad_input_not_a_missing_call() {
        let err = "not-a-uuid".parse::<CapitalCallId>().unwrap_err();
        assert!(matches!(
            err,
            Error::Validation {
                kind: ValidationKind::MalformedId,
                ..
            }
        ));
        assert_eq!(err.code(), "VAL_012");

        let id = CapitalCallId::new();
        assert_eq!(id.to_string().parse::<CapitalCallId>().unwrap(), id);
    }

    #[test]
    fn approved_is_the_only_terminal_status() {
        let terminal: Vec<_> = WorkflowStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![WorkflowStatus::Approved]);
    }
}
