//! Outbound projections.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::capital_call::{
    Breakdown, BreakdownCategory, CapitalCall, CapitalCallId, Queue, WorkflowStatus,
};
use crate::workflow::{self, Action};

/// Full view of one capital call, including breakdowns and the version
/// token a client echoes back on update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalCallDetail {
    pub id: CapitalCallId,
    pub batch_id: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub day_type: Option<String>,
    pub total_amount: Decimal,
    pub workflow_status: WorkflowStatus,
    pub queue: Queue,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub client_name: Option<String>,
    pub asset_description: Option<String>,
    pub reference_id: Option<String>,
    pub is_sensitive: bool,
    pub breakdowns: Vec<BreakdownView>,
    pub version: i64,
    /// What the workflow permits next, for clients that show or hide actions.
    pub allowed_actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownView {
    pub category: BreakdownCategory,
    pub percentage: Decimal,
    pub calculated_amount: Option<Decimal>,
}

impl From<&Breakdown> for BreakdownView {
    fn from(b: &Breakdown) -> Self {
        Self {
            category: b.category,
            percentage: b.percentage,
            calculated_amount: b.calculated_amount,
        }
    }
}

impl From<CapitalCall> for CapitalCallDetail {
    fn from(call: CapitalCall) -> Self {
        let (locked_by, locked_at) = match call.lock {
            Some(lock) => (Some(lock.holder), Some(lock.acquired_at)),
            None => (None, None),
        };
        Self {
            id: call.id,
            batch_id: call.batch_id,
            from_date: call.from_date,
            to_date: call.to_date,
            day_type: call.day_type,
            total_amount: call.total_amount,
            workflow_status: call.workflow_status,
            queue: call.queue,
            locked_by,
            locked_at,
            client_name: call.client_name,
            asset_description: call.asset_description,
            reference_id: call.reference_id,
            is_sensitive: call.is_sensitive,
            breakdowns: call.breakdowns.iter().map(BreakdownView::from).collect(),
            version: call.version,
            allowed_actions: workflow::allowed_actions(call.workflow_status),
            created_at: call.audit.created_at,
            created_by: call.audit.created_by,
            modified_at: call.audit.modified_at,
            modified_by: call.audit.modified_by,
        }
    }
}

/// Row shape for search results. No breakdowns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalCallSummary {
    pub id: CapitalCallId,
    pub batch_id: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub workflow_status: WorkflowStatus,
    pub queue: Queue,
    pub locked_by: Option<String>,
    pub client_name: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CapitalCall> for CapitalCallSummary {
    fn from(call: CapitalCall) -> Self {
        let locked_by = call.locked_by().map(str::to_string);
        Self {
            id: call.id,
            batch_id: call.batch_id,
            from_date: call.from_date,
            to_date: call.to_date,
            total_amount: call.total_amount,
            workflow_status: call.workflow_status,
            queue: call.queue,
            locked_by,
            client_name: call.client_name,
            reference_id: call.reference_id,
            created_at: call.audit.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}

/// Per-queue counts in the order the caller asked for them.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts(Vec<(Queue, u64)>);

impl QueueCounts {
    pub fn new(entries: Vec<(Queue, u64)>) -> Self {
        Self(entries)
    }

    pub fn get(&self, queue: Queue) -> Option<u64> {
        self.0.iter().find(|(q, _)| *q == queue).map(|(_, n)| *n)
    }

    pub fn queues(&self) -> impl Iterator<Item = Queue> + '_ {
        self.0.iter().map(|(q, _)| *q)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Queue, u64)> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for QueueCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (queue, count) in &self.0 {
            map.serialize_entry(queue.as_str(), count)?;
        }
        map.end()
    }
}
