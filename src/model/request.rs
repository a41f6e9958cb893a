//! Inbound payloads: create/update bodies, queue count requests, and
//! typed search queries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::capital_call::{BreakdownCategory, Queue, WorkflowStatus};
use crate::error::{Error, Result, ValidationKind};

// ---------------------------------------------------------------------------
// Create / update payload
// ---------------------------------------------------------------------------

/// Body of a create or update. Update replaces every field, including the
/// full breakdown list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalCallRequest {
    pub batch_id: String,
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub day_type: Option<String>,
    pub total_amount: Decimal,
    /// Defaults to `SSI_VERIFICATION` on create; keeps the current queue on update.
    #[serde(default)]
    pub queue: Option<Queue>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub asset_description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub is_sensitive: bool,
    #[serde(default)]
    pub breakdowns: Vec<BreakdownInput>,
    /// Version the client last saw. Only consulted by update.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl CapitalCallRequest {
    pub fn new(batch_id: impl Into<String>, total_amount: Decimal) -> Self {
        Self {
            batch_id: batch_id.into(),
            from_date: None,
            to_date: None,
            day_type: None,
            total_amount,
            queue: None,
            client_name: None,
            asset_description: None,
            reference_id: None,
            is_sensitive: false,
            breakdowns: Vec::new(),
            expected_version: None,
        }
    }

    pub fn dates(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to);
        self
    }

    pub fn day_type(mut self, day_type: impl Into<String>) -> Self {
        self.day_type = Some(day_type.into());
        self
    }

    pub fn queue(mut self, queue: Queue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn asset_description(mut self, description: impl Into<String>) -> Self {
        self.asset_description = Some(description.into());
        self
    }

    pub fn reference_id(mut self, reference: impl Into<String>) -> Self {
        self.reference_id = Some(reference.into());
        self
    }

    pub fn sensitive(mut self, is_sensitive: bool) -> Self {
        self.is_sensitive = is_sensitive;
        self
    }

    pub fn breakdown(mut self, category: BreakdownCategory, percentage: Decimal) -> Self {
        self.breakdowns.push(BreakdownInput {
            category,
            percentage,
        });
        self
    }

    pub fn expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// One requested allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownInput {
    pub category: BreakdownCategory,
    pub percentage: Decimal,
}

// ---------------------------------------------------------------------------
// Queue counts
// ---------------------------------------------------------------------------

/// Request for per-queue counts. Result keys follow `queues` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRequest {
    pub queues: Vec<Queue>,
    #[serde(flatten)]
    pub filter: QueueCountFilter,
}

impl CountRequest {
    pub fn new(queues: impl IntoIterator<Item = Queue>) -> Self {
        Self {
            queues: queues.into_iter().collect(),
            filter: QueueCountFilter::default(),
        }
    }

    pub fn filter(mut self, filter: QueueCountFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Optional narrowing applied to every per-queue count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCountFilter {
    /// Matches calls whose `from_date` is on or after this date.
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Matches calls whose `to_date` is on or before this date.
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    /// Exact match.
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Exact match.
    #[serde(default)]
    pub reference_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// A single typed search predicate. All predicates in a query are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum SearchFilter {
    BatchIdContains(String),
    ReferenceContains(String),
    WorkflowStatus(WorkflowStatus),
    /// Case-insensitive.
    ClientNameContains(String),
    FromDateOnOrAfter(NaiveDate),
    ToDateOnOrBefore(NaiveDate),
    DayType(String),
    Queue(Queue),
    LockedBy(String),
}

impl SearchFilter {
    /// Parse one `key=value` pair from a loosely typed boundary (query
    /// string, CLI flag). Unknown keys and malformed values are rejected.
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let filter = match key {
            "batchId" => SearchFilter::BatchIdContains(value.to_string()),
            "referenceId" => SearchFilter::ReferenceContains(value.to_string()),
            "workflowStatus" => SearchFilter::WorkflowStatus(value.parse()?),
            "clientName" => SearchFilter::ClientNameContains(value.to_string()),
            "fromDate" => SearchFilter::FromDateOnOrAfter(parse_date(key, value)?),
            "toDate" => SearchFilter::ToDateOnOrBefore(parse_date(key, value)?),
            "dayType" => SearchFilter::DayType(value.to_string()),
            "queue" => SearchFilter::Queue(value.parse()?),
            "lockedBy" => SearchFilter::LockedBy(value.to_string()),
            _ => {
                return Err(Error::validation(
                    ValidationKind::InvalidFilter,
                    format!("unknown search filter: {key}"),
                ));
            }
        };
        Ok(filter)
    }
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate> {
    value.parse::<NaiveDate>().map_err(|e| {
        Error::validation(
            ValidationKind::InvalidFilter,
            format!("{key} must be an ISO date (YYYY-MM-DD): {e}"),
        )
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    BatchId,
    TotalAmount,
    FromDate,
    ToDate,
    CreatedAt,
    WorkflowStatus,
}

impl std::str::FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "batchId" => Ok(SortField::BatchId),
            "totalAmount" => Ok(SortField::TotalAmount),
            "fromDate" => Ok(SortField::FromDate),
            "toDate" => Ok(SortField::ToDate),
            "createdAt" => Ok(SortField::CreatedAt),
            "workflowStatus" => Ok(SortField::WorkflowStatus),
            _ => Err(Error::validation(
                ValidationKind::InvalidFilter,
                format!("cannot sort by {s}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Requested page. `size` is clamped to [`Pagination::MAX_SIZE`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}

impl Pagination {
    pub const DEFAULT_SIZE: u32 = 25;
    pub const MAX_SIZE: u32 = 200;

    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
        }
    }

    pub fn page_or_default(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    pub fn size_or_default(&self) -> u32 {
        self.size
            .map(|s| s.clamp(1, Self::MAX_SIZE))
            .unwrap_or(Self::DEFAULT_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page_or_default()) * u64::from(self.size_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub filters: Vec<SearchFilter>,
    #[serde(default)]
    pub pagination: Pagination,
    /// Applied in order; empty means newest first.
    #[serde(default)]
    pub sort: Vec<Sort>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn page(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn sort_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort.push(Sort { field, direction });
        self
    }

    /// Sort keys with the default applied when none were given.
    pub fn effective_sort(&self) -> Vec<Sort> {
        if self.sort.is_empty() {
            vec![Sort::default()]
        } else {
            self.sort.clone()
        }
    }
}
