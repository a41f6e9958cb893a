//! In-process store behind a `tokio::sync::RwLock`.
//!
//! The version compare-and-set happens under the write lock, so concurrent
//! updates of one call serialize the same way they would in Postgres.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CapitalCallStore;
use crate::error::{Error, Result};
use crate::model::{
    CapitalCall, CapitalCallId, NewCapitalCallRecord, Page, Queue, QueueCountFilter,
    SearchFilter, SearchQuery, Sort, SortDirection, SortField,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    calls: RwLock<HashMap<CapitalCallId, CapitalCall>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.calls.read().await.is_empty()
    }
}

#[async_trait]
impl CapitalCallStore for MemoryStore {
    async fn find_by_id(&self, id: CapitalCallId) -> Result<Option<CapitalCall>> {
        Ok(self.calls.read().await.get(&id).cloned())
    }

    async fn insert(&self, record: NewCapitalCallRecord) -> Result<CapitalCall> {
        let call = CapitalCall {
            id: CapitalCallId::new(),
            batch_id: record.batch_id,
            from_date: record.from_date,
            to_date: record.to_date,
            day_type: record.day_type,
            total_amount: record.total_amount,
            workflow_status: record.workflow_status,
            queue: record.queue,
            lock: record.lock,
            client_name: record.client_name,
            asset_description: record.asset_description,
            reference_id: record.reference_id,
            is_sensitive: record.is_sensitive,
            breakdowns: record.breakdowns,
            version: 0,
            audit: record.audit,
        };
        self.calls.write().await.insert(call.id, call.clone());
        Ok(call)
    }

    async fn update(&self, call: &CapitalCall) -> Result<CapitalCall> {
        let mut calls = self.calls.write().await;
        let stored = calls
            .get_mut(&call.id)
            .ok_or_else(|| Error::NotFound(call.id.to_string()))?;
        if stored.version != call.version {
            return Err(Error::VersionConflict {
                id: call.id,
                expected: call.version,
            });
        }
        let mut next = call.clone();
        next.version = call.version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn count_by_queue(&self, queue: Queue, filter: &QueueCountFilter) -> Result<u64> {
        let calls = self.calls.read().await;
        let n = calls
            .values()
            .filter(|c| c.queue == queue && matches_count_filter(c, filter))
            .count();
        Ok(n as u64)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Page<CapitalCall>> {
        let calls = self.calls.read().await;
        let mut hits: Vec<&CapitalCall> = calls
            .values()
            .filter(|c| query.filters.iter().all(|f| matches_filter(c, f)))
            .collect();

        let sort = query.effective_sort();
        hits.sort_by(|a, b| {
            sort.iter()
                .map(|s| compare(a, b, s))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| {
                    a.audit
                        .created_at
                        .cmp(&b.audit.created_at)
                        .then_with(|| a.id.0.cmp(&b.id.0))
                })
        });

        let size = query.pagination.size_or_default();
        let total = hits.len() as u64;
        let items = hits
            .into_iter()
            .skip(usize::try_from(query.pagination.offset()).unwrap_or(usize::MAX))
            .take(size as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: query.pagination.page_or_default(),
            size,
            total,
        })
    }
}

fn matches_count_filter(call: &CapitalCall, filter: &QueueCountFilter) -> bool {
    filter
        .date_from
        .is_none_or(|d| call.from_date.is_some_and(|f| f >= d))
        && filter
            .date_to
            .is_none_or(|d| call.to_date.is_some_and(|t| t <= d))
        && filter
            .batch_id
            .as_deref()
            .is_none_or(|b| call.batch_id == b)
        && filter
            .reference_id
            .as_deref()
            .is_none_or(|r| call.reference_id.as_deref() == Some(r))
}

fn matches_filter(call: &CapitalCall, filter: &SearchFilter) -> bool {
    match filter {
        SearchFilter::BatchIdContains(s) => call.batch_id.contains(s.as_str()),
        SearchFilter::ReferenceContains(s) => call
            .reference_id
            .as_deref()
            .is_some_and(|r| r.contains(s.as_str())),
        SearchFilter::WorkflowStatus(status) => call.workflow_status == *status,
        SearchFilter::ClientNameContains(s) => {
            let needle = s.to_lowercase();
            call.client_name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
        }
        SearchFilter::FromDateOnOrAfter(d) => call.from_date.is_some_and(|f| f >= *d),
        SearchFilter::ToDateOnOrBefore(d) => call.to_date.is_some_and(|t| t <= *d),
        SearchFilter::DayType(s) => call.day_type.as_deref() == Some(s.as_str()),
        SearchFilter::Queue(q) => call.queue == *q,
        SearchFilter::LockedBy(s) => call.locked_by() == Some(s.as_str()),
    }
}

/// Missing values sort last in either direction, like `NULLS LAST`.
fn compare(a: &CapitalCall, b: &CapitalCall, sort: &Sort) -> Ordering {
    fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>, dir: SortDirection) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => directed(x.cmp(&y), dir),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
    fn directed(o: Ordering, dir: SortDirection) -> Ordering {
        match dir {
            SortDirection::Asc => o,
            SortDirection::Desc => o.reverse(),
        }
    }

    let dir = sort.direction;
    match sort.field {
        SortField::BatchId => directed(a.batch_id.cmp(&b.batch_id), dir),
        SortField::TotalAmount => directed(a.total_amount.cmp(&b.total_amount), dir),
        SortField::FromDate => nulls_last(a.from_date, b.from_date, dir),
        SortField::ToDate => nulls_last(a.to_date, b.to_date, dir),
        SortField::CreatedAt => directed(a.audit.created_at.cmp(&b.audit.created_at), dir),
        SortField::WorkflowStatus => directed(
            a.workflow_status.as_str().cmp(b.workflow_status.as_str()),
            dir,
        ),
    }
}
