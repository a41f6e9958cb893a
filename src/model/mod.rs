//! Domain types: the capital call entity, inbound payloads, and outbound
//! projections.

pub mod capital_call;
pub mod request;
pub mod response;

pub use capital_call::{
    Actor, Audit, Breakdown, BreakdownCategory, CapitalCall, CapitalCallId, Lock,
    NewCapitalCallRecord, Queue, WorkflowStatus,
};
pub use request::{
    BreakdownInput, CapitalCallRequest, CountRequest, Pagination, QueueCountFilter, SearchFilter,
    SearchQuery, Sort, SortDirection, SortField,
};
pub use response::{BreakdownView, CapitalCallDetail, CapitalCallSummary, Page, QueueCounts};
