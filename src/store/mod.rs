//! Persistence for capital calls.
//!
//! The service only talks to [`CapitalCallStore`]. Two implementations:
//! [`MemoryStore`] for tests and local runs, [`PgStore`] for Postgres.
//!
//! Every `update` is a compare-and-set on `version`: the write lands only
//! if the stored version still equals the one the caller loaded, and the
//! stored version then goes up by one. A stale write fails with
//! `Error::VersionConflict` and changes nothing.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    CapitalCall, CapitalCallId, NewCapitalCallRecord, Page, Queue, QueueCountFilter, SearchQuery,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CapitalCallStore: Send + Sync {
    async fn find_by_id(&self, id: CapitalCallId) -> Result<Option<CapitalCall>>;

    /// Persist a new call. The store assigns the id; version starts at 0.
    async fn insert(&self, record: NewCapitalCallRecord) -> Result<CapitalCall>;

    /// Replace the stored call, breakdowns included, if `call.version` is
    /// still current. Returns the call as stored, with the bumped version.
    async fn update(&self, call: &CapitalCall) -> Result<CapitalCall>;

    /// How many calls sit in `queue` and match `filter`.
    async fn count_by_queue(&self, queue: Queue, filter: &QueueCountFilter) -> Result<u64>;

    async fn search(&self, query: &SearchQuery) -> Result<Page<CapitalCall>>;
}
