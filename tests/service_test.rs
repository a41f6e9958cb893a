//! Service-level tests over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capital_call_rs::allocation::calculate_amount;
use capital_call_rs::auth::{Capability, PolicyAuthorizer};
use capital_call_rs::config::{ServiceConfig, ValidationLimits};
use capital_call_rs::model::{
    Actor, Audit, Breakdown, BreakdownCategory, CapitalCall, CapitalCallId, CapitalCallRequest,
    CountRequest, Lock, NewCapitalCallRecord, Page, Queue, QueueCountFilter, SearchFilter,
    SearchQuery, WorkflowStatus,
};
use capital_call_rs::store::{CapitalCallStore, MemoryStore};
use capital_call_rs::workflow::Action;
use capital_call_rs::{CapitalCallService, Error, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn policy() -> PolicyAuthorizer {
    use Capability::*;
    PolicyAuthorizer::default()
        .grant("alice", [View, Edit, Submit])
        .grant("bob", [View, Edit, Submit])
        .grant("carol", [View, Approve, Edit, Submit])
        .grant("mallory", [View])
        .admin("root")
}

fn alice() -> Actor {
    Actor::new("alice")
}

fn bob() -> Actor {
    Actor::new("bob")
}

fn carol() -> Actor {
    Actor::new("carol")
}

fn root() -> Actor {
    Actor::new("root")
}

fn service_over(store: Arc<dyn CapitalCallStore>) -> CapitalCallService {
    CapitalCallService::new(store, Arc::new(policy()), ServiceConfig::default())
}

fn setup() -> (Arc<MemoryStore>, CapitalCallService) {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store.clone());
    (store, service)
}

fn sixty_forty() -> CapitalCallRequest {
    CapitalCallRequest::new("ALE-000123", dec!(10000.00))
        .breakdown(BreakdownCategory::ManagementFees, dec!(60.00))
        .breakdown(BreakdownCategory::Other, dec!(40.00))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn submitted(service: &CapitalCallService) -> CapitalCallId {
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();
    service.submit(created.id, &alice()).await.unwrap();
    created.id
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_computes_amounts_and_locks_for_creator() {
    let (store, service) = setup();
    let detail = service.create(&sixty_forty(), &alice()).await.unwrap();
    assert_eq!(store.len().await, 1);

    assert_eq!(detail.workflow_status, WorkflowStatus::Draft);
    assert_eq!(detail.locked_by.as_deref(), Some("alice"));
    assert!(detail.locked_at.is_some());
    assert_eq!(detail.queue, Queue::SsiVerification);
    assert_eq!(detail.version, 0);
    assert_eq!(detail.created_by, "alice");
    assert!(detail.modified_at.is_none());

    let amounts: Vec<_> = detail
        .breakdowns
        .iter()
        .map(|b| b.calculated_amount)
        .collect();
    assert_eq!(amounts, vec![Some(dec!(6000.00)), Some(dec!(4000.00))]);
    assert_eq!(
        detail.allowed_actions,
        vec![Action::Update, Action::Submit, Action::Unlock]
    );
}

#[tokio::test]
async fn get_by_id_returns_recomputable_amounts() {
    let (_, service) = setup();
    let request = CapitalCallRequest::new("ALE-000777", dec!(1000.00))
        .breakdown(BreakdownCategory::PerformanceFees, dec!(33.335))
        .breakdown(BreakdownCategory::OperatingExpenses, dec!(12.5))
        .queue(Queue::Review)
        .client_name("Northwind LP")
        .reference_id("TOE-42")
        .dates(date(2024, 1, 1), date(2024, 6, 30))
        .day_type("BUSINESS")
        .sensitive(true);
    let created = service.create(&request, &alice()).await.unwrap();

    let fetched = service.get_by_id(created.id, &alice()).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.queue, Queue::Review);
    assert_eq!(fetched.reference_id.as_deref(), Some("TOE-42"));
    assert!(fetched.is_sensitive);
    for b in &fetched.breakdowns {
        assert_eq!(
            b.calculated_amount,
            calculate_amount(Some(fetched.total_amount), Some(b.percentage), 2).unwrap()
        );
    }
    assert_eq!(fetched.breakdowns[0].calculated_amount, Some(dec!(333.35)));
}

#[tokio::test]
async fn create_with_the_largest_total_stores_every_amount() {
    let (_, service) = setup();
    let request = CapitalCallRequest::new("ALE-000999", Decimal::MAX)
        .breakdown(BreakdownCategory::Distributions, dec!(50))
        .breakdown(BreakdownCategory::Other, dec!(50));
    let created = service.create(&request, &alice()).await.unwrap();

    for b in &created.breakdowns {
        assert_eq!(
            b.calculated_amount,
            Some(dec!(39614081257132168796771975168))
        );
    }
}

#[tokio::test]
async fn invalid_create_persists_nothing() {
    let (store, service) = setup();

    let over = CapitalCallRequest::new("ALE-000123", dec!(500))
        .breakdown(BreakdownCategory::ManagementFees, dec!(60.00))
        .breakdown(BreakdownCategory::Other, dec!(40.01));
    let err = service.create(&over, &alice()).await.unwrap_err();
    assert_eq!(err.code(), "VAL_003");

    let zero = CapitalCallRequest::new("ALE-000123", dec!(0));
    assert_eq!(
        service.create(&zero, &alice()).await.unwrap_err().code(),
        "VAL_008"
    );

    let backwards = sixty_forty().dates(date(2024, 5, 1), date(2024, 4, 1));
    assert_eq!(
        service.create(&backwards, &alice()).await.unwrap_err().code(),
        "VAL_004"
    );

    let bad_batch = CapitalCallRequest::new("BATCH-1", dec!(10));
    assert_eq!(
        service.create(&bad_batch, &alice()).await.unwrap_err().code(),
        "VAL_001"
    );

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn full_allocation_and_empty_breakdowns_are_accepted() {
    let (_, service) = setup();
    let full = CapitalCallRequest::new("ALE-000001", dec!(10))
        .breakdown(BreakdownCategory::Distributions, dec!(100.00));
    assert!(service.create(&full, &alice()).await.is_ok());

    let none = CapitalCallRequest::new("ALE-000002", dec!(10));
    let detail = service.create(&none, &alice()).await.unwrap();
    assert!(detail.breakdowns.is_empty());
}

#[tokio::test]
async fn permission_is_checked_before_validation() {
    let (store, service) = setup();
    let invalid = CapitalCallRequest::new("nope", dec!(-1));
    let err = service
        .create(&invalid, &Actor::new("mallory"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PermissionDenied {
            capability: Capability::Edit,
            ..
        }
    ));
    assert!(store.is_empty().await);

    let stranger = Actor::new("eve");
    let err = service
        .get_by_id(CapitalCallId::new(), &stranger)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ACCESS_DENIED");
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let (_, service) = setup();
    let id = CapitalCallId::new();
    assert_eq!(
        service.get_by_id(id, &alice()).await.unwrap_err().code(),
        "ENTITY_NOT_FOUND"
    );
    assert_eq!(
        service.submit(id, &alice()).await.unwrap_err().code(),
        "ENTITY_NOT_FOUND"
    );
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_moves_to_submitted_and_releases_lock() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();

    let detail = service.submit(created.id, &alice()).await.unwrap();
    assert_eq!(detail.workflow_status, WorkflowStatus::Submitted);
    assert!(detail.locked_by.is_none());
    assert!(detail.locked_at.is_none());
    assert_eq!(detail.version, 1);
    assert_eq!(detail.modified_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn submit_only_from_draft() {
    let (_, service) = setup();

    let id = submitted(&service).await;
    let err = service.submit(id, &alice()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: WorkflowStatus::Submitted,
            action: Action::Submit
        }
    ));

    let rejected = submitted(&service).await;
    service.reject(rejected, &carol()).await.unwrap();
    assert_eq!(
        service.submit(rejected, &carol()).await.unwrap_err().code(),
        "BUS_001"
    );

    let approved = submitted(&service).await;
    service.approve(approved, &carol()).await.unwrap();
    assert_eq!(
        service.submit(approved, &alice()).await.unwrap_err().code(),
        "BUS_001"
    );
}

#[tokio::test]
async fn approve_and_reject_only_from_submitted() {
    let (_, service) = setup();
    let draft = service.create(&sixty_forty(), &alice()).await.unwrap();
    assert_eq!(
        service.approve(draft.id, &carol()).await.unwrap_err().code(),
        "BUS_001"
    );
    assert_eq!(
        service.reject(draft.id, &carol()).await.unwrap_err().code(),
        "BUS_001"
    );

    let id = submitted(&service).await;
    let approved = service.approve(id, &carol()).await.unwrap();
    assert_eq!(approved.workflow_status, WorkflowStatus::Approved);
    assert!(approved.locked_by.is_none());
    assert!(approved.allowed_actions.is_empty());

    assert_eq!(
        service.reject(id, &carol()).await.unwrap_err().code(),
        "BUS_001"
    );
    assert_eq!(
        service.approve(id, &carol()).await.unwrap_err().code(),
        "BUS_001"
    );
}

#[tokio::test]
async fn approving_requires_the_approve_capability() {
    let (_, service) = setup();
    let id = submitted(&service).await;
    let err = service.approve(id, &alice()).await.unwrap_err();
    assert_eq!(err.code(), "ACCESS_DENIED");
    let err = service.reject(id, &alice()).await.unwrap_err();
    assert_eq!(err.code(), "ACCESS_DENIED");
}

#[tokio::test]
async fn reject_hands_the_lock_to_the_rejecter() {
    let (_, service) = setup();
    let id = submitted(&service).await;

    let rejected = service.reject(id, &carol()).await.unwrap();
    assert_eq!(rejected.workflow_status, WorkflowStatus::Rejected);
    assert_eq!(rejected.locked_by.as_deref(), Some("carol"));

    // The rejecter can edit; the original author cannot.
    let edit = sixty_forty().breakdown(BreakdownCategory::Distributions, dec!(0));
    assert!(service.update(id, &edit, &carol()).await.is_ok());
    assert_eq!(
        service.update(id, &edit, &alice()).await.unwrap_err().code(),
        "LOCK_CONFLICT"
    );
}

// ---------------------------------------------------------------------------
// Update and the lock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_replaces_breakdowns_and_bumps_version() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();

    let replacement = CapitalCallRequest::new("ALE-000123", dec!(2000.00))
        .breakdown(BreakdownCategory::OperatingExpenses, dec!(25.00))
        .queue(Queue::Review);
    let updated = service
        .update(created.id, &replacement, &alice())
        .await
        .unwrap();

    assert_eq!(updated.version, created.version + 1);
    assert_eq!(updated.total_amount, dec!(2000.00));
    assert_eq!(updated.queue, Queue::Review);
    assert_eq!(updated.breakdowns.len(), 1);
    assert_eq!(
        updated.breakdowns[0].category,
        BreakdownCategory::OperatingExpenses
    );
    assert_eq!(updated.breakdowns[0].calculated_amount, Some(dec!(500.00)));
    assert_eq!(updated.modified_by.as_deref(), Some("alice"));
    assert_eq!(updated.locked_by.as_deref(), Some("alice"));

    // Omitting the queue keeps the current one.
    let again = service
        .update(created.id, &sixty_forty(), &alice())
        .await
        .unwrap();
    assert_eq!(again.queue, Queue::Review);
}

#[tokio::test]
async fn update_by_non_holder_is_a_lock_conflict() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();

    let err = service
        .update(created.id, &sixty_forty(), &bob())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockConflict(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn update_on_approved_is_a_lock_conflict() {
    let (_, service) = setup();
    let id = submitted(&service).await;
    service.approve(id, &carol()).await.unwrap();

    for actor in [alice(), carol()] {
        let err = service.update(id, &sixty_forty(), &actor).await.unwrap_err();
        assert_eq!(err.code(), "LOCK_CONFLICT");
    }
}

#[tokio::test]
async fn update_while_submitted_is_a_lock_conflict() {
    let (_, service) = setup();
    let id = submitted(&service).await;
    let err = service
        .update(id, &sixty_forty(), &alice())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LOCK_CONFLICT");
}

#[tokio::test]
async fn failed_update_leaves_the_call_untouched() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();

    let bad = CapitalCallRequest::new("ALE-000123", dec!(10))
        .breakdown(BreakdownCategory::Other, dec!(100.01));
    assert_eq!(
        service
            .update(created.id, &bad, &alice())
            .await
            .unwrap_err()
            .code(),
        "VAL_002"
    );

    let unchanged = service.get_by_id(created.id, &alice()).await.unwrap();
    assert_eq!(unchanged, created);
}

#[tokio::test]
async fn stale_expected_version_is_a_version_conflict() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();
    service
        .update(created.id, &sixty_forty(), &alice())
        .await
        .unwrap();

    let stale = sixty_forty().expected_version(created.version);
    let err = service
        .update(created.id, &stale, &alice())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VersionConflict { expected: 0, .. }));
    assert!(err.is_retryable());

    let fresh = sixty_forty().expected_version(1);
    assert_eq!(
        service
            .update(created.id, &fresh, &alice())
            .await
            .unwrap()
            .version,
        2
    );
}

// ---------------------------------------------------------------------------
// Unlock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_unlock_clears_the_lock_but_keeps_status() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();

    service.unlock(created.id, &root()).await.unwrap();
    let after = service.get_by_id(created.id, &alice()).await.unwrap();
    assert_eq!(after.workflow_status, WorkflowStatus::Draft);
    assert!(after.locked_by.is_none());
    assert_eq!(after.modified_by.as_deref(), Some("root"));

    // The former holder no longer owns it.
    assert_eq!(
        service
            .update(created.id, &sixty_forty(), &alice())
            .await
            .unwrap_err()
            .code(),
        "LOCK_CONFLICT"
    );
}

#[tokio::test]
async fn unlock_needs_capability_and_a_non_approved_call() {
    let (_, service) = setup();
    let created = service.create(&sixty_forty(), &alice()).await.unwrap();
    assert_eq!(
        service.unlock(created.id, &alice()).await.unwrap_err().code(),
        "ACCESS_DENIED"
    );

    let id = submitted(&service).await;
    service.approve(id, &carol()).await.unwrap();
    assert_eq!(
        service.unlock(id, &root()).await.unwrap_err().code(),
        "BUS_001"
    );
}

// ---------------------------------------------------------------------------
// Submission re-validates what is stored
// ---------------------------------------------------------------------------

fn raw_record(breakdowns: Vec<Breakdown>, from: NaiveDate, to: NaiveDate) -> NewCapitalCallRecord {
    let now = Utc::now();
    NewCapitalCallRecord {
        batch_id: "ALE-000999".to_string(),
        from_date: Some(from),
        to_date: Some(to),
        day_type: None,
        total_amount: dec!(100),
        workflow_status: WorkflowStatus::Draft,
        queue: Queue::SsiVerification,
        lock: Some(Lock::acquire(&alice(), now)),
        client_name: None,
        asset_description: None,
        reference_id: None,
        is_sensitive: false,
        breakdowns,
        audit: Audit::created(&alice(), now),
    }
}

#[tokio::test]
async fn submit_rechecks_the_persisted_call() {
    let (store, service) = setup();
    let over = vec![
        Breakdown {
            category: BreakdownCategory::ManagementFees,
            percentage: dec!(70),
            calculated_amount: Some(dec!(70)),
        },
        Breakdown {
            category: BreakdownCategory::Other,
            percentage: dec!(30.5),
            calculated_amount: Some(dec!(30.50)),
        },
    ];
    let call = store
        .insert(raw_record(over, date(2024, 1, 1), date(2024, 2, 1)))
        .await
        .unwrap();
    assert_eq!(
        service.submit(call.id, &alice()).await.unwrap_err().code(),
        "VAL_003"
    );

    let long = store
        .insert(raw_record(Vec::new(), date(2023, 1, 1), date(2024, 6, 1)))
        .await
        .unwrap();
    assert_eq!(
        service.submit(long.id, &alice()).await.unwrap_err().code(),
        "VAL_006"
    );
}

#[tokio::test]
async fn validation_limits_are_configurable() {
    let store = Arc::new(MemoryStore::new());
    let config = ServiceConfig {
        limits: ValidationLimits {
            max_date_range_days: 7,
            ..ValidationLimits::default()
        },
        count_concurrency: 1,
    };
    let service = CapitalCallService::new(store, Arc::new(policy()), config);
    let request = sixty_forty().dates(date(2024, 1, 1), date(2024, 1, 9));
    assert_eq!(
        service.create(&request, &alice()).await.unwrap_err().code(),
        "VAL_006"
    );
}

// ---------------------------------------------------------------------------
// Queue counts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counts_with_no_matches_are_zero_in_request_order() {
    let (_, service) = setup();
    let counts = service
        .get_counts_by_queue(&CountRequest::new([Queue::Review, Queue::Approval]), &alice())
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&counts).unwrap(),
        r#"{"REVIEW":0,"APPROVAL":0}"#
    );
}

#[tokio::test]
async fn counts_respect_queue_and_filters() {
    let (_, service) = setup();
    for (batch, queue) in [
        ("ALE-000001", Queue::Review),
        ("ALE-000002", Queue::Review),
        ("ALE-000001", Queue::Approval),
    ] {
        let request = CapitalCallRequest::new(batch, dec!(10)).queue(queue);
        service.create(&request, &alice()).await.unwrap();
    }

    let request = CountRequest::new([
        Queue::Approval,
        Queue::Completed,
        Queue::Review,
        Queue::Approval,
    ]);
    let counts = service.get_counts_by_queue(&request, &alice()).await.unwrap();
    assert_eq!(
        counts.queues().collect::<Vec<_>>(),
        vec![Queue::Approval, Queue::Completed, Queue::Review]
    );
    assert_eq!(counts.get(Queue::Review), Some(2));
    assert_eq!(counts.get(Queue::Approval), Some(1));
    assert_eq!(counts.get(Queue::Completed), Some(0));

    let filtered = CountRequest::new([Queue::Review]).filter(QueueCountFilter {
        batch_id: Some("ALE-000001".into()),
        ..Default::default()
    });
    let counts = service.get_counts_by_queue(&filtered, &alice()).await.unwrap();
    assert_eq!(counts.get(Queue::Review), Some(1));
}

#[tokio::test]
async fn counts_need_at_least_one_queue_and_view() {
    let (_, service) = setup();
    let err = service
        .get_counts_by_queue(&CountRequest::new(Vec::new()), &alice())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VAL_010");

    let err = service
        .get_counts_by_queue(&CountRequest::new([Queue::Review]), &Actor::new("eve"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ACCESS_DENIED");
}

/// Delays or fails counts per queue; everything else goes to memory.
struct ScriptedCounts {
    inner: MemoryStore,
    delay: fn(Queue) -> Duration,
    fail_on: Option<Queue>,
}

#[async_trait]
impl CapitalCallStore for ScriptedCounts {
    async fn find_by_id(&self, id: CapitalCallId) -> Result<Option<CapitalCall>> {
        self.inner.find_by_id(id).await
    }

    async fn insert(&self, record: NewCapitalCallRecord) -> Result<CapitalCall> {
        self.inner.insert(record).await
    }

    async fn update(&self, call: &CapitalCall) -> Result<CapitalCall> {
        self.inner.update(call).await
    }

    async fn count_by_queue(&self, queue: Queue, filter: &QueueCountFilter) -> Result<u64> {
        tokio::time::sleep((self.delay)(queue)).await;
        if self.fail_on == Some(queue) {
            return Err(Error::Other(format!("count for {queue} failed")));
        }
        self.inner.count_by_queue(queue, filter).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Page<CapitalCall>> {
        self.inner.search(query).await
    }
}

#[tokio::test]
async fn counts_keep_request_order_whatever_finishes_first() {
    let store = Arc::new(ScriptedCounts {
        inner: MemoryStore::new(),
        delay: |q| match q {
            Queue::SsiVerification => Duration::from_millis(60),
            Queue::Review => Duration::from_millis(30),
            _ => Duration::ZERO,
        },
        fail_on: None,
    });
    let service = service_over(store);
    let order = [
        Queue::SsiVerification,
        Queue::Review,
        Queue::Approval,
        Queue::Completed,
        Queue::Rejected,
    ];
    let counts = service
        .get_counts_by_queue(&CountRequest::new(order), &alice())
        .await
        .unwrap();
    assert_eq!(counts.queues().collect::<Vec<_>>(), order.to_vec());
}

#[tokio::test]
async fn one_failed_count_fails_the_whole_request() {
    let store = Arc::new(ScriptedCounts {
        inner: MemoryStore::new(),
        delay: |_| Duration::ZERO,
        fail_on: Some(Queue::Approval),
    });
    let service = service_over(store);
    let err = service
        .get_counts_by_queue(
            &CountRequest::new([Queue::Review, Queue::Approval, Queue::Completed]),
            &alice(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INTERNAL_ERROR");
}

// ---------------------------------------------------------------------------
// Concurrent edits
// ---------------------------------------------------------------------------

/// Holds every `find_by_id` until two callers have loaded, so both work
/// from the same version.
struct LockstepLoads {
    inner: Arc<MemoryStore>,
    gate: Barrier,
}

#[async_trait]
impl CapitalCallStore for LockstepLoads {
    async fn find_by_id(&self, id: CapitalCallId) -> Result<Option<CapitalCall>> {
        let found = self.inner.find_by_id(id).await;
        self.gate.wait().await;
        found
    }

    async fn insert(&self, record: NewCapitalCallRecord) -> Result<CapitalCall> {
        self.inner.insert(record).await
    }

    async fn update(&self, call: &CapitalCall) -> Result<CapitalCall> {
        self.inner.update(call).await
    }

    async fn count_by_queue(&self, queue: Queue, filter: &QueueCountFilter) -> Result<u64> {
        self.inner.count_by_queue(queue, filter).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Page<CapitalCall>> {
        self.inner.search(query).await
    }
}

#[tokio::test]
async fn concurrent_updates_from_one_version_lose_one_write() {
    let (memory, plain) = setup();
    let created = plain.create(&sixty_forty(), &alice()).await.unwrap();

    let gated = service_over(Arc::new(LockstepLoads {
        inner: memory.clone(),
        gate: Barrier::new(2),
    }));
    let first = CapitalCallRequest::new("ALE-000123", dec!(111.00));
    let second = CapitalCallRequest::new("ALE-000123", dec!(222.00));

    let actor = alice();
    let (a, b) = tokio::join!(
        gated.update(created.id, &first, &actor),
        gated.update(created.id, &second, &actor),
    );

    let (winner, loser) = match (a, b) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(matches!(loser, Error::VersionConflict { expected: 0, .. }));
    assert_eq!(winner.version, 1);

    let stored = memory.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.total_amount, winner.total_amount);
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_returns_summaries() {
    let (_, service) = setup();
    service.create(&sixty_forty(), &alice()).await.unwrap();
    let id = submitted(&service).await;

    let query = SearchQuery::new().filter(SearchFilter::WorkflowStatus(WorkflowStatus::Submitted));
    let page = service.search(&query, &alice()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, id);
    assert!(page.items[0].locked_by.is_none());

    let everything = service.search(&SearchQuery::new(), &alice()).await.unwrap();
    assert_eq!(everything.total, 2);
    assert_eq!(everything.size, 25);
    // Newest first by default.
    assert_eq!(everything.items[0].id, id);
}
