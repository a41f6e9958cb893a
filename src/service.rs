//! Capital call orchestration.
//!
//! Every public operation follows the same order: authorize, load, check
//! workflow and lock rules, validate, write through the store. A denial
//! or rule failure returns before anything is written. Each write is a
//! single compare-and-set in the store, so a concurrent edit that slipped
//! in after the load surfaces as `VersionConflict`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use opentelemetry::KeyValue;
use tracing::{Instrument, Span};

use crate::allocation::apply_breakdowns;
use crate::auth::{Authorizer, Capability};
use crate::config::ServiceConfig;
use crate::error::{Error, Result, ValidationKind};
use crate::model::{
    Actor, Audit, CapitalCall, CapitalCallDetail, CapitalCallId, CapitalCallRequest,
    CapitalCallSummary, CountRequest, Lock, NewCapitalCallRecord, Page, Queue, QueueCounts,
    SearchQuery,
};
use crate::store::CapitalCallStore;
use crate::telemetry::metrics;
use crate::telemetry::span::{record_state_transition, start_action_span};
use crate::validation::CapitalCallValidator;
use crate::workflow::{self, Action};

pub struct CapitalCallService {
    store: Arc<dyn CapitalCallStore>,
    authorizer: Arc<dyn Authorizer>,
    validator: CapitalCallValidator,
    config: ServiceConfig,
}

impl CapitalCallService {
    pub fn new(
        store: Arc<dyn CapitalCallStore>,
        authorizer: Arc<dyn Authorizer>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            authorizer,
            validator: CapitalCallValidator::new(config.limits),
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn search(
        &self,
        query: &SearchQuery,
        actor: &Actor,
    ) -> Result<Page<CapitalCallSummary>> {
        self.authorizer.check_permission(actor, Capability::View)?;
        let page = self.store.search(query).await?;
        Ok(page.map(CapitalCallSummary::from))
    }

    pub async fn get_by_id(&self, id: CapitalCallId, actor: &Actor) -> Result<CapitalCallDetail> {
        self.authorizer.check_permission(actor, Capability::View)?;
        Ok(self.load(id).await?.into())
    }

    /// One count per requested queue, keyed in request order.
    ///
    /// Counts run concurrently, at most `count_concurrency` at a time. Any
    /// failed count fails the whole call; partial maps are never returned.
    /// A queue named twice is counted once, at its first position.
    pub async fn get_counts_by_queue(
        &self,
        request: &CountRequest,
        actor: &Actor,
    ) -> Result<QueueCounts> {
        self.authorizer.check_permission(actor, Capability::View)?;
        if request.queues.is_empty() {
            return Err(Error::validation(
                ValidationKind::EmptyQueues,
                "at least one queue is required",
            ));
        }

        let mut queues: Vec<Queue> = Vec::with_capacity(request.queues.len());
        for q in &request.queues {
            if !queues.contains(q) {
                queues.push(*q);
            }
        }

        let started = Instant::now();
        let store = &self.store;
        let filter = &request.filter;
        let counts: Vec<u64> = stream::iter(queues.iter().copied())
            .map(|queue| async move { store.count_by_queue(queue, filter).await })
            .buffered(self.config.count_concurrency.max(1))
            .try_collect()
            .await?;

        metrics::queue_counts_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("queues", queues.len() as i64)],
        );

        Ok(QueueCounts::new(queues.into_iter().zip(counts).collect()))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// New call in DRAFT, locked by `actor`.
    pub async fn create(
        &self,
        request: &CapitalCallRequest,
        actor: &Actor,
    ) -> Result<CapitalCallDetail> {
        let span = start_action_span(Action::Create.as_str(), None);
        let result = self
            .create_inner(request, actor, &span)
            .instrument(span.clone())
            .await;
        finish(Action::Create, actor, &result);
        result
    }

    async fn create_inner(
        &self,
        request: &CapitalCallRequest,
        actor: &Actor,
        span: &Span,
    ) -> Result<CapitalCallDetail> {
        self.authorizer.check_permission(actor, Action::Create.into())?;
        self.validator.validate_request(request)?;

        let now = Utc::now();
        let record = NewCapitalCallRecord {
            batch_id: request.batch_id.clone(),
            from_date: request.from_date,
            to_date: request.to_date,
            day_type: request.day_type.clone(),
            total_amount: request.total_amount,
            workflow_status: workflow::INITIAL_STATUS,
            queue: request.queue.unwrap_or_default(),
            lock: Some(Lock::acquire(actor, now)),
            client_name: request.client_name.clone(),
            asset_description: request.asset_description.clone(),
            reference_id: request.reference_id.clone(),
            is_sensitive: request.is_sensitive,
            breakdowns: apply_breakdowns(
                request.total_amount,
                &request.breakdowns,
                self.validator.limits().amount_precision,
            )?,
            audit: Audit::created(actor, now),
        };

        let call = self.store.insert(record).await?;
        span.record("capital_call.id", tracing::field::display(call.id));
        span.record("capital_call.status", call.workflow_status.as_str());
        tracing::info!(
            id = %call.id,
            batch_id = %call.batch_id,
            total_amount = %call.total_amount,
            breakdowns = call.breakdowns.len(),
            "capital call created"
        );
        Ok(call.into())
    }

    /// Full replace of the editable fields, breakdowns included.
    ///
    /// Only the lock holder may update, and never once approved. When the
    /// request carries `expected_version`, it must match the stored one.
    pub async fn update(
        &self,
        id: CapitalCallId,
        request: &CapitalCallRequest,
        actor: &Actor,
    ) -> Result<CapitalCallDetail> {
        let span = start_action_span(Action::Update.as_str(), Some(id));
        let result = self
            .update_inner(id, request, actor)
            .instrument(span.clone())
            .await;
        finish(Action::Update, actor, &result);
        result
    }

    async fn update_inner(
        &self,
        id: CapitalCallId,
        request: &CapitalCallRequest,
        actor: &Actor,
    ) -> Result<CapitalCallDetail> {
        self.authorizer.check_permission(actor, Action::Update.into())?;
        let mut call = self.load(id).await?;

        workflow::ensure_editable(&call, actor)?;
        workflow::check_transition(call.workflow_status, Action::Update)?;
        match request.expected_version {
            Some(expected) if expected != call.version => {
                return Err(Error::VersionConflict { id, expected });
            }
            _ => {}
        }
        self.validator.validate_request(request)?;

        call.batch_id = request.batch_id.clone();
        call.from_date = request.from_date;
        call.to_date = request.to_date;
        call.day_type = request.day_type.clone();
        call.total_amount = request.total_amount;
        if let Some(queue) = request.queue {
            call.queue = queue;
        }
        call.client_name = request.client_name.clone();
        call.asset_description = request.asset_description.clone();
        call.reference_id = request.reference_id.clone();
        call.is_sensitive = request.is_sensitive;
        call.breakdowns = apply_breakdowns(
            request.total_amount,
            &request.breakdowns,
            self.validator.limits().amount_precision,
        )?;
        call.audit.touch(actor, Utc::now());

        let saved = self.store.update(&call).await?;
        tracing::info!(
            id = %saved.id,
            version = saved.version,
            breakdowns = saved.breakdowns.len(),
            "capital call updated"
        );
        Ok(saved.into())
    }

    /// DRAFT to SUBMITTED. Re-validates the stored call and releases the lock.
    pub async fn submit(&self, id: CapitalCallId, actor: &Actor) -> Result<CapitalCallDetail> {
        self.run_transition(id, actor, Action::Submit).await
    }

    /// SUBMITTED to APPROVED. Terminal.
    pub async fn approve(&self, id: CapitalCallId, actor: &Actor) -> Result<CapitalCallDetail> {
        self.run_transition(id, actor, Action::Approve).await
    }

    /// SUBMITTED to REJECTED; the rejecting actor takes the lock.
    pub async fn reject(&self, id: CapitalCallId, actor: &Actor) -> Result<CapitalCallDetail> {
        self.run_transition(id, actor, Action::Reject).await
    }

    /// Administrative release of the lock, whoever holds it. Status is
    /// unchanged. Refused once approved.
    pub async fn unlock(&self, id: CapitalCallId, actor: &Actor) -> Result<()> {
        let span = start_action_span(Action::Unlock.as_str(), Some(id));
        let result = self
            .unlock_inner(id, actor)
            .instrument(span.clone())
            .await;
        finish(Action::Unlock, actor, &result);
        result
    }

    async fn unlock_inner(&self, id: CapitalCallId, actor: &Actor) -> Result<()> {
        self.authorizer.check_permission(actor, Action::Unlock.into())?;
        let mut call = self.load(id).await?;
        workflow::check_transition(call.workflow_status, Action::Unlock)?;

        let previous = call.lock.take();
        call.audit.touch(actor, Utc::now());
        self.store.update(&call).await?;

        tracing::info!(
            id = %id,
            previous_holder = previous.as_ref().map(|l| l.holder.as_str()),
            "capital call unlocked"
        );
        Ok(())
    }

    async fn run_transition(
        &self,
        id: CapitalCallId,
        actor: &Actor,
        action: Action,
    ) -> Result<CapitalCallDetail> {
        let span = start_action_span(action.as_str(), Some(id));
        let result = self
            .transition_inner(id, actor, action, &span)
            .instrument(span.clone())
            .await;
        finish(action, actor, &result);
        result
    }

    async fn transition_inner(
        &self,
        id: CapitalCallId,
        actor: &Actor,
        action: Action,
        span: &Span,
    ) -> Result<CapitalCallDetail> {
        self.authorizer.check_permission(actor, action.into())?;
        let mut call = self.load(id).await?;

        let from = call.workflow_status;
        let to = workflow::check_transition(from, action)?;
        if action == Action::Submit {
            self.validator.validate_for_submission(&call)?;
        }

        let now = Utc::now();
        match action {
            Action::Submit => call.lock = None,
            Action::Reject => call.lock = Some(Lock::acquire(actor, now)),
            _ => {}
        }
        call.workflow_status = to;
        call.audit.touch(actor, now);

        let saved = self.store.update(&call).await?;

        record_state_transition(span, from, to);
        metrics::state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
        Ok(saved.into())
    }

    async fn load(&self, id: CapitalCallId) -> Result<CapitalCall> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

/// Log and count the outcome of a write.
fn finish<T>(action: Action, actor: &Actor, result: &Result<T>) {
    metrics::record_action(action.as_str(), result);
    match result {
        Ok(_) => tracing::debug!(action = %action, actor = %actor, "action completed"),
        Err(e @ (Error::Database(_) | Error::Migration(_) | Error::Io(_) | Error::Other(_))) => {
            tracing::error!(action = %action, actor = %actor, code = e.code(), error = %e, "action failed");
        }
        Err(e) => {
            tracing::warn!(action = %action, actor = %actor, code = e.code(), error = %e, "action rejected");
        }
    }
}
