//! Workflow state machine and the advisory edit lock.
//!
//! `TRANSITIONS` is the only place legal moves are written down. Every
//! other question (can this action run, where does it lead, which buttons
//! should a UI show) is answered by reading it.
//!
//! ```text
//!   create ──► DRAFT ──submit──► SUBMITTED ──approve──► APPROVED
//!                                    │
//!                                    └──reject──► REJECTED
//! ```
//!
//! `unlock` keeps the status and works from every non-approved state.
//! `update` keeps the status and is open in DRAFT and REJECTED, where the
//! lock holder can edit.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Actor, CapitalCall, WorkflowStatus};

/// Something an actor can do to a capital call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Submit,
    Approve,
    Reject,
    Unlock,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Submit => "submit",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status every call starts in.
pub const INITIAL_STATUS: WorkflowStatus = WorkflowStatus::Draft;

const TRANSITIONS: &[(WorkflowStatus, Action, WorkflowStatus)] = {
    use Action::*;
    use WorkflowStatus::{Approved, Draft, Rejected, Submitted};
    &[
        (Draft, Update, Draft),
        (Draft, Submit, Submitted),
        (Draft, Unlock, Draft),
        (Submitted, Approve, Approved),
        (Submitted, Reject, Rejected),
        (Submitted, Unlock, Submitted),
        (Rejected, Update, Rejected),
        (Rejected, Unlock, Rejected),
    ]
};

/// Where `action` leads from `from`, or `InvalidTransition`.
pub fn check_transition(from: WorkflowStatus, action: Action) -> Result<WorkflowStatus> {
    TRANSITIONS
        .iter()
        .find(|(f, a, _)| *f == from && *a == action)
        .map(|(_, _, to)| *to)
        .ok_or(Error::InvalidTransition { from, action })
}

/// Whether some action moves `from` to a different status `to`.
pub fn can_transition_to(from: WorkflowStatus, to: WorkflowStatus) -> bool {
    from != to && TRANSITIONS.iter().any(|(f, _, t)| *f == from && *t == to)
}

/// Actions legal from `status`, in table order.
pub fn allowed_actions(status: WorkflowStatus) -> Vec<Action> {
    TRANSITIONS
        .iter()
        .filter(|(f, _, _)| *f == status)
        .map(|(_, a, _)| *a)
        .collect()
}

/// Distinct statuses reachable in one step, excluding `status` itself.
pub fn allowed_next_statuses(status: WorkflowStatus) -> Vec<WorkflowStatus> {
    let mut next = Vec::new();
    for (f, _, t) in TRANSITIONS {
        if *f == status && *t != status && !next.contains(t) {
            next.push(*t);
        }
    }
    next
}

/// Lock discipline for edits: the call must not be approved and `actor`
/// must be the current lock holder.
///
/// Independent of the version check the store does on write.
pub fn ensure_editable(call: &CapitalCall, actor: &Actor) -> Result<()> {
    if call.workflow_status.is_terminal() {
        return Err(Error::LockConflict(format!(
            "capital call {} is {} and can no longer be modified",
            call.id, call.workflow_status
        )));
    }
    if call.is_locked_by(actor) {
        return Ok(());
    }
    match call.locked_by() {
        Some(holder) => Err(Error::LockConflict(format!(
            "capital call {} is locked by {holder}",
            call.id
        ))),
        None => Err(Error::LockConflict(format!(
            "capital call {} is not locked by {actor}",
            call.id
        ))),
    }
}
