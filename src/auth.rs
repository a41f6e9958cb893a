//! Authorization: may this actor exercise this capability?
//!
//! The service asks an [`Authorizer`] before touching the store. The
//! bundled [`PolicyAuthorizer`] reads a TOML policy:
//!
//! ```toml
//! [actors.alice]
//! capabilities = ["view", "edit", "submit"]
//!
//! [actors.root]
//! admin = true
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Actor;
use crate::workflow::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    Edit,
    Submit,
    Approve,
    UnlockWorkItem,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Edit => "edit",
            Capability::Submit => "submit",
            Capability::Approve => "approve",
            Capability::UnlockWorkItem => "unlock_work_item",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability a mutating action needs. Approve and reject share one.
impl From<Action> for Capability {
    fn from(action: Action) -> Self {
        match action {
            Action::Create | Action::Update => Capability::Edit,
            Action::Submit => Capability::Submit,
            Action::Approve | Action::Reject => Capability::Approve,
            Action::Unlock => Capability::UnlockWorkItem,
        }
    }
}

pub trait Authorizer: Send + Sync {
    /// `Ok(())` when allowed, `Error::PermissionDenied` otherwise.
    fn check_permission(&self, actor: &Actor, capability: Capability) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Policy file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    actors: HashMap<String, ActorGrant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ActorGrant {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    capabilities: HashSet<Capability>,
}

/// Grants read from a TOML policy. Unknown actors get nothing.
#[derive(Debug, Clone, Default)]
pub struct PolicyAuthorizer {
    grants: HashMap<String, ActorGrant>,
    allow_all: bool,
}

impl PolicyAuthorizer {
    /// Every actor may do everything. For local tooling and tests.
    pub fn allow_all() -> Self {
        Self {
            grants: HashMap::new(),
            allow_all: true,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Self::parse(content, "inline")
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read policy {}: {e}", path.display()))
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, source: &str) -> Result<Self> {
        let file: PolicyFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad authorization policy {source}: {e}")))?;
        Ok(Self {
            grants: file.actors,
            allow_all: false,
        })
    }

    /// Grant `capabilities` to `actor`, replacing any earlier grant.
    pub fn grant(
        mut self,
        actor: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.grants.insert(
            actor.into(),
            ActorGrant {
                admin: false,
                capabilities: capabilities.into_iter().collect(),
            },
        );
        self
    }

    pub fn admin(mut self, actor: impl Into<String>) -> Self {
        self.grants.insert(
            actor.into(),
            ActorGrant {
                admin: true,
                capabilities: HashSet::new(),
            },
        );
        self
    }

    fn allows(&self, actor: &Actor, capability: Capability) -> bool {
        if self.allow_all {
            return true;
        }
        self.grants
            .get(actor.as_str())
            .is_some_and(|g| g.admin || g.capabilities.contains(&capability))
    }
}

impl Authorizer for PolicyAuthorizer {
    fn check_permission(&self, actor: &Actor, capability: Capability) -> Result<()> {
        if self.allows(actor, capability) {
            Ok(())
        } else {
            tracing::debug!(actor = %actor, %capability, "permission denied");
            Err(Error::PermissionDenied {
                actor: actor.as_str().to_string(),
                capability,
            })
        }
    }
}
