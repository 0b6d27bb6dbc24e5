//! Typed identifiers for containers and the entries they hold.
//!
//! A `ContainerId` names one pane-level owner of entries (`"ds1"`, `"pane-2"`).
//! A `Reference` addresses an entry inside some container: either a bare local
//! id (the entry is native to the container holding it) or an
//! `(owner, local)` pair (the entry is a mirror of something `owner` holds
//! natively).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a container (one pane's entry collection).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.0)
    }
}

/// Address of an entry within a container.
///
/// Two references are equal iff they are the same bare id, or the same
/// `(owner, local)` pair component-wise. A native `"e0"` never equals a
/// foreign `("ds1", "e0")`.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    /// Entry owned by the container that holds it.
    Native(String),
    /// Mirror of an entry owned natively by `owner`.
    Foreign { owner: ContainerId, local: String },
}

impl Reference {
    pub fn native(local: impl Into<String>) -> Self {
        Reference::Native(local.into())
    }

    pub fn foreign(owner: impl Into<ContainerId>, local: impl Into<String>) -> Self {
        Reference::Foreign {
            owner: owner.into(),
            local: local.into(),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Reference::Native(_))
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, Reference::Foreign { .. })
    }

    /// The id local to the owning container.
    pub fn local_id(&self) -> &str {
        match self {
            Reference::Native(local) | Reference::Foreign { local, .. } => local,
        }
    }

    /// Owning container for foreign references; `None` for native ones.
    pub fn owner(&self) -> Option<&ContainerId> {
        match self {
            Reference::Native(_) => None,
            Reference::Foreign { owner, .. } => Some(owner),
        }
    }

    /// True if this is a foreign reference owned by `owner`.
    pub fn is_owned_by(&self, owner: &ContainerId) -> bool {
        self.owner() == Some(owner)
    }

    /// How an entry held in `holder` under this reference is addressed from
    /// `viewer`.
    ///
    /// Native references get wrapped with the holder's id. Foreign references
    /// keep their pair, except inside their own origin container where they
    /// collapse back to the bare local id.
    pub fn address_from(&self, holder: &ContainerId, viewer: &ContainerId) -> Reference {
        match self {
            Reference::Native(local) => {
                if holder == viewer {
                    self.clone()
                } else {
                    Reference::foreign(holder.clone(), local.clone())
                }
            }
            Reference::Foreign { owner, local } => {
                if owner == viewer {
                    Reference::native(local.clone())
                } else {
                    self.clone()
                }
            }
        }
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Reference::native(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Native(local) => f.write_str(local),
            Reference::Foreign { owner, local } => write!(f, "[{owner},{local}]"),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({self})")
    }
}
