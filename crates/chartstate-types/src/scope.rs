//! Visibility scope: which other containers may mirror an entry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::ContainerId;

/// Declares which containers besides the owner see an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityScope {
    /// Private to the owning container.
    #[default]
    None,
    /// Visible to every attached container (`'*'`).
    All,
    /// Visible to the listed containers only.
    Only(BTreeSet<ContainerId>),
}

impl VisibilityScope {
    /// Build an explicit scope from a list of container ids.
    pub fn only<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ContainerId>,
    {
        VisibilityScope::Only(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, VisibilityScope::None)
    }

    /// Whether a container with id `viewer` may hold a mirror.
    pub fn is_visible_to(&self, viewer: &ContainerId) -> bool {
        match self {
            VisibilityScope::None => false,
            VisibilityScope::All => true,
            VisibilityScope::Only(ids) => ids.contains(viewer),
        }
    }
}
