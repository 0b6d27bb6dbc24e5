//! Entries: the drawable records a container holds.
//!
//! ## Options
//!
//! `EntryOptions` carries the typed visibility scope plus a free-form JSON
//! property map (colors, anchor points, line style, whatever the renderer
//! reads). Updates arrive as an [`OptionsPatch`] and are deep-merged: nested
//! objects merge key by key, every other value replaces.
//!
//! ## Validity
//!
//! `valid` is a render-cache flag. The engine clears it whenever an entry's
//! options or content change; renderers set it back after redrawing. A mirror
//! in another container has its own flag and is invalidated separately.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, EnumIter, EnumString};

use crate::ids::Reference;
use crate::scope::VisibilityScope;

/// Options of an entry: typed visibility plus renderer-defined properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryOptions {
    #[serde(default)]
    pub visibility: VisibilityScope,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visibility(mut self, visibility: VisibilityScope) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Deep-merge a patch into these options.
    pub fn merge(&mut self, patch: &OptionsPatch) {
        if let Some(visibility) = &patch.visibility {
            self.visibility = visibility.clone();
        }
        deep_merge(&mut self.props, &patch.props);
    }

    /// Copy of these options with `patch` merged in.
    pub fn merged(&self, patch: &OptionsPatch) -> Self {
        let mut next = self.clone();
        next.merge(patch);
        next
    }
}

/// Partial options for an update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<VisibilityScope>,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl OptionsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visibility(mut self, visibility: VisibilityScope) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.visibility.is_none() && self.props.is_empty()
    }
}

fn deep_merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (target.get_mut(key), value)
        {
            deep_merge(existing, incoming);
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// A drawable record held by exactly one container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub reference: Reference,
    /// Entry type (`"trend_line"`, `"label"`); also the id-generator namespace.
    pub kind: String,
    pub options: EntryOptions,
    /// Render cache is up to date.
    pub valid: bool,
    pub visible_in_viewport: bool,
    /// Renderer-owned state; the engine only carries it along.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_state: Option<Value>,
}

impl Entry {
    pub fn new(reference: Reference, kind: impl Into<String>, options: EntryOptions) -> Self {
        Self {
            reference,
            kind: kind.into(),
            options,
            valid: false,
            visible_in_viewport: true,
            render_state: None,
        }
    }

    pub fn mark_invalid(&mut self) {
        self.valid = false;
    }

    pub fn mark_valid(&mut self) {
        self.valid = true;
    }

    /// Same entry under a different reference, with a fresh render cache.
    ///
    /// Used for mirrors: the copy shares options but not render state.
    pub fn readdressed(&self, reference: Reference) -> Self {
        Self {
            reference,
            kind: self.kind.clone(),
            options: self.options.clone(),
            valid: false,
            visible_in_viewport: self.visible_in_viewport,
            render_state: None,
        }
    }
}

/// Descriptor for a new entry: type, optional explicit id, initial options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntrySpec {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub options: EntryOptions,
}

impl EntrySpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            options: EntryOptions::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_options(mut self, options: EntryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_visibility(mut self, visibility: VisibilityScope) -> Self {
        self.options.visibility = visibility;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.props.insert(key.into(), value.into());
        self
    }
}

/// Why an entry appears in a change notification.
///
/// Declaration order is the order reasons are grouped in a batch.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ChangeReason {
    AddEntry,
    UpdateEntry,
    RemoveEntry,
    /// Container contents were replaced wholesale.
    CacheReset,
    /// Render caches dropped without any content change.
    CacheInvalidated,
    /// Underlying data (not options) changed out of band.
    DataInvalid,
}

impl ChangeReason {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Reasons the replication hub mirrors into other containers.
    pub fn is_replicated(&self) -> bool {
        matches!(
            self,
            ChangeReason::AddEntry
                | ChangeReason::UpdateEntry
                | ChangeReason::RemoveEntry
                | ChangeReason::DataInvalid
        )
    }
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn test_deep_merge_nested_objects() {
        let mut options = EntryOptions::new()
            .with_prop("style", json!({"color": "red", "width": 1}))
            .with_prop("text", "a");

        options.merge(&OptionsPatch::new().set("style", json!({"width": 3})));

        assert_eq!(options.get("style"), Some(&json!({"color": "red", "width": 3})));
        assert_eq!(options.get("text"), Some(&json!("a")));
    }

    #[test]
    fn test_merge_replaces_scalars_and_visibility() {
        let mut options = EntryOptions::new().with_prop("text", "a");
        options.merge(
            &OptionsPatch::new()
                .set("text", "b")
                .visibility(VisibilityScope::All),
        );
        assert_eq!(options.get("text"), Some(&json!("b")));
        assert_eq!(options.visibility, VisibilityScope::All);
    }

    #[test]
    fn test_merge_object_over_scalar() {
        let mut options = EntryOptions::new().with_prop("points", 0);
        options.merge(&OptionsPatch::new().set("points", json!({"a": 1})));
        assert_eq!(options.get("points"), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_readdressed_resets_render_cache() {
        let mut entry = Entry::new(Reference::native("e0"), "line", EntryOptions::new());
        entry.mark_valid();
        entry.render_state = Some(json!({"path": [1, 2]}));

        let mirror = entry.readdressed(Reference::foreign("ds1", "e0"));
        assert!(!mirror.valid);
        assert!(mirror.render_state.is_none());
        assert_eq!(mirror.options, entry.options);
    }

    #[test]
    fn test_change_reason_strings() {
        assert_eq!(ChangeReason::DataInvalid.to_string(), "data_invalid");
        assert_eq!(ChangeReason::from_str("ADD_ENTRY"), Some(ChangeReason::AddEntry));
        let replicated: Vec<_> = ChangeReason::iter().filter(|r| r.is_replicated()).collect();
        assert_eq!(replicated.len(), 4);
    }
}
