//! Protocols: batches of incidents forming one undo step.
//!
//! A protocol starts unsigned and accepts incidents, which apply immediately.
//! Signing closes it: empty incidents are pruned, and a protocol left with
//! nothing is rejected (its inverse runs, restoring the state it found).

use std::fmt;

use strum::Display;

use crate::incident::Incident;
use crate::{EngineError, Result};

/// Lifecycle state of a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Sign {
    NotSigned,
    /// Signed empty; excised from the timeline.
    Rejected,
    Approved,
}

/// Which way a protocol is being replayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Inverse,
}

/// Life-cycle hook run around [`Protocol::apply`] / [`Protocol::inverse`].
pub type ProtocolHook<T> = Box<dyn FnMut(&mut T, Direction)>;

/// An ordered batch of incidents.
pub struct Protocol<I: Incident> {
    title: String,
    incidents: Vec<I>,
    sign: Sign,
    before: Option<ProtocolHook<I::Target>>,
    after: Option<ProtocolHook<I::Target>>,
}

impl<I: Incident> Protocol<I> {
    /// New unsigned protocol.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            incidents: Vec::new(),
            sign: Sign::NotSigned,
            before: None,
            after: None,
        }
    }

    /// Already-approved root of a timeline.
    pub(crate) fn sentinel() -> Self {
        let mut protocol = Self::new("");
        protocol.sign = Sign::Approved;
        protocol
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn is_signed(&self) -> bool {
        self.sign != Sign::NotSigned
    }

    pub fn incidents(&self) -> &[I] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn set_before_hook(&mut self, hook: ProtocolHook<I::Target>) {
        self.before = Some(hook);
    }

    pub fn set_after_hook(&mut self, hook: ProtocolHook<I::Target>) {
        self.after = Some(hook);
    }

    /// Whether any incident satisfies `predicate`.
    ///
    /// Callers use this to avoid recording the same kind of incident twice in
    /// one step.
    pub fn has_incident(&self, predicate: impl Fn(&I) -> bool) -> bool {
        self.incidents.iter().any(predicate)
    }

    /// Add an incident, merging it into an earlier one where possible.
    ///
    /// Existing incidents are scanned newest first; the first that absorbs
    /// `incident` is re-applied (when `immediate`) and `incident` is dropped.
    /// The scan stops at an incident that blocks the merge. Otherwise
    /// `incident` is appended and, when `immediate`, applied now.
    pub fn add_incident(
        &mut self,
        mut incident: I,
        target: &mut I::Target,
        immediate: bool,
    ) -> Result<()> {
        if self.is_signed() {
            return Err(EngineError::illegal(format!(
                "protocol '{}' is already signed ({})",
                self.title, self.sign
            )));
        }

        for existing in self.incidents.iter_mut().rev() {
            if existing.merge_with(&incident) {
                if immediate {
                    existing.apply(target);
                }
                return Ok(());
            }
            if existing.blocks_merge(&incident) {
                break;
            }
        }

        if immediate {
            incident.apply(target);
        }
        self.incidents.push(incident);
        Ok(())
    }

    /// Close the protocol.
    ///
    /// Prunes empty incidents. A protocol left with none is rejected when
    /// `rejectable` (it has a predecessor to fall back to): its inverse runs
    /// so the target is back where it was. Otherwise it is approved.
    pub fn try_sign(&mut self, target: &mut I::Target, rejectable: bool) -> Result<Sign> {
        if self.is_signed() {
            return Err(EngineError::illegal(format!(
                "protocol '{}' is already signed ({})",
                self.title, self.sign
            )));
        }

        self.incidents.retain(|incident| !incident.is_empty());

        if self.incidents.is_empty() && rejectable {
            self.sign = Sign::Rejected;
            self.inverse(target);
        } else {
            self.sign = Sign::Approved;
        }

        tracing::debug!(title = %self.title, sign = %self.sign, incidents = self.incidents.len(), "protocol signed");
        Ok(self.sign)
    }

    /// Run incidents forward.
    pub fn apply(&mut self, target: &mut I::Target) {
        if let Some(hook) = self.before.as_mut() {
            hook(target, Direction::Apply);
        }
        for incident in self.incidents.iter_mut() {
            incident.apply(target);
        }
        if let Some(hook) = self.after.as_mut() {
            hook(target, Direction::Apply);
        }
    }

    /// Run incidents backward, newest first.
    pub fn inverse(&mut self, target: &mut I::Target) {
        if let Some(hook) = self.before.as_mut() {
            hook(target, Direction::Inverse);
        }
        for incident in self.incidents.iter_mut().rev() {
            incident.inverse(target);
        }
        if let Some(hook) = self.after.as_mut() {
            hook(target, Direction::Inverse);
        }
    }
}

impl<I: Incident + fmt::Debug> fmt::Debug for Protocol<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("title", &self.title)
            .field("sign", &self.sign)
            .field("incidents", &self.incidents)
            .finish_non_exhaustive()
    }
}
