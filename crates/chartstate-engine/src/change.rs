//! Batched change notifications.
//!
//! A container collects one [`ChangeEvent`] per entry touched while a
//! transaction (or an out-of-band batch) runs, then hands subscribers a single
//! [`ChangeBatch`]. Observers never see a half-applied transaction.
//!
//! # Origin tracking
//!
//! Every batch carries a [`ChangeOrigin`], used to prevent echo loops between
//! containers that share entries:
//! - `Local`: the container's own edits (transactions, undo/redo, content)
//! - `Shared`: writes the replication hub made on the container's behalf;
//!   these must not be replicated again

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use chartstate_types::{ChangeReason, ContainerId, Entry};

/// Where a batch of changes came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeOrigin {
    /// Edits made through the container itself.
    #[default]
    Local,
    /// Mirror writes made by the replication hub.
    Shared,
}

/// One entry touched for one reason.
///
/// `entry` is a snapshot taken when the change happened; for removals it is
/// the entry as it was just before it left storage.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub reason: ChangeReason,
    pub entry: Entry,
}

/// All changes a container made in one transaction or out-of-band batch.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeBatch {
    source: ContainerId,
    origin: ChangeOrigin,
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub fn new(source: ContainerId, origin: ChangeOrigin, events: Vec<ChangeEvent>) -> Self {
        Self {
            source,
            origin,
            events,
        }
    }

    pub fn source(&self) -> &ContainerId {
        &self.source
    }

    pub fn origin(&self) -> ChangeOrigin {
        self.origin
    }

    pub fn is_shared(&self) -> bool {
        self.origin == ChangeOrigin::Shared
    }

    /// Events in the order they happened.
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Entries grouped by reason, each group in event order.
    pub fn by_reason(&self) -> BTreeMap<ChangeReason, Vec<&Entry>> {
        let mut grouped: BTreeMap<ChangeReason, Vec<&Entry>> = BTreeMap::new();
        for event in &self.events {
            grouped.entry(event.reason).or_default().push(&event.entry);
        }
        grouped
    }

    /// Entries recorded for one reason.
    pub fn entries(&self, reason: ChangeReason) -> impl Iterator<Item = &Entry> {
        self.events
            .iter()
            .filter(move |e| e.reason == reason)
            .map(|e| &e.entry)
    }
}

/// Receiver of a container's change batches.
pub trait ChangeSink {
    fn on_change(&mut self, batch: &ChangeBatch);
}

impl<F: FnMut(&ChangeBatch)> ChangeSink for F {
    fn on_change(&mut self, batch: &ChangeBatch) {
        self(batch)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered sinks, notified in subscription order.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    sinks: Vec<(SubscriptionId, Box<dyn ChangeSink>)>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self, sink: Box<dyn ChangeSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.sinks.push((id, sink));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sid, _)| *sid != id);
        self.sinks.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks.len()
    }

    pub(crate) fn dispatch(&mut self, batch: &ChangeBatch) {
        for (_, sink) in self.sinks.iter_mut() {
            sink.on_change(batch);
        }
    }
}
