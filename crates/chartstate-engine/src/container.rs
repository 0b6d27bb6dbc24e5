//! Containers: one pane's entries, its history, and its change feed.
//!
//! Every structural edit goes through a transaction:
//!
//! ```text
//! begin_transaction(opts)
//!     add / update / remove / clone_entry   → EntryIncident, applied now
//! end_transaction()
//!     sign the protocol (unless grouped)    → one ChangeBatch to subscribers
//! ```
//!
//! Content arriving from a data source bypasses history through
//! [`Container::no_history_managed_entries_process`]. Mirror writes made by the
//! replication hub bypass history too and are flushed as `Shared` batches.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chartstate_types::{
    ChangeReason, ContainerId, Entry, EntryOptions, EntrySpec, OptionsPatch, Reference,
};

use crate::change::{
    ChangeBatch, ChangeEvent, ChangeOrigin, ChangeSink, SubscriptionId, Subscribers,
};
use crate::config::EngineConfig;
use crate::id_alloc::IdAllocator;
use crate::incident::Incident;
use crate::protocol::{ProtocolHook, Sign};
use crate::storage::{self, EntryStorage, Removed};
use crate::timeline::{Clock, ProtocolRequest, Timeline};
use crate::{EngineError, Result};

/// How a transaction maps onto undo steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Undo step title.
    pub title: String,
    /// Grouping window for grouped transactions.
    pub timeout: Option<Duration>,
    /// Leave the protocol open at `end_transaction` so a later transaction
    /// with the same title can join it (drags, keyboard nudges).
    pub grouped: bool,
}

impl TransactionOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            timeout: None,
            grouped: false,
        }
    }

    pub fn grouped(mut self) -> Self {
        self.grouped = true;
        self
    }

    /// Grouped, joining only within `timeout` of the last use.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.grouped = true;
        self.timeout = Some(timeout);
        self
    }
}

impl From<&str> for TransactionOptions {
    fn from(title: &str) -> Self {
        Self::new(title)
    }
}

/// What entry incidents mutate: the storage plus the pending change log.
#[derive(Debug)]
pub struct ContainerState {
    id: ContainerId,
    storage: EntryStorage,
    pending: Vec<ChangeEvent>,
}

impl ContainerState {
    fn new(id: ContainerId) -> Self {
        Self {
            id,
            storage: EntryStorage::new(),
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn storage(&self) -> &EntryStorage {
        &self.storage
    }

    fn record(&mut self, reason: ChangeReason, entry: Entry) {
        self.pending.push(ChangeEvent { reason, entry });
    }
}

/// One reversible structural edit of a container.
#[derive(Clone, Debug)]
pub enum EntryIncident {
    Add {
        entry: Entry,
    },
    Update {
        reference: Reference,
        before: EntryOptions,
        after: EntryOptions,
    },
    /// `removed` is captured on every apply, with the neighbors inverse needs.
    Remove {
        reference: Reference,
        removed: Option<Removed>,
    },
}

impl EntryIncident {
    pub fn reference(&self) -> &Reference {
        match self {
            EntryIncident::Add { entry } => &entry.reference,
            EntryIncident::Update { reference, .. } | EntryIncident::Remove { reference, .. } => {
                reference
            }
        }
    }

    fn set_options(state: &mut ContainerState, reference: &Reference, options: &EntryOptions) {
        match state.storage.get_mut(reference) {
            Ok(entry) => {
                entry.options = options.clone();
                entry.mark_invalid();
                let snapshot = entry.clone();
                state.record(ChangeReason::UpdateEntry, snapshot);
            }
            Err(e) => tracing::warn!(container = %state.id, %reference, "update skipped: {e}"),
        }
    }

    fn take_out(state: &mut ContainerState, reference: &Reference) -> Option<Removed> {
        match state.storage.remove(reference) {
            Ok(removed) => {
                state.record(ChangeReason::RemoveEntry, removed.entry.clone());
                Some(removed)
            }
            Err(e) => {
                tracing::warn!(container = %state.id, %reference, "remove skipped: {e}");
                None
            }
        }
    }

    fn put_back(state: &mut ContainerState, mut entry: Entry, prev: Option<&Reference>, next: Option<&Reference>) {
        entry.mark_invalid();
        let snapshot = entry.clone();
        match state.storage.insert_near(entry, prev, next) {
            Ok(()) => state.record(ChangeReason::AddEntry, snapshot),
            Err(e) => {
                tracing::warn!(container = %state.id, reference = %snapshot.reference, "insert skipped: {e}")
            }
        }
    }
}

impl Incident for EntryIncident {
    type Target = ContainerState;

    fn apply(&mut self, state: &mut ContainerState) {
        match self {
            EntryIncident::Add { entry } => Self::put_back(state, entry.clone(), None, None),
            EntryIncident::Update {
                reference, after, ..
            } => Self::set_options(state, reference, after),
            EntryIncident::Remove { reference, removed } => {
                *removed = Self::take_out(state, reference);
            }
        }
    }

    fn inverse(&mut self, state: &mut ContainerState) {
        match self {
            EntryIncident::Add { entry } => {
                Self::take_out(state, &entry.reference);
            }
            EntryIncident::Update {
                reference, before, ..
            } => Self::set_options(state, reference, before),
            EntryIncident::Remove { removed, .. } => {
                if let Some(Removed { entry, prev, next }) = removed.take() {
                    Self::put_back(state, entry, prev.as_ref(), next.as_ref());
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, EntryIncident::Update { before, after, .. } if before == after)
    }

    fn merge_with(&mut self, other: &Self) -> bool {
        match (self, other) {
            (
                EntryIncident::Update {
                    reference, after, ..
                },
                EntryIncident::Update {
                    reference: other_ref,
                    after: other_after,
                    ..
                },
            ) if reference == other_ref => {
                *after = other_after.clone();
                true
            }
            _ => false,
        }
    }

    fn blocks_merge(&self, other: &Self) -> bool {
        !matches!(self, EntryIncident::Update { .. }) && self.reference() == other.reference()
    }
}

/// One pane's entries, with their timeline, id namespace, and subscribers.
pub struct Container {
    state: ContainerState,
    timeline: Timeline<EntryIncident>,
    ids: IdAllocator,
    transaction: Option<TransactionOptions>,
    subscribers: Subscribers,
    shared_pending: Vec<ChangeEvent>,
    /// Former neighbors of native entries removed through a mirror, keyed by
    /// reference, so a later re-add lands where the entry was.
    tombstones: HashMap<Reference, Neighbors>,
    config: EngineConfig,
}

#[derive(Clone, Debug)]
struct Neighbors {
    prev: Option<Reference>,
    next: Option<Reference>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.state.id)
            .field("entries", &self.state.storage.len())
            .field("transaction", &self.transaction)
            .field("undo_depth", &self.timeline.undo_depth())
            .finish_non_exhaustive()
    }
}

impl Container {
    pub fn new(id: impl Into<ContainerId>) -> Self {
        Self::with_config(id, EngineConfig::default())
    }

    pub fn with_config(id: impl Into<ContainerId>, config: EngineConfig) -> Self {
        let mut timeline = Timeline::new();
        timeline.set_max_depth(config.max_undo_depth);
        Self {
            state: ContainerState::new(id.into()),
            timeline,
            ids: IdAllocator::new(),
            transaction: None,
            subscribers: Subscribers::default(),
            shared_pending: Vec::new(),
            tombstones: HashMap::new(),
            config,
        }
    }

    /// Replace the grouping clock. Tests drive a `ManualClock` through this.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.timeline.set_clock(clock);
        self
    }

    pub fn id(&self) -> &ContainerId {
        &self.state.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &EntryStorage {
        &self.state.storage
    }

    pub fn entries(&self) -> storage::Iter<'_> {
        self.state.storage.iter()
    }

    /// References in storage order.
    pub fn references(&self) -> Vec<Reference> {
        self.state.storage.references()
    }

    pub fn entry(&self, reference: &Reference) -> Result<&Entry> {
        self.state.storage.get(reference)
    }

    pub fn has(&self, reference: &Reference) -> bool {
        self.state.storage.has(reference)
    }

    pub fn len(&self) -> usize {
        self.state.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.storage.is_empty()
    }

    /// Entries this container owns, in order.
    pub fn native_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries().filter(|e| e.reference.is_native())
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn timeline(&self) -> &Timeline<EntryIncident> {
        &self.timeline
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn transaction_title(&self) -> Option<&str> {
        self.transaction.as_ref().map(|t| t.title.as_str())
    }

    pub fn can_undo(&self) -> bool {
        self.timeline.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.timeline.can_redo()
    }

    pub fn undo_title(&self) -> Option<&str> {
        self.timeline.undo_title()
    }

    pub fn redo_title(&self) -> Option<&str> {
        self.timeline.redo_title()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn subscribe(&mut self, sink: impl ChangeSink + 'static) -> SubscriptionId {
        self.subscribers.subscribe(Box::new(sink))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub fn begin_transaction(&mut self, options: impl Into<TransactionOptions>) -> Result<()> {
        let options = options.into();
        if let Some(open) = &self.transaction {
            return Err(EngineError::illegal(format!(
                "cannot begin '{}': transaction '{}' is still open",
                options.title, open.title
            )));
        }

        // A plain transaction always starts its own undo step.
        if !options.grouped && self.timeline.open_protocol_mut().is_some() {
            self.timeline.sign_current(&mut self.state)?;
        }

        let mut request = ProtocolRequest::new(options.title.clone());
        if options.grouped {
            request.timeout = options.timeout.or(self.config.default_group_timeout());
        }
        self.timeline.get_or_open_protocol(&request, &mut self.state)?;

        tracing::debug!(container = %self.state.id, title = %options.title, "begin transaction");
        self.transaction = Some(options);
        Ok(())
    }

    /// Close the open transaction and notify subscribers once.
    pub fn end_transaction(&mut self) -> Result<()> {
        let options = self
            .transaction
            .take()
            .ok_or_else(|| EngineError::illegal("no transaction to end"))?;

        if !options.grouped && self.timeline.open_protocol_mut().is_some() {
            let sign = self.timeline.sign_current(&mut self.state)?;
            if sign == Sign::Rejected {
                tracing::debug!(container = %self.state.id, title = %options.title, "transaction had no net effect");
            }
        }

        self.flush();
        Ok(())
    }

    /// Run `f` inside a transaction. The transaction is ended even when `f`
    /// fails; `f`'s error wins.
    pub fn transact<R>(
        &mut self,
        options: impl Into<TransactionOptions>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.begin_transaction(options)?;
        let result = f(self);
        let ended = self.end_transaction();
        let value = result?;
        ended?;
        Ok(value)
    }

    /// Whether the open transaction's undo step already holds an incident
    /// matching `predicate`. False outside a transaction.
    pub fn transaction_has_incident(&self, predicate: impl Fn(&EntryIncident) -> bool) -> bool {
        self.transaction.is_some()
            && !self.timeline.current().is_signed()
            && self.timeline.current().has_incident(predicate)
    }

    /// Install before/after hooks on the open transaction's undo step. They
    /// run around every later replay of that step.
    pub fn set_transaction_hooks(
        &mut self,
        before: Option<ProtocolHook<ContainerState>>,
        after: Option<ProtocolHook<ContainerState>>,
    ) -> Result<()> {
        self.require_transaction("set hooks")?;
        let protocol = self
            .timeline
            .open_protocol_mut()
            .ok_or_else(|| EngineError::illegal("transaction has no open protocol"))?;
        if let Some(hook) = before {
            protocol.set_before_hook(hook);
        }
        if let Some(hook) = after {
            protocol.set_after_hook(hook);
        }
        Ok(())
    }

    fn require_transaction(&self, op: &str) -> Result<()> {
        if self.transaction.is_none() {
            return Err(EngineError::illegal(format!("{op} outside a transaction")));
        }
        Ok(())
    }

    fn require_no_transaction(&self, op: &str) -> Result<()> {
        if let Some(open) = &self.transaction {
            return Err(EngineError::illegal(format!(
                "{op} while transaction '{}' is open",
                open.title
            )));
        }
        Ok(())
    }

    fn record_incident(&mut self, incident: EntryIncident) -> Result<()> {
        let protocol = self
            .timeline
            .open_protocol_mut()
            .ok_or_else(|| EngineError::illegal("transaction has no open protocol"))?;
        protocol.add_incident(incident, &mut self.state, true)
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    /// Add a native entry. Returns its reference.
    pub fn add(&mut self, spec: EntrySpec) -> Result<Reference> {
        self.require_transaction("add")?;

        let reference = match &spec.id {
            Some(id) => {
                let reference = Reference::native(id.clone());
                if self.state.storage.has(&reference) {
                    return Err(EngineError::DuplicateReference(reference));
                }
                self.ids.prime(&spec.kind, id);
                reference
            }
            None => {
                let storage = &self.state.storage;
                Reference::native(
                    self.ids
                        .next_free(&spec.kind, |id| storage.has(&Reference::native(id))),
                )
            }
        };

        let entry = Entry::new(reference.clone(), spec.kind, spec.options);
        self.record_incident(EntryIncident::Add { entry })?;
        Ok(reference)
    }

    /// Deep-merge `patch` into an entry's options.
    pub fn update(&mut self, reference: &Reference, patch: &OptionsPatch) -> Result<()> {
        self.require_transaction("update")?;

        let before = self.state.storage.get(reference)?.options.clone();
        let after = before.merged(patch);
        self.record_incident(EntryIncident::Update {
            reference: reference.clone(),
            before,
            after,
        })
    }

    pub fn remove(&mut self, reference: &Reference) -> Result<()> {
        self.require_transaction("remove")?;

        if !self.state.storage.has(reference) {
            return Err(EngineError::ReferenceNotFound(reference.clone()));
        }
        self.record_incident(EntryIncident::Remove {
            reference: reference.clone(),
            removed: None,
        })
    }

    /// Add a copy of an entry under a fresh native id.
    pub fn clone_entry(&mut self, reference: &Reference) -> Result<Reference> {
        let mut ids = std::mem::take(&mut self.ids);
        let result = self.clone_entry_with(reference, &mut ids);
        self.ids = ids;
        result
    }

    /// Clone, minting the id from `ids` rather than this container's own
    /// allocator. The hub passes the source owner's allocator here.
    pub(crate) fn clone_entry_with(
        &mut self,
        reference: &Reference,
        ids: &mut IdAllocator,
    ) -> Result<Reference> {
        self.require_transaction("clone")?;

        let source = self.state.storage.get(reference)?;
        let kind = source.kind.clone();
        let options = source.options.clone();

        let storage = &self.state.storage;
        let id = ids.next_free(&kind, |id| storage.has(&Reference::native(id)));
        let copy = Reference::native(id);

        self.record_incident(EntryIncident::Add {
            entry: Entry::new(copy.clone(), kind, options),
        })?;
        Ok(copy)
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&mut self) -> Result<()> {
        self.require_no_transaction("undo")?;
        self.timeline.undo(&mut self.state)?;
        self.flush();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.require_no_transaction("redo")?;
        self.timeline.redo(&mut self.state)?;
        self.flush();
        Ok(())
    }

    /// Drop the undo stack, keeping current entries.
    pub fn clear_history(&mut self) -> Result<()> {
        self.require_no_transaction("clear history")?;
        if self.timeline.open_protocol_mut().is_some() {
            self.timeline.sign_current(&mut self.state)?;
            self.flush();
        }
        self.timeline.clear();
        Ok(())
    }

    // ========================================================================
    // Out-of-band changes
    // ========================================================================

    /// Apply `mutator` to each entry without touching history.
    ///
    /// Every reference is checked before anything is mutated. Touched entries
    /// are marked invalid and reported in one batch under `reason`. The
    /// mutator may not change an entry's reference.
    pub fn no_history_managed_entries_process(
        &mut self,
        references: &[Reference],
        mut mutator: impl FnMut(&mut Entry),
        reason: ChangeReason,
    ) -> Result<()> {
        if let Some(missing) = references.iter().find(|r| !self.state.storage.has(r)) {
            return Err(EngineError::ReferenceNotFound(missing.clone()));
        }

        let mut events = Vec::with_capacity(references.len());
        for reference in references {
            let entry = self.state.storage.get_mut(reference)?;
            mutator(entry);
            entry.reference = reference.clone();
            entry.mark_invalid();
            events.push(ChangeEvent {
                reason,
                entry: entry.clone(),
            });
        }

        self.emit(ChangeOrigin::Local, events);
        Ok(())
    }

    /// Renderer callback: the entry's render cache is current again.
    ///
    /// Not a change; nobody is notified.
    pub fn mark_rendered(&mut self, reference: &Reference) -> Result<()> {
        self.state.storage.get_mut(reference)?.mark_valid();
        Ok(())
    }

    /// Mark every entry invalid, e.g. after a viewport change.
    pub fn invalidate_all(&mut self) {
        let references = self.state.storage.references();
        let mut events = Vec::with_capacity(references.len());
        for reference in &references {
            if let Ok(entry) = self.state.storage.get_mut(reference) {
                entry.mark_invalid();
                events.push(ChangeEvent {
                    reason: ChangeReason::CacheInvalidated,
                    entry: entry.clone(),
                });
            }
        }
        self.emit(ChangeOrigin::Local, events);
    }

    /// Add entries found on initial load, outside history.
    ///
    /// Explicit ids prime the allocator so later ids never collide. Loaded
    /// entries are reported as `AddEntry` so attached peers mirror them.
    pub fn load(&mut self, specs: impl IntoIterator<Item = EntrySpec>) -> Result<Vec<Reference>> {
        self.require_no_transaction("load")?;

        let mut loaded = Vec::new();
        let mut events = Vec::new();
        for spec in specs {
            let reference = match &spec.id {
                Some(id) => {
                    self.ids.prime(&spec.kind, id);
                    Reference::native(id.clone())
                }
                None => {
                    let storage = &self.state.storage;
                    Reference::native(
                        self.ids
                            .next_free(&spec.kind, |id| storage.has(&Reference::native(id))),
                    )
                }
            };
            let entry = Entry::new(reference.clone(), spec.kind, spec.options);
            self.state.storage.push(entry.clone())?;
            events.push(ChangeEvent {
                reason: ChangeReason::AddEntry,
                entry,
            });
            loaded.push(reference);
        }

        tracing::debug!(container = %self.state.id, count = loaded.len(), "loaded entries");
        self.emit(ChangeOrigin::Local, events);
        Ok(loaded)
    }

    /// Clear the container's own contents.
    ///
    /// Native entries are removed, ids and history start over. Mirrors stay
    /// (their owners still hold them) but their render caches are reset.
    pub fn reset(&mut self) -> Result<()> {
        self.require_no_transaction("reset")?;

        let mut events: Vec<ChangeEvent> = self
            .state
            .storage
            .remove_where(|e| e.reference.is_native())
            .into_iter()
            .map(|entry| ChangeEvent {
                reason: ChangeReason::RemoveEntry,
                entry,
            })
            .collect();

        for reference in self.state.storage.references() {
            if let Ok(entry) = self.state.storage.get_mut(&reference) {
                entry.mark_invalid();
                entry.render_state = None;
                events.push(ChangeEvent {
                    reason: ChangeReason::CacheReset,
                    entry: entry.clone(),
                });
            }
        }

        self.ids.reset();
        self.timeline.reset();
        self.tombstones.clear();
        self.state.pending.clear();
        tracing::debug!(container = %self.state.id, "reset");
        self.emit(ChangeOrigin::Local, events);
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn flush(&mut self) {
        let events = std::mem::take(&mut self.state.pending);
        self.emit(ChangeOrigin::Local, events);
    }

    fn emit(&mut self, origin: ChangeOrigin, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let batch = ChangeBatch::new(self.state.id.clone(), origin, events);
        tracing::trace!(container = %self.state.id, ?origin, events = batch.len(), "change batch");
        self.subscribers.dispatch(&batch);
    }

    // ========================================================================
    // Mirror writes (replication hub only)
    // ========================================================================

    pub(crate) fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    /// Insert a mirror next to `prev` or `next`, else at the end of its run.
    ///
    /// A native entry coming back after a mirror removal goes next to the
    /// neighbors it had when it was removed, when any of them remain.
    pub(crate) fn mirror_insert(
        &mut self,
        entry: Entry,
        prev: Option<&Reference>,
        next: Option<&Reference>,
    ) -> Result<()> {
        let storage = &self.state.storage;
        let restored = self
            .tombstones
            .remove(&entry.reference)
            .filter(|n| {
                [&n.prev, &n.next]
                    .into_iter()
                    .flatten()
                    .any(|r| r.is_native() && storage.has(r))
            });

        let snapshot = entry.clone();
        match &restored {
            Some(n) => self
                .state
                .storage
                .insert_near(entry, n.prev.as_ref(), n.next.as_ref())?,
            None => self.state.storage.insert_near(entry, prev, next)?,
        }
        self.shared_pending.push(ChangeEvent {
            reason: ChangeReason::AddEntry,
            entry: snapshot,
        });
        Ok(())
    }

    /// Copy options onto a mirror and invalidate it.
    pub(crate) fn mirror_update(
        &mut self,
        reference: &Reference,
        options: &EntryOptions,
    ) -> Result<()> {
        let entry = self.state.storage.get_mut(reference)?;
        entry.options = options.clone();
        entry.mark_invalid();
        let snapshot = entry.clone();
        self.shared_pending.push(ChangeEvent {
            reason: ChangeReason::UpdateEntry,
            entry: snapshot,
        });
        Ok(())
    }

    pub(crate) fn mirror_invalidate(
        &mut self,
        reference: &Reference,
        reason: ChangeReason,
    ) -> Result<()> {
        let entry = self.state.storage.get_mut(reference)?;
        entry.mark_invalid();
        let snapshot = entry.clone();
        self.shared_pending.push(ChangeEvent {
            reason,
            entry: snapshot,
        });
        Ok(())
    }

    pub(crate) fn mirror_remove(&mut self, reference: &Reference) -> Result<()> {
        let removed = self.state.storage.remove(reference)?;
        if reference.is_native() {
            self.tombstones.insert(
                reference.clone(),
                Neighbors {
                    prev: removed.prev.clone(),
                    next: removed.next.clone(),
                },
            );
        }
        self.shared_pending.push(ChangeEvent {
            reason: ChangeReason::RemoveEntry,
            entry: removed.entry,
        });
        Ok(())
    }

    /// Remove every entry matching `pred` as a mirror write.
    pub(crate) fn mirror_remove_where(&mut self, pred: impl Fn(&Entry) -> bool) -> usize {
        let removed = self.state.storage.remove_where(pred);
        let count = removed.len();
        self.shared_pending
            .extend(removed.into_iter().map(|entry| ChangeEvent {
                reason: ChangeReason::RemoveEntry,
                entry,
            }));
        count
    }

    /// Notify subscribers of pending mirror writes as one `Shared` batch.
    pub(crate) fn flush_shared(&mut self) {
        let events = std::mem::take(&mut self.shared_pending);
        self.emit(ChangeOrigin::Shared, events);
    }
}
