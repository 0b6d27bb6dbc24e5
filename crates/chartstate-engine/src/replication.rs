//! Cross-container replication.
//!
//! The hub owns every attached [`Container`] and subscribes to each one's
//! change feed. Local batches queue in an inbox; [`ReplicationHub::sync`]
//! drains it and mirrors each replicated event into the containers its entry
//! is visible to.
//!
//! ## Addressing
//!
//! An entry held in `S` under reference `r` is addressed from `T` by
//! [`Reference::address_from`]: native `e` becomes `(S, e)`, and a mirror
//! `(T, e)` collapses back to native `e` inside its origin `T`.
//!
//! ## Targets
//!
//! | scope        | targets                                       |
//! |--------------|-----------------------------------------------|
//! | `All`        | every other attached container                |
//! | `Only(ids)`  | `ids`, plus the origin owner of a mirror      |
//! | `None`       | the origin owner of a mirror only             |
//!
//! Writes the hub makes are flushed as `Shared` batches, which the hub's own
//! subscription drops. That is what keeps two sharing containers from
//! bouncing the same change back and forth.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use chartstate_types::{ChangeReason, ContainerId, Entry, Reference, VisibilityScope};

use crate::change::{ChangeBatch, ChangeEvent, SubscriptionId};
use crate::container::{Container, TransactionOptions};
use crate::{EngineError, Result};

struct Attached {
    container: Container,
    subscription: SubscriptionId,
}

type Inbox = Rc<RefCell<VecDeque<ChangeBatch>>>;

/// Mirrors visibility-scoped entries between attached containers.
#[derive(Default)]
pub struct ReplicationHub {
    containers: IndexMap<ContainerId, Attached>,
    inbox: Inbox,
}

impl fmt::Debug for ReplicationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationHub")
            .field("containers", &self.containers.keys().collect::<Vec<_>>())
            .field("queued", &self.inbox.borrow().len())
            .finish()
    }
}

impl ReplicationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn is_attached(&self, id: &ContainerId) -> bool {
        self.containers.contains_key(id)
    }

    /// Attached container ids in attach order.
    pub fn ids(&self) -> impl Iterator<Item = &ContainerId> {
        self.containers.keys()
    }

    pub fn container(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.get(id).map(|a| &a.container)
    }

    /// Direct access for edits. Call [`ReplicationHub::sync`] afterwards so
    /// the edits reach the other containers.
    pub fn container_mut(&mut self, id: &ContainerId) -> Option<&mut Container> {
        self.containers.get_mut(id).map(|a| &mut a.container)
    }

    fn attached(&self, id: &ContainerId) -> Result<&Container> {
        self.container(id)
            .ok_or_else(|| EngineError::illegal(format!("container '{id}' is not attached")))
    }

    fn attached_mut(&mut self, id: &ContainerId) -> Result<&mut Container> {
        self.container_mut(id)
            .ok_or_else(|| EngineError::illegal(format!("container '{id}' is not attached")))
    }

    // ========================================================================
    // Attach / detach
    // ========================================================================

    /// Take ownership of `container` and exchange mirrors with every
    /// container already attached.
    pub fn attach(&mut self, mut container: Container) -> Result<()> {
        let id = container.id().clone();
        if self.is_attached(&id) {
            return Err(EngineError::illegal(format!(
                "container '{id}' is already attached"
            )));
        }
        self.sync()?;

        let inbox = Rc::clone(&self.inbox);
        let subscription = container.subscribe(move |batch: &ChangeBatch| {
            if !batch.is_shared() {
                inbox.borrow_mut().push_back(batch.clone());
            }
        });
        self.containers.insert(
            id.clone(),
            Attached {
                container,
                subscription,
            },
        );

        let others: Vec<ContainerId> = self.containers.keys().filter(|k| **k != id).cloned().collect();
        for other in &others {
            self.pull(&id, other)?;
            self.pull(other, &id)?;
        }

        for attached in self.containers.values_mut() {
            attached.container.flush_shared();
        }
        tracing::info!(container = %id, peers = others.len(), "attached");
        Ok(())
    }

    /// Give `viewer` a mirror of every native entry of `holder` visible to it.
    fn pull(&mut self, viewer: &ContainerId, holder: &ContainerId) -> Result<()> {
        let visible: Vec<Entry> = self
            .attached(holder)?
            .native_entries()
            .filter(|e| e.options.visibility.is_visible_to(viewer))
            .cloned()
            .collect();

        let target = self.attached_mut(viewer)?;
        for entry in visible {
            let addr = entry.reference.address_from(holder, viewer);
            if target.has(&addr) {
                target.mirror_update(&addr, &entry.options)?;
            } else {
                target.mirror_insert(entry.readdressed(addr), None, None)?;
            }
        }
        Ok(())
    }

    /// Release a container, removing every mirror of its entries from the
    /// others and every mirror it holds.
    pub fn detach(&mut self, id: &ContainerId) -> Result<Container> {
        if !self.is_attached(id) {
            return Err(EngineError::illegal(format!("container '{id}' is not attached")));
        }
        self.sync()?;

        let Some(Attached {
            mut container,
            subscription,
        }) = self.containers.shift_remove(id)
        else {
            return Err(EngineError::illegal(format!("container '{id}' is not attached")));
        };
        container.unsubscribe(subscription);

        for attached in self.containers.values_mut() {
            let removed = attached
                .container
                .mirror_remove_where(|e| e.reference.is_owned_by(id));
            if removed > 0 {
                tracing::debug!(container = %attached.container.id(), owner = %id, removed, "dropped mirrors");
            }
            attached.container.flush_shared();
        }

        container.mirror_remove_where(|e| e.reference.is_foreign());
        container.flush_shared();

        tracing::info!(container = %id, "detached");
        Ok(container)
    }

    // ========================================================================
    // Propagation
    // ========================================================================

    /// Propagate every queued local batch. On error the failing batch is
    /// dropped and later batches stay queued.
    pub fn sync(&mut self) -> Result<()> {
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(batch) = next else {
                return Ok(());
            };
            self.propagate(&batch)?;
        }
    }

    fn propagate(&mut self, batch: &ChangeBatch) -> Result<()> {
        let source = batch.source().clone();
        if !self.is_attached(&source) {
            tracing::debug!(container = %source, "skipping batch from detached container");
            return Ok(());
        }
        let peers: Vec<ContainerId> = self
            .containers
            .keys()
            .filter(|k| **k != source)
            .cloned()
            .collect();

        let mut touched: IndexSet<ContainerId> = IndexSet::new();
        let mut outcome = Ok(());
        'events: for event in batch.events().iter().filter(|e| e.reason.is_replicated()) {
            for target in &peers {
                match self.mirror_event(&source, target, event) {
                    Ok(true) => {
                        touched.insert(target.clone());
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(%source, %target, reason = %event.reason, "fan-out aborted: {e}");
                        outcome = Err(e);
                        break 'events;
                    }
                }
            }
        }

        // Writes that landed before a failure are still delivered with this batch.
        for id in &touched {
            if let Some(container) = self.container_mut(id) {
                container.flush_shared();
            }
        }
        outcome
    }

    /// Apply one event from `source` to `target`. Returns whether `target`
    /// was written.
    fn mirror_event(
        &mut self,
        source: &ContainerId,
        target: &ContainerId,
        event: &ChangeEvent,
    ) -> Result<bool> {
        let entry = &event.entry;
        let addr = entry.reference.address_from(source, target);
        let targeted = is_target(entry, target);
        let present = self.attached(target)?.has(&addr);

        match event.reason {
            ChangeReason::AddEntry if targeted => {
                if present {
                    self.attached_mut(target)?.mirror_update(&addr, &entry.options)?;
                } else {
                    self.insert_mirror(source, target, entry, &addr)?;
                }
            }
            ChangeReason::UpdateEntry => match (targeted, present) {
                (true, true) => {
                    self.attached_mut(target)?.mirror_update(&addr, &entry.options)?;
                }
                (true, false) if addr.is_foreign() => {
                    self.insert_mirror(source, target, entry, &addr)?;
                }
                (false, true) if addr.is_foreign() => {
                    self.attached_mut(target)?.mirror_remove(&addr)?;
                }
                _ => return Ok(false),
            },
            ChangeReason::RemoveEntry if present => {
                self.attached_mut(target)?.mirror_remove(&addr)?;
            }
            ChangeReason::DataInvalid if targeted && present => {
                self.attached_mut(target)?
                    .mirror_invalidate(&addr, ChangeReason::DataInvalid)?;
            }
            _ => return Ok(false),
        }

        tracing::trace!(%source, %target, reason = %event.reason, reference = %addr, "mirrored");
        Ok(true)
    }

    /// Insert a mirror, keeping its order relative to entries `target`
    /// already mirrors from the same region of `source`.
    fn insert_mirror(
        &mut self,
        source: &ContainerId,
        target: &ContainerId,
        entry: &Entry,
        addr: &Reference,
    ) -> Result<()> {
        let (prev, next) = {
            let source_c = self.attached(source)?;
            let target_c = self.attached(target)?;
            anchors(source_c, target_c, &entry.reference, addr)
        };
        self.attached_mut(target)?
            .mirror_insert(entry.readdressed(addr.clone()), prev.as_ref(), next.as_ref())
    }

    // ========================================================================
    // Conveniences: act on one container, then sync
    // ========================================================================

    pub fn transact<R>(
        &mut self,
        id: &ContainerId,
        options: impl Into<TransactionOptions>,
        f: impl FnOnce(&mut Container) -> Result<R>,
    ) -> Result<R> {
        let result = self.attached_mut(id)?.transact(options, f);
        self.sync()?;
        result
    }

    pub fn undo(&mut self, id: &ContainerId) -> Result<()> {
        let result = self.attached_mut(id)?.undo();
        self.sync()?;
        result
    }

    pub fn redo(&mut self, id: &ContainerId) -> Result<()> {
        let result = self.attached_mut(id)?.redo();
        self.sync()?;
        result
    }

    /// Out-of-band content refresh on one container, then sync.
    pub fn process_content(
        &mut self,
        id: &ContainerId,
        references: &[Reference],
        mutator: impl FnMut(&mut Entry),
        reason: ChangeReason,
    ) -> Result<()> {
        let result = self
            .attached_mut(id)?
            .no_history_managed_entries_process(references, mutator, reason);
        self.sync()?;
        result
    }

    /// Clone an entry of `id` in its own transaction.
    ///
    /// Cloning a mirror mints the new id from the mirror owner's namespace,
    /// so the copy never collides with ids the owner hands out later.
    pub fn clone_entry(
        &mut self,
        id: &ContainerId,
        reference: &Reference,
        options: impl Into<TransactionOptions>,
    ) -> Result<Reference> {
        let owner = reference
            .owner()
            .filter(|owner| *owner != id && self.is_attached(owner))
            .cloned();

        let result = match owner {
            Some(owner) => {
                let mut ids = std::mem::take(self.attached_mut(&owner)?.ids_mut());
                let result = self
                    .attached_mut(id)
                    .and_then(|c| c.transact(options, |c| c.clone_entry_with(reference, &mut ids)));
                *self.attached_mut(&owner)?.ids_mut() = ids;
                result
            }
            None => self
                .attached_mut(id)
                .and_then(|c| c.transact(options, |c| c.clone_entry(reference))),
        };
        self.sync()?;
        result
    }
}

/// Whether `entry`'s visibility reaches `target`. The origin owner of a
/// mirror is always reached.
fn is_target(entry: &Entry, target: &ContainerId) -> bool {
    let origin = entry.reference.is_owned_by(target);
    match &entry.options.visibility {
        VisibilityScope::All => true,
        VisibilityScope::Only(ids) => origin || ids.contains(target),
        VisibilityScope::None => origin,
    }
}

/// Nearest neighbors of `reference` in `source` that `target` already holds
/// in the same region as `addr`, as `target` addresses.
fn anchors(
    source: &Container,
    target: &Container,
    reference: &Reference,
    addr: &Reference,
) -> (Option<Reference>, Option<Reference>) {
    let order = source.references();
    let Some(pos) = order.iter().position(|r| r == reference) else {
        return (None, None);
    };

    let usable = |r: &Reference| {
        let candidate = r.address_from(source.id(), target.id());
        (candidate.owner() == addr.owner() && target.has(&candidate)).then_some(candidate)
    };
    let prev = order[..pos].iter().rev().find_map(usable);
    let next = order[pos + 1..].iter().find_map(usable);
    (prev, next)
}
