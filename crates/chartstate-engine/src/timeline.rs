//! Timeline: the undo/redo chain of protocols and the cursor into it.
//!
//! Protocols live in one vector ordered oldest to newest. The protocol under
//! the cursor is `current`; everything before it is the undo stack and
//! everything after it is the redo branch. Opening a protocol truncates the
//! redo branch. Rejected protocols are excised on the spot, so the chain only
//! ever holds approved protocols plus, at most, one open tip.
//!
//! Index 0 starts out as an approved empty sentinel, so `current` is signed at
//! rest and `can_undo()` starts `false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::incident::Incident;
use crate::protocol::{Protocol, Sign};
use crate::{EngineError, Result};

/// Millisecond clock used for grouping decisions.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// Wall clock (Unix milliseconds).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock for deterministic tests and replays.
///
/// Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_millis)))
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the caller wants from [`Timeline::get_or_open_protocol`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolRequest {
    pub title: String,
    /// Reuse an open protocol with the same title only within this window.
    /// `None` reuses it regardless of elapsed time.
    pub timeout: Option<Duration>,
}

impl ProtocolRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Undo/redo history over a target mutated by incidents of type `I`.
pub struct Timeline<I: Incident> {
    chain: Vec<Protocol<I>>,
    cursor: usize,
    last_title: Option<String>,
    last_used_at: u64,
    max_depth: Option<usize>,
    clock: Box<dyn Clock>,
}

impl<I: Incident> Default for Timeline<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Incident> Timeline<I> {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            chain: vec![Protocol::sentinel()],
            cursor: 0,
            last_title: None,
            last_used_at: 0,
            max_depth: None,
            clock,
        }
    }

    /// Keep at most `depth` protocols behind the cursor.
    pub fn set_max_depth(&mut self, depth: Option<usize>) {
        self.max_depth = depth;
        self.enforce_max_depth();
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn current(&self) -> &Protocol<I> {
        &self.chain[self.cursor]
    }

    /// The open protocol, if the tip is unsigned.
    pub fn open_protocol_mut(&mut self) -> Option<&mut Protocol<I>> {
        let current = &mut self.chain[self.cursor];
        (!current.is_signed()).then_some(current)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.chain.len()
    }

    /// Title of the step `undo()` would revert.
    pub fn undo_title(&self) -> Option<&str> {
        self.can_undo().then(|| self.current().title())
    }

    /// Title of the step `redo()` would replay.
    pub fn redo_title(&self) -> Option<&str> {
        self.chain.get(self.cursor + 1).map(|p| p.title())
    }

    /// Number of undoable steps.
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    /// Number of redoable steps.
    pub fn redo_depth(&self) -> usize {
        self.chain.len() - self.cursor - 1
    }

    /// Protocols oldest first, including the root.
    pub fn protocols(&self) -> impl Iterator<Item = &Protocol<I>> {
        self.chain.iter()
    }

    /// Return the protocol new incidents should go into.
    ///
    /// An open protocol is reused only when `request.title` matches the last
    /// title used and, if a timeout is given, no more than that has elapsed
    /// since it was last used; otherwise it is signed first. A signed
    /// `current` gets a new protocol opened after it.
    pub fn get_or_open_protocol(
        &mut self,
        request: &ProtocolRequest,
        target: &mut I::Target,
    ) -> Result<&mut Protocol<I>> {
        let now = self.clock.now_millis();

        if !self.current().is_signed() {
            let same_title = self.last_title.as_deref() == Some(request.title.as_str());
            let expired = request.timeout.is_some_and(|timeout| {
                now.saturating_sub(self.last_used_at) > timeout.as_millis() as u64
            });
            if !same_title || expired {
                self.sign_current(target)?;
            }
        }

        if self.current().is_signed() {
            self.open(&request.title);
        }

        self.last_title = Some(request.title.clone());
        self.last_used_at = now;
        Ok(&mut self.chain[self.cursor])
    }

    /// Sign the open tip. A rejected tip is excised and the cursor falls back.
    pub fn sign_current(&mut self, target: &mut I::Target) -> Result<Sign> {
        let rejectable = self.cursor > 0;
        let sign = self.chain[self.cursor].try_sign(target, rejectable)?;

        if sign == Sign::Rejected {
            debug_assert_eq!(self.cursor + 1, self.chain.len(), "rejected protocol has a successor");
            self.chain.truncate(self.cursor);
            self.cursor -= 1;
        }
        Ok(sign)
    }

    fn open(&mut self, title: &str) {
        let discarded = self.chain.len() - self.cursor - 1;
        if discarded > 0 {
            tracing::debug!(title, discarded, "discarding redo branch");
        }
        self.chain.truncate(self.cursor + 1);
        self.chain.push(Protocol::new(title));
        self.cursor += 1;

        self.enforce_max_depth();
    }

    fn enforce_max_depth(&mut self) {
        let Some(max) = self.max_depth else {
            return;
        };
        if self.cursor > max {
            let excess = self.cursor - max;
            self.chain.drain(..excess);
            self.cursor -= excess;
        }
    }

    /// Step back one protocol, reverting it.
    ///
    /// An open tip is signed first: if that rejects it, it was already
    /// reverted and removed, and the cursor is left on its predecessor.
    pub fn undo(&mut self, target: &mut I::Target) -> Result<()> {
        if !self.can_undo() {
            return Err(EngineError::illegal("nothing to undo"));
        }

        self.last_title = None;

        if !self.current().is_signed() && self.sign_current(target)? == Sign::Rejected {
            return Ok(());
        }

        let title = self.chain[self.cursor].title().to_string();
        self.chain[self.cursor].inverse(target);
        self.cursor -= 1;
        tracing::debug!(%title, "undo");
        Ok(())
    }

    /// Step forward one protocol, replaying it.
    pub fn redo(&mut self, target: &mut I::Target) -> Result<()> {
        if !self.can_redo() {
            return Err(EngineError::illegal("nothing to redo"));
        }

        self.last_title = None;
        self.cursor += 1;
        self.chain[self.cursor].apply(target);
        tracing::debug!(title = %self.chain[self.cursor].title(), "redo");
        Ok(())
    }

    /// Drop the whole undo stack. Present state and the redo branch survive.
    pub fn clear(&mut self) {
        if self.cursor > 0 {
            self.chain.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    /// Forget everything and start again from a fresh sentinel.
    pub fn reset(&mut self) {
        self.chain = vec![Protocol::sentinel()];
        self.cursor = 0;
        self.last_title = None;
        self.last_used_at = 0;
    }
}
