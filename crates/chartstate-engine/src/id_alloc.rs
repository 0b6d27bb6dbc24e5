//! Per-container, per-type id generation.
//!
//! Ids look like `<type><n>` (`trend_line0`, `trend_line1`, ...). Each
//! container owns one allocator; nothing is global.

use std::collections::HashMap;

/// Monotonic id counters keyed by entry type.
#[derive(Clone, Debug, Default)]
pub struct IdAllocator {
    counters: HashMap<String, u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for `kind`.
    pub fn next(&mut self, kind: &str) -> String {
        let counter = self.counters.entry(kind.to_string()).or_insert(0);
        let id = format!("{kind}{counter}");
        *counter += 1;
        id
    }

    /// Next id for `kind` for which `taken` is false.
    pub fn next_free(&mut self, kind: &str, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.next(kind);
            if !taken(&id) {
                return id;
            }
        }
    }

    /// Advance the `kind` counter past an existing id.
    ///
    /// Ids not of the form `<kind><n>` are ignored.
    pub fn prime(&mut self, kind: &str, existing_id: &str) {
        let Some(n) = existing_id
            .strip_prefix(kind)
            .and_then(|rest| rest.parse::<u64>().ok())
        else {
            return;
        };
        let counter = self.counters.entry(kind.to_string()).or_insert(0);
        *counter = (*counter).max(n + 1);
    }

    /// Forget every counter.
    pub fn reset(&mut self) {
        self.counters.clear();
    }
}
