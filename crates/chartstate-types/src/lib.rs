//! Shared reference, entry, and visibility types for chartstate.
//!
//! Leaf crate: no internal chartstate dependencies. The engine crate builds
//! storage, history, and replication on top of these.
//!
//! # Overview
//!
//! ```text
//! Container (ContainerId) ← one pane's drawable collection
//!     └── holds Entry (Reference)
//!             ├── Native("e0")            owned here
//!             └── Foreign("ds2", "e3")    mirror of ds2's e3
//!     └── Entry.options.visibility decides who mirrors it
//! ```
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`ContainerId`]   | Which container                              |
//! | [`Reference`]     | Native or foreign entry address              |
//! | [`VisibilityScope`] | Which containers may mirror an entry       |
//! | [`Entry`]         | Drawable record (options + render flags)     |
//! | [`EntrySpec`]     | Descriptor for adding a new entry            |
//! | [`OptionsPatch`]  | Partial options, deep-merged on update       |
//! | [`ChangeReason`]  | Why an entry appears in a notification       |
//! |-------------------|----------------------------------------------|

pub mod entry;
pub mod ids;
pub mod scope;

pub use entry::{ChangeReason, Entry, EntryOptions, EntrySpec, OptionsPatch};
pub use ids::{ContainerId, Reference};
pub use scope::VisibilityScope;
