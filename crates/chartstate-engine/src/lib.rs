//! Transactional state engine for chart panes.
//!
//! Each pane is a [`Container`] of drawable entries. Structural edits run
//! inside transactions, become reversible incidents on the container's
//! [`Timeline`], and reach observers as one [`ChangeBatch`] per transaction.
//! A [`ReplicationHub`] mirrors entries with a visibility scope into the other
//! attached containers so one object can be edited from any pane sharing it.
//!
//! # Layers
//!
//! - **EntryStorage**: ordered, reference-indexed entries; foreign runs first
//! - **Incident / Protocol**: reversible edits and the signed batch of them
//! - **Timeline**: undo/redo chain with title + timeout grouping
//! - **Container**: transactions, id namespace, change notifications
//! - **ReplicationHub**: mirror bookkeeping between attached containers
//!
//! Everything is single-threaded and synchronous. Incidents apply inline and
//! replication fans out when the hub is synced, never in the background.

pub mod change;
pub mod config;
pub mod container;
mod error;
pub mod id_alloc;
pub mod incident;
pub mod protocol;
pub mod replication;
pub mod storage;
pub mod timeline;

pub use change::{ChangeBatch, ChangeEvent, ChangeOrigin, ChangeSink, SubscriptionId};
pub use config::EngineConfig;
pub use container::{Container, ContainerState, EntryIncident, TransactionOptions};
pub use error::EngineError;
pub use id_alloc::IdAllocator;
pub use incident::Incident;
pub use protocol::{Direction, Protocol, ProtocolHook, Sign};
pub use replication::ReplicationHub;
pub use storage::{EntryStorage, OwnerBounds, Removed};
pub use timeline::{Clock, ManualClock, ProtocolRequest, SystemClock, Timeline};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
