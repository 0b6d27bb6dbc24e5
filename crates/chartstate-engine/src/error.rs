//! Error types for engine operations.

use thiserror::Error;

use chartstate_types::Reference;

/// Errors surfaced by storage, history, containers, and the replication hub.
///
/// All of these are contract violations by the caller. They are returned
/// immediately and never retried or swallowed inside the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation attempted in a disallowed lifecycle phase.
    ///
    /// Mutating outside a transaction, nested `begin_transaction`, re-signing a
    /// signed protocol, undo/redo past the end of the chain, attaching twice.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Lookup, or insert relative to an anchor, that is not in storage.
    #[error("reference not found: {0}")]
    ReferenceNotFound(Reference),

    /// Insert or add with a key already present.
    #[error("duplicate reference: {0}")]
    DuplicateReference(Reference),

    /// Config file failed to parse.
    #[error("config error: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Config file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        EngineError::IllegalState(msg.into())
    }
}
