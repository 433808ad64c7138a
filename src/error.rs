// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Error taxonomy for store operations.
//!
//! Structural errors (wrong type, missing object) always surface to the
//! application. Transient network errors are a separate variant so a
//! calling layer can retry exactly those and nothing else. Misuse of a
//! terminated transaction handle is a contract violation and panics
//! rather than returning an error.

use crate::crdt::CrdtIdentifier;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by store, transaction, and snapshot operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The object exists but was created with a different CRDT type.
    #[error("wrong type for object {id}: {detail}")]
    WrongType { id: CrdtIdentifier, detail: String },

    /// The object does not exist and creation was not requested.
    #[error("no such object: {0}")]
    NoSuchObject(CrdtIdentifier),

    /// The requested snapshot cannot be satisfied: pruned away, never
    /// existed, or requires state not materialized locally.
    #[error("version not found for {id}: {detail}")]
    VersionNotFound { id: CrdtIdentifier, detail: String },

    /// Transient communication failure during fetch or commit.
    #[error("network failure: {0}")]
    Network(String),

    /// A durable snapshot failed to encode, decode, or verify.
    #[error("snapshot codec: {0}")]
    Codec(String),
}

impl Error {
    /// True for failures that a caller-level retry loop may resolve.
    pub fn is_transient(&self) -> bool {
        return matches!(self, Error::Network(_));
    }

    pub(crate) fn wrong_type(id: &CrdtIdentifier, detail: impl Into<String>) -> Error {
        return Error::WrongType {
            id: id.clone(),
            detail: detail.into(),
        };
    }

    pub(crate) fn version_not_found(id: &CrdtIdentifier, detail: impl Into<String>) -> Error {
        return Error::VersionNotFound {
            id: id.clone(),
            detail: detail.into(),
        };
    }
}
