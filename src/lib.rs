// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Tandem - a geo-replicated object store on operation-based CRDTs.
//!
//! Replicas exchange update operations, not state; convergence comes
//! from commutative merge rules instead of consensus. Transactions get
//! snapshot isolation and a two-phase commit: fast local commit, then
//! global sequencing, with nothing blocking on the wide-area path.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use tandem::clocks::SiteId;
//! use tandem::crdt::CrdtIdentifier;
//! use tandem::crdt::set::AddWinsSet;
//! use tandem::session::Session;
//! use tandem::store::MemoryStore;
//!
//! // One in-process store, one client session.
//! let store = Arc::new(MemoryStore::new(SiteId::new("dc-1")));
//! let session = Session::new(SiteId::new("client-1"), store)?;
//! let id = CrdtIdentifier::new("posts", "day-1");
//!
//! // Write in one transaction.
//! let txn = session.begin()?;
//! let posts = txn.get::<AddWinsSet<String>>(&id, true)?;
//! posts.add("hello, world".to_string())?;
//! txn.commit()?;
//!
//! // Read in the next.
//! let txn = session.begin()?;
//! let posts = txn.get::<AddWinsSet<String>>(&id, false)?;
//! assert!(posts.lookup(&"hello, world".to_string())?);
//! # Ok::<(), tandem::error::Error>(())
//! ```

pub mod clocks;
pub mod codec;
pub mod crdt;
pub mod error;
pub mod managed;
pub mod session;
pub mod shard;
pub mod store;
pub mod txn;
