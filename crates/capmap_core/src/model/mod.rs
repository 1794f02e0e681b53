//! Domain model for workspaces, maps and the capability taxonomy.
//!
//! # Responsibility
//! - Define canonical data structures used by the deduplication engine.
//! - Keep the taxonomy aggregate and its invariants in one place.
//!
//! # Invariants
//! - Every domain object is identified by a stable UUID.
//! - Node references are external; the taxonomy only holds their ids.

pub mod map;
pub mod taxonomy;
pub mod workspace;
