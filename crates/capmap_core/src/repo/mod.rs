//! Collaborator contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the narrow async interfaces the engine consumes: workspaces,
//!   maps and node references.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Store APIs return semantic errors (`WorkspaceNotFound`,
//!   `VersionConflict`, ...) in addition to DB transport errors.
//! - Taxonomy saves are compare-and-swap on the document version.

pub mod map_repo;
pub mod registry;
pub mod sqlite_store;
pub mod store;
pub mod workspace_repo;
