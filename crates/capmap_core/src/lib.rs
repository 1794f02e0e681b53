//! Core domain logic for capmap.
//! This crate owns the capability taxonomy of a workspace and the engine that
//! files map nodes into it exactly once.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{CoreConfig, DedupConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::map::{MapId, MapRecord, MapSummary, NewMap, NodeId, NodeRef, UnfiledMap};
pub use model::taxonomy::{
    Alias, AliasId, Capability, CapabilityCategory, CapabilityId, CategoryId, Placement,
    PopulatedAlias, PopulatedCapability, PopulatedCategory, PopulatedTaxonomy, Taxonomy,
    TaxonomyError, TaxonomyTarget, SEED_CATEGORY_NAMES,
};
pub use model::workspace::{NewWorkspace, Workspace, WorkspaceId};
pub use repo::registry::{StoreLocation, StoreRegistry};
pub use repo::sqlite_store::SqliteStore;
pub use repo::store::{MapStore, NodeStore, StoreError, StoreResult, WorkspaceStore};
pub use service::dedup_service::{DedupError, DedupService, FilingStage, MissingTarget};
pub use service::workspace_service::{WorkspaceService, WorkspaceServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
