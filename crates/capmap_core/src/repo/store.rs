//! Store traits shared by the engine and its persistence adapters.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::db::DbError;
use crate::model::map::{MapId, MapRecord, MapSummary, NodeId, NodeRef};
use crate::model::taxonomy::Taxonomy;
use crate::model::workspace::{Workspace, WorkspaceId};

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    WorkspaceNotFound(WorkspaceId),
    MapNotFound(MapId),
    NodeNotFound(NodeId),
    /// Taxonomy document changed since it was loaded.
    VersionConflict {
        workspace_id: WorkspaceId,
        expected: u64,
        actual: u64,
    },
    /// Access check rejected by the owning collaborator. Opaque to the core.
    AccessDenied(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
    /// Shared connection lock was poisoned by a panicking holder.
    LockPoisoned,
    /// Non-SQLite backend rejected the operation.
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::WorkspaceNotFound(id) => write!(f, "workspace not found: {id}"),
            Self::MapNotFound(id) => write!(f, "map not found: {id}"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::VersionConflict {
                workspace_id,
                expected,
                actual,
            } => write!(
                f,
                "taxonomy of workspace {workspace_id} is at version {actual}, expected {expected}"
            ),
            Self::AccessDenied(message) => write!(f, "access denied: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "store requires table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::LockPoisoned => write!(f, "store connection lock poisoned"),
            Self::Backend(message) => write!(f, "storage backend error: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Workspace documents, including the taxonomy tree.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Persists a newly initialized workspace.
    async fn insert_workspace(&self, workspace: &Workspace) -> StoreResult<()>;
    /// Loads one workspace with its taxonomy and version.
    async fn load_workspace(&self, workspace_id: WorkspaceId) -> StoreResult<Option<Workspace>>;
    /// Replaces the taxonomy document when it is still at `expected_version`.
    ///
    /// Returns the new version. Fails with `VersionConflict` when another
    /// writer got there first.
    async fn save_taxonomy(
        &self,
        workspace_id: WorkspaceId,
        taxonomy: &Taxonomy,
        expected_version: u64,
    ) -> StoreResult<u64>;
    /// Appends one map id to the workspace map list.
    async fn append_map(&self, workspace_id: WorkspaceId, map_id: MapId) -> StoreResult<()>;
}

/// Map listing owned by the map collaborator.
#[async_trait]
pub trait MapStore: Send + Sync {
    async fn insert_map(&self, map: &MapRecord) -> StoreResult<()>;
    /// Non-archived maps of one workspace, in creation order.
    async fn list_active_maps(&self, workspace_id: WorkspaceId) -> StoreResult<Vec<MapSummary>>;
    /// Nodes of one map with `processed_for_duplication = false`.
    async fn list_unfiled_nodes(&self, map_id: MapId) -> StoreResult<Vec<NodeRef>>;
}

/// Node reference lookups and the processing flag.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Resolves the ids that still exist, keeping input order.
    async fn load_nodes(&self, node_ids: &[NodeId]) -> StoreResult<Vec<NodeRef>>;
    /// Sets `processed_for_duplication = true`. Never resets it.
    async fn mark_processed(&self, node_id: NodeId) -> StoreResult<()>;
}
