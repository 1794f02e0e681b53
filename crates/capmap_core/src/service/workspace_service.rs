//! Workspace use-case service.
//!
//! # Responsibility
//! - Bootstrap workspaces with default metadata and the seeded taxonomy.
//! - Register new maps inside a workspace.
//! - Expose the deep-populated taxonomy without filing anything.
//!
//! # Invariants
//! - Owner must be non-blank.
//! - A map id is appended to the workspace before the map record exists;
//!   a failed map insert leaves the id listed and is logged.

use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use super::populate::populate_taxonomy;
use crate::model::map::{MapRecord, NewMap};
use crate::model::taxonomy::PopulatedTaxonomy;
use crate::model::workspace::{NewWorkspace, Workspace, WorkspaceId};
use crate::repo::sqlite_store::SqliteStore;
use crate::repo::store::{MapStore, NodeStore, StoreError, WorkspaceStore};

/// Errors from workspace service operations.
#[derive(Debug)]
pub enum WorkspaceServiceError {
    /// Owner is blank after trim.
    InvalidOwner,
    WorkspaceNotFound(WorkspaceId),
    /// Store-level failure.
    Store(StoreError),
}

impl Display for WorkspaceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOwner => write!(f, "workspace owner must not be blank"),
            Self::WorkspaceNotFound(id) => write!(f, "workspace not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WorkspaceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for WorkspaceServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::WorkspaceNotFound(id) => Self::WorkspaceNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Workspace service facade.
pub struct WorkspaceService {
    workspaces: Arc<dyn WorkspaceStore>,
    maps: Arc<dyn MapStore>,
    nodes: Arc<dyn NodeStore>,
}

impl WorkspaceService {
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        maps: Arc<dyn MapStore>,
        nodes: Arc<dyn NodeStore>,
    ) -> Self {
        Self {
            workspaces,
            maps,
            nodes,
        }
    }

    /// Creates the service with one SQLite store serving every collaborator.
    pub fn with_sqlite(store: Arc<SqliteStore>) -> Self {
        Self::new(store.clone(), store.clone(), store)
    }

    /// Creates and persists a workspace with the seeded taxonomy.
    pub async fn init_workspace(
        &self,
        request: NewWorkspace,
    ) -> Result<Workspace, WorkspaceServiceError> {
        let owner = request.owner.trim().to_string();
        if owner.is_empty() {
            return Err(WorkspaceServiceError::InvalidOwner);
        }

        let workspace = Workspace::init(NewWorkspace { owner, ..request });
        self.workspaces.insert_workspace(&workspace).await?;
        info!(
            "event=workspace_init module=service status=ok workspace_id={} categories={}",
            workspace.id,
            workspace.taxonomy.category_count()
        );
        Ok(workspace)
    }

    /// Creates a map inside an existing workspace.
    pub async fn create_map(
        &self,
        workspace_id: WorkspaceId,
        request: NewMap,
    ) -> Result<MapRecord, WorkspaceServiceError> {
        let record = request.into_record(workspace_id);
        self.workspaces.append_map(workspace_id, record.id).await?;

        if let Err(err) = self.maps.insert_map(&record).await {
            error!(
                "event=map_create module=service status=error workspace_id={workspace_id} map_id={} error={err}",
                record.id
            );
            return Err(err.into());
        }
        info!(
            "event=map_create module=service status=ok workspace_id={workspace_id} map_id={}",
            record.id
        );
        Ok(record)
    }

    /// Loads a workspace.
    pub async fn get_workspace(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Workspace, WorkspaceServiceError> {
        self.workspaces
            .load_workspace(workspace_id)
            .await?
            .ok_or(WorkspaceServiceError::WorkspaceNotFound(workspace_id))
    }

    /// Returns the taxonomy with every filed node resolved.
    pub async fn find_processed_nodes(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<PopulatedTaxonomy, WorkspaceServiceError> {
        let workspace = self.get_workspace(workspace_id).await?;
        Ok(populate_taxonomy(self.nodes.as_ref(), &workspace).await?)
    }
}
