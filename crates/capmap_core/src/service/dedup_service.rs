//! Node deduplication engine.
//!
//! # Responsibility
//! - Discover nodes that have not been filed into the taxonomy yet.
//! - File a node under a new capability, a new alias, or an existing alias.
//! - Keep the taxonomy document and the node processing flag in step.
//!
//! # Invariants
//! - Every lookup runs before any write; a failed lookup writes nothing.
//! - A node is filed into at most one alias.
//! - The taxonomy save and the node flag update are issued together and both
//!   outcomes are inspected; a half-applied filing is reported as
//!   `PartialFiling`, never swallowed.
//! - Taxonomy saves are compare-and-swap; a lost race reloads the document
//!   and re-applies the mutation up to `max_conflict_retries` times.
//! - A filed node left unflagged by an earlier partial filing is flagged
//!   again when any filing call names it; the call still reports
//!   `AlreadyFiled`.

use futures::future::try_join_all;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use super::populate::populate_taxonomy;
use crate::config::DedupConfig;
use crate::model::map::{NodeId, NodeRef, UnfiledMap};
use crate::model::taxonomy::{
    AliasId, CapabilityId, CategoryId, Placement, PopulatedTaxonomy, Taxonomy, TaxonomyError,
    TaxonomyTarget,
};
use crate::model::workspace::{Workspace, WorkspaceId};
use crate::repo::sqlite_store::SqliteStore;
use crate::repo::store::{MapStore, NodeStore, StoreError, WorkspaceStore};

/// Step of a deduplication call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingStage {
    Lookup,
    Load,
    TreeSave,
    NodeFlag,
    Populate,
    Discovery,
}

impl FilingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Load => "load",
            Self::TreeSave => "tree_save",
            Self::NodeFlag => "node_flag",
            Self::Populate => "populate",
            Self::Discovery => "discovery",
        }
    }
}

impl Display for FilingStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Missing element named by a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingTarget {
    Workspace(WorkspaceId),
    Node(NodeId),
    Taxonomy(TaxonomyTarget),
}

impl Display for MissingTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workspace(id) => write!(f, "workspace {id}"),
            Self::Node(id) => write!(f, "node {id}"),
            Self::Taxonomy(target) => write!(f, "{target}"),
        }
    }
}

/// Errors from deduplication operations.
#[derive(Debug)]
pub enum DedupError {
    NotFound(MissingTarget),
    AlreadyFiled {
        node_id: NodeId,
        alias_id: AliasId,
    },
    /// Rejected by a collaborator's access check.
    AccessDenied(String),
    Persistence {
        stage: FilingStage,
        source: StoreError,
    },
    /// One filing write is in place and the other failed.
    ///
    /// `taxonomy` holds the saved tree when the save went through, only the
    /// node flag failed and the tree could still be read back.
    PartialFiling {
        failed: FilingStage,
        taxonomy: Option<Box<PopulatedTaxonomy>>,
        source: StoreError,
    },
    /// Every compare-and-swap attempt lost against a concurrent writer.
    Conflict {
        workspace_id: WorkspaceId,
        attempts: u32,
    },
}

impl DedupError {
    /// Stage the error belongs to.
    pub fn stage(&self) -> FilingStage {
        match self {
            Self::NotFound(_) | Self::AlreadyFiled { .. } | Self::AccessDenied(_) => {
                FilingStage::Lookup
            }
            Self::Persistence { stage, .. } => *stage,
            Self::PartialFiling { failed, .. } => *failed,
            Self::Conflict { .. } => FilingStage::TreeSave,
        }
    }

    fn from_store(stage: FilingStage, err: StoreError) -> Self {
        match err {
            StoreError::AccessDenied(message) => Self::AccessDenied(message),
            StoreError::WorkspaceNotFound(id) => Self::NotFound(MissingTarget::Workspace(id)),
            other => Self::Persistence {
                stage,
                source: other,
            },
        }
    }
}

impl Display for DedupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(target) => write!(f, "{target} not found"),
            Self::AlreadyFiled { node_id, alias_id } => {
                write!(f, "node {node_id} is already filed under alias {alias_id}")
            }
            Self::AccessDenied(message) => write!(f, "access denied: {message}"),
            Self::Persistence { stage, source } => write!(f, "{stage} failed: {source}"),
            Self::PartialFiling { failed, source, .. } => {
                write!(f, "filing partially applied, {failed} failed: {source}")
            }
            Self::Conflict {
                workspace_id,
                attempts,
            } => write!(
                f,
                "taxonomy of workspace {workspace_id} kept changing; gave up after {attempts} attempts"
            ),
        }
    }
}

impl Error for DedupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence { source, .. } | Self::PartialFiling { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<TaxonomyError> for DedupError {
    fn from(value: TaxonomyError) -> Self {
        match value {
            TaxonomyError::TargetNotFound(target) => {
                Self::NotFound(MissingTarget::Taxonomy(target))
            }
            TaxonomyError::NodeAlreadyFiled { node_id, alias_id } => {
                Self::AlreadyFiled { node_id, alias_id }
            }
            other => Self::Persistence {
                stage: FilingStage::Lookup,
                source: StoreError::InvalidData(other.to_string()),
            },
        }
    }
}

/// Deduplication engine facade.
pub struct DedupService {
    workspaces: Arc<dyn WorkspaceStore>,
    maps: Arc<dyn MapStore>,
    nodes: Arc<dyn NodeStore>,
    config: DedupConfig,
}

impl DedupService {
    /// Creates the engine from its collaborators.
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        maps: Arc<dyn MapStore>,
        nodes: Arc<dyn NodeStore>,
        config: DedupConfig,
    ) -> Self {
        Self {
            workspaces,
            maps,
            nodes,
            config,
        }
    }

    /// Creates the engine with one SQLite store serving every collaborator.
    pub fn with_sqlite(store: Arc<SqliteStore>, config: DedupConfig) -> Self {
        Self::new(store.clone(), store.clone(), store, config)
    }

    /// Lists the non-archived maps of a workspace that still hold unfiled
    /// nodes, each with those nodes.
    ///
    /// Node listings run concurrently; one failing listing fails the call.
    pub async fn discover_unfiled_nodes(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<UnfiledMap>, DedupError> {
        let started_at = Instant::now();
        self.load_workspace(workspace_id).await?;

        let maps = self
            .maps
            .list_active_maps(workspace_id)
            .await
            .map_err(|err| DedupError::from_store(FilingStage::Discovery, err))?;
        let map_count = maps.len();

        let listings = maps.into_iter().map(|map| async move {
            let nodes = self.maps.list_unfiled_nodes(map.id).await?;
            Ok::<_, StoreError>(UnfiledMap { map, nodes })
        });
        let annotated = try_join_all(listings).await.map_err(|err| {
            error!(
                "event=discover_unfiled module=dedup status=error workspace_id={workspace_id} error={err}"
            );
            DedupError::from_store(FilingStage::Discovery, err)
        })?;

        let unfiled: Vec<UnfiledMap> = annotated
            .into_iter()
            .filter(|entry| !entry.nodes.is_empty())
            .collect();
        info!(
            "event=discover_unfiled module=dedup status=ok workspace_id={workspace_id} maps={map_count} maps_with_unfiled={} duration_ms={}",
            unfiled.len(),
            started_at.elapsed().as_millis()
        );
        Ok(unfiled)
    }

    /// Files `node_id` as the single member of a new alias inside a new
    /// capability of category `category_id`.
    pub async fn file_under_new_capability(
        &self,
        workspace_id: WorkspaceId,
        category_id: CategoryId,
        node_id: NodeId,
    ) -> Result<PopulatedTaxonomy, DedupError> {
        self.file_node("new_capability", workspace_id, node_id, |taxonomy| {
            taxonomy.file_under_new_capability(category_id, node_id)
        })
        .await
    }

    /// Files `node_id` as the single member of a new alias inside the
    /// existing capability `capability_id`.
    pub async fn file_under_new_alias(
        &self,
        workspace_id: WorkspaceId,
        capability_id: CapabilityId,
        node_id: NodeId,
    ) -> Result<PopulatedTaxonomy, DedupError> {
        self.file_node("new_alias", workspace_id, node_id, |taxonomy| {
            taxonomy.file_under_new_alias(capability_id, node_id)
        })
        .await
    }

    /// Appends `node_id` to the existing alias `alias_id`, marking it a
    /// duplicate of the alias members.
    pub async fn add_to_alias(
        &self,
        workspace_id: WorkspaceId,
        alias_id: AliasId,
        node_id: NodeId,
    ) -> Result<PopulatedTaxonomy, DedupError> {
        self.file_node("add_to_alias", workspace_id, node_id, |taxonomy| {
            taxonomy.add_to_alias(alias_id, node_id)
        })
        .await
    }

    async fn file_node<F>(
        &self,
        operation: &'static str,
        workspace_id: WorkspaceId,
        node_id: NodeId,
        mutate: F,
    ) -> Result<PopulatedTaxonomy, DedupError>
    where
        F: Fn(&mut Taxonomy) -> Result<Placement, TaxonomyError> + Send + Sync,
    {
        let started_at = Instant::now();
        info!(
            "event=file_node module=dedup status=start op={operation} workspace_id={workspace_id} node_id={node_id}"
        );

        let result = self
            .file_node_attempts(operation, workspace_id, node_id, &mutate)
            .await;
        match &result {
            Ok(taxonomy) => info!(
                "event=file_node module=dedup status=ok op={operation} workspace_id={workspace_id} node_id={node_id} version={} duration_ms={}",
                taxonomy.version,
                started_at.elapsed().as_millis()
            ),
            Err(err @ DedupError::PartialFiling { .. }) => warn!(
                "event=file_node module=dedup status=partial op={operation} workspace_id={workspace_id} node_id={node_id} stage={} duration_ms={} error={err}",
                err.stage(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=file_node module=dedup status=error op={operation} workspace_id={workspace_id} node_id={node_id} stage={} duration_ms={} error={err}",
                err.stage(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    async fn file_node_attempts<F>(
        &self,
        operation: &'static str,
        workspace_id: WorkspaceId,
        node_id: NodeId,
        mutate: &F,
    ) -> Result<PopulatedTaxonomy, DedupError>
    where
        F: Fn(&mut Taxonomy) -> Result<Placement, TaxonomyError> + Send + Sync,
    {
        let node = self.load_node(node_id).await?;

        let max_attempts = self.config.max_conflict_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut workspace = self.load_workspace(workspace_id).await?;
            let expected_version = workspace.taxonomy_version;
            let placement = match mutate(&mut workspace.taxonomy) {
                Ok(placement) => placement,
                Err(TaxonomyError::NodeAlreadyFiled { alias_id, .. }) => {
                    return Err(self.reflag_filed_node(operation, &node, alias_id).await);
                }
                Err(err) => return Err(err.into()),
            };

            let (saved, flagged) = tokio::join!(
                self.workspaces
                    .save_taxonomy(workspace_id, &workspace.taxonomy, expected_version),
                self.nodes.mark_processed(node_id),
            );

            match (saved, flagged) {
                (Err(StoreError::VersionConflict { actual, .. }), _) if attempt < max_attempts => {
                    warn!(
                        "event=file_node module=dedup status=retry op={operation} workspace_id={workspace_id} attempt={attempt} expected_version={expected_version} actual_version={actual}"
                    );
                }
                (Ok(version), Ok(())) => {
                    workspace.taxonomy_version = version;
                    info!(
                        "event=file_node module=dedup status=applied op={operation} workspace_id={workspace_id} node_id={node_id} category_id={} capability_id={} alias_id={}",
                        placement.category_id, placement.capability_id, placement.alias_id
                    );
                    return self.populate(&workspace).await;
                }
                (Ok(version), Err(flag_err)) => {
                    workspace.taxonomy_version = version;
                    warn!(
                        "event=file_node module=dedup status=partial op={operation} workspace_id={workspace_id} node_id={node_id} stage=node_flag version={version} error={flag_err}"
                    );
                    let taxonomy = match self.populate(&workspace).await {
                        Ok(taxonomy) => Some(Box::new(taxonomy)),
                        Err(populate_err) => {
                            error!(
                                "event=file_node module=dedup status=error op={operation} workspace_id={workspace_id} node_id={node_id} stage=populate error={populate_err}"
                            );
                            None
                        }
                    };
                    return Err(DedupError::PartialFiling {
                        failed: FilingStage::NodeFlag,
                        taxonomy,
                        source: flag_err,
                    });
                }
                (Err(save_err), Ok(())) => {
                    return Err(DedupError::PartialFiling {
                        failed: FilingStage::TreeSave,
                        taxonomy: None,
                        source: save_err,
                    });
                }
                (Err(StoreError::VersionConflict { .. }), Err(_)) => {
                    return Err(DedupError::Conflict {
                        workspace_id,
                        attempts: attempt,
                    });
                }
                (Err(save_err), Err(flag_err)) => {
                    error!(
                        "event=file_node module=dedup status=error op={operation} workspace_id={workspace_id} node_id={node_id} stage=node_flag error={flag_err}"
                    );
                    return Err(DedupError::from_store(FilingStage::TreeSave, save_err));
                }
            }
        }
    }

    async fn load_node(&self, node_id: NodeId) -> Result<NodeRef, DedupError> {
        self.nodes
            .load_nodes(&[node_id])
            .await
            .map_err(|err| DedupError::from_store(FilingStage::Lookup, err))?
            .into_iter()
            .next()
            .ok_or(DedupError::NotFound(MissingTarget::Node(node_id)))
    }

    /// Flags a node that is already in the tree but still unprocessed.
    ///
    /// Returns the error the filing call reports: `AlreadyFiled`, or
    /// `PartialFiling` when the flag write fails again.
    async fn reflag_filed_node(
        &self,
        operation: &'static str,
        node: &NodeRef,
        alias_id: AliasId,
    ) -> DedupError {
        let already_filed = DedupError::AlreadyFiled {
            node_id: node.id,
            alias_id,
        };
        if node.processed_for_duplication {
            return already_filed;
        }

        match self.nodes.mark_processed(node.id).await {
            Ok(()) => {
                info!(
                    "event=flag_repair module=dedup status=ok op={operation} node_id={} alias_id={alias_id}",
                    node.id
                );
                already_filed
            }
            Err(source) => DedupError::PartialFiling {
                failed: FilingStage::NodeFlag,
                taxonomy: None,
                source,
            },
        }
    }

    async fn load_workspace(&self, workspace_id: WorkspaceId) -> Result<Workspace, DedupError> {
        self.workspaces
            .load_workspace(workspace_id)
            .await
            .map_err(|err| DedupError::from_store(FilingStage::Load, err))?
            .ok_or(DedupError::NotFound(MissingTarget::Workspace(workspace_id)))
    }

    async fn populate(&self, workspace: &Workspace) -> Result<PopulatedTaxonomy, DedupError> {
        populate_taxonomy(self.nodes.as_ref(), workspace)
            .await
            .map_err(|err| DedupError::from_store(FilingStage::Populate, err))
    }
}
