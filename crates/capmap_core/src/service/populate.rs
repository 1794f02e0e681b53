//! Deep population of a workspace taxonomy.

use log::debug;
use std::collections::HashMap;

use crate::model::taxonomy::PopulatedTaxonomy;
use crate::model::workspace::Workspace;
use crate::repo::store::{NodeStore, StoreResult};

/// Resolves every filed node id of `workspace` into its node record.
///
/// Ids the node store no longer knows are left out of the view.
pub(crate) async fn populate_taxonomy(
    nodes: &dyn NodeStore,
    workspace: &Workspace,
) -> StoreResult<PopulatedTaxonomy> {
    let node_ids = workspace.taxonomy.filed_node_ids();
    let resolved: HashMap<_, _> = nodes
        .load_nodes(&node_ids)
        .await?
        .into_iter()
        .map(|node| (node.id, node))
        .collect();

    if resolved.len() < node_ids.len() {
        debug!(
            "event=taxonomy_populate module=service status=partial workspace_id={} filed={} resolved={}",
            workspace.id,
            node_ids.len(),
            resolved.len()
        );
    }

    Ok(PopulatedTaxonomy {
        workspace_id: workspace.id,
        version: workspace.taxonomy_version,
        categories: workspace.taxonomy.populate(&resolved),
    })
}
