//! Map and node reference read models.
//!
//! Maps and their nodes are owned by the map collaborator. The engine only
//! reads display fields and toggles `processed_for_duplication`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workspace::WorkspaceId;

/// Stable map identifier.
pub type MapId = Uuid;

/// Stable node reference identifier.
pub type NodeId = Uuid;

/// Display-relevant projection of one map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSummary {
    pub id: MapId,
    /// Map author as recorded on creation.
    pub owner: String,
    pub purpose: String,
    pub name: Option<String>,
}

/// Full map record as created inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRecord {
    pub id: MapId,
    pub workspace_id: WorkspaceId,
    pub owner: String,
    pub purpose: String,
    pub name: Option<String>,
    pub responsible_person: Option<String>,
    pub archived: bool,
}

impl MapRecord {
    /// Returns the projection used by discovery listings.
    pub fn summary(&self) -> MapSummary {
        MapSummary {
            id: self.id,
            owner: self.owner.clone(),
            purpose: self.purpose.clone(),
            name: self.name.clone(),
        }
    }
}

pub const DEFAULT_MAP_OWNER: &str = "your competitor";
pub const DEFAULT_MAP_PURPOSE: &str = "be busy with nothing";

/// Caller input for map creation. Blank fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMap {
    pub owner: Option<String>,
    pub purpose: Option<String>,
    pub name: Option<String>,
    pub responsible_person: Option<String>,
}

impl NewMap {
    /// Builds the record for a new, non-archived map in `workspace_id`.
    pub fn into_record(self, workspace_id: WorkspaceId) -> MapRecord {
        MapRecord {
            id: Uuid::new_v4(),
            workspace_id,
            owner: non_blank(self.owner).unwrap_or_else(|| DEFAULT_MAP_OWNER.to_string()),
            purpose: non_blank(self.purpose).unwrap_or_else(|| DEFAULT_MAP_PURPOSE.to_string()),
            name: non_blank(self.name),
            responsible_person: non_blank(self.responsible_person),
            archived: false,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// One point on a map, the unit of deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub parent_map: MapId,
    pub name: String,
    /// Monotonic: flips `false -> true` once the node is filed.
    pub processed_for_duplication: bool,
}

impl NodeRef {
    /// Creates an unprocessed node reference on `parent_map`.
    pub fn new(parent_map: MapId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_map,
            name: name.into(),
            processed_for_duplication: false,
        }
    }
}

/// Map annotated with the nodes still waiting to be filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnfiledMap {
    pub map: MapSummary,
    /// Never empty in discovery results.
    pub nodes: Vec<NodeRef>,
}
