//! Workspace aggregate.
//!
//! # Responsibility
//! - Group the maps of one organization and own its capability taxonomy.
//! - Apply creation defaults for blank user input.
//!
//! # Invariants
//! - A new workspace is never archived and carries the seeded taxonomy at
//!   version 0.
//! - `taxonomy_version` only grows; every successful taxonomy save bumps it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::map::MapId;
use super::taxonomy::Taxonomy;

/// Stable workspace identifier.
pub type WorkspaceId = Uuid;

pub const DEFAULT_WORKSPACE_NAME: &str = "Unnamed";
pub const DEFAULT_WORKSPACE_DESCRIPTION: &str =
    "I am too lazy to fill this field even when I know it causes organizational mess";
pub const DEFAULT_WORKSPACE_PURPOSE: &str = "Just playing around.";

/// Caller input for workspace creation. Blank fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkspace {
    pub name: Option<String>,
    pub description: Option<String>,
    pub purpose: Option<String>,
    pub owner: String,
}

/// Workspace with its taxonomy document.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub purpose: String,
    pub description: String,
    pub owners: Vec<String>,
    pub archived: bool,
    /// Map ids in creation order.
    pub maps: Vec<MapId>,
    pub taxonomy: Taxonomy,
    /// Optimistic concurrency token of the taxonomy document.
    pub taxonomy_version: u64,
}

impl Workspace {
    /// Builds a fresh workspace with defaults and the seeded taxonomy.
    pub fn init(request: NewWorkspace) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: or_default(request.name, DEFAULT_WORKSPACE_NAME),
            purpose: or_default(request.purpose, DEFAULT_WORKSPACE_PURPOSE),
            description: or_default(request.description, DEFAULT_WORKSPACE_DESCRIPTION),
            owners: vec![request.owner],
            archived: false,
            maps: Vec::new(),
            taxonomy: Taxonomy::seeded(),
            taxonomy_version: 0,
        }
    }
}

fn or_default(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.to_string(),
    }
}
