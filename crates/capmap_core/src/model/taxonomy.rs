//! Capability taxonomy aggregate.
//!
//! # Responsibility
//! - Hold the category → capability → alias → node-id hierarchy of one
//!   workspace.
//! - Resolve any category, capability or alias id without walking the tree.
//! - Apply the three filing mutations and reject unknown targets.
//!
//! # Invariants
//! - Identifiers are unique across the whole taxonomy, per level.
//! - A node id is filed into at most one alias.
//! - Categories are append-only; capabilities and aliases keep insertion
//!   order.
//!
//! The tree is stored as an arena: one flat record vector per level plus an
//! id → index map per level. The nested `CapabilityCategory` shape is only
//! used at the persistence and display boundaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use super::map::{NodeId, NodeRef};

pub type CategoryId = Uuid;
pub type CapabilityId = Uuid;
pub type AliasId = Uuid;

/// Category names every new workspace starts with, in display order.
pub const SEED_CATEGORY_NAMES: [&str; 7] = [
    "Customer Service",
    "Administrative",
    "Quality",
    "Operational",
    "Sales and Marketing",
    "Research",
    "Finances",
];

/// Persisted shape of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCategory {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// Persisted shape of one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

/// Persisted shape of one alias: node ids in filing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: AliasId,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
}

/// Addressable taxonomy element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonomyTarget {
    Category(CategoryId),
    Capability(CapabilityId),
    Alias(AliasId),
}

impl Display for TaxonomyTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category(id) => write!(f, "capability category {id}"),
            Self::Capability(id) => write!(f, "capability {id}"),
            Self::Alias(id) => write!(f, "alias {id}"),
        }
    }
}

/// Errors raised by taxonomy construction and mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    /// No element with the given id exists.
    TargetNotFound(TaxonomyTarget),
    /// The node is already a member of an alias.
    NodeAlreadyFiled { node_id: NodeId, alias_id: AliasId },
    /// A persisted document reuses one id for two elements.
    DuplicateId(Uuid),
    /// A persisted document files one node twice.
    DuplicateNode(NodeId),
}

impl Display for TaxonomyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetNotFound(target) => write!(f, "{target} not found"),
            Self::NodeAlreadyFiled { node_id, alias_id } => {
                write!(f, "node {node_id} is already filed under alias {alias_id}")
            }
            Self::DuplicateId(id) => write!(f, "taxonomy id {id} is used more than once"),
            Self::DuplicateNode(id) => write!(f, "node {id} is filed more than once"),
        }
    }
}

impl Error for TaxonomyError {}

/// Where a filing operation placed a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub category_id: CategoryId,
    pub capability_id: CapabilityId,
    pub alias_id: AliasId,
}

#[derive(Debug, Clone)]
struct CategoryRecord {
    id: CategoryId,
    name: String,
    capabilities: Vec<usize>,
}

#[derive(Debug, Clone)]
struct CapabilityRecord {
    id: CapabilityId,
    category: usize,
    aliases: Vec<usize>,
}

#[derive(Debug, Clone)]
struct AliasRecord {
    id: AliasId,
    capability: usize,
    nodes: Vec<NodeId>,
}

/// Arena-backed taxonomy tree of one workspace.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    categories: Vec<CategoryRecord>,
    capabilities: Vec<CapabilityRecord>,
    aliases: Vec<AliasRecord>,
    category_index: HashMap<CategoryId, usize>,
    capability_index: HashMap<CapabilityId, usize>,
    alias_index: HashMap<AliasId, usize>,
    node_index: HashMap<NodeId, usize>,
}

impl Taxonomy {
    /// Creates the initial taxonomy with the fixed seed categories.
    pub fn seeded() -> Self {
        let mut taxonomy = Self::default();
        for name in SEED_CATEGORY_NAMES {
            taxonomy.push_category(Uuid::new_v4(), name.to_string());
        }
        taxonomy
    }

    /// Rebuilds the arena from the persisted nested shape.
    ///
    /// # Errors
    /// - `DuplicateId` when two elements of one level share an id.
    /// - `DuplicateNode` when one node id appears in more than one slot.
    pub fn from_categories(categories: Vec<CapabilityCategory>) -> Result<Self, TaxonomyError> {
        let mut taxonomy = Self::default();
        for category in categories {
            if taxonomy.category_index.contains_key(&category.id) {
                return Err(TaxonomyError::DuplicateId(category.id));
            }
            let category_slot = taxonomy.push_category(category.id, category.name);
            for capability in category.capabilities {
                if taxonomy.capability_index.contains_key(&capability.id) {
                    return Err(TaxonomyError::DuplicateId(capability.id));
                }
                let capability_slot = taxonomy.push_capability(category_slot, capability.id);
                for alias in capability.aliases {
                    if taxonomy.alias_index.contains_key(&alias.id) {
                        return Err(TaxonomyError::DuplicateId(alias.id));
                    }
                    let alias_slot = taxonomy.push_alias(capability_slot, alias.id);
                    for node_id in alias.nodes {
                        if taxonomy.node_index.contains_key(&node_id) {
                            return Err(TaxonomyError::DuplicateNode(node_id));
                        }
                        taxonomy.push_node(alias_slot, node_id);
                    }
                }
            }
        }
        Ok(taxonomy)
    }

    /// Returns the nested shape used for persistence and display.
    pub fn to_categories(&self) -> Vec<CapabilityCategory> {
        self.categories
            .iter()
            .map(|category| CapabilityCategory {
                id: category.id,
                name: category.name.clone(),
                capabilities: category
                    .capabilities
                    .iter()
                    .map(|&slot| self.capability_shape(slot))
                    .collect(),
            })
            .collect()
    }

    /// Number of categories.
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Category ids in display order.
    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.categories.iter().map(|category| category.id).collect()
    }

    /// Looks up a category id by its display name.
    pub fn category_id_by_name(&self, name: &str) -> Option<CategoryId> {
        self.categories
            .iter()
            .find(|category| category.name == name)
            .map(|category| category.id)
    }

    /// Capability ids of one category, in insertion order.
    pub fn capability_ids(&self, category_id: CategoryId) -> Option<Vec<CapabilityId>> {
        let slot = *self.category_index.get(&category_id)?;
        Some(
            self.categories[slot]
                .capabilities
                .iter()
                .map(|&capability| self.capabilities[capability].id)
                .collect(),
        )
    }

    /// Alias ids of one capability, in insertion order.
    pub fn alias_ids(&self, capability_id: CapabilityId) -> Option<Vec<AliasId>> {
        let slot = *self.capability_index.get(&capability_id)?;
        Some(
            self.capabilities[slot]
                .aliases
                .iter()
                .map(|&alias| self.aliases[alias].id)
                .collect(),
        )
    }

    /// Node ids of one alias, in filing order.
    pub fn alias_nodes(&self, alias_id: AliasId) -> Option<&[NodeId]> {
        let slot = *self.alias_index.get(&alias_id)?;
        Some(self.aliases[slot].nodes.as_slice())
    }

    /// Returns whether the target id exists at its level.
    pub fn contains(&self, target: TaxonomyTarget) -> bool {
        match target {
            TaxonomyTarget::Category(id) => self.category_index.contains_key(&id),
            TaxonomyTarget::Capability(id) => self.capability_index.contains_key(&id),
            TaxonomyTarget::Alias(id) => self.alias_index.contains_key(&id),
        }
    }

    /// Returns the alias a node is filed under, if any.
    pub fn alias_of_node(&self, node_id: NodeId) -> Option<AliasId> {
        self.node_index
            .get(&node_id)
            .map(|&slot| self.aliases[slot].id)
    }

    /// All filed node ids in category/capability/alias/filing order.
    pub fn filed_node_ids(&self) -> Vec<NodeId> {
        self.categories
            .iter()
            .flat_map(|category| category.capabilities.iter())
            .flat_map(|&capability| self.capabilities[capability].aliases.iter())
            .flat_map(|&alias| self.aliases[alias].nodes.iter().copied())
            .collect()
    }

    /// Appends a new capability holding one new alias with `node_id`.
    pub fn file_under_new_capability(
        &mut self,
        category_id: CategoryId,
        node_id: NodeId,
    ) -> Result<Placement, TaxonomyError> {
        let category_slot = *self
            .category_index
            .get(&category_id)
            .ok_or(TaxonomyError::TargetNotFound(TaxonomyTarget::Category(
                category_id,
            )))?;
        self.ensure_unfiled(node_id)?;

        let capability_slot = self.push_capability(category_slot, Uuid::new_v4());
        let alias_slot = self.push_alias(capability_slot, Uuid::new_v4());
        self.push_node(alias_slot, node_id);
        Ok(self.placement(alias_slot))
    }

    /// Appends a new alias with `node_id` to an existing capability.
    pub fn file_under_new_alias(
        &mut self,
        capability_id: CapabilityId,
        node_id: NodeId,
    ) -> Result<Placement, TaxonomyError> {
        let capability_slot = *self
            .capability_index
            .get(&capability_id)
            .ok_or(TaxonomyError::TargetNotFound(TaxonomyTarget::Capability(
                capability_id,
            )))?;
        self.ensure_unfiled(node_id)?;

        let alias_slot = self.push_alias(capability_slot, Uuid::new_v4());
        self.push_node(alias_slot, node_id);
        Ok(self.placement(alias_slot))
    }

    /// Appends `node_id` to an existing alias.
    pub fn add_to_alias(
        &mut self,
        alias_id: AliasId,
        node_id: NodeId,
    ) -> Result<Placement, TaxonomyError> {
        let alias_slot = *self
            .alias_index
            .get(&alias_id)
            .ok_or(TaxonomyError::TargetNotFound(TaxonomyTarget::Alias(alias_id)))?;
        self.ensure_unfiled(node_id)?;

        self.push_node(alias_slot, node_id);
        Ok(self.placement(alias_slot))
    }

    /// Builds the display tree, resolving node ids through `resolved`.
    ///
    /// Ids missing from `resolved` are skipped; the caller decides whether
    /// that deserves a diagnostic.
    pub fn populate(&self, resolved: &HashMap<NodeId, NodeRef>) -> Vec<PopulatedCategory> {
        self.categories
            .iter()
            .map(|category| PopulatedCategory {
                id: category.id,
                name: category.name.clone(),
                capabilities: category
                    .capabilities
                    .iter()
                    .map(|&capability_slot| {
                        let capability = &self.capabilities[capability_slot];
                        PopulatedCapability {
                            id: capability.id,
                            aliases: capability
                                .aliases
                                .iter()
                                .map(|&alias_slot| {
                                    let alias = &self.aliases[alias_slot];
                                    PopulatedAlias {
                                        id: alias.id,
                                        nodes: alias
                                            .nodes
                                            .iter()
                                            .filter_map(|node_id| resolved.get(node_id).cloned())
                                            .collect(),
                                    }
                                })
                                .collect(),
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    fn ensure_unfiled(&self, node_id: NodeId) -> Result<(), TaxonomyError> {
        match self.alias_of_node(node_id) {
            Some(alias_id) => Err(TaxonomyError::NodeAlreadyFiled { node_id, alias_id }),
            None => Ok(()),
        }
    }

    fn placement(&self, alias_slot: usize) -> Placement {
        let alias = &self.aliases[alias_slot];
        let capability = &self.capabilities[alias.capability];
        Placement {
            category_id: self.categories[capability.category].id,
            capability_id: capability.id,
            alias_id: alias.id,
        }
    }

    fn capability_shape(&self, slot: usize) -> Capability {
        let capability = &self.capabilities[slot];
        Capability {
            id: capability.id,
            aliases: capability
                .aliases
                .iter()
                .map(|&alias_slot| {
                    let alias = &self.aliases[alias_slot];
                    Alias {
                        id: alias.id,
                        nodes: alias.nodes.clone(),
                    }
                })
                .collect(),
        }
    }

    fn push_category(&mut self, id: CategoryId, name: String) -> usize {
        let slot = self.categories.len();
        self.categories.push(CategoryRecord {
            id,
            name,
            capabilities: Vec::new(),
        });
        self.category_index.insert(id, slot);
        slot
    }

    fn push_capability(&mut self, category: usize, id: CapabilityId) -> usize {
        let slot = self.capabilities.len();
        self.capabilities.push(CapabilityRecord {
            id,
            category,
            aliases: Vec::new(),
        });
        self.categories[category].capabilities.push(slot);
        self.capability_index.insert(id, slot);
        slot
    }

    fn push_alias(&mut self, capability: usize, id: AliasId) -> usize {
        let slot = self.aliases.len();
        self.aliases.push(AliasRecord {
            id,
            capability,
            nodes: Vec::new(),
        });
        self.capabilities[capability].aliases.push(slot);
        self.alias_index.insert(id, slot);
        slot
    }

    fn push_node(&mut self, alias: usize, node_id: NodeId) {
        self.aliases[alias].nodes.push(node_id);
        self.node_index.insert(node_id, alias);
    }
}

/// Deep-populated taxonomy returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulatedTaxonomy {
    pub workspace_id: Uuid,
    /// Document version the view was built from.
    pub version: u64,
    pub categories: Vec<PopulatedCategory>,
}

impl PopulatedTaxonomy {
    /// Finds a populated category by id.
    pub fn category(&self, id: CategoryId) -> Option<&PopulatedCategory> {
        self.categories.iter().find(|category| category.id == id)
    }

    /// Finds a populated capability anywhere in the tree.
    pub fn capability(&self, id: CapabilityId) -> Option<&PopulatedCapability> {
        self.categories
            .iter()
            .flat_map(|category| category.capabilities.iter())
            .find(|capability| capability.id == id)
    }

    /// Finds a populated alias anywhere in the tree.
    pub fn alias(&self, id: AliasId) -> Option<&PopulatedAlias> {
        self.categories
            .iter()
            .flat_map(|category| category.capabilities.iter())
            .flat_map(|capability| capability.aliases.iter())
            .find(|alias| alias.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulatedCategory {
    pub id: CategoryId,
    pub name: String,
    pub capabilities: Vec<PopulatedCapability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulatedCapability {
    pub id: CapabilityId,
    pub aliases: Vec<PopulatedAlias>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulatedAlias {
    pub id: AliasId,
    pub nodes: Vec<NodeRef>,
}
