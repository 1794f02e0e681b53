//! Map and node reference persistence on SQLite.
//!
//! # Invariants
//! - Map listings exclude archived maps and are ordered by creation.
//! - `processed_for_duplication` is only ever written as `1`.

use async_trait::async_trait;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::sqlite_store::{parse_flag, parse_uuid, SqliteStore};
use super::store::{MapStore, NodeStore, StoreError, StoreResult};
use super::workspace_repo::workspace_exists;
use crate::model::map::{MapId, MapRecord, MapSummary, NodeId, NodeRef};
use crate::model::workspace::WorkspaceId;

const NODE_SELECT_SQL: &str = "SELECT
    id,
    parent_map,
    name,
    processed_for_duplication
FROM nodes";

#[async_trait]
impl MapStore for SqliteStore {
    async fn insert_map(&self, map: &MapRecord) -> StoreResult<()> {
        self.with_conn(|conn| {
            if !workspace_exists(conn, map.workspace_id)? {
                return Err(StoreError::WorkspaceNotFound(map.workspace_id));
            }
            conn.execute(
                "INSERT INTO maps (
                    id,
                    workspace_id,
                    owner,
                    purpose,
                    name,
                    responsible_person,
                    archived
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    map.id.to_string(),
                    map.workspace_id.to_string(),
                    map.owner,
                    map.purpose,
                    map.name,
                    map.responsible_person,
                    i64::from(map.archived),
                ],
            )?;
            Ok(())
        })
    }

    async fn list_active_maps(&self, workspace_id: WorkspaceId) -> StoreResult<Vec<MapSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner, purpose, name
                 FROM maps
                 WHERE workspace_id = ?1
                   AND archived = 0
                 ORDER BY created_at ASC, rowid ASC;",
            )?;
            let mut rows = stmt.query([workspace_id.to_string()])?;
            let mut maps = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                maps.push(MapSummary {
                    id: parse_uuid(&id, "maps.id")?,
                    owner: row.get(1)?,
                    purpose: row.get(2)?,
                    name: row.get(3)?,
                });
            }
            Ok(maps)
        })
    }

    async fn list_unfiled_nodes(&self, map_id: MapId) -> StoreResult<Vec<NodeRef>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{NODE_SELECT_SQL}
                 WHERE parent_map = ?1
                   AND processed_for_duplication = 0
                 ORDER BY created_at ASC, rowid ASC;"
            ))?;
            let mut rows = stmt.query([map_id.to_string()])?;
            let mut nodes = Vec::new();
            while let Some(row) = rows.next()? {
                nodes.push(parse_node_row(row)?);
            }
            Ok(nodes)
        })
    }
}

#[async_trait]
impl NodeStore for SqliteStore {
    async fn load_nodes(&self, node_ids: &[NodeId]) -> StoreResult<Vec<NodeRef>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!("{NODE_SELECT_SQL} WHERE id = ?1;"))?;
            let mut nodes = Vec::with_capacity(node_ids.len());
            for node_id in node_ids {
                let mut rows = stmt.query([node_id.to_string()])?;
                if let Some(row) = rows.next()? {
                    nodes.push(parse_node_row(row)?);
                }
            }
            Ok(nodes)
        })
    }

    async fn mark_processed(&self, node_id: NodeId) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE nodes
                 SET processed_for_duplication = 1
                 WHERE id = ?1;",
                [node_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NodeNotFound(node_id));
            }
            Ok(())
        })
    }
}

impl SqliteStore {
    /// Seeds one node reference on an existing map.
    ///
    /// Node creation belongs to the map editor; this entry point exists so
    /// hosts and tests can populate a store.
    pub fn insert_node(&self, node: &NodeRef) -> StoreResult<()> {
        self.with_conn(|conn| {
            if !map_exists(conn, node.parent_map)? {
                return Err(StoreError::MapNotFound(node.parent_map));
            }
            conn.execute(
                "INSERT INTO nodes (id, parent_map, name, processed_for_duplication)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    node.id.to_string(),
                    node.parent_map.to_string(),
                    node.name,
                    i64::from(node.processed_for_duplication),
                ],
            )?;
            Ok(())
        })
    }

    /// Flags one map as archived so it drops out of discovery.
    pub fn archive_map(&self, map_id: MapId) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE maps SET archived = 1 WHERE id = ?1;",
                [map_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::MapNotFound(map_id));
            }
            info!("event=map_archive module=repo status=ok map_id={map_id}");
            Ok(())
        })
    }
}

fn map_exists(conn: &Connection, map_id: MapId) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM maps WHERE id = ?1;",
            [map_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<NodeRef> {
    let id: String = row.get("id")?;
    let parent_map: String = row.get("parent_map")?;
    Ok(NodeRef {
        id: parse_uuid(&id, "nodes.id")?,
        parent_map: parse_uuid(&parent_map, "nodes.parent_map")?,
        name: row.get("name")?,
        processed_for_duplication: parse_flag(
            row.get("processed_for_duplication")?,
            "nodes.processed_for_duplication",
        )?,
    })
}
