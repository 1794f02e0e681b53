//! Workspace persistence on SQLite.
//!
//! # Invariants
//! - The taxonomy is stored as one JSON document per workspace together with
//!   `taxonomy_version`.
//! - `save_taxonomy` only writes when the stored version equals the expected
//!   one, then bumps it by one.
//! - Owner and map lists keep insertion order through `position`.

use async_trait::async_trait;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::sqlite_store::{parse_flag, parse_uuid, version_from_sql, version_to_sql, SqliteStore};
use super::store::{StoreError, StoreResult, WorkspaceStore};
use crate::model::map::MapId;
use crate::model::taxonomy::{CapabilityCategory, Taxonomy};
use crate::model::workspace::{Workspace, WorkspaceId};

#[async_trait]
impl WorkspaceStore for SqliteStore {
    async fn insert_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        let taxonomy_json = encode_taxonomy(&workspace.taxonomy)?;
        let version = version_to_sql(workspace.taxonomy_version)?;
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO workspaces (
                    id,
                    name,
                    purpose,
                    description,
                    archived,
                    taxonomy_json,
                    taxonomy_version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    workspace.id.to_string(),
                    workspace.name,
                    workspace.purpose,
                    workspace.description,
                    i64::from(workspace.archived),
                    taxonomy_json,
                    version,
                ],
            )?;
            for (position, owner) in workspace.owners.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO workspace_owners (workspace_id, owner, position)
                     VALUES (?1, ?2, ?3);",
                    params![workspace.id.to_string(), owner, position as i64],
                )?;
            }
            for (position, map_id) in workspace.maps.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO workspace_maps (workspace_id, map_id, position)
                     VALUES (?1, ?2, ?3);",
                    params![workspace.id.to_string(), map_id.to_string(), position as i64],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn load_workspace(&self, workspace_id: WorkspaceId) -> StoreResult<Option<Workspace>> {
        self.with_conn(|conn| load_workspace_row(conn, workspace_id))
    }

    async fn save_taxonomy(
        &self,
        workspace_id: WorkspaceId,
        taxonomy: &Taxonomy,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let taxonomy_json = encode_taxonomy(taxonomy)?;
        let expected = version_to_sql(expected_version)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE workspaces
                 SET taxonomy_json = ?2,
                     taxonomy_version = taxonomy_version + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND taxonomy_version = ?3;",
                params![workspace_id.to_string(), taxonomy_json, expected],
            )?;
            if changed == 1 {
                debug!(
                    "event=taxonomy_save module=repo status=ok workspace_id={workspace_id} version={}",
                    expected_version + 1
                );
                return Ok(expected_version + 1);
            }

            match current_version(conn, workspace_id)? {
                None => Err(StoreError::WorkspaceNotFound(workspace_id)),
                Some(actual) => Err(StoreError::VersionConflict {
                    workspace_id,
                    expected: expected_version,
                    actual,
                }),
            }
        })
    }

    async fn append_map(&self, workspace_id: WorkspaceId, map_id: MapId) -> StoreResult<()> {
        self.with_conn(|conn| {
            if current_version(conn, workspace_id)?.is_none() {
                return Err(StoreError::WorkspaceNotFound(workspace_id));
            }
            conn.execute(
                "INSERT INTO workspace_maps (workspace_id, map_id, position)
                 SELECT ?1, ?2, COALESCE(MAX(position), -1) + 1
                 FROM workspace_maps
                 WHERE workspace_id = ?1;",
                params![workspace_id.to_string(), map_id.to_string()],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn workspace_exists(conn: &Connection, workspace_id: WorkspaceId) -> StoreResult<bool> {
    Ok(current_version(conn, workspace_id)?.is_some())
}

fn current_version(conn: &Connection, workspace_id: WorkspaceId) -> StoreResult<Option<u64>> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT taxonomy_version FROM workspaces WHERE id = ?1;",
            [workspace_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    value.map(version_from_sql).transpose()
}

fn load_workspace_row(
    conn: &Connection,
    workspace_id: WorkspaceId,
) -> StoreResult<Option<Workspace>> {
    let row = conn
        .query_row(
            "SELECT name, purpose, description, archived, taxonomy_json, taxonomy_version
             FROM workspaces
             WHERE id = ?1;",
            [workspace_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((name, purpose, description, archived, taxonomy_json, version)) = row else {
        return Ok(None);
    };

    Ok(Some(Workspace {
        id: workspace_id,
        name,
        purpose,
        description,
        owners: list_owners(conn, workspace_id)?,
        archived: parse_flag(archived, "workspaces.archived")?,
        maps: list_map_ids(conn, workspace_id)?,
        taxonomy: decode_taxonomy(&taxonomy_json)?,
        taxonomy_version: version_from_sql(version)?,
    }))
}

fn list_owners(conn: &Connection, workspace_id: WorkspaceId) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT owner
         FROM workspace_owners
         WHERE workspace_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([workspace_id.to_string()])?;
    let mut owners = Vec::new();
    while let Some(row) = rows.next()? {
        owners.push(row.get(0)?);
    }
    Ok(owners)
}

fn list_map_ids(conn: &Connection, workspace_id: WorkspaceId) -> StoreResult<Vec<MapId>> {
    let mut stmt = conn.prepare(
        "SELECT map_id
         FROM workspace_maps
         WHERE workspace_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([workspace_id.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "workspace_maps.map_id")?);
    }
    Ok(ids)
}

fn encode_taxonomy(taxonomy: &Taxonomy) -> StoreResult<String> {
    serde_json::to_string(&taxonomy.to_categories())
        .map_err(|err| StoreError::InvalidData(format!("cannot encode taxonomy: {err}")))
}

fn decode_taxonomy(value: &str) -> StoreResult<Taxonomy> {
    let categories: Vec<CapabilityCategory> = serde_json::from_str(value).map_err(|err| {
        StoreError::InvalidData(format!("invalid json in workspaces.taxonomy_json: {err}"))
    })?;
    Taxonomy::from_categories(categories).map_err(|err| {
        StoreError::InvalidData(format!("invalid taxonomy in workspaces.taxonomy_json: {err}"))
    })
}
