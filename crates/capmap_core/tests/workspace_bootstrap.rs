use capmap_core::model::map::{DEFAULT_MAP_OWNER, DEFAULT_MAP_PURPOSE};
use capmap_core::{
    NewMap, NewWorkspace, SqliteStore, StoreLocation, StoreRegistry, WorkspaceService,
    WorkspaceServiceError, SEED_CATEGORY_NAMES,
};
use std::sync::Arc;
use uuid::Uuid;

fn service() -> WorkspaceService {
    WorkspaceService::with_sqlite(Arc::new(SqliteStore::open_in_memory().unwrap()))
}

#[tokio::test]
async fn init_workspace_seeds_categories_and_defaults() {
    let workspaces = service();

    let workspace = workspaces
        .init_workspace(NewWorkspace {
            owner: "  erin ".to_string(),
            description: Some("   ".to_string()),
            ..NewWorkspace::default()
        })
        .await
        .unwrap();

    assert_eq!(workspace.name, "Unnamed");
    assert_eq!(workspace.purpose, "Just playing around.");
    assert!(!workspace.description.trim().is_empty());
    assert_eq!(workspace.owners, vec!["erin".to_string()]);
    assert!(!workspace.archived);
    assert_eq!(workspace.taxonomy_version, 0);

    let stored = workspaces.get_workspace(workspace.id).await.unwrap();
    assert_eq!(stored.name, workspace.name);
    assert_eq!(stored.owners, workspace.owners);
    assert_eq!(stored.taxonomy.category_ids(), workspace.taxonomy.category_ids());

    let taxonomy = workspaces.find_processed_nodes(workspace.id).await.unwrap();
    let names: Vec<&str> = taxonomy
        .categories
        .iter()
        .map(|category| category.name.as_str())
        .collect();
    assert_eq!(names, SEED_CATEGORY_NAMES.to_vec());
    assert!(taxonomy
        .categories
        .iter()
        .all(|category| category.capabilities.is_empty()));
}

#[tokio::test]
async fn blank_owner_is_rejected() {
    let workspaces = service();

    let err = workspaces
        .init_workspace(NewWorkspace {
            owner: "   ".to_string(),
            ..NewWorkspace::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::InvalidOwner));
}

#[tokio::test]
async fn create_map_appends_in_order_with_defaults() {
    let workspaces = service();
    let workspace = workspaces
        .init_workspace(NewWorkspace {
            owner: "frank".to_string(),
            ..NewWorkspace::default()
        })
        .await
        .unwrap();

    let first = workspaces
        .create_map(workspace.id, NewMap::default())
        .await
        .unwrap();
    let second = workspaces
        .create_map(
            workspace.id,
            NewMap {
                owner: Some("Rival Inc".to_string()),
                name: Some("Pricing".to_string()),
                ..NewMap::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(first.owner, DEFAULT_MAP_OWNER);
    assert_eq!(first.purpose, DEFAULT_MAP_PURPOSE);
    assert_eq!(second.owner, "Rival Inc");
    assert_eq!(second.name.as_deref(), Some("Pricing"));

    let stored = workspaces.get_workspace(workspace.id).await.unwrap();
    assert_eq!(stored.maps, vec![first.id, second.id]);
}

#[tokio::test]
async fn unknown_workspace_is_reported() {
    let workspaces = service();
    let missing = Uuid::new_v4();

    let err = workspaces
        .create_map(missing, NewMap::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceServiceError::WorkspaceNotFound(id) if id == missing));

    let err = workspaces.find_processed_nodes(missing).await.unwrap_err();
    assert!(matches!(err, WorkspaceServiceError::WorkspaceNotFound(id) if id == missing));
}

#[tokio::test]
async fn registry_shares_one_store_per_location() {
    let registry = StoreRegistry::new();
    let location = StoreLocation::Memory("shared".to_string());

    let writer = WorkspaceService::with_sqlite(registry.open(&location).unwrap());
    let workspace = writer
        .init_workspace(NewWorkspace {
            owner: "grace".to_string(),
            ..NewWorkspace::default()
        })
        .await
        .unwrap();

    let reader = WorkspaceService::with_sqlite(registry.open(&location).unwrap());
    let loaded = reader.get_workspace(workspace.id).await.unwrap();
    assert_eq!(loaded.id, workspace.id);

    assert!(registry.close(&location).unwrap());
    let fresh = WorkspaceService::with_sqlite(registry.open(&location).unwrap());
    assert!(matches!(
        fresh.get_workspace(workspace.id).await.unwrap_err(),
        WorkspaceServiceError::WorkspaceNotFound(_)
    ));
}
