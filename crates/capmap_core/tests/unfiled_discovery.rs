use capmap_core::{
    DedupConfig, DedupError, DedupService, MapId, MissingTarget, NewMap, NewWorkspace, NodeId,
    NodeRef, SqliteStore, Workspace, WorkspaceService,
};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    store: Arc<SqliteStore>,
    workspaces: WorkspaceService,
    dedup: DedupService,
    workspace: Workspace,
}

async fn setup() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let workspaces = WorkspaceService::with_sqlite(store.clone());
    let dedup = DedupService::with_sqlite(store.clone(), DedupConfig::default());
    let workspace = workspaces
        .init_workspace(NewWorkspace {
            owner: "dave".to_string(),
            ..NewWorkspace::default()
        })
        .await
        .unwrap();
    Fixture {
        store,
        workspaces,
        dedup,
        workspace,
    }
}

async fn add_map(fixture: &Fixture, name: &str) -> MapId {
    fixture
        .workspaces
        .create_map(
            fixture.workspace.id,
            NewMap {
                name: Some(name.to_string()),
                ..NewMap::default()
            },
        )
        .await
        .unwrap()
        .id
}

fn add_node(fixture: &Fixture, map_id: MapId, name: &str) -> NodeId {
    let node = NodeRef::new(map_id, name);
    fixture.store.insert_node(&node).unwrap();
    node.id
}

#[tokio::test]
async fn workspace_without_maps_has_nothing_to_discover() {
    let fixture = setup().await;

    let unfiled = fixture
        .dedup
        .discover_unfiled_nodes(fixture.workspace.id)
        .await
        .unwrap();

    assert!(unfiled.is_empty());
}

#[tokio::test]
async fn discovery_keeps_only_active_maps_with_unfiled_nodes() {
    let fixture = setup().await;
    let sales = add_map(&fixture, "Sales").await;
    let empty = add_map(&fixture, "Empty").await;
    let archived = add_map(&fixture, "Old").await;
    let support = add_map(&fixture, "Support").await;

    let lead = add_node(&fixture, sales, "Lead");
    let deal = add_node(&fixture, sales, "Deal");
    add_node(&fixture, archived, "Fax");
    let ticket = add_node(&fixture, support, "Ticket");
    let hotline = add_node(&fixture, support, "Hotline");
    fixture.store.archive_map(archived).unwrap();

    let quality = fixture
        .workspace
        .taxonomy
        .category_id_by_name("Quality")
        .unwrap();
    fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, quality, hotline)
        .await
        .unwrap();

    let unfiled = fixture
        .dedup
        .discover_unfiled_nodes(fixture.workspace.id)
        .await
        .unwrap();

    let map_ids: Vec<MapId> = unfiled.iter().map(|entry| entry.map.id).collect();
    assert_eq!(map_ids, vec![sales, support]);
    assert!(!map_ids.contains(&empty));
    let sales_nodes: Vec<NodeId> = unfiled[0].nodes.iter().map(|n| n.id).collect();
    assert_eq!(sales_nodes, vec![lead, deal]);
    let support_nodes: Vec<NodeId> = unfiled[1].nodes.iter().map(|n| n.id).collect();
    assert_eq!(support_nodes, vec![ticket]);
    assert!(unfiled
        .iter()
        .flat_map(|entry| entry.nodes.iter())
        .all(|node| !node.processed_for_duplication));
    assert_eq!(unfiled[0].map.name.as_deref(), Some("Sales"));
}

#[tokio::test]
async fn fully_filed_map_drops_out_of_discovery() {
    let fixture = setup().await;
    let map_id = add_map(&fixture, "Ops").await;
    let node_id = add_node(&fixture, map_id, "Dispatch");
    let operational = fixture
        .workspace
        .taxonomy
        .category_id_by_name("Operational")
        .unwrap();

    let before = fixture
        .dedup
        .discover_unfiled_nodes(fixture.workspace.id)
        .await
        .unwrap();
    assert_eq!(before.len(), 1);

    fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, operational, node_id)
        .await
        .unwrap();

    let after = fixture
        .dedup
        .discover_unfiled_nodes(fixture.workspace.id)
        .await
        .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn discovery_on_unknown_workspace_is_not_found() {
    let fixture = setup().await;
    let missing = Uuid::new_v4();

    let err = fixture
        .dedup
        .discover_unfiled_nodes(missing)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DedupError::NotFound(MissingTarget::Workspace(id)) if id == missing
    ));
}
