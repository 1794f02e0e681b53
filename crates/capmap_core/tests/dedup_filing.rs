use capmap_core::{
    DedupConfig, DedupError, DedupService, MapRecord, MissingTarget, NewMap, NewWorkspace,
    NodeId, NodeRef, NodeStore, SqliteStore, TaxonomyTarget, Workspace, WorkspaceService,
};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    store: Arc<SqliteStore>,
    workspaces: WorkspaceService,
    dedup: DedupService,
    workspace: Workspace,
    map: MapRecord,
}

async fn setup() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let workspaces = WorkspaceService::with_sqlite(store.clone());
    let dedup = DedupService::with_sqlite(store.clone(), DedupConfig::default());
    let workspace = workspaces
        .init_workspace(NewWorkspace {
            name: Some("Tea Corp".to_string()),
            owner: "alice".to_string(),
            ..NewWorkspace::default()
        })
        .await
        .unwrap();
    let map = workspaces
        .create_map(workspace.id, NewMap::default())
        .await
        .unwrap();
    Fixture {
        store,
        workspaces,
        dedup,
        workspace,
        map,
    }
}

fn seed_node(fixture: &Fixture, name: &str) -> NodeId {
    let node = NodeRef::new(fixture.map.id, name);
    fixture.store.insert_node(&node).unwrap();
    node.id
}

async fn is_processed(fixture: &Fixture, node_id: NodeId) -> bool {
    fixture.store.load_nodes(&[node_id]).await.unwrap()[0].processed_for_duplication
}

async fn version(fixture: &Fixture) -> u64 {
    fixture
        .workspaces
        .get_workspace(fixture.workspace.id)
        .await
        .unwrap()
        .taxonomy_version
}

#[tokio::test]
async fn filing_chain_builds_capability_aliases_and_flags_nodes() {
    let fixture = setup().await;
    let quality = fixture
        .workspace
        .taxonomy
        .category_id_by_name("Quality")
        .unwrap();
    let n1 = seed_node(&fixture, "Kettle");
    let n2 = seed_node(&fixture, "Boiler");
    let n3 = seed_node(&fixture, "Water heater");

    let result = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, quality, n1)
        .await
        .unwrap();
    let category = result.category(quality).unwrap();
    assert_eq!(category.capabilities.len(), 1);
    let capability = &category.capabilities[0];
    assert_eq!(capability.aliases.len(), 1);
    let alias_one = capability.aliases[0].id;
    let node_ids: Vec<NodeId> = capability.aliases[0].nodes.iter().map(|n| n.id).collect();
    assert_eq!(node_ids, vec![n1]);
    assert!(is_processed(&fixture, n1).await);
    assert_eq!(result.version, 1);
    assert!(result
        .categories
        .iter()
        .filter(|c| c.id != quality)
        .all(|c| c.capabilities.is_empty()));

    let result = fixture
        .dedup
        .file_under_new_alias(fixture.workspace.id, capability.id, n2)
        .await
        .unwrap();
    let capability = result.capability(capability.id).unwrap();
    assert_eq!(capability.aliases.len(), 2);
    assert_eq!(capability.aliases[0].id, alias_one);
    assert_eq!(capability.aliases[0].nodes.len(), 1);
    assert_eq!(capability.aliases[0].nodes[0].id, n1);
    assert_eq!(capability.aliases[1].nodes.len(), 1);
    assert_eq!(capability.aliases[1].nodes[0].id, n2);
    let alias_two = capability.aliases[1].id;
    assert!(is_processed(&fixture, n2).await);

    let result = fixture
        .dedup
        .add_to_alias(fixture.workspace.id, alias_one, n3)
        .await
        .unwrap();
    let first: Vec<NodeId> = result
        .alias(alias_one)
        .unwrap()
        .nodes
        .iter()
        .map(|n| n.id)
        .collect();
    let second: Vec<NodeId> = result
        .alias(alias_two)
        .unwrap()
        .nodes
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(first, vec![n1, n3]);
    assert_eq!(second, vec![n2]);
    assert!(result.alias(alias_one).unwrap().nodes[1].processed_for_duplication);
    assert_eq!(result.version, 3);
    assert_eq!(version(&fixture).await, 3);
}

#[tokio::test]
async fn new_capability_leaves_sibling_capabilities_unchanged() {
    let fixture = setup().await;
    let research = fixture
        .workspace
        .taxonomy
        .category_id_by_name("Research")
        .unwrap();
    let n1 = seed_node(&fixture, "Lab");
    let n2 = seed_node(&fixture, "Prototype");

    let first = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, research, n1)
        .await
        .unwrap();
    let before = first.category(research).unwrap().capabilities[0].clone();

    let second = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, research, n2)
        .await
        .unwrap();
    let category = second.category(research).unwrap();
    assert_eq!(category.capabilities.len(), 2);
    assert_eq!(category.capabilities[0], before);
    assert_eq!(category.capabilities[1].aliases[0].nodes[0].id, n2);
}

#[tokio::test]
async fn unknown_category_fails_without_writing() {
    let fixture = setup().await;
    let n4 = seed_node(&fixture, "Orphan");
    let missing = Uuid::new_v4();

    let err = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, missing, n4)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DedupError::NotFound(MissingTarget::Taxonomy(TaxonomyTarget::Category(id))) if id == missing
    ));
    assert_eq!(version(&fixture).await, 0);
    assert!(!is_processed(&fixture, n4).await);
    let taxonomy = fixture
        .workspaces
        .find_processed_nodes(fixture.workspace.id)
        .await
        .unwrap();
    assert!(taxonomy.categories.iter().all(|c| c.capabilities.is_empty()));
}

#[tokio::test]
async fn unknown_capability_and_alias_fail_with_not_found() {
    let fixture = setup().await;
    let node_id = seed_node(&fixture, "Cup");
    let missing = Uuid::new_v4();

    let err = fixture
        .dedup
        .file_under_new_alias(fixture.workspace.id, missing, node_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DedupError::NotFound(MissingTarget::Taxonomy(TaxonomyTarget::Capability(_)))
    ));

    let err = fixture
        .dedup
        .add_to_alias(fixture.workspace.id, missing, node_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DedupError::NotFound(MissingTarget::Taxonomy(TaxonomyTarget::Alias(_)))
    ));
    assert_eq!(version(&fixture).await, 0);
    assert!(!is_processed(&fixture, node_id).await);
}

#[tokio::test]
async fn unknown_node_or_workspace_fails_before_writing() {
    let fixture = setup().await;
    let quality = fixture
        .workspace
        .taxonomy
        .category_id_by_name("Quality")
        .unwrap();
    let ghost = Uuid::new_v4();

    let err = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, quality, ghost)
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::NotFound(MissingTarget::Node(id)) if id == ghost));
    assert_eq!(version(&fixture).await, 0);

    let node_id = seed_node(&fixture, "Cup");
    let other_workspace = Uuid::new_v4();
    let err = fixture
        .dedup
        .file_under_new_capability(other_workspace, quality, node_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DedupError::NotFound(MissingTarget::Workspace(id)) if id == other_workspace
    ));
    assert!(!is_processed(&fixture, node_id).await);
}

#[tokio::test]
async fn refiling_a_node_is_rejected_and_flag_stays_set() {
    let fixture = setup().await;
    let taxonomy = &fixture.workspace.taxonomy;
    let quality = taxonomy.category_id_by_name("Quality").unwrap();
    let finances = taxonomy.category_id_by_name("Finances").unwrap();
    let node_id = seed_node(&fixture, "Invoice");

    let filed = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, quality, node_id)
        .await
        .unwrap();
    let alias_id = filed.category(quality).unwrap().capabilities[0].aliases[0].id;

    let err = fixture
        .dedup
        .file_under_new_capability(fixture.workspace.id, finances, node_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DedupError::AlreadyFiled { node_id: n, alias_id: a } if n == node_id && a == alias_id
    ));
    assert!(is_processed(&fixture, node_id).await);
    assert_eq!(version(&fixture).await, 1);
}

#[tokio::test]
async fn filed_taxonomy_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capmap.sqlite3");
    let workspace_id;
    let node_id;
    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let workspaces = WorkspaceService::with_sqlite(store.clone());
        let dedup = DedupService::with_sqlite(store.clone(), DedupConfig::default());
        let workspace = workspaces
            .init_workspace(NewWorkspace {
                owner: "bob".to_string(),
                ..NewWorkspace::default()
            })
            .await
            .unwrap();
        let map = workspaces
            .create_map(workspace.id, NewMap::default())
            .await
            .unwrap();
        let node = NodeRef::new(map.id, "Shipping");
        store.insert_node(&node).unwrap();
        let operational = workspace
            .taxonomy
            .category_id_by_name("Operational")
            .unwrap();
        dedup
            .file_under_new_capability(workspace.id, operational, node.id)
            .await
            .unwrap();
        workspace_id = workspace.id;
        node_id = node.id;
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let workspaces = WorkspaceService::with_sqlite(store);
    let taxonomy = workspaces.find_processed_nodes(workspace_id).await.unwrap();
    assert_eq!(taxonomy.version, 1);
    let filed: Vec<NodeId> = taxonomy
        .categories
        .iter()
        .flat_map(|c| c.capabilities.iter())
        .flat_map(|c| c.aliases.iter())
        .flat_map(|a| a.nodes.iter().map(|n| n.id))
        .collect();
    assert_eq!(filed, vec![node_id]);
}
