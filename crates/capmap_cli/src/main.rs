//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `capmap_core` wiring end to end: open a store, bootstrap a
//!   workspace, read back its taxonomy.
//! - Keep output deterministic apart from generated ids.

use capmap_core::{
    core_version, init_logging_from_config, CoreConfig, NewWorkspace, StoreLocation,
    StoreRegistry, WorkspaceService,
};
use std::error::Error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env();
    init_logging_from_config(&config)?;

    let registry = StoreRegistry::new();
    let location = match &config.database_path {
        Some(path) => StoreLocation::File(path.clone()),
        None => StoreLocation::Memory("cli".to_string()),
    };
    let store = registry.open(&location)?;
    let workspaces = WorkspaceService::with_sqlite(store);

    let workspace = workspaces
        .init_workspace(NewWorkspace {
            owner: "capmap-cli".to_string(),
            ..NewWorkspace::default()
        })
        .await?;
    let taxonomy = workspaces.find_processed_nodes(workspace.id).await?;

    println!("capmap_core version={}", core_version());
    println!("workspace id={} name={}", workspace.id, workspace.name);
    for category in &taxonomy.categories {
        println!(
            "category name=\"{}\" capabilities={}",
            category.name,
            category.capabilities.len()
        );
    }

    registry.close_all()?;
    log::info!("event=cli_exit module=cli status=ok");
    Ok(())
}
