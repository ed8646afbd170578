//! `chatloom tools`: list the tools the model can call.

use std::sync::Arc;
use std::time::Duration;

use chatloom_config::AppConfig;
use chatloom_core::profile::UserProfile;
use chatloom_memory::NoopMemory;
use chatloom_tools::WorkspaceClient;

use super::CliResult;

pub async fn run(config: AppConfig) -> CliResult {
    // Only definitions are needed, so no real index is opened.
    let registry =
        chatloom_tools::default_registry(&config, Arc::new(NoopMemory), UserProfile::default().shared(), None);

    println!("{} tools registered (timeout {}s each)", registry.len(), registry.timeout().as_secs());
    for def in registry.definitions() {
        println!();
        println!("  {}", def.name);
        println!("    {}", def.description);
        let schema = serde_json::to_string_pretty(&def.parameters)?;
        for line in schema.lines() {
            println!("    {line}");
        }
    }

    println!();
    if config.workspace.enabled {
        let client = WorkspaceClient::new(
            config.workspace.api_url.clone(),
            Duration::from_secs(config.workspace.timeout_secs),
        );
        let status = if client.health().await { "reachable" } else { "UNREACHABLE" };
        println!("  workspace at {}: {status}", client.base_url());
    } else {
        println!("  (workspace tools are disabled; set workspace.enabled = true to add them)");
    }
    Ok(())
}
