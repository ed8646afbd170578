//! `chatloom config`: configuration management commands.

use std::path::Path;

use chatloom_config::AppConfig;

use super::CliResult;

pub async fn validate(path: Option<&Path>) -> CliResult {
    println!("Validating configuration...");

    let loaded = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };

    match loaded {
        Ok(config) => {
            println!("   ok  Config parsed and validated");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set OPENAI_API_KEY or CHATLOOM_API_KEY)".to_string());
            }
            if config.workspace.enabled && !config.workspace.api_url.starts_with("http") {
                warnings.push(format!("workspace.api_url '{}' is not an http(s) URL", config.workspace.api_url));
            }
            for w in &warnings {
                println!("   warn  {w}");
            }

            println!();
            println!("   Endpoint:        {}", config.api_url);
            println!("   Chat model:      {}", config.llm.chat_model);
            println!("   Fallback model:  {}", config.llm.fallback_model);
            println!("   Max tool calls:  {}", config.agent.max_tool_calls);
            println!("   History pairs:   {}", config.memory.max_history_pairs);
            println!("   Turn store:      {}", config.memory.turn_store);
            println!(
                "   Workspace:       {}",
                if config.workspace.enabled { config.workspace.api_url.as_str() } else { "disabled" }
            );
        }
        Err(e) => {
            println!("   error  {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(config: AppConfig) -> CliResult {
    println!("{}", redacted_toml(&config)?);
    Ok(())
}

pub async fn path(path: Option<&Path>) -> CliResult {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("{}", config_path.display());
    Ok(())
}

fn redacted_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("***".into());
    }
    toml::to_string_pretty(&shown)
}
