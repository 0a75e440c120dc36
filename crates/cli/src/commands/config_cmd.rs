//! `steward config`: configuration management commands.

use std::path::Path;

use steward_config::AppConfig;

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_file(config_path);
    println!("Validating {}...", path.display());

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set STEWARD_API_KEY, ANTHROPIC_API_KEY or OPENAI_API_KEY)");
            }
            if !config.agent.safe_mode {
                warnings.push("Safe mode is off: mutating tools run without approval");
            }
            if config.tools.forbidden_paths.is_empty() {
                warnings.push("No forbidden paths configured");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:   {}", config.provider);
            println!("   Model:      {}", config.model);
            println!("   Workspace:  {}", config.tools.workspace_dir().display());
            println!("   Iterations: {}", config.agent.max_iterations);
            println!("   Safe mode:  {}", config.agent.safe_mode);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("<redacted>".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_file(config_path).display());
    Ok(())
}

pub async fn init(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_file(config_path);
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, AppConfig::default_toml()).await?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
