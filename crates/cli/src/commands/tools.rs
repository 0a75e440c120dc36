//! `steward tools`: list the built-in tools.

use std::path::Path;

use steward_core::tool::ToolDefinition;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = steward_tools::default_registry(&config.tools)?;

    println!("Tools (workspace: {})", config.tools.workspace_dir().display());
    println!();
    for definition in registry.definitions() {
        print!("{}", describe(&definition));
    }
    if config.agent.safe_mode {
        println!("Safe mode is on: mutating tools need an approval callback (--interactive-approval).");
    }
    Ok(())
}

fn describe(definition: &ToolDefinition) -> String {
    let mut out = format!(
        "  {:<22} {:<9} {}\n",
        definition.name, definition.capability, definition.description
    );
    let required: Vec<&str> = definition.parameters["required"]
        .as_array()
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    if let Some(properties) = definition.parameters["properties"].as_object() {
        for (name, spec) in properties {
            let ty = spec["type"].as_str().unwrap_or("any");
            let marker = if required.contains(&name.as_str()) { "*" } else { " " };
            out.push_str(&format!("  {:<22}   {marker}{name}: {ty}\n", ""));
        }
    }
    out.push('\n');
    out
}
