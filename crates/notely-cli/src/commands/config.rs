use std::path::Path;

use notely_core::config::ClientConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::{load_effective_config, CliPaths};
use crate::error::CliError;

pub fn run_config(paths: &CliPaths, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let effective = load_effective_config(paths)?;
            for line in render_config(&effective, &paths.config_path, &paths.db_path) {
                println!("{line}");
            }
            Ok(())
        }
        ConfigCommands::SetUrl { url } => {
            let config = update_config_file(&paths.config_path, |config| {
                config.set_api_base_url(&url)
            })?;
            println!(
                "Sync server set to {}",
                config.api_base_url.as_deref().unwrap_or_default()
            );
            Ok(())
        }
        ConfigCommands::SetToken { token } => {
            update_config_file(&paths.config_path, |config| {
                config.set_access_token(&token)
            })?;
            println!("Access token saved to {}", paths.config_path.display());
            Ok(())
        }
        ConfigCommands::ClearToken => {
            update_config_file(&paths.config_path, |config| {
                config.clear_access_token();
                Ok(())
            })?;
            println!("Access token removed");
            Ok(())
        }
    }
}

/// Load the config file (without environment overrides), change it, save it
pub fn update_config_file<F>(path: &Path, change: F) -> Result<ClientConfig, CliError>
where
    F: FnOnce(&mut ClientConfig) -> notely_core::Result<()>,
{
    let mut config = ClientConfig::load(path)?;
    change(&mut config)?;
    config.save(path)?;
    Ok(config)
}

pub fn render_config(config: &ClientConfig, config_path: &Path, db_path: &Path) -> Vec<String> {
    vec![
        format!("config file: {}", config_path.display()),
        format!("database:    {}", db_path.display()),
        format!(
            "server:      {}",
            config.api_base_url.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "token:       {}",
            if config.access_token.is_some() {
                "[REDACTED]"
            } else {
                "(not set)"
            }
        ),
        format!("debounce:    {}ms", config.debounce_ms),
    ]
}
