//! Config command implementation.

use anyhow::Result;
use clap::Subcommand;

use crate::models::Config;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Write the current configuration to the config file
    Init,
}

pub async fn handle_config(cmd: ConfigCommand, verbose: bool) -> Result<()> {
    let config = Config::load()?;

    match cmd {
        ConfigCommand::Show => {
            let content = toml::to_string_pretty(&config)
                .map_err(crate::error::ConfigError::TomlSerializeError)?;
            print!("{}", content);
        }
        ConfigCommand::Init => {
            config.save()?;
            let path = Config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            if verbose {
                println!("Wrote configuration to {}", path);
            } else {
                println!("Configuration saved.");
            }
        }
    }

    Ok(())
}
