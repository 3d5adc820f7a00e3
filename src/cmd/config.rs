//! Configuration view and validation - `checkup config`.

use std::path::Path;

use anyhow::{Context, Result};

use checkup::config::{Config, DEFAULT_CONFIG_FILE};

use super::super::ConfigCommands;

const REDACTED: &str = "********";

pub fn cmd_config(config: &Config, path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let source = match path {
        Some(p) => p.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "defaults".to_string(),
    };

    match command {
        None | Some(ConfigCommands::Show) => {
            let mut shown = config.clone();
            if shown.annotator.api_key.is_some() {
                shown.annotator.api_key = Some(REDACTED.to_string());
            }
            let rendered =
                toml::to_string_pretty(&shown).context("Failed to render configuration")?;
            println!("# Effective configuration (source: {}, with env overrides)", source);
            println!();
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration OK ({})", source);
            } else {
                println!("Configuration warnings ({}):", source);
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }
    Ok(())
}
