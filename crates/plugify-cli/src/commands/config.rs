use crate::errors::{CliError, Result};
use crate::GlobalOpts;
use clap::Subcommand;
use colored::Colorize;
use plugify_config::{Config, KEYS};
use std::fs;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print every configured value
    Show,
    /// Print a single value
    Get { key: String },
    /// Set a value and save the config file
    Set { key: String, value: String },
    /// Get or set the path to the config file.
    /// If `new_path` is provided, a pointer file redirects the default location to it.
    Path {
        /// Optional new config path to set
        new_path: Option<String>,
    },
}

fn unknown_key(key: &str) -> CliError {
    CliError::InvalidArgs(format!(
        "Unknown config key: {}. Supported keys: {}",
        key,
        KEYS.join(", ")
    ))
}

pub fn handle_config(action: Option<ConfigAction>, opts: &GlobalOpts) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", "Configuration:".bold().green());
            if config.is_empty() {
                if opts.verbosity_level() > 0 {
                    println!("  {}", "(empty)".yellow());
                }
            } else {
                for (key, value) in config.values_iter() {
                    println!("  {}: {}", key.cyan(), value);
                }
            }
        }
        ConfigAction::Get { key } => {
            if !KEYS.contains(&key.as_str()) {
                return Err(unknown_key(&key));
            }
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{}", value),
                None => plugify_logger::note(&format!("{} is not set", key)),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, value.clone())?;
            config.save()?;
            plugify_logger::success(&format!("Set {} = {}", key, value));
        }
        ConfigAction::Path { new_path } => {
            let config_path = Config::path();
            plugify_logger::debug(&format!("Reading config from: {}", config_path.display()));
            let pointer_path = Config::pointer_path();

            match new_path {
                Some(p) => {
                    if let Some(parent) = pointer_path.parent() {
                        fs::create_dir_all(parent).map_err(plugify_config::ConfigError::from)?;
                    }
                    fs::write(&pointer_path, p.as_bytes()).map_err(plugify_config::ConfigError::from)?;
                    plugify_logger::success(&format!("Config path set to {}", p));
                }
                None => {
                    println!("{}", config_path.display());
                    if let Ok(contents) = fs::read_to_string(&pointer_path) {
                        let trimmed = contents.trim();
                        if !trimmed.is_empty() {
                            println!("{} {}", "overridden-by".cyan(), trimmed);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
