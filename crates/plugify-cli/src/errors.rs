//! Error types of the command-line front end

use plugify_config::ConfigError;
use plugify_manifest::GenerationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidArgs(String),

    #[error("{failed} of {total} module(s) failed")]
    ModulesFailed { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, CliError>;
