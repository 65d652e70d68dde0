//! Error types for distrib-cls

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The learning-rate policy string is not one of `cos` / `steps`.
    #[error("LR policy '{0}' not supported")]
    UnsupportedLrPolicy(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Environment variable {var} has invalid value '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Backend '{backend}' cannot run a {world_size}-process group in this build")]
    BackendUnavailable { backend: String, world_size: usize },

    #[error("Collective error: {0}")]
    Collective(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
