//! Crate-wide error taxonomy.
//!
//! Configuration problems (duplicate/unknown names, cyclic graphs) are raised
//! at startup before any file IO. Transform-step and IO failures abort a
//! single build run; whether they are fatal depends on the mode (one-shot
//! `build` exits non-zero, a watch session logs and keeps serving).

use thiserror::Error;

use crate::types::{TaskName, TransformName};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate transform name: {0}")]
    DuplicateTransform(TransformName),

    #[error("Unknown transform: {0}")]
    UnknownTransform(TransformName),

    #[error("Unknown task: {0}")]
    UnknownTask(TaskName),

    #[error("Dependency cycle involving '{0}'")]
    CyclicDependency(String),

    #[error("Build failed in transform '{transform}': {source}")]
    BuildFailed {
        transform: TransformName,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// True for errors that must abort the process even in a watch session.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            PipelineError::ConfigError(_)
                | PipelineError::DuplicateTransform(_)
                | PipelineError::UnknownTransform(_)
                | PipelineError::UnknownTask(_)
                | PipelineError::CyclicDependency(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
