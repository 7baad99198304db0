//! Shared error types (scene-agnostic).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Generic error: {0}")]
    Generic(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Modifier '{modifier}' cannot be used on object '{object}'")]
    ModifierIncompatible { modifier: String, object: String },

    #[error("Modifier '{modifier}' allows a single instance per object ('{object}')")]
    ModifierSingle { modifier: String, object: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
