//! Error types for the Polystore crate
//!
//! This module contains errors raised by the coordinator itself; repository
//! operations surface [`repo_core::StoreError`] directly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolyStoreError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Store(#[from] repo_core::StoreError),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("repository already registered: {0}")]
    RepositoryAlreadyRegistered(String),

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(&'static str),
}
