//! Error taxonomy for repository operations
//!
//! "Not found" is not represented here: update/delete/read misses surface as
//! `Ok(None)` so callers can treat logical absence as a normal outcome.

use thiserror::Error;

use crate::CancellationToken;

type Source = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Null/empty required input, detected before any I/O.
    #[error("invalid argument for {operation} on {entity}: {message}")]
    InvalidArgument {
        operation: &'static str,
        entity: &'static str,
        message: String,
    },

    /// The cancellation signal fired before the operation acknowledged a write.
    #[error("{operation} on {entity} was cancelled")]
    Cancelled {
        operation: &'static str,
        entity: &'static str,
    },

    /// Concurrent modification or uniqueness violation; retry with fresh data.
    #[error("conflict during {operation} on {entity}: {message}")]
    Conflict {
        operation: &'static str,
        entity: &'static str,
        message: String,
    },

    /// Connection drop, timeout. Retried by the provider with bounded
    /// attempts; surfaces here only once retries are exhausted.
    #[error("transient store failure during {operation} on {entity}: {source}")]
    Transient {
        operation: &'static str,
        entity: &'static str,
        #[source]
        source: Source,
    },

    /// Any other native-store error.
    #[error("store fault during {operation} on {entity}: {source}")]
    Store {
        operation: &'static str,
        entity: &'static str,
        #[source]
        source: Source,
    },

    #[error("serialization failure for {entity}: {source}")]
    Serialization {
        entity: &'static str,
        #[source]
        source: Source,
    },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] crate::validation::ValidationError),
}

impl StoreError {
    pub fn invalid_argument(
        operation: &'static str,
        entity: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            operation,
            entity,
            message: message.into(),
        }
    }

    pub fn cancelled(operation: &'static str, entity: &'static str) -> Self {
        tracing::debug!(operation, entity, "operation cancelled");
        Self::Cancelled { operation, entity }
    }

    pub fn conflict(
        operation: &'static str,
        entity: &'static str,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        tracing::warn!(operation, entity, %message, "store conflict");
        Self::Conflict {
            operation,
            entity,
            message,
        }
    }

    pub fn transient(
        operation: &'static str,
        entity: &'static str,
        source: impl Into<Source>,
    ) -> Self {
        let source = source.into();
        tracing::warn!(operation, entity, error = %source, "transient store failure");
        Self::Transient {
            operation,
            entity,
            source,
        }
    }

    pub fn store(
        operation: &'static str,
        entity: &'static str,
        source: impl Into<Source>,
    ) -> Self {
        let source = source.into();
        tracing::error!(operation, entity, error = %source, "store fault");
        Self::Store {
            operation,
            entity,
            source,
        }
    }

    pub fn serialization(entity: &'static str, source: impl Into<Source>) -> Self {
        let source = source.into();
        tracing::error!(entity, error = %source, "serialization failure");
        Self::Serialization { entity, source }
    }
}

/// Fail with [`StoreError::Cancelled`] if the token has fired. Providers call
/// this on entry and again before every write is issued.
pub fn ensure_live(
    cancel: &CancellationToken,
    operation: &'static str,
    entity: &'static str,
) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::cancelled(operation, entity));
    }
    Ok(())
}
