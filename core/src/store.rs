//! Shared error type for the durable stores behind both services.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur in a store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness or version constraint rejected the write.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A row could not be mapped to or from its domain type.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the same call may succeed if retried later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Boxed future returned by dyn-compatible store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;
