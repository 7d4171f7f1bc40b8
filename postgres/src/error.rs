//! Mapping from sqlx failures to [`StoreError`].

use campsite_core::store::StoreError;

/// Classify a sqlx error.
///
/// Unique violations are conflicts, decode failures are serialization errors, and
/// everything else (pool timeouts, I/O, protocol) is treated as unavailability so
/// callers retry it.
pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Serialization(error.to_string()),
        _ => StoreError::Unavailable(error.to_string()),
    }
}
