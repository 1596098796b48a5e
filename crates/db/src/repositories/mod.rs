use thiserror::Error;

use claimdesk_core::store::StoreError;

pub mod memory;
pub mod request;

pub use memory::InMemoryRequestRepository;
pub use request::SqlRequestRepository;

/// Capacity of the change feed; slower subscribers observe a lag and refetch.
pub(crate) const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => {
                StoreError::Unavailable(format!("stored request is unreadable: {message}"))
            }
        }
    }
}
