use thiserror::Error;

use super::BatchStatus;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} batch {id} in status {status}")]
    InvalidStatus {
        id: String,
        status: BatchStatus,
        operation: &'static str,
    },

    #[error("Batch is full: at most {max} documents per batch")]
    Full { max: usize },

    #[error("Batch {0} has no documents")]
    Empty(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}
