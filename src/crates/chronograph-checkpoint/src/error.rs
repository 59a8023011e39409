//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("checkpoint not found: lineage={lineage_id} checkpoint={checkpoint_id}")]
    NotFound {
        lineage_id: String,
        checkpoint_id: String,
    },

    /// A checkpoint with this id is already stored; checkpoints are immutable
    #[error("checkpoint already exists: lineage={lineage_id} checkpoint={checkpoint_id}")]
    AlreadyExists {
        lineage_id: String,
        checkpoint_id: String,
    },

    /// The parent named by a put has not been stored
    #[error("parent checkpoint {parent_id} not stored in lineage {lineage_id}")]
    ParentNotFound {
        lineage_id: String,
        parent_id: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint or config
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),
}

impl CheckpointError {
    pub fn not_found(lineage_id: impl Into<String>, checkpoint_id: impl Into<String>) -> Self {
        Self::NotFound {
            lineage_id: lineage_id.into(),
            checkpoint_id: checkpoint_id.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
