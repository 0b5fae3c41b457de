//! Structured long-term memory the model writes to through tools.
//!
//! Facts live in a flat list with a category index beside it. Each fact
//! carries priority, confidence and version metadata; near-duplicates are
//! merged periodically by word overlap.

mod item;
mod store;

pub use item::{
    MemoryCategory, MemoryFilter, MemoryId, MemoryItem, MemoryMetadata, MemoryUpdate,
    MAX_PRIORITY,
};
pub use store::MemoryStore;

use thiserror::Error;

/// Errors from memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("Memory item {0} not found")]
    NotFound(MemoryId),

    #[error("Unknown memory category: {0}")]
    UnknownCategory(String),
}
