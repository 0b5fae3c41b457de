//! The game-playing agent.
//!
//! Contains the agent and turn controller, the tool surface the model
//! acts through, and the memory, transcript and summary machinery that
//! carry a session across turns.

mod controller;
pub mod memory;
mod state;
mod summary;
mod tools;
mod transcript;

pub use controller::{
    build_system_prompt, Agent, Observation, TurnController, TurnError, TurnOutcome,
};
pub use memory::{MemoryCategory, MemoryError, MemoryId, MemoryItem, MemoryStore};
pub use state::{GameState, SUMMARY_HEADING};
pub use summary::{Summarizer, SUMMARY_HISTORY_MESSAGES};
pub use tools::{Execution, ToolContext, ToolError, ToolHandler, ToolRegistry};
pub use transcript::Transcript;
