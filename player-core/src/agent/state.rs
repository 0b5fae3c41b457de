//! Per-session game state.

use super::memory::MemoryStore;
use tracing::info;

/// Heading placed above the narrative summary in the state snapshot.
pub const SUMMARY_HEADING: &str = "=== GAME PROGRESS SUMMARY ===";

/// What the agent knows about the running session.
#[derive(Debug, Clone, Default)]
pub struct GameState {
    /// Incremented once per analysis cycle.
    pub turn_count: u64,
    pub identified_game: Option<String>,
    pub current_goal: Option<String>,
    /// Latest narrative summary. Replaced wholesale.
    pub summary: String,
    pub memory: MemoryStore,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_turn(&mut self) -> u64 {
        self.turn_count += 1;
        self.turn_count
    }

    pub fn replace_summary(&mut self, summary: impl Into<String>) {
        self.summary = summary.into();
    }

    /// Game, goal, memory and the latest summary as prompt text.
    pub fn snapshot_summary(&self) -> String {
        let mut snapshot = format!(
            "Current game: {}\nCurrent goal: {}\n{}",
            self.identified_game.as_deref().unwrap_or("Not identified"),
            self.current_goal.as_deref().unwrap_or("Not set"),
            self.memory.format_for_prompt()
        );
        if !self.summary.is_empty() {
            snapshot.push_str("\n\n");
            snapshot.push_str(SUMMARY_HEADING);
            snapshot.push('\n');
            snapshot.push_str(&self.summary);
        }
        snapshot
    }

    /// Dump the state to the log.
    pub fn log_state(&self) {
        info!(
            game = self.identified_game.as_deref().unwrap_or("Not identified"),
            goal = self.current_goal.as_deref().unwrap_or("Not set"),
            turn = self.turn_count,
            memory_items = self.memory.len(),
            "game state"
        );
        if !self.summary.is_empty() {
            info!(summary = %self.summary, "current summary");
        }
        for item in self.memory.items() {
            let category = item.category.map(|c| c.name()).unwrap_or("none");
            info!(id = %item.id, category, text = %item.text, "memory item");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::memory::{MemoryCategory, MemoryMetadata};

    #[test]
    fn test_empty_snapshot() {
        let state = GameState::new();
        assert_eq!(
            state.snapshot_summary(),
            "Current game: Not identified\nCurrent goal: Not set\n"
        );
    }

    #[test]
    fn test_snapshot_with_memory_and_summary() {
        let mut state = GameState::new();
        state.identified_game = Some("Pokemon Red".into());
        state.current_goal = Some("reach the next town".into());
        state
            .memory
            .add("Potion", Some(MemoryCategory::Items), MemoryMetadata::default());
        state.replace_summary("Left the house.");

        let snapshot = state.snapshot_summary();
        assert!(snapshot.starts_with(
            "Current game: Pokemon Red\nCurrent goal: reach the next town\nMemory:\n"
        ));
        assert!(snapshot.contains("[1] Potion"));
        assert!(snapshot.ends_with("\n\n=== GAME PROGRESS SUMMARY ===\nLeft the house."));
    }

    #[test]
    fn test_replace_summary_does_not_merge() {
        let mut state = GameState::new();
        state.replace_summary("first");
        state.replace_summary("second");
        assert_eq!(state.summary, "second");
        assert_eq!(state.increment_turn(), 1);
    }
}
