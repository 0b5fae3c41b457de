//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p player-core --test api_integration -- --ignored`

use player_core::config::SummaryConfig;
use player_core::{Agent, Config, MockEmulator, TurnController};
use std::sync::Arc;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

#[tokio::test]
#[ignore] // Run with: cargo test -p player-core --test api_integration -- --ignored
async fn test_single_turn_against_api() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let mut config = Config {
        summary: SummaryConfig {
            initial_summary: false,
            ..Default::default()
        },
        ..Default::default()
    };
    config.model_defaults.thinking = false;
    config.model_defaults.max_tokens = 2048;

    let client = claude::Claude::from_env().expect("Failed to create client");
    let agent = Agent::new(Arc::new(client), &config);
    let mut emulator = MockEmulator::new();
    let mut controller = TurnController::new(agent, &mut emulator);

    let exit = controller.run_turn().await;
    assert!(!exit);

    let agent = controller.into_agent();
    assert_eq!(agent.state().turn_count, 1);
    assert!(agent.transcript().archive().len() >= 2, "model call did not complete");
    assert!(agent.transcript().unanswered_tool_uses().is_empty());
}
