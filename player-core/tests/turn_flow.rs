//! Turn-based sessions against a scripted model and an in-memory emulator.

use claude::{ContentBlock, Message, Request, Role, ToolChoice, ToolResultContent};
use player_core::config::SummaryConfig;
use player_core::emulator::InputEvent;
use player_core::{Agent, Button, Config, MockEmulator, ScriptedModel, TurnController};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn config() -> Config {
    Config {
        summary: SummaryConfig {
            initial_summary: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

fn tool_results(message: &Message) -> Vec<(&str, bool)> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => Some((tool_use_id.as_str(), *is_error)),
            _ => None,
        })
        .collect()
}

/// Every tool result in a request answers an invocation made earlier in
/// the same request, and the request opens with a user turn.
fn assert_well_formed(request: &Request) {
    let first = &request.messages[0];
    assert_eq!(first.role, Role::User);
    assert!(!first.has_tool_results());

    let mut seen = HashSet::new();
    for message in &request.messages {
        for tool_use in message.tool_uses() {
            seen.insert(tool_use.id);
        }
        for (id, _) in tool_results(message) {
            assert!(seen.contains(id), "orphaned tool result {id}");
        }
    }
}

#[tokio::test]
async fn test_reach_the_next_town() {
    let model = Arc::new(ScriptedModel::new());
    model.push_response(vec![
        ContentBlock::text("This is Pallet Town."),
        tool_use("t1", "set_game", json!({"game": "Pokemon Red"})),
        tool_use("t2", "set_current_goal", json!({"goal": "reach the next town"})),
        tool_use(
            "t3",
            "add_to_memory",
            json!({
                "item": "Route 1 leads north out of Pallet Town",
                "category": "locations",
                "priority": 7
            }),
        ),
    ]);
    model.push_tool_call("t4", "send_inputs", json!({"inputs": "R5 U10"}));
    model.push_text("Heading north.");

    let agent = Agent::new(model.clone(), &config());
    let mut emulator = MockEmulator::new();
    let mut controller = TurnController::new(agent, &mut emulator);

    for _ in 0..3 {
        assert!(!controller.run_turn().await);
    }

    let state = controller.agent().state();
    assert_eq!(state.turn_count, 3);
    assert_eq!(state.identified_game.as_deref(), Some("Pokemon Red"));
    assert_eq!(state.current_goal.as_deref(), Some("reach the next town"));
    assert_eq!(state.memory.len(), 1);

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_well_formed(request);
    }

    // Turn 2 sees all three results from turn 1, then a fresh observation
    // that leads with the state snapshot.
    let second = &requests[1];
    assert_eq!(
        tool_results(&second.messages[2]),
        vec![("t1", false), ("t2", false), ("t3", false)]
    );
    let snapshot = second.messages[3].content[0].as_text().unwrap();
    assert!(snapshot.contains("Current goal: reach the next town"));
    assert!(snapshot.contains("[LOCATIONS]"));
    assert!(snapshot.contains("Route 1 leads north out of Pallet Town (priority: 7"));

    // The send_inputs result carries a confirmation and a screenshot.
    let third = &requests[2];
    let results = third
        .messages
        .iter()
        .rev()
        .find(|m| m.has_tool_results())
        .unwrap();
    match &results.content[0] {
        ContentBlock::ToolResult { content, .. } => {
            assert_eq!(content[0].as_text(), Some("Inputs sent successfully"));
            assert!(matches!(content[1], ToolResultContent::Image { .. }));
        }
        other => panic!("expected tool result, got {other:?}"),
    }

    drop(controller);
    assert_eq!(emulator.ticks(), 15);
    assert_eq!(
        emulator.events(),
        &[
            InputEvent::Press(Button::Right),
            InputEvent::Release(Button::Right),
            InputEvent::Press(Button::Up),
            InputEvent::Release(Button::Up),
        ]
    );
}

#[tokio::test]
async fn test_model_error_does_not_stop_the_session() {
    let model = Arc::new(ScriptedModel::new());
    model.push_error(claude::Error::Api {
        status: 529,
        message: "overloaded".into(),
    });
    model.push_tool_call("t1", "set_game", json!({"game": "Pokemon Red"}));

    let agent = Agent::new(model.clone(), &config());
    let mut emulator = MockEmulator::new();
    let mut controller = TurnController::new(agent, &mut emulator);

    assert!(!controller.run_turn().await);
    assert!(!controller.run_turn().await);
    assert!(!controller.run_turn().await);

    let agent = controller.into_agent();
    assert_eq!(agent.state().turn_count, 3);
    assert_eq!(agent.state().identified_game.as_deref(), Some("Pokemon Red"));
    assert!(agent.transcript().unanswered_tool_uses().is_empty());
    for request in model.requests() {
        assert_well_formed(&request);
    }
}

#[tokio::test]
async fn test_small_window_never_sends_orphans() {
    let model = Arc::new(ScriptedModel::new());
    for i in 0..6 {
        model.push_tool_call(format!("t{i}"), "send_inputs", json!({"inputs": "A"}));
    }

    let mut config = config();
    config.max_history_messages = 2;
    let agent = Agent::new(model.clone(), &config);
    let mut emulator = MockEmulator::new();
    let mut controller = TurnController::new(agent, &mut emulator);

    for _ in 0..6 {
        controller.run_turn().await;
    }

    let agent = controller.into_agent();
    assert_eq!(agent.transcript().window_len(), 2);
    assert_eq!(agent.transcript().archive().len(), 18);
    for request in model.requests() {
        assert_well_formed(&request);
        assert!(request.messages.len() <= 2);
    }
}

#[tokio::test]
async fn test_summaries_run_on_cadence() {
    let model = Arc::new(ScriptedModel::new());
    for text in ["a1", "Summary one", "a2", "a3", "Summary two", "a4"] {
        model.push_text(text);
    }

    let config = Config {
        summary: SummaryConfig {
            initial_summary: false,
            summary_interval: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let agent = Agent::new(model.clone(), &config);
    let mut emulator = MockEmulator::new();
    let mut controller = TurnController::new(agent, &mut emulator);

    for _ in 0..4 {
        controller.run_turn().await;
    }

    let requests = model.requests();
    assert_eq!(requests.len(), 6);
    for i in [1, 4] {
        assert!(matches!(requests[i].tool_choice, Some(ToolChoice::None)));
        assert!(requests[i]
            .system
            .as_deref()
            .unwrap()
            .contains("CRITICAL REVIEW"));
    }

    // The action call on a summary turn already sees the new summary.
    let snapshot = requests[2].messages.last().unwrap().content[0]
        .as_text()
        .unwrap();
    assert!(snapshot.ends_with("=== GAME PROGRESS SUMMARY ===\nSummary one"));

    let agent = controller.into_agent();
    assert_eq!(agent.state().summary, "Summary two");
    assert_eq!(agent.summarizer().count(), 2);
}

#[tokio::test]
async fn test_capture_failure_degrades_to_text() {
    let model = Arc::new(ScriptedModel::new());
    let agent = Agent::new(model.clone(), &config());
    let mut emulator = MockEmulator::new().failing_capture();
    let mut controller = TurnController::new(agent, &mut emulator);

    controller.run_turn().await;

    let first = &model.requests()[0].messages[0];
    assert_eq!(first.content.len(), 1);
    assert_eq!(
        first.content[0].as_text(),
        Some("Error capturing screenshot")
    );
}

#[tokio::test]
async fn test_goal_turn_appends_one_matching_result() {
    let model = Arc::new(ScriptedModel::new());
    model.push_tool_call("goal_1", "set_current_goal", json!({"goal": "reach the next town"}));

    let agent = Agent::new(model.clone(), &config());
    let mut emulator = MockEmulator::new();
    let mut controller = TurnController::new(agent, &mut emulator);
    controller.run_turn().await;

    let agent = controller.into_agent();
    assert_eq!(
        agent.state().current_goal.as_deref(),
        Some("reach the next town")
    );

    let archive = agent.transcript().archive();
    assert_eq!(archive.len(), 3);
    assert_eq!(tool_results(&archive[2]), vec![("goal_1", false)]);
    match &archive[2].content[0] {
        ContentBlock::ToolResult { content, .. } => assert_eq!(
            content[0].as_text(),
            Some("Current goal set to reach the next town")
        ),
        other => panic!("expected tool result, got {other:?}"),
    }
}
