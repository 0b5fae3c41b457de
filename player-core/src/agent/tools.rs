//! Tools the model uses to play and to manage its memory.
//!
//! The registry maps each tool name to a handler function. Handlers get a
//! [`ToolContext`] with the session state and, when inputs may run
//! immediately, the emulator.

use super::memory::{
    MemoryCategory, MemoryError, MemoryFilter, MemoryId, MemoryItem, MemoryMetadata, MemoryUpdate,
    MAX_PRIORITY,
};
use super::state::GameState;
use crate::emulator::{capture_tool_content, Emulator};
use crate::input::{self, InputError};
use claude::{ContentBlock, Tool, ToolResultContent, ToolUse};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use thiserror::Error;
use tracing::{error, info};

/// Errors raised by tool handlers. Always reported back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Input(#[from] InputError),
}

/// Whether `send_inputs` may drive the emulator right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Immediate,
    /// Inputs are queued for the foreground loop.
    Deferred,
}

/// Everything a handler may touch during one dispatch.
pub struct ToolContext<'a> {
    pub state: &'a mut GameState,
    pub emulator: Option<&'a mut dyn Emulator>,
    pub execution: Execution,
    pub screenshot_scale: u32,
    /// Raw input strings queued in deferred mode.
    pub pending: Vec<String>,
    /// Set when executed inputs made the emulator ask to exit.
    pub exit_requested: bool,
}

impl<'a> ToolContext<'a> {
    /// Context that executes inputs on `emulator`.
    pub fn immediate(state: &'a mut GameState, emulator: &'a mut dyn Emulator) -> Self {
        Self {
            state,
            emulator: Some(emulator),
            execution: Execution::Immediate,
            screenshot_scale: 1,
            pending: Vec::new(),
            exit_requested: false,
        }
    }

    /// Context that queues inputs instead of executing them.
    pub fn deferred(state: &'a mut GameState) -> Self {
        Self {
            state,
            emulator: None,
            execution: Execution::Deferred,
            screenshot_scale: 1,
            pending: Vec::new(),
            exit_requested: false,
        }
    }

    pub fn with_screenshot_scale(mut self, scale: u32) -> Self {
        self.screenshot_scale = scale.max(1);
        self
    }
}

/// A tool handler.
pub type ToolHandler =
    fn(&mut ToolContext<'_>, &Value) -> Result<Vec<ToolResultContent>, ToolError>;

/// Tool definitions plus their handlers, keyed by name.
pub struct ToolRegistry {
    definitions: Vec<Tool>,
    handlers: HashMap<String, ToolHandler>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ToolRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            definitions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Registry with every game and memory tool.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(send_inputs_tool(), handle_send_inputs);
        registry.register(set_game_tool(), handle_set_game);
        registry.register(set_current_goal_tool(), handle_set_current_goal);
        registry.register(add_to_memory_tool(), handle_add_to_memory);
        registry.register(remove_from_memory_tool(), handle_remove_from_memory);
        registry.register(update_memory_item_tool(), handle_update_memory_item);
        registry.register(search_memory_tool(), handle_search_memory);
        registry
    }

    /// Register a tool, replacing any previous one with the same name.
    pub fn register(&mut self, definition: Tool, handler: ToolHandler) {
        self.definitions.retain(|d| d.name != definition.name);
        self.handlers.insert(definition.name.clone(), handler);
        self.definitions.push(definition);
    }

    /// Tool definitions for a request.
    pub fn definitions(&self) -> Vec<Tool> {
        self.definitions.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run one invocation and wrap the outcome as a tool result.
    ///
    /// Never fails: unknown tools and handler errors become error results.
    pub fn dispatch(&self, ctx: &mut ToolContext<'_>, tool_use: &ToolUse) -> ContentBlock {
        info!(tool = %tool_use.name, input = %tool_use.input, "executing tool");
        let outcome = match self.handlers.get(&tool_use.name) {
            Some(handler) => handler(ctx, &tool_use.input),
            None => Err(ToolError::UnknownTool(tool_use.name.clone())),
        };

        match outcome {
            Ok(content) => ContentBlock::ToolResult {
                tool_use_id: tool_use.id.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                error!(tool = %tool_use.name, error = %e, "tool failed");
                ContentBlock::ToolResult {
                    tool_use_id: tool_use.id.clone(),
                    content: vec![ToolResultContent::text(format!("Error: {e}"))],
                    is_error: true,
                }
            }
        }
    }

    /// Run every invocation in order. One result per invocation.
    pub fn dispatch_all(
        &self,
        ctx: &mut ToolContext<'_>,
        tool_uses: &[ToolUse],
    ) -> Vec<ContentBlock> {
        tool_uses
            .iter()
            .map(|tool_use| self.dispatch(ctx, tool_use))
            .collect()
    }
}

// ============================================================================
// Definitions
// ============================================================================

fn send_inputs_tool() -> Tool {
    Tool {
        name: "send_inputs".to_string(),
        description: "Send a sequence of button inputs to the game emulator. Please follow the notation rules.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "inputs": {
                    "type": "string",
                    "description": "Sequence of inputs, e.g., 'R5 U2 A2'"
                }
            },
            "required": ["inputs"]
        }),
    }
}

fn set_game_tool() -> Tool {
    Tool {
        name: "set_game".to_string(),
        description: "Set the identified game. Use this tool when you have determined what game is being played based on the frames provided.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "game": {
                    "type": "string",
                    "description": "Name of the game"
                }
            },
            "required": ["game"]
        }),
    }
}

fn set_current_goal_tool() -> Tool {
    Tool {
        name: "set_current_goal".to_string(),
        description: "Set the current goal in the game. Use this tool to update your objective as you progress through the game, such as 'reach the next level' or 'defeat the boss'.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "Current goal"
                }
            },
            "required": ["goal"]
        }),
    }
}

fn add_to_memory_tool() -> Tool {
    Tool {
        name: "add_to_memory".to_string(),
        description: format!(
            "Add a new item to memory with optional category and metadata. Categories help organize information about game state, items, NPCs, locations, etc. Available categories: {}.",
            MemoryCategory::names().join(", ")
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "item": {
                    "type": "string",
                    "description": "Information to remember"
                },
                "category": {
                    "type": "string",
                    "enum": MemoryCategory::names(),
                    "description": "Category for organizing memory"
                },
                "priority": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": MAX_PRIORITY,
                    "description": "Priority level (0-10, higher is more important)"
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "description": "Confidence in the information (0.0-1.0)"
                },
                "context": {
                    "type": "object",
                    "description": "Additional context about when/where this information was obtained"
                }
            },
            "required": ["item"]
        }),
    }
}

fn remove_from_memory_tool() -> Tool {
    Tool {
        name: "remove_from_memory".to_string(),
        description: "Remove an item from memory by its ID. Use this when information is no longer relevant or is incorrect.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "memory_id": {
                    "type": "integer",
                    "description": "ID of the memory item to remove"
                }
            },
            "required": ["memory_id"]
        }),
    }
}

fn update_memory_item_tool() -> Tool {
    Tool {
        name: "update_memory_item".to_string(),
        description: "Update an existing memory item by its ID. Can update the content, category, and metadata.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "memory_id": {
                    "type": "integer",
                    "description": "ID of the memory item to update"
                },
                "new_item": {
                    "type": "string",
                    "description": "Updated information"
                },
                "category": {
                    "type": "string",
                    "enum": MemoryCategory::names(),
                    "description": "New category (optional)"
                },
                "priority": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": MAX_PRIORITY,
                    "description": "New priority level (0-10)"
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "description": "New confidence value (0.0-1.0)"
                },
                "context": {
                    "type": "object",
                    "description": "Additional context to merge with existing context"
                }
            },
            "required": ["memory_id", "new_item"]
        }),
    }
}

fn search_memory_tool() -> Tool {
    Tool {
        name: "search_memory".to_string(),
        description: "Search memory items by text and optional filters.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to search for in memory items"
                },
                "category": {
                    "type": "string",
                    "enum": MemoryCategory::names(),
                    "description": "Optional category to search within"
                },
                "min_priority": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": MAX_PRIORITY,
                    "description": "Minimum priority level"
                },
                "min_confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "description": "Minimum confidence level"
                }
            },
            "required": ["query"]
        }),
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn handle_send_inputs(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let raw = required_str(input, "inputs")?;
    let actions = input::parse(raw)?;

    match ctx.execution {
        Execution::Deferred => {
            info!(inputs = raw, "queueing inputs");
            ctx.pending.push(raw.to_string());
            Ok(vec![ToolResultContent::text("Input queued for execution")])
        }
        Execution::Immediate => {
            if ctx.exit_requested {
                return Err(ToolError::Execution(
                    "Emulator is exiting, inputs not sent".into(),
                ));
            }
            let scale = ctx.screenshot_scale;
            let emulator = ctx
                .emulator
                .as_deref_mut()
                .ok_or_else(|| ToolError::Execution("no emulator attached".into()))?;
            info!(inputs = raw, frames = input::total_frames(&actions), "executing inputs");
            if input::execute(emulator, &actions) {
                ctx.exit_requested = true;
            }
            let screenshot = capture_tool_content(emulator, scale);
            Ok(vec![
                ToolResultContent::text("Inputs sent successfully"),
                screenshot,
            ])
        }
    }
}

fn handle_set_game(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let game = required_str(input, "game")?;
    ctx.state.identified_game = Some(game.to_string());
    info!(game, "game set");
    Ok(vec![ToolResultContent::text(format!("Game set to {game}"))])
}

fn handle_set_current_goal(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let goal = required_str(input, "goal")?;
    ctx.state.current_goal = Some(goal.to_string());
    info!(goal, "goal set");
    Ok(vec![ToolResultContent::text(format!(
        "Current goal set to {goal}"
    ))])
}

fn handle_add_to_memory(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let text = required_str(input, "item")?;
    let category = optional_category(input)?;

    let mut metadata = MemoryMetadata::default();
    if let Some(priority) = optional_priority(input, "priority")? {
        metadata.priority = priority;
    }
    if let Some(confidence) = optional_f64(input, "confidence")? {
        metadata.confidence = confidence;
    }
    if let Some(context) = optional_context(input)? {
        metadata.context = context;
    }

    let item = ctx.state.memory.add(text, category, metadata);

    let mut response = String::from("Added to memory");
    if let Some(category) = item.category {
        let _ = write!(response, " [{category}]");
    }
    let _ = write!(response, " (id: {})", item.id);
    if item.priority > 0 {
        let _ = write!(response, ", priority: {}", item.priority);
    }
    if item.confidence < 1.0 {
        let _ = write!(response, ", confidence: {:.1}", item.confidence);
    }
    Ok(vec![ToolResultContent::text(response)])
}

fn handle_remove_from_memory(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let id = required_id(input)?;
    let removed = ctx.state.memory.remove(id)?;

    let mut response = format!("Removed memory item {id}");
    if let Some(category) = removed.category {
        let _ = write!(response, " from category [{category}]");
    }
    Ok(vec![ToolResultContent::text(response)])
}

fn handle_update_memory_item(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let id = required_id(input)?;
    let update = MemoryUpdate {
        text: Some(required_str(input, "new_item")?.to_string()),
        category: optional_category(input)?,
        priority: optional_priority(input, "priority")?,
        confidence: optional_f64(input, "confidence")?,
        context: optional_context(input)?,
        ..Default::default()
    };

    let item = ctx.state.memory.update(id, update)?;

    let mut response = format!("Updated memory item {id}");
    if let Some(category) = item.category {
        let _ = write!(response, " [{category}]");
    }
    let _ = write!(response, " (version: {})", item.version);
    Ok(vec![ToolResultContent::text(response)])
}

fn handle_search_memory(
    ctx: &mut ToolContext<'_>,
    input: &Value,
) -> Result<Vec<ToolResultContent>, ToolError> {
    let query = required_str(input, "query")?;
    let category = optional_category(input)?;
    let filter = MemoryFilter {
        min_priority: optional_priority(input, "min_priority")?,
        min_confidence: optional_f64(input, "min_confidence")?,
        source: None,
    };

    let results = ctx.state.memory.search(query, category, &filter);
    if results.is_empty() {
        return Ok(vec![ToolResultContent::text("No matching memory items found")]);
    }

    let mut response = String::from("Found matching memory items:\n");
    for item in results {
        response.push_str(&format_search_hit(item));
    }
    Ok(vec![ToolResultContent::text(response)])
}

fn format_search_hit(item: &MemoryItem) -> String {
    let mut line = format!("[{}] ", item.id);
    if let Some(category) = item.category {
        let _ = write!(line, "[{category}] ");
    }
    line.push_str(&item.text);
    if item.has_custom_scores() {
        let _ = write!(
            line,
            " (priority: {}, confidence: {:.1})",
            item.priority, item.confidence
        );
    }
    line.push('\n');
    line
}

// ============================================================================
// Argument helpers
// ============================================================================

fn required_str<'v>(input: &'v Value, key: &str) -> Result<&'v str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string field '{key}'")))
}

fn present<'v>(input: &'v Value, key: &str) -> Option<&'v Value> {
    input.get(key).filter(|v| !v.is_null())
}

fn required_id(input: &Value) -> Result<MemoryId, ToolError> {
    let value = input
        .get("memory_id")
        .ok_or_else(|| ToolError::InvalidArguments("missing field 'memory_id'".into()))?;
    // Models sometimes send ids as strings.
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .map(MemoryId)
        .ok_or_else(|| ToolError::InvalidArguments(format!("invalid memory_id: {value}")))
}

fn optional_category(input: &Value) -> Result<Option<MemoryCategory>, ToolError> {
    match present(input, "category").map(|v| v.as_str()) {
        None => Ok(None),
        Some(Some(name)) if name.trim().is_empty() => Ok(None),
        Some(Some(name)) => Ok(Some(name.parse()?)),
        Some(None) => Err(ToolError::InvalidArguments(
            "category must be a string".into(),
        )),
    }
}

fn optional_priority(input: &Value, key: &str) -> Result<Option<u8>, ToolError> {
    match present(input, key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|p| Some(p.min(MAX_PRIORITY as u64) as u8))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("{key} must be a non-negative integer"))
            }),
    }
}

fn optional_f64(input: &Value, key: &str) -> Result<Option<f64>, ToolError> {
    match present(input, key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArguments(format!("{key} must be a number"))),
    }
}

fn optional_context(input: &Value) -> Result<Option<BTreeMap<String, Value>>, ToolError> {
    match present(input, "context") {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(to_btree(map))),
        Some(_) => Err(ToolError::InvalidArguments(
            "context must be an object".into(),
        )),
    }
}

fn to_btree(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{Button, InputEvent};
    use crate::testing::MockEmulator;

    fn call(name: &str, input: Value) -> ToolUse {
        ToolUse {
            id: format!("toolu_{name}"),
            name: name.to_string(),
            input,
        }
    }

    fn result_text(block: &ContentBlock) -> (String, bool) {
        match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => (
                content
                    .iter()
                    .filter_map(ToolResultContent::as_text)
                    .collect::<Vec<_>>()
                    .join(""),
                *is_error,
            ),
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[test]
    fn test_all_tools_have_valid_schemas() {
        let registry = ToolRegistry::standard();
        let tools = registry.definitions();
        assert_eq!(tools.len(), 7);
        for tool in tools {
            assert!(!tool.description.is_empty());
            assert_eq!(tool.input_schema["type"], "object");
            assert!(tool.input_schema["required"].is_array());
            assert!(registry.contains(&tool.name));
        }
    }

    #[test]
    fn test_set_game_and_goal() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut ctx = ToolContext::deferred(&mut state);

        let results = registry.dispatch_all(
            &mut ctx,
            &[
                call("set_game", json!({"game": "Pokemon Red"})),
                call("set_current_goal", json!({"goal": "reach the next town"})),
            ],
        );

        assert_eq!(result_text(&results[0]), ("Game set to Pokemon Red".into(), false));
        assert_eq!(
            result_text(&results[1]),
            ("Current goal set to reach the next town".into(), false)
        );
        assert_eq!(state.identified_game.as_deref(), Some("Pokemon Red"));
        assert_eq!(state.current_goal.as_deref(), Some("reach the next town"));
    }

    #[test]
    fn test_unknown_tool_and_failure_do_not_block_batch() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut ctx = ToolContext::deferred(&mut state);

        let calls = [
            call("fly_away", json!({})),
            call("set_game", json!({})),
            call("set_game", json!({"game": "Tetris"})),
        ];
        let results = registry.dispatch_all(&mut ctx, &calls);

        assert_eq!(results.len(), 3);
        assert_eq!(result_text(&results[0]), ("Error: Unknown tool: fly_away".into(), true));
        assert!(result_text(&results[1]).1);
        assert_eq!(result_text(&results[2]), ("Game set to Tetris".into(), false));
        for (call, result) in calls.iter().zip(&results) {
            match result {
                ContentBlock::ToolResult { tool_use_id, .. } => assert_eq!(tool_use_id, &call.id),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_memory_tools() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut ctx = ToolContext::deferred(&mut state);

        let added = registry.dispatch(
            &mut ctx,
            &call(
                "add_to_memory",
                json!({
                    "item": "Brock uses rock types",
                    "category": "npcs",
                    "priority": 4,
                    "confidence": 0.9
                }),
            ),
        );
        assert_eq!(
            result_text(&added).0,
            "Added to memory [npcs] (id: 1), priority: 4, confidence: 0.9"
        );

        let updated = registry.dispatch(
            &mut ctx,
            &call(
                "update_memory_item",
                json!({"memory_id": 1, "new_item": "Brock uses Onix", "category": "npcs"}),
            ),
        );
        assert_eq!(result_text(&updated).0, "Updated memory item 1 [npcs] (version: 2)");

        let found = registry.dispatch(&mut ctx, &call("search_memory", json!({"query": "onix"})));
        assert_eq!(
            result_text(&found).0,
            "Found matching memory items:\n[1] [npcs] Brock uses Onix (priority: 4, confidence: 0.9)\n"
        );

        let missing =
            registry.dispatch(&mut ctx, &call("search_memory", json!({"query": "misty"})));
        assert_eq!(result_text(&missing).0, "No matching memory items found");

        let remove = call("remove_from_memory", json!({"memory_id": 1}));
        let removed = registry.dispatch(&mut ctx, &remove);
        assert_eq!(
            result_text(&removed).0,
            "Removed memory item 1 from category [npcs]"
        );

        let again = registry.dispatch(&mut ctx, &remove);
        assert_eq!(
            result_text(&again),
            ("Error: Memory item 1 not found".into(), true)
        );
    }

    #[test]
    fn test_unknown_category_is_error() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut ctx = ToolContext::deferred(&mut state);

        let result = registry.dispatch(
            &mut ctx,
            &call("add_to_memory", json!({"item": "x", "category": "weapons"})),
        );
        assert_eq!(result_text(&result), ("Error: Unknown memory category: weapons".into(), true));
        assert!(state.memory.is_empty());
    }

    #[test]
    fn test_send_inputs_immediate() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut emulator = MockEmulator::new();
        let mut ctx = ToolContext::immediate(&mut state, &mut emulator);

        let result = registry.dispatch(&mut ctx, &call("send_inputs", json!({"inputs": "A2"})));
        assert!(!ctx.exit_requested);
        drop(ctx);

        match &result {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(!is_error);
                assert_eq!(content[0].as_text(), Some("Inputs sent successfully"));
                assert!(matches!(content[1], ToolResultContent::Image { .. }));
            }
            _ => unreachable!(),
        }
        assert_eq!(emulator.ticks(), 2);
        assert_eq!(emulator.events()[0], InputEvent::Press(Button::A));
    }

    #[test]
    fn test_send_inputs_after_exit_is_refused() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut emulator = MockEmulator::new().exit_after(2);
        let mut ctx = ToolContext::immediate(&mut state, &mut emulator);

        let calls = [
            call("send_inputs", json!({"inputs": "A2"})),
            call("send_inputs", json!({"inputs": "B3"})),
        ];
        let results = registry.dispatch_all(&mut ctx, &calls);
        assert!(ctx.exit_requested);
        drop(ctx);

        assert!(!result_text(&results[0]).1);
        assert_eq!(
            result_text(&results[1]),
            ("Error: Emulator is exiting, inputs not sent".into(), true)
        );
        assert_eq!(emulator.ticks(), 2);
        assert_eq!(
            emulator.events(),
            &[InputEvent::Press(Button::A), InputEvent::Release(Button::A)]
        );
    }

    #[test]
    fn test_send_inputs_deferred_queues_raw_string() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut ctx = ToolContext::deferred(&mut state);

        let queued = registry.dispatch(&mut ctx, &call("send_inputs", json!({"inputs": "U3 A"})));
        assert_eq!(result_text(&queued), ("Input queued for execution".into(), false));

        let rejected = registry.dispatch(&mut ctx, &call("send_inputs", json!({"inputs": "Q1"})));
        assert!(result_text(&rejected).1);

        assert_eq!(ctx.pending, vec!["U3 A".to_string()]);
    }

    #[test]
    fn test_send_inputs_capture_failure_degrades() {
        let registry = ToolRegistry::standard();
        let mut state = GameState::new();
        let mut emulator = MockEmulator::new().failing_capture();
        let mut ctx = ToolContext::immediate(&mut state, &mut emulator);

        let result = registry.dispatch(&mut ctx, &call("send_inputs", json!({"inputs": "B"})));
        assert_eq!(
            result_text(&result),
            ("Inputs sent successfullyError capturing screenshot".into(), false)
        );
    }
}
