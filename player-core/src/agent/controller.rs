//! The game-playing agent and the turn-based controller.
//!
//! [`Agent`] owns the session: state, transcript, summarizer and tools.
//! One call to [`Agent::analyze`] is one turn: snapshot, prompt, model
//! call, tool dispatch. [`TurnController`] drives turns against an
//! emulator one after another.

use super::state::GameState;
use super::summary::Summarizer;
use super::tools::{ToolContext, ToolRegistry};
use super::transcript::Transcript;
use crate::client::{log_response, ModelClient};
use crate::config::{Config, EmulationMode, ModelSettings};
use crate::emulator::{capture_content, Emulator};
use crate::input::BUTTON_RULES;
use chrono::Local;
use claude::{ContentBlock, Message, Request, Role};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors that end a turn early.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model call failed: {0}")]
    Model(#[from] claude::Error),
}

/// What the agent sees at the start of a turn.
#[derive(Debug, Clone)]
pub struct Observation {
    pub screen: ContentBlock,
    pub screen_text: Option<String>,
}

impl Observation {
    /// Capture the screen, and its text form when `with_text` is set.
    pub fn capture(emulator: &mut dyn Emulator, scale: u32, with_text: bool) -> Self {
        let screen = capture_content(emulator, scale);
        let screen_text = if with_text { emulator.screen_text() } else { None };
        Self {
            screen,
            screen_text,
        }
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    pub turn: u64,
    /// Tool invocations answered this turn.
    pub tool_calls: usize,
    /// Inputs queued for later execution.
    pub pending: Vec<String>,
    /// The emulator asked to exit while inputs ran.
    pub exit_requested: bool,
}

/// The game-playing agent.
pub struct Agent {
    client: Arc<dyn ModelClient>,
    settings: ModelSettings,
    mode: EmulationMode,
    system_prompt: String,
    screenshot_scale: u32,
    enable_wrapper: bool,
    state: GameState,
    transcript: Transcript,
    summarizer: Summarizer,
    tools: ToolRegistry,
}

impl Agent {
    /// Create an agent from resolved configuration.
    pub fn new(client: Arc<dyn ModelClient>, config: &Config) -> Self {
        Self {
            summarizer: Summarizer::new(client.clone(), config.summary_settings(), &config.summary),
            client,
            settings: config.action_settings(),
            mode: config.emulation_mode,
            system_prompt: build_system_prompt(config),
            screenshot_scale: config.screenshot_scale.max(1),
            enable_wrapper: config.enable_wrapper,
            state: GameState::new(),
            transcript: Transcript::new(config.max_history_messages),
            tools: ToolRegistry::standard(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn mode(&self) -> EmulationMode {
        self.mode
    }

    pub fn screenshot_scale(&self) -> u32 {
        self.screenshot_scale
    }

    pub fn wants_screen_text(&self) -> bool {
        self.enable_wrapper
    }

    /// Run one turn.
    ///
    /// With an emulator, `send_inputs` executes immediately. Without one,
    /// inputs are returned in [`TurnOutcome::pending`] for the caller to
    /// execute.
    pub async fn analyze(
        &mut self,
        observation: Observation,
        emulator: Option<&mut dyn Emulator>,
    ) -> Result<TurnOutcome, TurnError> {
        let turn = self.state.increment_turn();
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        info!(turn, "======= NEW TURN: {now} =======");
        self.state.log_state();

        // The turn's snapshot must include any summary produced this turn.
        if self.summarizer.is_due(turn) {
            info!(turn, "generating summary");
            let summary = self
                .summarizer
                .generate(&self.transcript, &self.state, self.tools.definitions())
                .await;
            self.state.replace_summary(summary);
        }

        let user_message = self.user_message(turn, &now, observation);
        self.transcript.append(user_message);

        let request = Request::new(self.transcript.request_messages())
            .with_system(&self.system_prompt)
            .with_tools(self.tools.definitions());
        let response = self.client.complete(self.settings.apply(request)).await?;
        log_response(&response);

        if !response.content.is_empty() {
            self.transcript
                .append(Message::with_content(Role::Assistant, response.content.clone()));
        }

        let tool_uses = response.tool_uses();
        let mut ctx = match emulator {
            Some(emulator) => ToolContext::immediate(&mut self.state, emulator),
            None => ToolContext::deferred(&mut self.state),
        }
        .with_screenshot_scale(self.screenshot_scale);
        let results = self.tools.dispatch_all(&mut ctx, &tool_uses);
        let pending = std::mem::take(&mut ctx.pending);
        let exit_requested = ctx.exit_requested;
        drop(ctx);

        if !results.is_empty() {
            self.transcript
                .append(Message::with_content(Role::User, results));
        }
        self.transcript.trim();

        Ok(TurnOutcome {
            turn,
            tool_calls: tool_uses.len(),
            pending,
            exit_requested,
        })
    }

    /// Answer any unanswered tool calls at the end of the transcript with
    /// error results. Returns how many were answered.
    pub fn repair_unanswered(&mut self, reason: &str) -> usize {
        self.transcript.repair_unanswered(reason)
    }

    fn user_message(&self, turn: u64, now: &str, observation: Observation) -> Message {
        let mut content = Vec::new();
        if !self.transcript.archive().is_empty() {
            content.push(ContentBlock::text(self.state.snapshot_summary()));
        }
        if self.mode == EmulationMode::Continuous {
            content.push(ContentBlock::text(format!(
                "Current time: {now}\nTurn #{turn}"
            )));
        }
        content.push(observation.screen);
        if let Some(text) = observation.screen_text.filter(|_| self.enable_wrapper) {
            content.push(ContentBlock::text(format!(
                "A textual representation of the current screen is:\n{text}"
            )));
        }
        Message::with_content(Role::User, content)
    }
}

/// System prompt: agent role, button notation, mode guidance and custom
/// instructions.
pub fn build_system_prompt(config: &Config) -> String {
    let mode_info = match config.emulation_mode {
        EmulationMode::Continuous => include_str!("prompts/continuous.txt").replace(
            "{interval}",
            &config.continuous_analysis_interval.to_string(),
        ),
        EmulationMode::TurnBased => String::new(),
    };

    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/system.txt"));
    prompt.push_str("\n<notation>\n");
    prompt.push_str(BUTTON_RULES);
    prompt.push_str("</notation>\n\n");
    if !mode_info.is_empty() {
        prompt.push_str(&mode_info);
        prompt.push('\n');
    }
    prompt.push_str("<custom_instructions>\n");
    prompt.push_str(config.custom_instructions.trim());
    prompt.push_str("\n</custom_instructions>\n\n");
    prompt.push_str("Always use the tools provided to you to interact with the game.\n");
    prompt
}

// ============================================================================
// Turn-based controller
// ============================================================================

/// Runs turns back to back. The emulator only advances while inputs
/// from a turn execute, plus one tick between turns.
pub struct TurnController<'e> {
    agent: Agent,
    emulator: &'e mut dyn Emulator,
    shutdown: Arc<AtomicBool>,
}

impl<'e> TurnController<'e> {
    pub fn new(agent: Agent, emulator: &'e mut dyn Emulator) -> Self {
        Self {
            agent,
            emulator,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop at the next turn boundary once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn into_agent(self) -> Agent {
        self.agent
    }

    /// Run a single turn. Errors are logged and the transcript repaired;
    /// the turn loop always continues.
    ///
    /// Returns true if the emulator asked to exit.
    pub async fn run_turn(&mut self) -> bool {
        let observation = Observation::capture(
            &mut *self.emulator,
            self.agent.screenshot_scale(),
            self.agent.wants_screen_text(),
        );

        let exit = match self
            .agent
            .analyze(observation, Some(&mut *self.emulator))
            .await
        {
            Ok(outcome) => {
                info!(
                    turn = outcome.turn,
                    tool_calls = outcome.tool_calls,
                    "turn complete"
                );
                outcome.exit_requested
            }
            Err(e) => {
                error!(error = %e, "turn failed");
                self.agent.repair_unanswered(&e.to_string());
                false
            }
        };

        info!(
            "======= END TURN: {} =======",
            Local::now().format(TIMESTAMP_FORMAT)
        );
        exit
    }

    /// Tick, then take a turn, until the emulator exits or shutdown is
    /// requested.
    pub async fn run(&mut self) {
        info!("starting turn-based mode");
        while !self.shutdown.load(Ordering::SeqCst) {
            if self.emulator.tick() {
                break;
            }
            if self.run_turn().await {
                info!("emulator requested exit");
                break;
            }
        }
    }
}
