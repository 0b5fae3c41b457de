//! Narrative summaries of the session.
//!
//! Every few turns the archive is compressed into a short summary with a
//! separate model call. The summary replaces the previous one in
//! [`GameState`] and is shown to the model in each state snapshot.

use super::state::GameState;
use super::transcript::Transcript;
use crate::client::{log_response, ModelClient};
use crate::config::{ModelSettings, SummaryConfig};
use crate::input::BUTTON_RULES;
use claude::{ContentBlock, Message, Request, Role, Tool, ToolChoice};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Archive messages sent with each summary request.
pub const SUMMARY_HISTORY_MESSAGES: usize = 60;

const SUMMARY_INSTRUCTION: &str = "Please analyze the gameplay session and create a comprehensive summary according to the instructions in the system prompt.";

/// Produces narrative summaries from the archive.
pub struct Summarizer {
    client: Arc<dyn ModelClient>,
    settings: ModelSettings,
    initial_summary: bool,
    interval: u64,
    previous_summary: String,
    count: u64,
}

impl Summarizer {
    pub fn new(
        client: Arc<dyn ModelClient>,
        settings: ModelSettings,
        config: &SummaryConfig,
    ) -> Self {
        Self {
            client,
            settings,
            initial_summary: config.initial_summary,
            interval: config.summary_interval.max(1),
            previous_summary: String::new(),
            count: 0,
        }
    }

    /// Last successfully generated summary.
    pub fn previous_summary(&self) -> &str {
        &self.previous_summary
    }

    /// Summaries attempted so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Whether a summary should be generated on `turn`.
    pub fn is_due(&self, turn: u64) -> bool {
        (self.initial_summary && turn == 1) || (turn > 0 && turn % self.interval == 0)
    }

    /// The planning prompt on turn 1, the retrospective prompt otherwise.
    pub fn system_prompt(turn: u64) -> String {
        let head = if turn == 1 {
            include_str!("prompts/initial_summary.txt")
        } else {
            include_str!("prompts/summary.txt")
        };
        format!(
            "{head}The button rules are as follows:\n{BUTTON_RULES}{}",
            include_str!("prompts/summary_footer.txt")
        )
    }

    /// Build the summary request from the archive and current state.
    pub fn build_request(
        &self,
        transcript: &Transcript,
        state: &GameState,
        tools: Vec<Tool>,
    ) -> Request {
        let mut messages = transcript.recent_archive(SUMMARY_HISTORY_MESSAGES);

        let mut content = vec![ContentBlock::text(SUMMARY_INSTRUCTION)];
        if !self.previous_summary.is_empty() {
            content.push(ContentBlock::text(format!(
                "Here is the previous gameplay summary:\n\n{}",
                self.previous_summary
            )));
        }
        content.push(ContentBlock::text(format!(
            "Here is the current game state:\n\n{}",
            state.snapshot_summary()
        )));
        messages.push(Message::with_content(Role::User, content));

        let request = Request::new(messages)
            .with_system(Self::system_prompt(state.turn_count))
            .with_tools(tools)
            .with_tool_choice(ToolChoice::None);
        self.settings.apply(request)
    }

    /// Generate a new summary.
    ///
    /// Failures are not fatal: a short notice is returned in place of the
    /// summary and the cached previous summary is left alone.
    pub async fn generate(
        &mut self,
        transcript: &Transcript,
        state: &GameState,
        tools: Vec<Tool>,
    ) -> String {
        self.count += 1;
        info!(count = self.count, turn = state.turn_count, "generating gameplay summary");

        let request = self.build_request(transcript, state, tools);
        match self.client.complete(request).await {
            Ok(response) => {
                log_response(&response);
                if !response.tool_uses().is_empty() {
                    warn!("ignoring tool calls in summary response");
                }
                let summary = response.text();
                info!(chars = summary.len(), "summary generated");
                self.previous_summary = summary.clone();
                summary
            }
            Err(e) => {
                error!(error = %e, "summary generation failed");
                format!("Summary generation failed: {e}")
            }
        }
    }
}
