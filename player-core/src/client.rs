//! Model client seam.
//!
//! The agent talks to the model through [`ModelClient`] so tests can swap
//! in a scripted double for the real API client.

use crate::config::ModelSettings;
use async_trait::async_trait;
use claude::{Claude, ContentBlock, Request, Response, TOKEN_EFFICIENT_TOOLS_BETA};
use tracing::{debug, info};

/// Something that can complete a model request.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error>;
}

#[async_trait]
impl ModelClient for Claude {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        Claude::complete(self, request).await
    }
}

impl ModelSettings {
    /// Apply model, token limits, thinking and beta flags to a request.
    pub fn apply(&self, request: Request) -> Request {
        let mut request = request
            .with_model(&self.model)
            .with_max_tokens(self.max_tokens);
        if self.thinking {
            request = request.with_thinking(self.thinking_budget);
        }
        if self.efficient_tools {
            request = request.with_beta(TOKEN_EFFICIENT_TOOLS_BETA);
        }
        request
    }
}

const SAMPLE_CHARS: usize = 200;

fn sample(text: &str) -> String {
    if text.chars().count() <= SAMPLE_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(SAMPLE_CHARS).collect();
        format!("{head}...")
    }
}

/// Log the block structure of a response.
pub fn log_response(response: &Response) {
    let kinds: Vec<&str> = response.content.iter().map(ContentBlock::kind).collect();
    debug!(
        stop_reason = ?response.stop_reason,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        blocks = ?kinds,
        "model response"
    );

    for block in &response.content {
        match block {
            ContentBlock::Thinking { thinking, .. } => {
                info!(thinking = %sample(thinking), "model thinking");
            }
            ContentBlock::RedactedThinking { .. } => {
                info!("model thinking redacted");
            }
            ContentBlock::Text { text } => {
                info!(text = %sample(text), "model text");
            }
            ContentBlock::ToolUse { name, input, .. } => {
                info!(tool = %name, input = %input, "model tool call");
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude::Message;

    #[test]
    fn test_apply_settings() {
        let settings = ModelSettings {
            model: "test-model".into(),
            thinking: true,
            efficient_tools: true,
            max_tokens: 2000,
            thinking_budget: 1000,
        };
        let request = settings.apply(Request::new(vec![Message::user("hi")]));

        assert_eq!(request.model.as_deref(), Some("test-model"));
        assert_eq!(request.max_tokens, 2000);
        assert_eq!(request.thinking.map(|t| t.budget_tokens), Some(1000));
        assert_eq!(request.betas, vec![TOKEN_EFFICIENT_TOOLS_BETA.to_string()]);
    }

    #[test]
    fn test_apply_without_thinking() {
        let settings = ModelSettings {
            thinking: false,
            efficient_tools: false,
            ..ModelSettings::default()
        };
        let request = settings.apply(Request::new(Vec::new()));

        assert!(request.thinking.is_none());
        assert!(request.betas.is_empty());
    }

    #[test]
    fn test_sample_truncates() {
        let long = "x".repeat(500);
        assert_eq!(sample(&long).len(), SAMPLE_CHARS + 3);
        assert_eq!(sample("short"), "short");
    }
}
