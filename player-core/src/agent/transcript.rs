//! Conversation history.
//!
//! Every message goes into two places: a bounded rolling window that is
//! sent to the model each turn, and an unbounded archive that feeds the
//! summarizer. Eviction from the window never touches the archive.

use claude::{ContentBlock, Message, Role, ToolResultContent, ToolUse};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Rolling window plus archive.
#[derive(Debug, Clone)]
pub struct Transcript {
    window: VecDeque<Message>,
    archive: Vec<Message>,
    max_window: usize,
}

impl Transcript {
    /// Create a transcript whose window holds at most `max_window` messages.
    pub fn new(max_window: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(max_window + 1),
            archive: Vec::new(),
            max_window: max_window.max(1),
        }
    }

    /// Append to both the window and the archive, evicting the oldest
    /// window entries past the cap.
    pub fn append(&mut self, message: Message) {
        self.archive.push(message.clone());
        self.window.push_back(message);
        self.trim();
    }

    /// Evict from the front of the window until it fits the cap.
    pub fn trim(&mut self) {
        while self.window.len() > self.max_window {
            self.window.pop_front();
        }
    }

    pub fn max_window(&self) -> usize {
        self.max_window
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window(&self) -> impl Iterator<Item = &Message> {
        self.window.iter()
    }

    pub fn archive(&self) -> &[Message] {
        &self.archive
    }

    /// Most recent message ever appended.
    pub fn last(&self) -> Option<&Message> {
        self.archive.last()
    }

    /// Messages for a model request, built from the window.
    ///
    /// Leading messages that cannot start a conversation are skipped: an
    /// assistant message, or tool results whose invocation was evicted.
    pub fn request_messages(&self) -> Vec<Message> {
        let start = self
            .window
            .iter()
            .position(starts_conversation)
            .unwrap_or(self.window.len());
        self.window.iter().skip(start).cloned().collect()
    }

    /// The last `count` archive messages, with the same leading-orphan rule
    /// as [`Transcript::request_messages`].
    pub fn recent_archive(&self, count: usize) -> Vec<Message> {
        let tail = &self.archive[self.archive.len().saturating_sub(count)..];
        let start = tail
            .iter()
            .position(starts_conversation)
            .unwrap_or(tail.len());
        tail[start..].to_vec()
    }

    /// Tool invocations in the last message that have no result yet.
    pub fn unanswered_tool_uses(&self) -> Vec<ToolUse> {
        match self.last() {
            Some(message) if message.role == Role::Assistant => message.tool_uses(),
            _ => Vec::new(),
        }
    }

    /// Answer every unanswered invocation with an error result.
    ///
    /// Returns how many results were synthesized.
    pub fn repair_unanswered(&mut self, reason: &str) -> usize {
        let pending = self.unanswered_tool_uses();
        if pending.is_empty() {
            return 0;
        }

        warn!(count = pending.len(), reason, "answering unanswered tool calls with errors");
        let results = pending
            .into_iter()
            .map(|tool_use| ContentBlock::ToolResult {
                tool_use_id: tool_use.id,
                content: vec![ToolResultContent::text(format!("Error: {reason}"))],
                is_error: true,
            })
            .collect::<Vec<_>>();
        let count = results.len();
        self.append(Message::with_content(Role::User, results));
        debug!(window = self.window.len(), archive = self.archive.len(), "transcript repaired");
        count
    }
}

fn starts_conversation(message: &Message) -> bool {
    message.role == Role::User && !message.has_tool_results()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_call(id: &str) -> Message {
        Message::with_content(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: "set_game".to_string(),
                input: json!({"game": "Tetris"}),
            }],
        )
    }

    fn tool_result(id: &str) -> Message {
        Message::with_content(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: id.to_string(),
                content: vec![ToolResultContent::text("ok")],
                is_error: false,
            }],
        )
    }

    #[test]
    fn test_window_cap_and_archive_growth() {
        let mut transcript = Transcript::new(4);
        for i in 0..25 {
            transcript.append(Message::user(format!("message {i}")));
            assert!(transcript.window_len() <= 4);
        }

        assert_eq!(transcript.archive().len(), 25);
        assert_eq!(transcript.window_len(), 4);
        let first = transcript.window().next().unwrap();
        assert_eq!(first.content[0].as_text(), Some("message 21"));
    }

    #[test]
    fn test_request_skips_leading_orphans() {
        let mut transcript = Transcript::new(4);
        transcript.append(Message::user("turn 1"));
        transcript.append(tool_call("a"));
        transcript.append(tool_result("a"));
        transcript.append(Message::user("turn 2"));
        transcript.append(tool_call("b"));

        // Window is [call a, result a, turn 2, call b].
        let messages = transcript.request_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content[0].as_text(), Some("turn 2"));
        assert_eq!(transcript.window_len(), 4);
    }

    #[test]
    fn test_recent_archive() {
        let mut transcript = Transcript::new(2);
        transcript.append(Message::user("turn 1"));
        transcript.append(tool_call("a"));
        transcript.append(tool_result("a"));
        transcript.append(Message::user("turn 2"));

        assert_eq!(transcript.recent_archive(60).len(), 4);
        let recent = transcript.recent_archive(3);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content[0].as_text(), Some("turn 2"));
    }

    #[test]
    fn test_repair_answers_every_invocation() {
        let mut transcript = Transcript::new(10);
        transcript.append(Message::user("turn 1"));
        transcript.append(Message::with_content(
            Role::Assistant,
            vec![
                ContentBlock::text("pressing buttons"),
                ContentBlock::ToolUse {
                    id: "x".into(),
                    name: "send_inputs".into(),
                    input: json!({"inputs": "A"}),
                },
                ContentBlock::ToolUse {
                    id: "y".into(),
                    name: "set_current_goal".into(),
                    input: json!({"goal": "leave the house"}),
                },
            ],
        ));

        assert_eq!(transcript.repair_unanswered("model call failed"), 2);

        let repair = transcript.last().unwrap();
        assert_eq!(repair.role, Role::User);
        let ids: Vec<&str> = repair
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    is_error,
                    ..
                } => {
                    assert!(*is_error);
                    Some(tool_use_id.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["x", "y"]);

        // Already answered: nothing more to do.
        assert_eq!(transcript.repair_unanswered("again"), 0);
    }

    #[test]
    fn test_repair_ignores_user_tail() {
        let mut transcript = Transcript::new(10);
        assert_eq!(transcript.repair_unanswered("empty"), 0);
        transcript.append(Message::user("turn 1"));
        assert_eq!(transcript.repair_unanswered("no calls"), 0);
        assert_eq!(transcript.archive().len(), 1);
    }
}
