//! Testing utilities.
//!
//! This module provides doubles for the two external collaborators:
//! - `ScriptedModel` returns queued responses and records every request
//! - `MockEmulator` counts ticks, records joypad events and serves a fixed frame

use crate::client::ModelClient;
use crate::emulator::{Emulator, EmulatorError, Frame, InputEvent};
use async_trait::async_trait;
use claude::{ContentBlock, Request, Response, StopReason, Usage};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Game Boy screen width.
pub const SCREEN_WIDTH: u32 = 160;
/// Game Boy screen height.
pub const SCREEN_HEIGHT: u32 = 144;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A model client that replays scripted results.
///
/// When the script runs out it answers with a plain text response.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<Response, claude::Error>>>,
    requests: Mutex<Vec<Request>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response made of `content`.
    pub fn push_response(&self, content: Vec<ContentBlock>) {
        lock(&self.script).push_back(Ok(response(content)));
    }

    /// Queue a text-only response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(vec![ContentBlock::text(text)]);
    }

    /// Queue a response with a single tool call.
    pub fn push_tool_call(&self, id: impl Into<String>, name: impl Into<String>, input: Value) {
        self.push_response(vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }]);
    }

    /// Queue an error.
    pub fn push_error(&self, error: claude::Error) {
        lock(&self.script).push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Most requests ever awaiting an answer at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Scripted results not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        lock(&self.requests).push(request);
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| {
            Ok(response(vec![ContentBlock::text(
                "No more scripted responses.",
            )]))
        })
    }
}

fn response(content: Vec<ContentBlock>) -> Response {
    let stop_reason = if content
        .iter()
        .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    {
        StopReason::ToolUse
    } else {
        StopReason::EndTurn
    };
    Response {
        id: "msg_scripted".to_string(),
        model: "scripted".to_string(),
        content,
        stop_reason,
        usage: Usage::default(),
    }
}

/// An in-memory emulator.
pub struct MockEmulator {
    ticks: u64,
    events: Vec<InputEvent>,
    frame: Frame,
    exit_after: Option<u64>,
    fail_capture: bool,
    speed: Option<u32>,
    loaded_state: Option<Vec<u8>>,
    title: String,
    screen_text: Option<String>,
}

impl Default for MockEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmulator {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            events: Vec::new(),
            frame: Frame::solid(SCREEN_WIDTH, SCREEN_HEIGHT, [224, 248, 208, 255]),
            exit_after: None,
            fail_capture: false,
            speed: None,
            loaded_state: None,
            title: "POKEMON RED".to_string(),
            screen_text: None,
        }
    }

    /// Request exit on the `ticks`-th tick.
    pub fn exit_after(mut self, ticks: u64) -> Self {
        self.exit_after = Some(ticks);
        self
    }

    /// Make every screen capture fail.
    pub fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    pub fn with_screen_text(mut self, text: impl Into<String>) -> Self {
        self.screen_text = Some(text.into());
        self
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    pub fn speed(&self) -> Option<u32> {
        self.speed
    }

    pub fn loaded_state(&self) -> Option<&[u8]> {
        self.loaded_state.as_deref()
    }
}

impl Emulator for MockEmulator {
    fn tick(&mut self) -> bool {
        self.ticks += 1;
        self.exit_after.is_some_and(|limit| self.ticks >= limit)
    }

    fn send_input(&mut self, event: InputEvent) {
        self.events.push(event);
    }

    fn capture_screen(&mut self) -> Result<Frame, EmulatorError> {
        if self.fail_capture {
            return Err(EmulatorError::Protocol("capture disabled".into()));
        }
        Ok(self.frame.clone())
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), EmulatorError> {
        self.loaded_state = Some(state.to_vec());
        Ok(())
    }

    fn set_emulation_speed(&mut self, speed: u32) {
        self.speed = Some(speed);
    }

    fn cartridge_title(&mut self) -> String {
        self.title.clone()
    }

    fn screen_text(&mut self) -> Option<String> {
        self.screen_text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude::Message;

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new();
        model.push_text("first");
        model.push_error(claude::Error::Parse("bad".into()));

        let first = model.complete(Request::new(vec![Message::user("a")])).await.unwrap();
        assert_eq!(first.text(), "first");
        assert!(model.complete(Request::new(Vec::new())).await.is_err());

        let fallback = model.complete(Request::new(Vec::new())).await.unwrap();
        assert_eq!(fallback.text(), "No more scripted responses.");
        assert_eq!(model.request_count(), 3);
        assert_eq!(model.peak_in_flight(), 1);
        assert_eq!(model.remaining(), 0);
    }

    #[test]
    fn test_mock_emulator_exit() {
        let mut emulator = MockEmulator::new().exit_after(2);
        assert!(!emulator.tick());
        assert!(emulator.tick());
        assert_eq!(emulator.ticks(), 2);
    }
}
