//! Emulator bridge over newline-delimited JSON.
//!
//! The emulator runs in a separate process. Each command is one JSON line
//! on its stdin and is answered by exactly one JSON line on its stdout.

use base64::Engine;
use player_core::{Emulator, EmulatorError, Frame, InputEvent};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, error, warn};

// ============================================================================
// Wire messages
// ============================================================================

/// Commands sent to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeCommand {
    Load { rom: String, sound: bool },
    Tick,
    Input { button: String, pressed: bool },
    Screen,
    LoadState { data: String },
    Speed { speed: u32 },
    Title,
    ScreenText,
}

/// Replies from the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum BridgeReply {
    Ok,
    Tick {
        exit: bool,
    },
    Screen {
        width: u32,
        height: u32,
        /// Base64 RGBA pixels, row-major.
        rgba: String,
    },
    Title {
        title: String,
    },
    ScreenText {
        #[serde(default)]
        text: Option<String>,
    },
    Error {
        message: String,
    },
}

impl BridgeReply {
    fn into_result(self) -> Result<Self, EmulatorError> {
        match self {
            BridgeReply::Error { message } => Err(EmulatorError::Protocol(message)),
            other => Ok(other),
        }
    }
}

fn unexpected(reply: &BridgeReply) -> EmulatorError {
    EmulatorError::Protocol(format!("unexpected reply: {reply:?}"))
}

// ============================================================================
// Bridge emulator
// ============================================================================

/// An [`Emulator`] that forwards every call over a line protocol.
pub struct BridgeEmulator<R, W> {
    reader: R,
    writer: W,
    child: Option<Child>,
    line: String,
}

/// A bridge running as a child process.
pub type ProcessEmulator = BridgeEmulator<BufReader<ChildStdout>, ChildStdin>;

impl ProcessEmulator {
    /// Spawn `command` and load `rom` into it.
    pub fn spawn(command: &[String], rom: &Path, sound: bool) -> Result<Self, EmulatorError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EmulatorError::Protocol("empty emulator command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take().ok_or(EmulatorError::Closed)?;
        let stdout = child.stdout.take().ok_or(EmulatorError::Closed)?;

        let mut emulator = BridgeEmulator::new(BufReader::new(stdout), stdin);
        emulator.child = Some(child);
        emulator.load_rom(rom, sound)?;
        Ok(emulator)
    }
}

impl<R: BufRead, W: Write> BridgeEmulator<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            child: None,
            line: String::new(),
        }
    }

    pub fn load_rom(&mut self, rom: &Path, sound: bool) -> Result<(), EmulatorError> {
        let command = BridgeCommand::Load {
            rom: rom.display().to_string(),
            sound,
        };
        self.expect_ok(command)
    }

    /// Send one command and read its reply.
    pub fn request(&mut self, command: &BridgeCommand) -> Result<BridgeReply, EmulatorError> {
        let encoded = serde_json::to_string(command)
            .map_err(|e| EmulatorError::Protocol(e.to_string()))?;
        writeln!(self.writer, "{encoded}")?;
        self.writer.flush()?;

        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(EmulatorError::Closed);
        }
        let reply: BridgeReply = serde_json::from_str(self.line.trim_end())
            .map_err(|e| EmulatorError::Protocol(format!("bad reply: {e}")))?;
        reply.into_result()
    }

    fn expect_ok(&mut self, command: BridgeCommand) -> Result<(), EmulatorError> {
        match self.request(&command)? {
            BridgeReply::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

impl<R, W> Emulator for BridgeEmulator<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn tick(&mut self) -> bool {
        match self.request(&BridgeCommand::Tick) {
            Ok(BridgeReply::Tick { exit }) => exit,
            Ok(other) => {
                error!(reply = ?other, "unexpected tick reply, stopping");
                true
            }
            Err(e) => {
                error!(error = %e, "emulator tick failed, stopping");
                true
            }
        }
    }

    fn send_input(&mut self, event: InputEvent) {
        let (button, pressed) = match event {
            InputEvent::Press(button) => (button, true),
            InputEvent::Release(button) => (button, false),
        };
        let command = BridgeCommand::Input {
            button: button.name().to_string(),
            pressed,
        };
        if let Err(e) = self.expect_ok(command) {
            warn!(error = %e, ?event, "input rejected by emulator");
        }
    }

    fn capture_screen(&mut self) -> Result<Frame, EmulatorError> {
        match self.request(&BridgeCommand::Screen)? {
            BridgeReply::Screen {
                width,
                height,
                rgba,
            } => {
                let pixels = base64::engine::general_purpose::STANDARD
                    .decode(rgba)
                    .map_err(|e| EmulatorError::InvalidFrame(e.to_string()))?;
                Frame::new(width, height, pixels)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), EmulatorError> {
        let data = base64::engine::general_purpose::STANDARD.encode(state);
        self.expect_ok(BridgeCommand::LoadState { data })
    }

    fn set_emulation_speed(&mut self, speed: u32) {
        if let Err(e) = self.expect_ok(BridgeCommand::Speed { speed }) {
            warn!(error = %e, speed, "failed to set emulation speed");
        }
    }

    fn cartridge_title(&mut self) -> String {
        match self.request(&BridgeCommand::Title) {
            Ok(BridgeReply::Title { title }) => title,
            Ok(other) => {
                warn!(reply = ?other, "unexpected title reply");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "failed to read cartridge title");
                String::new()
            }
        }
    }

    fn screen_text(&mut self) -> Option<String> {
        match self.request(&BridgeCommand::ScreenText) {
            Ok(BridgeReply::ScreenText { text }) => text,
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "screen text unavailable");
                None
            }
        }
    }
}

impl<R, W> Drop for BridgeEmulator<R, W> {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_core::Button;
    use std::io::Cursor;

    fn bridge(replies: &[&str]) -> BridgeEmulator<Cursor<Vec<u8>>, Vec<u8>> {
        let mut input = replies.join("\n");
        input.push('\n');
        BridgeEmulator::new(Cursor::new(input.into_bytes()), Vec::new())
    }

    fn sent(bridge: &BridgeEmulator<Cursor<Vec<u8>>, Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(bridge.writer.clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_command_encoding() {
        let line = serde_json::to_string(&BridgeCommand::Input {
            button: "start".into(),
            pressed: true,
        })
        .unwrap();
        assert_eq!(line, r#"{"cmd":"input","button":"start","pressed":true}"#);
        assert_eq!(
            serde_json::to_string(&BridgeCommand::Tick).unwrap(),
            r#"{"cmd":"tick"}"#
        );
    }

    #[test]
    fn test_tick_and_inputs() {
        let mut emulator = bridge(&[
            r#"{"reply":"tick","exit":false}"#,
            r#"{"reply":"ok"}"#,
            r#"{"reply":"tick","exit":true}"#,
        ]);

        assert!(!emulator.tick());
        emulator.send_input(InputEvent::Press(Button::Start));
        assert!(emulator.tick());

        let commands = sent(&emulator);
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1]["button"], "start");
        assert_eq!(commands[1]["pressed"], true);
    }

    #[test]
    fn test_capture_screen() {
        let rgba = base64::engine::general_purpose::STANDARD.encode([0u8; 2 * 2 * 4]);
        let reply = format!(r#"{{"reply":"screen","width":2,"height":2,"rgba":"{rgba}"}}"#);
        let mut emulator = bridge(&[&reply]);

        let frame = emulator.capture_screen().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
    }

    #[test]
    fn test_error_reply_and_closed_stream() {
        let mut emulator = bridge(&[r#"{"reply":"error","message":"no state"}"#]);

        let err = emulator.load_state(b"state").unwrap_err();
        assert!(matches!(err, EmulatorError::Protocol(ref m) if m == "no state"));

        // Nothing left to read.
        assert!(matches!(
            emulator.capture_screen(),
            Err(EmulatorError::Closed)
        ));
        assert!(emulator.tick());
    }

    #[test]
    fn test_title_and_screen_text() {
        let mut emulator = bridge(&[
            r#"{"reply":"title","title":"POKEMON RED"}"#,
            r#"{"reply":"screen_text","text":null}"#,
        ]);
        assert_eq!(emulator.cartridge_title(), "POKEMON RED");
        assert_eq!(emulator.screen_text(), None);
    }
}
