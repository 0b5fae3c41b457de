//! Button notation used by the `send_inputs` tool.
//!
//! Tokens are separated by whitespace. A token is either a set of button
//! letters optionally followed by a hold duration, or a wait:
//!
//! ```text
//! A        press A for 1 frame
//! R5       hold RIGHT for 5 frames
//! AB3      hold A and B together for 3 frames
//! W / W20  wait 1 / 20 frames with no buttons held
//! ```
//!
//! Durations are raw emulator frames. The Game Boy runs at
//! [`FRAME_RATE_HZ`], so one frame is roughly 16.74 ms of game time and
//! 60 frames is about one second.

use crate::emulator::{Button, Emulator, InputEvent};
use thiserror::Error;
use tracing::debug;

/// Game Boy vertical refresh rate.
pub const FRAME_RATE_HZ: f64 = 59.7275;

const WAIT_SYMBOL: char = 'W';

/// Notation reference shown to the model.
pub const BUTTON_RULES: &str = include_str!("agent/prompts/buttons.txt");

/// Errors from parsing button notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("invalid input token '{token}': unknown symbol '{symbol}'")]
    InvalidToken { token: String, symbol: char },

    #[error("invalid input token '{token}': bad duration")]
    InvalidDuration { token: String },

    #[error("invalid input token '{token}': button '{symbol}' repeated")]
    DuplicateButton { token: String, symbol: char },
}

/// One step of an input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Hold every button in the set for `frames` frames.
    Hold { buttons: Vec<Button>, frames: u32 },
    /// Let `frames` frames pass with nothing held.
    Wait { frames: u32 },
}

impl InputAction {
    /// Frames this action occupies.
    pub fn frames(&self) -> u32 {
        match self {
            InputAction::Hold { frames, .. } | InputAction::Wait { frames } => *frames,
        }
    }
}

/// Parse a notation string into actions.
///
/// Empty or whitespace-only input parses to no actions.
pub fn parse(sequence: &str) -> Result<Vec<InputAction>, InputError> {
    sequence.split_whitespace().map(parse_token).collect()
}

fn parse_token(token: &str) -> Result<InputAction, InputError> {
    let split = token
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(token.len());
    let (symbols, digits) = token.split_at(split);

    let frames = if digits.is_empty() {
        1
    } else {
        match digits.parse::<u32>() {
            Ok(0) | Err(_) => {
                return Err(InputError::InvalidDuration {
                    token: token.to_string(),
                })
            }
            Ok(n) => n,
        }
    };

    if symbols.is_empty() {
        return Err(InputError::InvalidDuration {
            token: token.to_string(),
        });
    }

    if symbols == WAIT_SYMBOL.to_string() {
        return Ok(InputAction::Wait { frames });
    }

    let mut buttons = Vec::with_capacity(symbols.len());
    for symbol in symbols.chars() {
        let button = Button::from_symbol(symbol).ok_or_else(|| InputError::InvalidToken {
            token: token.to_string(),
            symbol,
        })?;
        if buttons.contains(&button) {
            return Err(InputError::DuplicateButton {
                token: token.to_string(),
                symbol,
            });
        }
        buttons.push(button);
    }

    Ok(InputAction::Hold { buttons, frames })
}

/// Drive the emulator through a parsed sequence.
///
/// Returns true if the emulator requested exit; remaining actions are
/// skipped and any held buttons are released first.
pub fn execute(emulator: &mut dyn Emulator, actions: &[InputAction]) -> bool {
    for action in actions {
        debug!(?action, "executing input");
        match action {
            InputAction::Wait { frames } => {
                if tick_frames(emulator, *frames) {
                    return true;
                }
            }
            InputAction::Hold { buttons, frames } => {
                for button in buttons {
                    emulator.send_input(InputEvent::Press(*button));
                }
                let exit = tick_frames(emulator, *frames);
                for button in buttons {
                    emulator.send_input(InputEvent::Release(*button));
                }
                if exit {
                    return true;
                }
            }
        }
    }
    false
}

fn tick_frames(emulator: &mut dyn Emulator, frames: u32) -> bool {
    (0..frames).any(|_| emulator.tick())
}

/// Total frames a sequence will take.
pub fn total_frames(actions: &[InputAction]) -> u64 {
    actions.iter().map(|a| a.frames() as u64).sum()
}
