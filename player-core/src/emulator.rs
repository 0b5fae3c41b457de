//! Emulator capability boundary.
//!
//! The agent never links an emulator directly. Everything it needs is
//! expressed by the [`Emulator`] trait: frame stepping, joypad events,
//! screen capture and save-state loading.

use base64::Engine;
use claude::{ContentBlock, ToolResultContent};
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;
use tracing::warn;

/// Media type of every captured frame sent to the model.
pub const SCREEN_MEDIA_TYPE: &str = "image/png";

/// Errors raised by an emulator backend.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("emulator I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("emulator protocol error: {0}")]
    Protocol(String),

    #[error("emulator process closed")]
    Closed,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Game Boy joypad buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
}

impl Button {
    /// Map a notation letter to a button.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'A' => Some(Button::A),
            'B' => Some(Button::B),
            'U' => Some(Button::Up),
            'D' => Some(Button::Down),
            'L' => Some(Button::Left),
            'R' => Some(Button::Right),
            'S' => Some(Button::Start),
            'E' => Some(Button::Select),
            _ => None,
        }
    }

    /// The notation letter for this button.
    pub fn symbol(&self) -> char {
        match self {
            Button::A => 'A',
            Button::B => 'B',
            Button::Up => 'U',
            Button::Down => 'D',
            Button::Left => 'L',
            Button::Right => 'R',
            Button::Start => 'S',
            Button::Select => 'E',
        }
    }

    /// Lowercase name used by emulator bridges.
    pub fn name(&self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::Start => "start",
            Button::Select => "select",
        }
    }
}

/// A joypad event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Press(Button),
    Release(Button),
}

/// A captured screen in RGBA8.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking the buffer size.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, EmulatorError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(EmulatorError::InvalidFrame(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Encode as PNG, upscaling by `scale` with nearest-neighbor sampling.
    pub fn to_png(&self, scale: u32) -> Result<Vec<u8>, EmulatorError> {
        let image = RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| EmulatorError::InvalidFrame("buffer does not match size".into()))?;
        let image = if scale > 1 {
            image::imageops::resize(
                &image,
                self.width * scale,
                self.height * scale,
                FilterType::Nearest,
            )
        } else {
            image
        };

        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| EmulatorError::InvalidFrame(e.to_string()))?;
        Ok(bytes)
    }

    /// Base64-encoded PNG.
    pub fn to_base64_png(&self, scale: u32) -> Result<String, EmulatorError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_png(scale)?))
    }

    /// Image content block for a user message.
    pub fn to_content(&self, scale: u32) -> Result<ContentBlock, EmulatorError> {
        Ok(ContentBlock::Image {
            media_type: SCREEN_MEDIA_TYPE.to_string(),
            data: self.to_base64_png(scale)?,
        })
    }

    /// Image segment for a tool result.
    pub fn to_tool_content(&self, scale: u32) -> Result<ToolResultContent, EmulatorError> {
        Ok(ToolResultContent::Image {
            media_type: SCREEN_MEDIA_TYPE.to_string(),
            data: self.to_base64_png(scale)?,
        })
    }
}

/// The emulator capability set the agent drives.
pub trait Emulator: Send {
    /// Advance one frame. Returns true when the emulator wants to exit.
    fn tick(&mut self) -> bool;

    /// Inject a joypad event.
    fn send_input(&mut self, event: InputEvent);

    /// Capture the current screen.
    fn capture_screen(&mut self) -> Result<Frame, EmulatorError>;

    /// Restore a save state.
    fn load_state(&mut self, state: &[u8]) -> Result<(), EmulatorError>;

    /// Set the emulation speed multiplier (0 = unlimited).
    fn set_emulation_speed(&mut self, speed: u32);

    /// Title from the cartridge header.
    fn cartridge_title(&mut self) -> String;

    /// Optional textual representation of the screen.
    fn screen_text(&mut self) -> Option<String> {
        None
    }
}

/// Capture the screen as a message segment.
///
/// A failed capture degrades to a text segment so the turn can continue.
pub fn capture_content(emulator: &mut dyn Emulator, scale: u32) -> ContentBlock {
    match emulator
        .capture_screen()
        .and_then(|frame| frame.to_content(scale))
    {
        Ok(block) => block,
        Err(e) => {
            warn!(error = %e, "screen capture failed");
            ContentBlock::text("Error capturing screenshot")
        }
    }
}

/// Capture the screen as a tool-result segment.
pub fn capture_tool_content(emulator: &mut dyn Emulator, scale: u32) -> ToolResultContent {
    match emulator
        .capture_screen()
        .and_then(|frame| frame.to_tool_content(scale))
    {
        Ok(segment) => segment,
        Err(e) => {
            warn!(error = %e, "screen capture failed");
            ToolResultContent::text("Error capturing screenshot")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_symbols() {
        for symbol in ['A', 'B', 'U', 'D', 'L', 'R', 'S', 'E'] {
            let button = Button::from_symbol(symbol).unwrap();
            assert_eq!(button.symbol(), symbol);
        }
        assert_eq!(Button::from_symbol('W'), None);
        assert_eq!(Button::from_symbol('a'), None);
    }

    #[test]
    fn test_frame_size_check() {
        assert!(Frame::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            Frame::new(2, 2, vec![0; 15]),
            Err(EmulatorError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_png_encoding_and_scale() {
        let frame = Frame::solid(160, 144, [255, 255, 255, 255]);
        let png = frame.to_png(2).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 320);
        assert_eq!(decoded.height(), 288);
    }

    #[test]
    fn test_image_content_block() {
        let frame = Frame::solid(4, 4, [0, 0, 0, 255]);
        match frame.to_content(1).unwrap() {
            ContentBlock::Image { media_type, data } => {
                assert_eq!(media_type, "image/png");
                assert!(!data.is_empty());
            }
            other => panic!("expected image block, got {other:?}"),
        }
    }
}
