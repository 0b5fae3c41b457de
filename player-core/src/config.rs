//! Player configuration.
//!
//! Loaded once at startup from a TOML file and passed explicitly to the
//! agent and controllers. A missing file is written out with defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("ROM file not found: {0}")]
    RomNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the emulator and the model share time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmulationMode {
    /// The emulator only advances while inputs from a turn execute.
    #[default]
    TurnBased,
    /// The emulator runs in real time while analysis happens in the background.
    Continuous,
}

impl fmt::Display for EmulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulationMode::TurnBased => write!(f, "turn_based"),
            EmulationMode::Continuous => write!(f, "continuous"),
        }
    }
}

impl FromStr for EmulationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turn_based" => Ok(EmulationMode::TurnBased),
            "continuous" => Ok(EmulationMode::Continuous),
            other => Err(ConfigError::Invalid(format!(
                "unknown emulation mode '{other}' (expected turn_based or continuous)"
            ))),
        }
    }
}

/// Model settings shared by every request kind unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub thinking: bool,
    #[serde(default = "default_true")]
    pub efficient_tools: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: usize,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            thinking: true,
            efficient_tools: true,
            max_tokens: default_max_tokens(),
            thinking_budget: default_thinking_budget(),
        }
    }
}

/// Optional per-request-kind overrides of [`ModelDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficient_tools: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<usize>,
}

/// Summary section: model overrides plus cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(flatten)]
    pub overrides: ModelOverrides,
    /// Generate a planning summary on the first turn.
    #[serde(default = "default_true")]
    pub initial_summary: bool,
    /// Summarize every N turns.
    #[serde(default = "default_summary_interval")]
    pub summary_interval: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            overrides: ModelOverrides::default(),
            initial_summary: true,
            summary_interval: default_summary_interval(),
        }
    }
}

/// Fully resolved model settings for one kind of request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub thinking: bool,
    pub efficient_tools: bool,
    pub max_tokens: usize,
    pub thinking_budget: usize,
}

impl ModelSettings {
    /// Overlay `overrides` onto `defaults`.
    pub fn resolve(defaults: &ModelDefaults, overrides: &ModelOverrides) -> Self {
        Self {
            model: overrides
                .model
                .clone()
                .unwrap_or_else(|| defaults.model.clone()),
            thinking: overrides.thinking.unwrap_or(defaults.thinking),
            efficient_tools: overrides.efficient_tools.unwrap_or(defaults.efficient_tools),
            max_tokens: overrides.max_tokens.unwrap_or(defaults.max_tokens),
            thinking_budget: overrides.thinking_budget.unwrap_or(defaults.thinking_budget),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::resolve(&ModelDefaults::default(), &ModelOverrides::default())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_rom_path")]
    pub rom_path: PathBuf,

    /// Save state loaded into the emulator at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Emulation speed multiplier (0 = unlimited).
    #[serde(default = "default_emulation_speed")]
    pub emulation_speed: u32,

    #[serde(default)]
    pub emulation_mode: EmulationMode,

    /// Minimum seconds between analyses in continuous mode.
    #[serde(default = "default_analysis_interval")]
    pub continuous_analysis_interval: f64,

    /// Include the emulator's textual screen representation in each turn.
    #[serde(default)]
    pub enable_wrapper: bool,

    #[serde(default)]
    pub enable_sound: bool,

    /// Rolling window cap.
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Nearest-neighbor upscale factor for screenshots.
    #[serde(default = "default_screenshot_scale")]
    pub screenshot_scale: u32,

    /// Appended to the system prompt.
    #[serde(default)]
    pub custom_instructions: String,

    /// Program and arguments of the emulator bridge; the ROM path is appended.
    #[serde(default = "default_emulator_command")]
    pub emulator_command: Vec<String>,

    #[serde(default)]
    pub model_defaults: ModelDefaults,

    /// Overrides for gameplay turns.
    #[serde(default)]
    pub action: ModelOverrides,

    #[serde(default)]
    pub summary: SummaryConfig,
}

fn default_true() -> bool {
    true
}
fn default_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}
fn default_max_tokens() -> usize {
    20000
}
fn default_thinking_budget() -> usize {
    16000
}
fn default_summary_interval() -> u64 {
    30
}
fn default_rom_path() -> PathBuf {
    PathBuf::from("red.gb")
}
fn default_log_file() -> PathBuf {
    PathBuf::from("game_agent.log")
}
fn default_emulation_speed() -> u32 {
    1
}
fn default_analysis_interval() -> f64 {
    1.0
}
fn default_max_history_messages() -> usize {
    30
}
fn default_screenshot_scale() -> u32 {
    1
}
fn default_emulator_command() -> Vec<String> {
    vec!["gb-bridge".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom_path: default_rom_path(),
            state_path: None,
            log_file: default_log_file(),
            emulation_speed: default_emulation_speed(),
            emulation_mode: EmulationMode::default(),
            continuous_analysis_interval: default_analysis_interval(),
            enable_wrapper: false,
            enable_sound: false,
            max_history_messages: default_max_history_messages(),
            screenshot_scale: default_screenshot_scale(),
            custom_instructions: String::new(),
            emulator_command: default_emulator_command(),
            model_defaults: ModelDefaults::default(),
            action: ModelOverrides::default(),
            summary: SummaryConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, writing a default file first if none exists.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "created default config");
            return Ok(config);
        }
        Self::load(path)
    }

    /// Load from an existing file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Write as pretty TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value ranges. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_messages < 2 {
            return Err(ConfigError::Invalid(
                "max_history_messages must be at least 2".into(),
            ));
        }
        if self.summary.summary_interval < 1 {
            return Err(ConfigError::Invalid(
                "summary_interval must be at least 1".into(),
            ));
        }
        if !(self.continuous_analysis_interval > 0.0) {
            return Err(ConfigError::Invalid(
                "continuous_analysis_interval must be positive".into(),
            ));
        }
        if self.screenshot_scale == 0 {
            return Err(ConfigError::Invalid(
                "screenshot_scale must be at least 1".into(),
            ));
        }
        if self.emulator_command.is_empty() {
            return Err(ConfigError::Invalid("emulator_command is empty".into()));
        }
        for (kind, settings) in [
            ("action", self.action_settings()),
            ("summary", self.summary_settings()),
        ] {
            if settings.thinking && settings.thinking_budget >= settings.max_tokens {
                return Err(ConfigError::Invalid(format!(
                    "{kind}: thinking_budget ({}) must be below max_tokens ({})",
                    settings.thinking_budget, settings.max_tokens
                )));
            }
        }
        Ok(())
    }

    /// Check that the ROM exists.
    pub fn check_rom(&self) -> Result<(), ConfigError> {
        if self.rom_path.is_file() {
            Ok(())
        } else {
            Err(ConfigError::RomNotFound(self.rom_path.clone()))
        }
    }

    /// Settings for gameplay turns.
    pub fn action_settings(&self) -> ModelSettings {
        ModelSettings::resolve(&self.model_defaults, &self.action)
    }

    /// Settings for summary generation.
    pub fn summary_settings(&self) -> ModelSettings {
        ModelSettings::resolve(&self.model_defaults, &self.summary.overrides)
    }
}
