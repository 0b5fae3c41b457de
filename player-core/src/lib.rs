//! Long-horizon agent core for playing Game Boy titles with Claude.
//!
//! This crate provides:
//! - A structured memory the model maintains through tools
//! - A bounded conversation window backed by a full archive
//! - Periodic narrative summaries of the session
//! - Turn-based and continuous (real-time) control loops
//!
//! The emulator and the model are both behind traits, so every loop can
//! run against the doubles in [`testing`].
//!
//! # Quick Start
//!
//! ```ignore
//! use player_core::{Agent, Config, TurnController};
//! use std::sync::Arc;
//!
//! let config = Config::load_or_create("config.toml")?;
//! let client = Arc::new(claude::Claude::from_env()?);
//! let agent = Agent::new(client, &config);
//!
//! let mut controller = TurnController::new(agent, &mut emulator);
//! controller.run().await;
//! ```

pub mod agent;
pub mod client;
pub mod config;
pub mod emulator;
pub mod input;
pub mod scheduler;
pub mod testing;

// Primary public API
pub use agent::{Agent, GameState, Observation, TurnController, TurnError, TurnOutcome};
pub use client::ModelClient;
pub use config::{Config, ConfigError, EmulationMode, ModelSettings};
pub use emulator::{Button, Emulator, EmulatorError, Frame, InputEvent};
pub use input::{InputAction, InputError};
pub use scheduler::ContinuousScheduler;
pub use testing::{MockEmulator, ScriptedModel};
