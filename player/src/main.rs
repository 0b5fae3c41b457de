//! Plays a Game Boy title with Claude.
//!
//! The emulator runs as a child process speaking the JSON-lines protocol
//! in [`bridge`]. Settings come from a TOML file that is created with
//! defaults on first run.
//!
//! ```bash
//! cargo run -p player -- --config config.toml --mode continuous
//! ```

mod bridge;

use anyhow::Context;
use bridge::ProcessEmulator;
use clap::Parser;
use player_core::config::DEFAULT_CONFIG_PATH;
use player_core::{Agent, Config, ContinuousScheduler, EmulationMode, Emulator, TurnController};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "player", about = "Let Claude play a Game Boy game")]
struct Cli {
    /// Path to the TOML config file. Created with defaults if missing.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the emulation mode (turn_based or continuous).
    #[arg(long)]
    mode: Option<EmulationMode>,

    /// Override the ROM path.
    #[arg(long)]
    rom: Option<PathBuf>,

    /// Override the save state to load at startup.
    #[arg(long)]
    state: Option<PathBuf>,
}

/// Log to stderr and append to `log_file`. `RUST_LOG` controls the filter;
/// `PLAYER_LOG_FORMAT=json` switches both sinks to JSON lines.
fn init_tracing(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let file = Mutex::new(file);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("PLAYER_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .with(fmt::layer().with_writer(file).with_ansi(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(fmt::layer().with_writer(file).with_ansi(false))
            .try_init()
            .ok();
    }
    Ok(())
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: Cli) -> anyhow::Result<Config> {
    let mut config = Config::load_or_create(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(mode) = cli.mode {
        config.emulation_mode = mode;
    }
    if let Some(rom) = cli.rom {
        config.rom_path = rom;
    }
    if let Some(state) = cli.state {
        config.state_path = Some(state);
    }
    Ok(config)
}

/// Where to log. Falls back to the default log file when the config
/// could not be loaded.
fn log_file(config: &anyhow::Result<Config>) -> PathBuf {
    match config {
        Ok(config) => config.log_file.clone(),
        Err(_) => Config::default().log_file,
    }
}

fn load_state(emulator: &mut ProcessEmulator, path: &Path) {
    match std::fs::read(path) {
        Ok(bytes) => match emulator.load_state(&bytes) {
            Ok(()) => info!(path = %path.display(), "loaded save state"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load save state"),
        },
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "save state not readable, starting fresh"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Cli::parse());
    init_tracing(&log_file(&config))?;
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to load configuration");
            return Err(e);
        }
    };

    if let Err(e) = config.check_rom().and_then(|()| config.validate()) {
        error!(error = %e, "invalid configuration");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let client = match claude::Claude::from_env() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "no model client");
            eprintln!("Error: {e}");
            eprintln!("Please set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here");
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut emulator =
        ProcessEmulator::spawn(&config.emulator_command, &config.rom_path, config.enable_sound)
            .context("failed to start emulator")?;
    emulator.set_emulation_speed(config.emulation_speed);
    if let Some(path) = &config.state_path {
        load_state(&mut emulator, path);
    }

    let title = emulator.cartridge_title();
    info!(title = %title, mode = %config.emulation_mode, "starting session");
    println!("Playing {title} in {} mode", config.emulation_mode);

    let agent = Agent::new(Arc::new(client), &config);
    match config.emulation_mode {
        EmulationMode::TurnBased => {
            TurnController::new(agent, &mut emulator)
                .with_shutdown(shutdown)
                .run()
                .await;
        }
        EmulationMode::Continuous => {
            ContinuousScheduler::new(agent, config.continuous_analysis_interval)
                .with_shutdown(shutdown)
                .run(&mut emulator)
                .await;
        }
    }

    info!("session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(config: PathBuf) -> Cli {
        Cli {
            config,
            mode: None,
            rom: None,
            state: None,
        }
    }

    #[test]
    fn test_unreadable_config_logs_to_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "emulation_mode = [").unwrap();

        let config = load_config(cli(path));

        let err = config.as_ref().unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config from"));
        assert_eq!(log_file(&config), PathBuf::from("game_agent.log"));
    }

    #[test]
    fn test_overrides_apply_to_created_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut args = cli(path.clone());
        args.mode = Some(EmulationMode::Continuous);
        args.rom = Some(PathBuf::from("red.gb"));

        let config = load_config(args);

        assert!(path.exists());
        let config = config.unwrap();
        assert_eq!(config.emulation_mode, EmulationMode::Continuous);
        assert_eq!(config.rom_path, PathBuf::from("red.gb"));
        assert_eq!(config.state_path, None);
    }
}
