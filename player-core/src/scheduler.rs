//! Continuous mode: the emulator runs in real time while analysis
//! happens in the background.
//!
//! The foreground loop ticks the emulator, executes queued inputs and
//! starts an analysis whenever the adaptive interval has elapsed. Only
//! one analysis runs at a time. Queued inputs wait while an analysis is
//! in flight so they never race the screenshot the model is reading.

use crate::agent::{Agent, Observation};
use crate::emulator::Emulator;
use crate::input;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Weight kept from the previous interval when smoothing.
const INTERVAL_SMOOTHING: f64 = 0.7;
/// Failures closer together than this count as consecutive.
const ERROR_WINDOW: Duration = Duration::from_secs(60);
/// Consecutive failures tolerated before backing off hard.
const MAX_QUICK_RETRIES: u32 = 3;
const SHORT_BACKOFF: Duration = Duration::from_secs(2);
const LONG_BACKOFF: Duration = Duration::from_secs(5);
/// Interval applied after repeated failures, in seconds.
const FAILURE_INTERVAL: f64 = 10.0;
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const LOOP_YIELD: Duration = Duration::from_millis(1);

/// Smooth the analysis interval toward the last analysis duration,
/// never dropping below `floor`.
pub fn next_interval(current: f64, duration: f64, floor: f64) -> f64 {
    (INTERVAL_SMOOTHING * current + (1.0 - INTERVAL_SMOOTHING) * duration).max(floor)
}

/// State shared between the foreground loop and the analysis task.
#[derive(Debug)]
struct SchedulerState {
    pending: VecDeque<String>,
    analyzing: bool,
    complete: bool,
    interval: f64,
    error_count: u32,
    last_error: Option<Instant>,
}

impl SchedulerState {
    fn new(interval: f64) -> Self {
        Self {
            pending: VecDeque::new(),
            analyzing: false,
            complete: true,
            interval,
            error_count: 0,
            last_error: None,
        }
    }

    fn record_success(&mut self, pending: Vec<String>, duration: f64, floor: f64) {
        self.pending.extend(pending);
        self.interval = next_interval(self.interval, duration, floor);
        self.error_count = 0;
    }

    /// Count a failure and return how long to back off.
    fn record_failure(&mut self, now: Instant, duration: f64, floor: f64) -> Duration {
        self.interval = next_interval(self.interval, duration, floor);
        self.error_count = match self.last_error {
            Some(last) if now.duration_since(last) < ERROR_WINDOW => self.error_count + 1,
            _ => 1,
        };
        self.last_error = Some(now);

        if self.error_count > MAX_QUICK_RETRIES {
            self.interval = (self.interval * 1.5).max(FAILURE_INTERVAL);
            LONG_BACKOFF
        } else {
            SHORT_BACKOFF
        }
    }
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives the emulator in real time and analyzes in the background.
pub struct ContinuousScheduler {
    agent: Arc<tokio::sync::Mutex<Agent>>,
    state: Arc<Mutex<SchedulerState>>,
    floor: f64,
    screenshot_scale: u32,
    screen_text: bool,
    shutdown: Arc<AtomicBool>,
}

impl ContinuousScheduler {
    /// `interval` is the configured analysis interval in seconds. The
    /// adaptive interval starts there and never drops below it.
    pub fn new(agent: Agent, interval: f64) -> Self {
        let floor = interval.max(0.0);
        Self {
            screenshot_scale: agent.screenshot_scale(),
            screen_text: agent.wants_screen_text(),
            agent: Arc::new(tokio::sync::Mutex::new(agent)),
            state: Arc::new(Mutex::new(SchedulerState::new(floor))),
            floor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop at the next loop iteration once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn agent(&self) -> Arc<tokio::sync::Mutex<Agent>> {
        self.agent.clone()
    }

    /// Current adaptive interval in seconds.
    pub fn interval(&self) -> f64 {
        lock(&self.state).interval
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn is_analyzing(&self) -> bool {
        lock(&self.state).analyzing
    }

    /// Run until the emulator exits or shutdown is requested. An analysis
    /// still in flight gets a short grace period before it is abandoned.
    pub async fn run(&mut self, emulator: &mut dyn Emulator) {
        info!(interval = self.floor, "starting continuous mode");
        emulator.set_emulation_speed(1);

        let mut last_analysis = Instant::now();
        let mut task: Option<JoinHandle<()>> = None;

        while !self.shutdown.load(Ordering::SeqCst) {
            let next = {
                let mut state = lock(&self.state);
                if state.analyzing {
                    None
                } else {
                    state.pending.pop_front()
                }
            };
            if let Some(inputs) = next {
                if self.execute(emulator, &inputs) {
                    info!("emulator requested exit during inputs");
                    break;
                }
            }

            let start = {
                let mut state = lock(&self.state);
                let due = last_analysis.elapsed().as_secs_f64() >= state.interval;
                if !state.analyzing && due {
                    state.analyzing = true;
                    state.complete = false;
                    true
                } else {
                    false
                }
            };
            if start {
                last_analysis = Instant::now();
                let observation =
                    Observation::capture(emulator, self.screenshot_scale, self.screen_text);
                task = Some(tokio::spawn(analyze(
                    self.agent.clone(),
                    self.state.clone(),
                    observation,
                    self.floor,
                )));
            }

            {
                let mut state = lock(&self.state);
                if state.analyzing && state.complete {
                    state.analyzing = false;
                }
            }

            if emulator.tick() {
                info!("emulator requested exit");
                break;
            }
            tokio::time::sleep(LOOP_YIELD).await;
        }

        if let Some(mut handle) = task {
            if tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("analysis still running at shutdown, abandoning it");
                handle.abort();
            }
        }
    }

    /// Returns true if the emulator asked to exit.
    fn execute(&self, emulator: &mut dyn Emulator, inputs: &str) -> bool {
        match input::parse(inputs) {
            Ok(actions) => {
                debug!(inputs, "executing queued inputs");
                input::execute(emulator, &actions)
            }
            Err(e) => {
                error!(inputs, error = %e, "dropping invalid queued inputs");
                false
            }
        }
    }
}

async fn analyze(
    agent: Arc<tokio::sync::Mutex<Agent>>,
    state: Arc<Mutex<SchedulerState>>,
    observation: Observation,
    floor: f64,
) {
    let started = Instant::now();
    let mut agent = agent.lock().await;

    match agent.analyze(observation, None).await {
        Ok(outcome) => {
            let duration = started.elapsed().as_secs_f64();
            if duration > floor {
                warn!(
                    duration,
                    configured = floor,
                    "analysis took longer than the configured interval"
                );
            }
            let mut state = lock(&state);
            state.record_success(outcome.pending, duration, floor);
            debug!(interval = state.interval, "adaptive interval updated");
        }
        Err(e) => {
            error!(error = %e, "analysis failed");
            let duration = started.elapsed().as_secs_f64();
            let backoff = lock(&state).record_failure(Instant::now(), duration, floor);
            tokio::time::sleep(backoff).await;
            agent.repair_unanswered(&e.to_string());
        }
    }

    lock(&state).complete = true;
}
