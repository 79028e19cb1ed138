//! One-shot countdown run before the recorder starts.
//!
//! `start(n)` publishes `(n, Counting)` immediately, then one state per tick:
//! `n-1 .. 1` while counting, `(0, Completing)` for the "Go!" frame, and finally
//! `(0, Done)`. Completion is therefore reported exactly once, `n + 1` ticks
//! after start.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownPhase {
    Counting,
    /// Count reached zero; one display-only tick remains
    Completing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownState {
    pub remaining_seconds: u32,
    pub phase: CountdownPhase,
}

impl CountdownState {
    fn new(seconds: u32) -> Self {
        Self {
            remaining_seconds: seconds,
            phase: CountdownPhase::Counting,
        }
    }

    fn advance(&mut self) {
        match self.phase {
            CountdownPhase::Counting => {
                self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
                if self.remaining_seconds == 0 {
                    self.phase = CountdownPhase::Completing;
                }
            }
            CountdownPhase::Completing => self.phase = CountdownPhase::Done,
            CountdownPhase::Done => {}
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == CountdownPhase::Done
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountdownError {
    #[error("countdown duration must be at least one second")]
    ZeroDuration,
    #[error("a countdown is already running")]
    AlreadyRunning,
}

/// Drives a single countdown at a time on the tokio runtime.
#[derive(Debug)]
pub struct CountdownGate {
    tick: Duration,
    active: Option<JoinHandle<()>>,
}

impl Default for CountdownGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownGate {
    pub fn new() -> Self {
        Self::with_tick(TICK)
    }

    pub fn with_tick(tick: Duration) -> Self {
        Self { tick, active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start counting down from `seconds`.
    ///
    /// `emit` receives every state in order and returns `false` once nobody is
    /// listening, which ends the countdown early. There is no other way to stop it.
    pub fn start<F>(&mut self, seconds: u32, emit: F) -> Result<(), CountdownError>
    where
        F: FnMut(CountdownState) -> bool + Send + 'static,
    {
        if seconds == 0 {
            return Err(CountdownError::ZeroDuration);
        }
        if self.is_active() {
            return Err(CountdownError::AlreadyRunning);
        }
        debug!(seconds, "countdown started");
        let tick = self.tick;
        self.active = Some(tokio::spawn(run(seconds, tick, emit)));
        Ok(())
    }

    /// Forget the finished countdown so the next one can start.
    pub fn reset(&mut self) {
        self.active = None;
    }
}

async fn run<F>(seconds: u32, tick: Duration, mut emit: F)
where
    F: FnMut(CountdownState) -> bool,
{
    let mut state = CountdownState::new(seconds);
    if !emit(state) {
        return;
    }

    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    loop {
        interval.tick().await;
        state.advance();
        trace!(?state, "countdown tick");
        if !emit(state) || state.is_done() {
            return;
        }
    }
}
