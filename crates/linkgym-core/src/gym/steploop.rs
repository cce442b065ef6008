//! The measurement/action step loop
//!
//! Binds simulated time to an external decision process: every interval the
//! loop gathers a measurement batch, emits it, stalls the current callback
//! for a bounded wall-clock window awaiting an action, applies a non-none
//! action synchronously, and rearms itself. Cadence is fixed by simulated
//! time, so a missed deadline degrades to a stale configuration instead of
//! stalling the simulation.

use super::config::EnvConfig;
use super::measure::{Action, Measurement};
use super::transport::Transport;
use crate::error::Result;
use std::time::Duration;
use tracing::{debug, info};

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLoopState {
    /// Waiting for the measurement start time
    Idle,
    /// Emitting every interval
    Active,
    /// Past the environment end time; nothing further is emitted
    Stopped,
}

/// Result of one loop callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A batch was emitted; `action_applied` says whether a non-none
    /// action arrived inside the wait window and was applied
    Stepped {
        /// Whether an action changed state this step
        action_applied: bool,
    },
    /// The end time was reached; pending waits are abandoned
    Stopped,
}

/// The step-synchronized exchange loop
#[derive(Debug)]
pub struct StepLoop<T: Transport> {
    config: EnvConfig,
    transport: T,
    state: StepLoopState,
    next_at_ms: Option<u64>,
    steps: u64,
}

impl<T: Transport> StepLoop<T> {
    /// Create an idle loop; the first wakeup is the measurement start time
    pub fn new(config: EnvConfig, transport: T) -> Self {
        let next_at_ms = Some(config.measurement_start_time_ms);
        Self { config, transport, state: StepLoopState::Idle, next_at_ms, steps: 0 }
    }

    /// Current lifecycle state
    pub fn state(&self) -> StepLoopState {
        self.state
    }

    /// Number of measurement batches emitted so far
    pub fn steps_emitted(&self) -> u64 {
        self.steps
    }

    /// Simulated time of the next wakeup the owning scheduler should
    /// deliver, or `None` once stopped
    pub fn next_event_ms(&self) -> Option<u64> {
        self.next_at_ms
    }

    /// Execute one loop callback at simulated time `now_ms`.
    ///
    /// `collect` gathers the outward batch for this timestamp; `apply`
    /// consumes an action that arrived in time and carried a value. Both
    /// run synchronously inside this call, before control returns to the
    /// scheduler. The wait stalls wall-clock time only; simulated time
    /// does not advance during it.
    pub fn fire<F, G>(&mut self, now_ms: u64, collect: F, apply: G) -> Result<StepOutcome>
    where
        F: FnOnce(u64) -> Vec<Measurement>,
        G: FnOnce(&Action),
    {
        if self.state == StepLoopState::Stopped {
            return Ok(StepOutcome::Stopped);
        }
        if self.state == StepLoopState::Idle {
            info!(start_ms = now_ms, "measurement loop started");
            self.state = StepLoopState::Active;
        }
        if now_ms >= self.config.env_end_time_ms {
            info!(now_ms, steps = self.steps, "measurement loop stopped");
            self.state = StepLoopState::Stopped;
            self.next_at_ms = None;
            return Ok(StepOutcome::Stopped);
        }

        let batch = collect(now_ms);
        debug!(now_ms, records = batch.len(), "emitting measurement batch");
        self.transport.send(&batch)?;

        let wait = Duration::from_millis(self.config.max_wait_time_for_action_ms);
        let action_applied = match self.transport.receive(wait) {
            Some(action) if action.value.is_some() => {
                debug!(now_ms, group = %action.group, subject = action.subject_id,
                       "applying action");
                apply(&action);
                true
            }
            // A none-value or a missed deadline changes nothing; the
            // previous configuration persists for this step.
            Some(_) | None => false,
        };

        self.steps += 1;
        self.next_at_ms = Some(now_ms + self.config.measurement_interval_ms);
        Ok(StepOutcome::Stepped { action_applied })
    }

    /// Drive the loop to completion on its own wakeup times. Scenarios
    /// that interleave other events use a scheduler and `fire` directly.
    pub fn run<F, G>(&mut self, mut collect: F, mut apply: G) -> Result<u64>
    where
        F: FnMut(u64) -> Vec<Measurement>,
        G: FnMut(&Action),
    {
        while let Some(at) = self.next_event_ms() {
            self.fire(at, &mut collect, &mut apply)?;
        }
        Ok(self.steps)
    }
}
