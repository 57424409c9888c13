use crate::core::config::SimTiming;
use crate::core::engine::Shared;
use crate::core::engine::state::TurnOutcome;
use crate::core::types::ProcessId;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;

/// Everything a threaded actor owns
pub(crate) struct Actor {
    pub(crate) shared: Arc<Shared>,
    pub(crate) id: ProcessId,
    pub(crate) rng: StdRng,
    pub(crate) timing: SimTiming,
    pub(crate) release_chance: f64,
    /// Never receives a value; disconnects when the engine stops
    pub(crate) stop: Receiver<()>,
}

impl Actor {
    /// Actor loop
    ///
    /// Runs one turn per iteration under the engine lock, then sleeps outside
    /// of it. Exits when the stop channel disconnects or when its process has
    /// been removed by a resolution, and always leaves through `retire` so no
    /// resource is abandoned.
    pub(crate) fn run(mut self) {
        tracing::debug!(process = %self.id, "actor started");

        loop {
            if matches!(self.stop.try_recv(), Err(TryRecvError::Disconnected)) {
                break;
            }

            let outcome = {
                let mut state = self.shared.state.lock();
                state.turn(&self.id, &mut self.rng, self.release_chance)
            };

            match outcome {
                Ok(TurnOutcome::Gone) => {
                    tracing::debug!(process = %self.id, "process removed, actor exits");
                    return;
                }
                Ok(TurnOutcome::Waiting(_) | TurnOutcome::StillWaiting(_)) => {
                    if !self.pause(self.timing.retry_wait) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(process = %self.id, "actor turn failed: {e}");
                    break;
                }
            }

            let jitter = self.jitter();
            if !self.pause(jitter) {
                break;
            }
        }

        self.shared.retire(&self.id);
        tracing::debug!(process = %self.id, "actor stopped");
    }

    /// Sleep for `duration` unless the engine stops first
    ///
    /// # Returns
    /// `false` if the stop signal arrived
    fn pause(&self, duration: Duration) -> bool {
        matches!(self.stop.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }

    fn jitter(&mut self) -> Duration {
        let lo = self.timing.jitter_min.as_micros() as u64;
        let hi = self.timing.jitter_max.as_micros() as u64;
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        Duration::from_micros(self.rng.random_range(lo..=hi))
    }
}
