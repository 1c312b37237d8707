use super::command::SEQUENCE_TERMINATOR;
use crate::call::{CallError, CallHandle, CallState, CallerInfo};
use crate::config::IvrConfig;
use crate::media::PromptPlayer;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for collecting DTMF input.
#[derive(Debug, Clone)]
pub struct DtmfCollectConfig {
    /// Collection stops once this many symbols were read.
    pub max_digits: usize,
    /// Symbol that ends the input early. Kept in the result.
    pub terminator: char,
    /// How long a single read waits before the call state is checked again.
    pub poll_interval: Duration,
    /// Total time budget from the start of collection.
    pub timeout: Option<Duration>,
}

impl Default for DtmfCollectConfig {
    fn default() -> Self {
        Self {
            max_digits: 20,
            terminator: SEQUENCE_TERMINATOR,
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

impl From<&IvrConfig> for DtmfCollectConfig {
    fn from(config: &IvrConfig) -> Self {
        Self {
            max_digits: config.max_digits,
            terminator: SEQUENCE_TERMINATOR,
            poll_interval: config.poll_interval(),
            timeout: config.input_timeout(),
        }
    }
}

/// High-level call control for one IVR run.
///
/// Wraps the engine's [`CallHandle`] together with the prompt player so the
/// IVR script reads as a sequence of answer/play/collect/hangup steps.
pub struct CallController<'a> {
    call: &'a mut dyn CallHandle,
    player: PromptPlayer,
    hung_up: bool,
}

impl<'a> CallController<'a> {
    pub fn new(call: &'a mut dyn CallHandle, player: PromptPlayer) -> Self {
        Self {
            call,
            player,
            hung_up: false,
        }
    }

    pub fn caller(&self) -> &CallerInfo {
        self.call.caller()
    }

    pub fn state(&self) -> CallState {
        self.call.state()
    }

    /// Whether this controller already asked the engine to hang up.
    pub fn hung_up(&self) -> bool {
        self.hung_up
    }

    pub fn ensure_answered(&self) -> Result<(), CallError> {
        match self.call.state() {
            CallState::Answered => Ok(()),
            actual => Err(CallError::InvalidState {
                expected: CallState::Answered,
                actual,
            }),
        }
    }

    pub async fn answer(&mut self) -> Result<(), CallError> {
        self.call.accept().await
    }

    pub async fn play(&mut self, prompt: &str) {
        self.player.play(&mut *self.call, prompt).await
    }

    pub async fn play_fraction(&mut self, prompt: &str, speed: u32) {
        self.player.play_fraction(&mut *self.call, prompt, speed).await
    }

    /// Discard keypresses buffered while prompts were playing.
    pub fn flush_input(&mut self) {
        let dropped = self.call.flush_dtmf();
        if dropped > 0 {
            debug!(dropped, "discarded stale dtmf");
        }
    }

    /// Collect DTMF symbols.
    ///
    /// Returns once the terminator is read, `max_digits` symbols were
    /// gathered, the timeout elapsed, or the call left the answered state.
    /// The result may be empty; callers check [`state`](Self::state) to tell
    /// a hangup apart from silence.
    pub async fn collect_dtmf(&mut self, config: &DtmfCollectConfig) -> Result<String, CallError> {
        let deadline = config.timeout.map(|t| Instant::now() + t);
        let mut collected = String::new();

        while collected.chars().count() < config.max_digits
            && self.call.state() == CallState::Answered
        {
            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        debug!(collected, "dtmf collection timed out");
                        break;
                    }
                    remaining.min(config.poll_interval)
                }
                None => config.poll_interval,
            };

            match self.call.read_dtmf(wait).await {
                Ok(Some(digit)) => {
                    collected.push(digit);
                    if digit == config.terminator {
                        break;
                    }
                }
                Ok(None) => {}
                Err(CallError::InvalidState { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(collected)
    }

    /// Hang up the call. Only the first request reaches the engine.
    pub async fn hangup(&mut self) -> Result<(), CallError> {
        if self.hung_up {
            return Ok(());
        }
        self.hung_up = true;
        self.call.hangup().await
    }
}
