//! Pixel IVR: answers a call, collects `#x#y#color*` and draws the pixel.
//!
//! # State Machine
//!
//! ```text
//! Ringing → Answered → Prompting(n) → Collecting(n) → Validating(n) ─┐
//!                          ↑                │ empty         │ invalid  │ valid
//!                          └────────────────┴───────────────┘ (n < N)  ↓
//!                                                                 Submitting
//!                                                                      ↓
//!                                   Terminated ← Reporting ←───────────┘
//! ```
//!
//! Every call ends in `Terminated` exactly once, through one of three paths:
//! the script completes, the caller hangs up while input is being collected,
//! or an unexpected error (including a panic) triggers best-effort cleanup.

use super::command::parse_pixel_input;
use super::{ApplicationContext, CallController, CallInfo, DtmfCollectConfig};
use crate::call::{CallError, CallHandle};
use crate::callrecord::{CallOutcome, CallRecord, Disposition};
use crate::media::prompt;
use futures::FutureExt;
use rand::Rng;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvrState {
    Ringing,
    Answered,
    Prompting { attempt: u32 },
    Collecting { attempt: u32 },
    Validating { attempt: u32 },
    Submitting,
    Reporting,
    Terminated,
}

impl fmt::Display for IvrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IvrState::Ringing => write!(f, "ringing"),
            IvrState::Answered => write!(f, "answered"),
            IvrState::Prompting { attempt } => write!(f, "prompting({})", attempt),
            IvrState::Collecting { attempt } => write!(f, "collecting({})", attempt),
            IvrState::Validating { attempt } => write!(f, "validating({})", attempt),
            IvrState::Submitting => write!(f, "submitting"),
            IvrState::Reporting => write!(f, "reporting"),
            IvrState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Why the script stopped before completing.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller is gone; no further I/O on the call.
    #[error("caller disconnected: {0}")]
    Disconnected(CallError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<CallError> for SessionError {
    fn from(e: CallError) -> Self {
        if e.is_invalid_state() {
            SessionError::Disconnected(e)
        } else {
            SessionError::Unexpected(e.into())
        }
    }
}

/// Runs the pixel IVR, once per call.
#[derive(Debug, Clone)]
pub struct PixelIvr {
    context: ApplicationContext,
}

impl PixelIvr {
    pub fn new(context: ApplicationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ApplicationContext {
        &self.context
    }

    /// Drive `call` to completion and return its record.
    ///
    /// Never fails: every failure is classified into the record's
    /// [`Disposition`], which is also handed to the record sink.
    pub async fn run(&self, call: &mut dyn CallHandle) -> CallRecord {
        let info = CallInfo::new(call.caller().clone());
        let span = info_span!(
            "call",
            call_id = %info.call_id,
            caller = %info.caller.number,
        );
        let record = self.run_call(call, info).instrument(span).await;
        self.context.emit_record(record.clone());
        record
    }

    async fn run_call(&self, call: &mut dyn CallHandle, info: CallInfo) -> CallRecord {
        let start_time = SystemTime::now();
        info!(
            caller_name = %info.caller.name,
            caller_host = %info.caller.host,
            "incoming call"
        );

        let mut session = IvrSession::new(&self.context, call);
        let result = match AssertUnwindSafe(session.script()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(SessionError::Unexpected(anyhow::anyhow!(
                "panic in call script: {}",
                panic_message(&panic)
            ))),
        };

        let (disposition, error) = match result {
            Ok(()) => (session.outcome.completed_disposition(), None),
            Err(SessionError::Disconnected(e)) => {
                info!(state = %session.state, "caller disconnected: {}", e);
                (Disposition::InvalidState, None)
            }
            Err(SessionError::Unexpected(e)) => {
                warn!(state = %session.state, "unexpected error in call: {:#}", e);
                if AssertUnwindSafe(session.recover()).catch_unwind().await.is_err() {
                    debug!("cleanup panicked");
                }
                (Disposition::Error, Some(format!("{:#}", e)))
            }
        };
        session.transition(IvrState::Terminated);

        CallRecord::new(
            info.call_id,
            info.caller,
            disposition,
            session.outcome,
            error,
            start_time,
        )
    }
}

struct IvrSession<'a> {
    context: &'a ApplicationContext,
    ctrl: CallController<'a>,
    state: IvrState,
    outcome: CallOutcome,
}

impl<'a> IvrSession<'a> {
    fn new(context: &'a ApplicationContext, call: &'a mut dyn CallHandle) -> Self {
        Self {
            context,
            ctrl: CallController::new(call, context.player.clone()),
            state: IvrState::Ringing,
            outcome: CallOutcome::default(),
        }
    }

    fn transition(&mut self, next: IvrState) {
        debug!(from = %self.state, to = %next, "ivr state");
        self.state = next;
    }

    async fn script(&mut self) -> Result<(), SessionError> {
        let config = self.context.config.clone();
        let collect = DtmfCollectConfig::from(config.as_ref());

        self.ctrl.answer().await?;
        self.transition(IvrState::Answered);

        if let Some((lo, hi)) = config.waiting_divisor {
            let divisor = rand::rng().random_range(lo.max(1)..=hi.max(1));
            self.ctrl.play_fraction(prompt::WAITING, divisor).await;
        }
        self.ctrl.play(prompt::WELCOME).await;

        for attempt in 1..=config.max_retries {
            self.outcome.attempts = attempt;
            self.ctrl.flush_input();

            self.transition(IvrState::Prompting { attempt });
            self.ctrl.play(prompt::INPUT).await;

            self.transition(IvrState::Collecting { attempt });
            let input = self.ctrl.collect_dtmf(&collect).await?;
            self.ctrl.ensure_answered()?;
            if input.is_empty() {
                info!(attempt, "no input");
                continue;
            }

            self.transition(IvrState::Validating { attempt });
            let command = match parse_pixel_input(&input, &self.context.catalog) {
                Ok(command) => command,
                Err(e) => {
                    info!(attempt, input = %input, "invalid input: {}", e);
                    self.ctrl.play(prompt::INVALID).await;
                    if attempt < config.max_retries {
                        self.ctrl.play(prompt::TRY_AGAIN).await;
                    }
                    continue;
                }
            };

            info!(attempt, %command, "pixel command accepted");
            self.outcome.command = Some(command.clone());
            self.transition(IvrState::Submitting);
            self.ctrl.play(prompt::SAVING).await;

            let succeeded = self.context.drawing.submit(&command).await;
            self.outcome.succeeded = succeeded;
            self.ctrl
                .play(if succeeded {
                    prompt::SUCCESS
                } else {
                    prompt::ERROR
                })
                .await;
            break;
        }

        self.transition(IvrState::Reporting);
        self.ctrl.play(prompt::BYE).await;
        tokio::time::sleep(config.bye_pause()).await;
        if self.ctrl.ensure_answered().is_ok() {
            match self.ctrl.hangup().await {
                Err(e) if e.is_invalid_state() => debug!("call ended during hangup: {}", e),
                result => result?,
            }
        } else {
            debug!(state = %self.ctrl.state(), "caller left before hangup");
        }
        Ok(())
    }

    /// Best-effort goodbye after an unexpected error. Failures are ignored.
    async fn recover(&mut self) {
        if self.ctrl.hung_up() || self.ctrl.ensure_answered().is_err() {
            return;
        }
        self.ctrl.play(prompt::ERROR).await;
        self.ctrl.play(prompt::BYE).await;
        if let Err(e) = self.ctrl.hangup().await {
            debug!("hangup during cleanup failed: {}", e);
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
