//! Test harness for [`PixelIvr`].
//!
//! Provides [`MockCallStack`]: a channel-backed call with an in-memory prompt
//! store, driven by a scripted caller.
//!
//! Every prompt is stored with its own name as audio data (one byte per frame),
//! so each [`SessionAction::WriteAudio`] can be mapped back to the prompt
//! that produced it.
//!
//! # Quick start
//!
//! ```rust,ignore
//! let mut drawing = MockDrawingService::new();
//! drawing.expect_submit().returning(|_| true);
//!
//! let transcript = MockCallStack::new(drawing)
//!     .caller_input(CallerInput::digits("#1#2#3*"))
//!     .run()
//!     .await;
//! assert_eq!(transcript.record.disposition, Disposition::Success);
//! ```
//!
//! Engine failures are injected with [`MockCallStack::fault`], and
//! [`MockCallStack::hangup_on`] makes the caller leave as soon as a given
//! prompt starts.

use super::{ApplicationContext, PixelIvr};
use crate::call::{
    channel, CallError, CallHandle, CallSessionHandle, CallState, CallerInfo, SessionAction,
};
use crate::callrecord::CallRecord;
use crate::config::IvrConfig;
use crate::drawing::DrawingService;
use crate::media::prompt::{self, AudioAsset, MemoryPromptStore};
use crate::media::PromptPlayer;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// What the simulated caller does each time the "input" prompt plays.
#[derive(Debug, Clone)]
pub enum CallerInput {
    Digits(String),
    /// Press some keys, then hang up before finishing the sequence.
    DigitsThenHangup(String),
    Silence,
    Hangup,
}

/// A failure the call handle produces instead of talking to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `read_dtmf` fails with a transport error.
    DtmfTransport,
    /// `hangup` fails with a transport error and never reaches the caller.
    HangupTransport,
    /// `hangup` reports the call as ended although it is still answered.
    HangupInvalidState,
    HangupPanics,
}

/// Call handle that fails the operations named by its faults and forwards
/// everything else to the channel-backed session.
struct FaultyCall {
    inner: CallSessionHandle,
    faults: Vec<Fault>,
}

impl FaultyCall {
    fn has(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }
}

#[async_trait]
impl CallHandle for FaultyCall {
    fn caller(&self) -> &CallerInfo {
        self.inner.caller()
    }

    fn state(&self) -> CallState {
        self.inner.state()
    }

    async fn accept(&mut self) -> Result<(), CallError> {
        self.inner.accept().await
    }

    async fn write_audio(&mut self, frames: Bytes) -> Result<(), CallError> {
        self.inner.write_audio(frames).await
    }

    async fn read_dtmf(&mut self, timeout: Duration) -> Result<Option<char>, CallError> {
        if self.has(Fault::DtmfTransport) {
            return Err(CallError::Transport("rtp socket closed".to_string()));
        }
        self.inner.read_dtmf(timeout).await
    }

    fn flush_dtmf(&mut self) -> usize {
        self.inner.flush_dtmf()
    }

    async fn hangup(&mut self) -> Result<(), CallError> {
        if self.has(Fault::HangupPanics) {
            panic!("engine crashed on hangup");
        }
        if self.has(Fault::HangupTransport) {
            return Err(CallError::Transport("bye not sent".to_string()));
        }
        if self.has(Fault::HangupInvalidState) {
            return Err(CallError::InvalidState {
                expected: CallState::Answered,
                actual: CallState::Ended,
            });
        }
        self.inner.hangup().await
    }
}

impl CallerInput {
    pub fn digits(digits: &str) -> Self {
        CallerInput::Digits(digits.to_string())
    }
}

/// Everything the caller observed during one call.
#[derive(Debug)]
pub struct Transcript {
    pub accepted: bool,
    pub prompts: Vec<String>,
    pub hangups: usize,
    pub record: CallRecord,
}

impl Transcript {
    pub fn count(&self, name: &str) -> usize {
        self.prompts.iter().filter(|p| *p == name).count()
    }
}

pub fn prompt_store() -> MemoryPromptStore {
    let mut store = MemoryPromptStore::new();
    for name in prompt::ALL_PROMPTS {
        store.insert(
            name,
            AudioAsset::new(8, 1, Bytes::from_static(name.as_bytes())),
        );
    }
    store
}

/// Map written audio back to the prompt name.
pub fn prompt_name(frames: &Bytes) -> String {
    if let Some(name) = prompt::ALL_PROMPTS
        .iter()
        .find(|name| name.as_bytes() == frames.as_ref())
    {
        return name.to_string();
    }
    // the waiting prompt is cut short
    if prompt::WAITING.as_bytes().starts_with(frames) {
        return prompt::WAITING.to_string();
    }
    format!("unknown({:?})", frames)
}

pub struct MockCallStack {
    config: IvrConfig,
    drawing: Arc<dyn DrawingService>,
    inputs: VecDeque<CallerInput>,
    /// Digits pressed while the welcome prompt plays.
    early_digits: Option<String>,
    faults: Vec<Fault>,
    /// The caller hangs up when this prompt starts.
    hangup_on: Option<&'static str>,
}

impl MockCallStack {
    pub fn new(drawing: impl DrawingService + 'static) -> Self {
        let config = IvrConfig {
            waiting_divisor: None,
            ..Default::default()
        };
        Self {
            config,
            drawing: Arc::new(drawing),
            inputs: VecDeque::new(),
            early_digits: None,
            faults: Vec::new(),
            hangup_on: None,
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut IvrConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn caller_input(mut self, input: CallerInput) -> Self {
        self.inputs.push_back(input);
        self
    }

    pub fn early_digits(mut self, digits: &str) -> Self {
        self.early_digits = Some(digits.to_string());
        self
    }

    pub fn fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn hangup_on(mut self, prompt: &'static str) -> Self {
        self.hangup_on = Some(prompt);
        self
    }

    /// Run the IVR on a fresh call and play the scripted caller until the
    /// IVR releases the call. Inputs beyond the script are silence.
    pub async fn run(mut self) -> Transcript {
        let ctx = ApplicationContext::new(
            self.config,
            PromptPlayer::new(Arc::new(prompt_store())),
            self.drawing,
            None,
        );
        let ivr = PixelIvr::new(ctx);
        let (handle, mut remote) = channel(CallerInfo::new("Test", "1001", "127.0.0.1"));
        let mut call = FaultyCall {
            inner: handle,
            faults: self.faults,
        };
        let task = tokio::spawn(async move { ivr.run(&mut call).await });

        let mut accepted = false;
        let mut prompts = Vec::new();
        let mut hangups = 0;
        while let Some(cmd) = remote.recv_cmd().await {
            match cmd {
                SessionAction::AcceptCall => accepted = true,
                SessionAction::Hangup => hangups += 1,
                SessionAction::WriteAudio(frames) => {
                    let name = prompt_name(&frames);
                    if name == prompt::WELCOME {
                        if let Some(digits) = self.early_digits.take() {
                            remote.dtmf(&digits);
                        }
                    }
                    if name == prompt::INPUT {
                        match self.inputs.pop_front().unwrap_or(CallerInput::Silence) {
                            CallerInput::Digits(digits) => {
                                remote.dtmf(&digits);
                            }
                            CallerInput::DigitsThenHangup(digits) => {
                                remote.dtmf(&digits).remote_hangup();
                            }
                            CallerInput::Silence => {}
                            CallerInput::Hangup => {
                                remote.remote_hangup();
                            }
                        }
                    }
                    if self.hangup_on == Some(name.as_str()) {
                        remote.remote_hangup();
                    }
                    prompts.push(name);
                }
            }
        }

        let record = task.await.expect("ivr task panicked");
        Transcript {
            accepted,
            prompts,
            hangups,
            record,
        }
    }
}
