use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod app;
pub mod session;

pub use session::{channel, CallSessionHandle, RemoteParty, SessionAction};

/// Lifecycle of a call as observed by the IVR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Ringing,
    Answered,
    Ended,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Ringing => write!(f, "ringing"),
            CallState::Answered => write!(f, "answered"),
            CallState::Ended => write!(f, "ended"),
        }
    }
}

/// Originating party of an inbound call, taken from the INVITE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub name: String,
    pub number: String,
    pub host: String,
}

impl CallerInfo {
    pub fn new(
        name: impl Into<String>,
        number: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
            host: host.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    /// The operation needs a different call state, usually because the
    /// caller already hung up.
    #[error("invalid call state: expected {expected}, got {actual}")]
    InvalidState {
        expected: CallState,
        actual: CallState,
    },
    #[error("call transport error: {0}")]
    Transport(String),
}

impl CallError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, CallError::InvalidState { .. })
    }
}

/// One live call, owned by the telephony engine and lent to the IVR for the
/// duration of the call.
#[async_trait]
pub trait CallHandle: Send {
    fn caller(&self) -> &CallerInfo;

    fn state(&self) -> CallState;

    async fn accept(&mut self) -> Result<(), CallError>;

    /// Queue raw frames on the outbound media channel.
    async fn write_audio(&mut self, frames: Bytes) -> Result<(), CallError>;

    /// Wait up to `timeout` for the next DTMF symbol.
    ///
    /// Returns `Ok(None)` when nothing arrived in time and
    /// [`CallError::InvalidState`] once the call is no longer answered.
    async fn read_dtmf(&mut self, timeout: Duration) -> Result<Option<char>, CallError>;

    /// Drop any DTMF symbols buffered so far, returning how many were dropped.
    fn flush_dtmf(&mut self) -> usize;

    async fn hangup(&mut self) -> Result<(), CallError>;
}
