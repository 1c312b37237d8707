//! Channel-backed call session.
//!
//! [`CallSessionHandle`] is the IVR-facing half: it implements [`CallHandle`]
//! by sending [`SessionAction`]s to the transport and receiving DTMF symbols
//! from it. [`RemoteParty`] is the transport-facing half, driven by the
//! telephony engine (or by tests and the `simulate` command).

use super::{CallError, CallHandle, CallState, CallerInfo};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Commands sent from the IVR toward the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    AcceptCall,
    WriteAudio(Bytes),
    Hangup,
}

pub type SessionActionSender = mpsc::UnboundedSender<SessionAction>;
pub type SessionActionReceiver = mpsc::UnboundedReceiver<SessionAction>;

/// Create a connected handle/remote pair for a call that is ringing.
pub fn channel(caller: CallerInfo) -> (CallSessionHandle, RemoteParty) {
    let state = Arc::new(watch::Sender::new(CallState::Ringing));
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (dtmf_tx, dtmf_rx) = mpsc::unbounded_channel();
    let handle = CallSessionHandle {
        caller,
        state: state.clone(),
        cmd_tx,
        dtmf_rx,
    };
    let remote = RemoteParty {
        state,
        cmd_rx,
        dtmf_tx,
    };
    (handle, remote)
}

pub struct CallSessionHandle {
    caller: CallerInfo,
    state: Arc<watch::Sender<CallState>>,
    cmd_tx: SessionActionSender,
    dtmf_rx: mpsc::UnboundedReceiver<char>,
}

impl CallSessionHandle {
    fn require(&self, expected: CallState) -> Result<(), CallError> {
        let actual = *self.state.borrow();
        if actual != expected {
            return Err(CallError::InvalidState { expected, actual });
        }
        Ok(())
    }

    fn send_command(&self, action: SessionAction) -> Result<(), CallError> {
        self.cmd_tx
            .send(action)
            .map_err(|_| CallError::Transport("session command channel closed".to_string()))
    }
}

#[async_trait]
impl CallHandle for CallSessionHandle {
    fn caller(&self) -> &CallerInfo {
        &self.caller
    }

    fn state(&self) -> CallState {
        *self.state.borrow()
    }

    async fn accept(&mut self) -> Result<(), CallError> {
        self.require(CallState::Ringing)?;
        self.send_command(SessionAction::AcceptCall)?;
        self.state.send_replace(CallState::Answered);
        Ok(())
    }

    async fn write_audio(&mut self, frames: Bytes) -> Result<(), CallError> {
        self.require(CallState::Answered)?;
        self.send_command(SessionAction::WriteAudio(frames))
    }

    async fn read_dtmf(&mut self, timeout: Duration) -> Result<Option<char>, CallError> {
        self.require(CallState::Answered)?;
        let mut state_rx = self.state.subscribe();
        tokio::select! {
            digit = self.dtmf_rx.recv() => match digit {
                Some(digit) => Ok(Some(digit)),
                None => Err(CallError::Transport("dtmf channel closed".to_string())),
            },
            _ = async { state_rx.wait_for(|s| *s != CallState::Answered).await.map(|_| ()) } => {
                Err(CallError::InvalidState {
                    expected: CallState::Answered,
                    actual: *self.state.borrow(),
                })
            }
            _ = tokio::time::sleep(timeout) => Ok(None),
        }
    }

    fn flush_dtmf(&mut self) -> usize {
        let mut dropped = 0;
        while self.dtmf_rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    async fn hangup(&mut self) -> Result<(), CallError> {
        let actual = self.state();
        if actual == CallState::Ended {
            return Err(CallError::InvalidState {
                expected: CallState::Answered,
                actual,
            });
        }
        self.state.send_replace(CallState::Ended);
        self.send_command(SessionAction::Hangup)
    }
}

/// The transport side of a call: receives the IVR's commands, injects DTMF
/// and hangups.
pub struct RemoteParty {
    state: Arc<watch::Sender<CallState>>,
    cmd_rx: SessionActionReceiver,
    dtmf_tx: mpsc::UnboundedSender<char>,
}

impl RemoteParty {
    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Send each symbol of `digits` as a separate DTMF event.
    pub fn dtmf(&self, digits: &str) -> &Self {
        for digit in digits.chars() {
            let _ = self.dtmf_tx.send(digit);
        }
        self
    }

    /// The caller hangs up.
    pub fn remote_hangup(&self) -> &Self {
        self.state.send_replace(CallState::Ended);
        self
    }

    /// Wait for the next command. Returns `None` once the handle is dropped.
    pub async fn recv_cmd(&mut self) -> Option<SessionAction> {
        self.cmd_rx.recv().await
    }

    /// Wait up to `timeout_ms` milliseconds for the next command.
    pub async fn next_cmd(&mut self, timeout_ms: u64) -> Option<SessionAction> {
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.cmd_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drain all immediately-available commands without blocking.
    pub fn drain_cmds(&mut self) -> Vec<SessionAction> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            out.push(cmd);
        }
        out
    }
}
