//! Drives one call through the IVR with a scripted caller, without a
//! telephony engine.

use crate::app::App;
use crate::call::{channel, CallerInfo, SessionAction};
use crate::callrecord::CallRecord;
use crate::media::prompt::INPUT;
use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

pub struct Simulator {
    caller: CallerInfo,
    inputs: VecDeque<String>,
    hangup_when_done: bool,
    record_audio: bool,
}

pub struct Simulation {
    pub record: CallRecord,
    /// Everything the IVR played, concatenated.
    pub audio: Bytes,
    pub frame_rate: u32,
}

impl Simulator {
    pub fn new(caller: &str) -> Self {
        Self {
            caller: CallerInfo::new("simulator", caller, "localhost"),
            inputs: VecDeque::new(),
            hangup_when_done: false,
            record_audio: false,
        }
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = String>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Hang up instead of staying silent once the inputs run out.
    pub fn hangup_when_done(mut self, hangup: bool) -> Self {
        self.hangup_when_done = hangup;
        self
    }

    pub fn record_audio(mut self, record: bool) -> Self {
        self.record_audio = record;
        self
    }

    pub async fn run(mut self, app: &App) -> Result<Simulation> {
        let input_prompt = app
            .context()
            .player
            .store()
            .lookup(INPUT)
            .await
            .map_err(|e| anyhow!("cannot recognize the input prompt: {}", e))?;

        let (call, mut remote) = channel(self.caller.clone());
        let task = app.dispatch(call);
        let mut audio = BytesMut::new();

        while let Some(cmd) = remote.recv_cmd().await {
            let frames = match cmd {
                SessionAction::WriteAudio(frames) => frames,
                other => {
                    debug!(cmd = ?other, "simulator received command");
                    continue;
                }
            };
            if self.record_audio {
                audio.extend_from_slice(&frames);
            }
            if frames != input_prompt.data {
                continue;
            }
            match self.inputs.pop_front() {
                Some(digits) => {
                    info!(digits = %digits, "caller presses keys");
                    remote.dtmf(&digits);
                }
                None if self.hangup_when_done => {
                    info!("caller hangs up");
                    remote.remote_hangup();
                }
                None => info!("caller stays silent"),
            }
        }

        let record = task.await?;
        Ok(Simulation {
            record,
            audio: audio.freeze(),
            frame_rate: input_prompt.frame_rate,
        })
    }
}

impl Simulation {
    /// Save the played audio as 16-bit mono PCM.
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.frame_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for chunk in self.audio.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
        Ok(())
    }
}
