use crate::{
    call::{app::PixelCommand, CallerInfo},
    config::CallRecordConfig,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    path::Path,
    pin::Pin,
    sync::Arc,
    time::{Instant, SystemTime},
};
use tokio::{fs::File, io::AsyncWriteExt, select, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub type CallRecordSender = tokio::sync::mpsc::UnboundedSender<CallRecord>;
pub type CallRecordReceiver = tokio::sync::mpsc::UnboundedReceiver<CallRecord>;

pub type FnSaveCallRecord = Arc<
    Box<
        dyn Fn(
                &CancellationToken,
                Arc<Option<CallRecordConfig>>,
                CallRecord,
            ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
            + Send
            + Sync,
    >,
>;

/// How a call ended. Exactly one per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// A command was parsed and the drawing service accepted it.
    Success,
    /// A command was parsed but the drawing service rejected it or was
    /// unreachable.
    SubmitFailed,
    /// Every attempt ended without a valid command.
    NoInput,
    /// The caller hung up while the IVR was waiting for input.
    InvalidState,
    /// The IVR failed unexpectedly and recovered.
    Error,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Success => write!(f, "success"),
            Disposition::SubmitFailed => write!(f, "submit-failed"),
            Disposition::NoInput => write!(f, "no-input"),
            Disposition::InvalidState => write!(f, "invalid-state"),
            Disposition::Error => write!(f, "error"),
        }
    }
}

/// Accumulated state of one call, updated as the IVR progresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub succeeded: bool,
    pub command: Option<PixelCommand>,
    pub attempts: u32,
}

impl CallOutcome {
    /// Classify a script that ran to completion.
    pub fn completed_disposition(&self) -> Disposition {
        match (&self.command, self.succeeded) {
            (Some(_), true) => Disposition::Success,
            (Some(_), false) => Disposition::SubmitFailed,
            (None, _) => Disposition::NoInput,
        }
    }
}

/// The record emitted once per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub caller: CallerInfo,
    pub disposition: Disposition,
    pub succeeded: bool,
    pub attempts: u32,
    pub command: Option<PixelCommand>,
    pub error: Option<String>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub duration_ms: u64,
}

impl CallRecord {
    pub fn new(
        call_id: String,
        caller: CallerInfo,
        disposition: Disposition,
        outcome: CallOutcome,
        error: Option<String>,
        start_time: SystemTime,
    ) -> Self {
        let end_time = SystemTime::now();
        let duration_ms = end_time
            .duration_since(start_time)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            call_id,
            caller,
            disposition,
            succeeded: outcome.succeeded,
            attempts: outcome.attempts,
            command: outcome.command,
            error,
            start_time,
            end_time,
            duration_ms,
        }
    }
}

pub struct CallRecordManager {
    pub sender: CallRecordSender,
    config: Arc<Option<CallRecordConfig>>,
    cancel_token: CancellationToken,
    receiver: CallRecordReceiver,
    saver_fn: FnSaveCallRecord,
}

pub struct CallRecordManagerBuilder {
    pub cancel_token: Option<CancellationToken>,
    pub config: Option<CallRecordConfig>,
    saver_fn: Option<FnSaveCallRecord>,
}

impl Default for CallRecordManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRecordManagerBuilder {
    pub fn new() -> Self {
        Self {
            cancel_token: None,
            config: None,
            saver_fn: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = Some(cancel_token);
        self
    }

    pub fn with_config(mut self, config: Option<CallRecordConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_saver(mut self, saver: FnSaveCallRecord) -> Self {
        self.saver_fn = Some(saver);
        self
    }

    pub fn build(self) -> CallRecordManager {
        let cancel_token = self.cancel_token.unwrap_or_default();
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let saver_fn = self
            .saver_fn
            .unwrap_or_else(|| Arc::new(Box::new(CallRecordManager::default_saver)));

        if let Some(CallRecordConfig::Local { root }) = &self.config {
            if !Path::new(&root).exists() {
                match std::fs::create_dir_all(root) {
                    Ok(_) => {
                        info!("CallRecordManager created directory: {}", root);
                    }
                    Err(e) => {
                        error!("CallRecordManager failed to create directory: {}", e);
                    }
                }
            }
        }

        CallRecordManager {
            sender,
            config: Arc::new(self.config),
            cancel_token,
            receiver,
            saver_fn,
        }
    }
}

impl CallRecordManager {
    fn default_saver(
        _cancel_token: &CancellationToken,
        config: Arc<Option<CallRecordConfig>>,
        record: CallRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            info!(
                call_id = %record.call_id,
                caller = %record.caller.number,
                disposition = %record.disposition,
                attempts = record.attempts,
                command = ?record.command,
                duration_ms = record.duration_ms,
                "call finished"
            );
            let start_time = Instant::now();
            let saved_to = match config.as_ref() {
                None => return Ok(()),
                Some(CallRecordConfig::Local { root }) => {
                    Self::save_with_local(root, &record).await?
                }
                Some(CallRecordConfig::Http { url, headers }) => {
                    Self::save_with_http(url, headers, &record).await?
                }
            };
            info!(
                elapsed = ?start_time.elapsed(),
                call_id = %record.call_id,
                saved_to = %saved_to,
                "CallRecordManager saved"
            );
            Ok(())
        })
    }

    async fn save_with_local(root: &str, record: &CallRecord) -> Result<String> {
        let file_name = Path::new(root).join(format!("{}.json", record.call_id));
        let file_content = serde_json::to_string(record)?;
        let mut file = File::create(&file_name).await?;
        file.write_all(file_content.as_bytes()).await?;
        file.flush().await?;
        Ok(file_name.to_string_lossy().to_string())
    }

    async fn save_with_http(
        url: &str,
        headers: &Option<HashMap<String, String>>,
        record: &CallRecord,
    ) -> Result<String> {
        let client = reqwest::Client::new();
        let mut request = client.post(url).json(record);
        if let Some(headers_map) = headers {
            for (key, value) in headers_map {
                request = request.header(key, value);
            }
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(url.to_string())
        } else {
            Err(anyhow::anyhow!(
                "HTTP upload failed with status: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ))
        }
    }

    /// Save records as they arrive. Once cancelled, the receiver is closed
    /// and every record already queued is saved before this returns.
    pub async fn serve(&mut self) {
        let mut saving = JoinSet::new();
        loop {
            let record = select! {
                _ = self.cancel_token.cancelled() => None,
                record = self.receiver.recv() => record,
                Some(_) = saving.join_next(), if !saving.is_empty() => continue,
            };
            match record {
                Some(record) => self.spawn_save(&mut saving, record),
                None => break,
            }
        }

        self.receiver.close();
        while let Ok(record) = self.receiver.try_recv() {
            self.spawn_save(&mut saving, record);
        }
        let pending = saving.len();
        while saving.join_next().await.is_some() {}
        info!(pending, "CallRecordManager stopped");
    }

    fn spawn_save(&self, saving: &mut JoinSet<()>, record: CallRecord) {
        let call_id = record.call_id.clone();
        let save = (self.saver_fn)(&self.cancel_token, self.config.clone(), record);
        saving.spawn(async move {
            if let Err(e) = save.await {
                error!(call_id = %call_id, "Failed to save call record: {}", e);
            }
        });
    }
}
