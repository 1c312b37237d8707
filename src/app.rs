use crate::call::app::{ApplicationContext, PixelIvr};
use crate::call::CallSessionHandle;
use crate::callrecord::{CallRecord, CallRecordManager, CallRecordManagerBuilder, FnSaveCallRecord};
use crate::config::Config;
use crate::drawing::{DrawingService, PixelebbeClient};
use crate::media::prompt::ALL_PROMPTS;
use crate::media::{PromptPlayer, PromptStore, WavPromptStore};
use anyhow::{anyhow, Result};
use futures::lock::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct App {
    pub config: Arc<Config>,
    pub token: CancellationToken,
    ivr: PixelIvr,
    callrecord_manager: Mutex<Option<CallRecordManager>>,
}

#[derive(Default)]
pub struct AppBuilder {
    pub config: Option<Config>,
    pub prompt_store: Option<Arc<dyn PromptStore>>,
    pub drawing: Option<Arc<dyn DrawingService>>,
    pub cancel_token: Option<CancellationToken>,
    pub callrecord_saver: Option<FnSaveCallRecord>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn prompt_store(mut self, store: Arc<dyn PromptStore>) -> Self {
        self.prompt_store = Some(store);
        self
    }

    pub fn drawing(mut self, drawing: Arc<dyn DrawingService>) -> Self {
        self.drawing = Some(drawing);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn callrecord_saver(mut self, saver: FnSaveCallRecord) -> Self {
        self.callrecord_saver = Some(saver);
        self
    }

    pub fn build(self) -> Result<App> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let token = self.cancel_token.unwrap_or_default();

        let prompt_store = match self.prompt_store {
            Some(store) => store,
            None => Arc::new(WavPromptStore::new(&config.ivr.audio_dir)),
        };
        let drawing = match self.drawing {
            Some(drawing) => drawing,
            None => Arc::new(PixelebbeClient::new(&config.pixelebbe)?),
        };

        let mut manager_builder = CallRecordManagerBuilder::new()
            .with_cancel_token(token.child_token())
            .with_config(config.callrecord.clone());
        if let Some(saver) = self.callrecord_saver {
            manager_builder = manager_builder.with_saver(saver);
        }
        let manager = manager_builder.build();

        let context = ApplicationContext::new(
            config.ivr.clone(),
            PromptPlayer::new(prompt_store),
            drawing,
            Some(manager.sender.clone()),
        );

        Ok(App {
            config: Arc::new(config),
            token,
            ivr: PixelIvr::new(context),
            callrecord_manager: Mutex::new(Some(manager)),
        })
    }
}

impl App {
    pub fn context(&self) -> &ApplicationContext {
        self.ivr.context()
    }

    /// Run the IVR on an incoming call in its own task.
    pub fn dispatch(&self, call: CallSessionHandle) -> JoinHandle<CallRecord> {
        let ivr = self.ivr.clone();
        tokio::spawn(async move {
            let mut call = call;
            ivr.run(&mut call).await
        })
    }

    /// Names of prompts that cannot be loaded.
    pub async fn check_prompts(&self) -> Vec<&'static str> {
        let store = self.context().player.store();
        let mut missing = Vec::new();
        for name in ALL_PROMPTS {
            if let Err(e) = store.lookup(name).await {
                warn!(prompt = name, "prompt unavailable: {}", e);
                missing.push(name);
            }
        }
        missing
    }

    /// Persist call records until the app is cancelled. Records queued by
    /// then are saved before this returns.
    pub async fn run(&self) -> Result<()> {
        let Some(mut manager) = self.callrecord_manager.lock().await.take() else {
            return Err(anyhow!("app is already running"));
        };
        info!(
            sip_user = %self.config.sip.user,
            sip_domain = %self.config.sip.domain,
            drawing = %self.config.pixelebbe.url,
            "pixelphone started"
        );
        manager.serve().await;
        info!("pixelphone stopped");
        self.token.cancel();
        Ok(())
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}
