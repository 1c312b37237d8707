use super::command::ColorCatalog;
use crate::callrecord::{CallRecord, CallRecordSender};
use crate::call::CallerInfo;
use crate::config::IvrConfig;
use crate::drawing::DrawingService;
use crate::media::PromptPlayer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Metadata about the current call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    /// Unique per-call identifier, used to correlate logs and the record.
    pub call_id: String,
    pub caller: CallerInfo,
}

impl CallInfo {
    pub fn new(caller: CallerInfo) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            caller,
        }
    }
}

/// Resources shared by every call: read-only configuration, the prompt
/// player, the drawing service and the record sink.
///
/// Cheap to clone; nothing in it is mutated while calls are running.
#[derive(Clone)]
pub struct ApplicationContext {
    pub config: Arc<IvrConfig>,
    pub catalog: Arc<ColorCatalog>,
    pub player: PromptPlayer,
    pub drawing: Arc<dyn DrawingService>,
    pub records: Option<CallRecordSender>,
}

impl ApplicationContext {
    pub fn new(
        config: IvrConfig,
        player: PromptPlayer,
        drawing: Arc<dyn DrawingService>,
        records: Option<CallRecordSender>,
    ) -> Self {
        let catalog = Arc::new(ColorCatalog::new(config.colors.clone()));
        Self {
            config: Arc::new(config),
            catalog,
            player,
            drawing,
            records,
        }
    }

    /// Hand the finished call's record to the record manager.
    pub fn emit_record(&self, record: CallRecord) {
        let Some(sender) = &self.records else {
            return;
        };
        if let Err(e) = sender.send(record) {
            warn!(call_id = %e.0.call_id,"call record dropped, manager is gone");
        }
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("config", &self.config)
            .field("colors", &self.catalog.len())
            .finish()
    }
}
