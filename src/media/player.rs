use super::prompt::PromptStore;
use crate::call::CallHandle;
use std::sync::Arc;
use tracing::{debug, warn};

/// Plays named prompts on a call and waits for them to finish.
///
/// Failures are logged and swallowed: a prompt that cannot be played is
/// treated as silence and never aborts the call.
#[derive(Clone)]
pub struct PromptPlayer {
    store: Arc<dyn PromptStore>,
}

impl PromptPlayer {
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PromptStore> {
        &self.store
    }

    pub async fn play(&self, call: &mut dyn CallHandle, name: &str) {
        self.play_fraction(call, name, 1).await
    }

    /// Play the first `1 / speed` of the prompt.
    pub async fn play_fraction(&self, call: &mut dyn CallHandle, name: &str, speed: u32) {
        let asset = match self.store.lookup(name).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(prompt = name, "failed to load prompt: {}", e);
                return;
            }
        };
        let (frames, duration) = asset.truncated(speed);
        if let Err(e) = call.write_audio(frames).await {
            warn!(prompt = name, "failed to play prompt: {}", e);
            return;
        }
        debug!(prompt = name, speed, ?duration, "playing prompt");
        tokio::time::sleep(duration).await;
    }
}
