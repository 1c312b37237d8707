pub mod player;
pub mod prompt;

pub use player::PromptPlayer;
pub use prompt::{AudioAsset, MemoryPromptStore, PromptStore, WavPromptStore};
