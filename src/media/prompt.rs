use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use hound::WavReader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

pub const WAITING: &str = "waiting";
pub const WELCOME: &str = "welcome";
pub const INPUT: &str = "input";
pub const INVALID: &str = "invalid";
pub const TRY_AGAIN: &str = "tryagain";
pub const SAVING: &str = "saving";
pub const SUCCESS: &str = "success";
pub const ERROR: &str = "error";
pub const BYE: &str = "bye";

pub const ALL_PROMPTS: [&str; 9] = [
    WAITING, WELCOME, INPUT, INVALID, TRY_AGAIN, SAVING, SUCCESS, ERROR, BYE,
];

/// Decoded prompt audio ready to be written to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    pub frame_rate: u32,
    pub bytes_per_frame: usize,
    pub data: Bytes,
}

impl AudioAsset {
    pub fn new(frame_rate: u32, bytes_per_frame: usize, data: Bytes) -> Self {
        Self {
            frame_rate,
            bytes_per_frame,
            data,
        }
    }

    /// 16-bit little-endian mono PCM.
    pub fn from_pcm(frame_rate: u32, samples: &[i16]) -> Self {
        let data = samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect::<Vec<u8>>();
        Self::new(frame_rate, 2, Bytes::from(data))
    }

    pub fn frame_count(&self) -> usize {
        if self.bytes_per_frame == 0 {
            return 0;
        }
        self.data.len() / self.bytes_per_frame
    }

    pub fn duration(&self) -> Duration {
        if self.frame_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.frame_rate as f64)
    }

    /// The first `1 / divisor` of the asset and how long it plays.
    pub fn truncated(&self, divisor: u32) -> (Bytes, Duration) {
        let divisor = divisor.max(1);
        let frames = self.frame_count() / divisor as usize;
        let data = self.data.slice(..frames * self.bytes_per_frame);
        (data, self.duration() / divisor)
    }
}

/// Resolves prompt names to audio.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Arc<AudioAsset>>;
}

/// Prompts held in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryPromptStore {
    assets: HashMap<String, Arc<AudioAsset>>,
}

impl MemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, asset: AudioAsset) -> &mut Self {
        self.assets.insert(name.into(), Arc::new(asset));
        self
    }
}

#[async_trait]
impl PromptStore for MemoryPromptStore {
    async fn lookup(&self, name: &str) -> Result<Arc<AudioAsset>> {
        self.assets
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("prompt not found: {}", name))
    }
}

/// Prompts loaded from `<dir>/<name>.wav`, cached after the first read.
pub struct WavPromptStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<AudioAsset>>>,
}

impl WavPromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", name))
    }

    fn cached(&self, name: &str) -> Option<Arc<AudioAsset>> {
        self.cache.read().ok()?.get(name).cloned()
    }
}

#[async_trait]
impl PromptStore for WavPromptStore {
    async fn lookup(&self, name: &str) -> Result<Arc<AudioAsset>> {
        if let Some(asset) = self.cached(name) {
            return Ok(asset);
        }
        let path = self.path_of(name);
        let asset = tokio::task::spawn_blocking(move || read_wav_asset(&path)).await??;
        let asset = Arc::new(asset);
        debug!(
            prompt = name,
            frames = asset.frame_count(),
            frame_rate = asset.frame_rate,
            "prompt loaded"
        );
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name.to_string(), asset.clone());
        }
        Ok(asset)
    }
}

/// Read a WAV file as 16-bit little-endian mono PCM.
pub fn read_wav_asset(path: &Path) -> Result<AudioAsset> {
    let reader = BufReader::new(
        File::open(path).map_err(|e| anyhow!("{}: {}", e, path.display()))?,
    );
    let mut wav_reader = WavReader::new(reader)?;
    let spec = wav_reader.spec();
    let mut samples: Vec<i16> = Vec::with_capacity(wav_reader.len() as usize);

    match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => {
                for sample in wav_reader.samples::<i16>() {
                    samples.push(sample?);
                }
            }
            8 => {
                for sample in wav_reader.samples::<i8>() {
                    samples.push((sample? as i16) << 8);
                }
            }
            24 | 32 => {
                let shift = spec.bits_per_sample - 16;
                for sample in wav_reader.samples::<i32>() {
                    samples.push((sample? >> shift) as i16);
                }
            }
            bits => return Err(anyhow!("unsupported bits per sample: {}", bits)),
        },
        hound::SampleFormat::Float => {
            for sample in wav_reader.samples::<f32>() {
                samples.push((sample?.clamp(-1.0, 1.0) * 32767.0) as i16);
            }
        }
    }

    let channels = spec.channels.max(1) as usize;
    if channels > 1 {
        samples = samples
            .chunks(channels)
            .map(|frame| (frame.iter().map(|s| *s as i32).sum::<i32>() / frame.len() as i32) as i16)
            .collect();
    }
    Ok(AudioAsset::from_pcm(spec.sample_rate, &samples))
}
