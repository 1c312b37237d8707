use anyhow::{anyhow, Error, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const PRIVATE_KEY_ENV: &str = "PIXELEBBE_PRIVATE_KEY";
pub const DEFAULT_CONF_PATH: &str = "pixelphone.toml";

#[derive(Parser, Debug)]
#[command(
    version = crate::version::get_short_version(),
    long_version = crate::version::get_version_info(),
    about = "A DTMF-driven IVR that draws pixels on a remote canvas"
)]
pub struct Cli {
    /// Config file; defaults to `pixelphone.toml` when that exists
    #[clap(long, global = true)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the configuration and report missing prompts
    Check,
    /// Run one call against an in-process caller
    Simulate {
        /// Digits to send after each "input" prompt, e.g. "#12#7#3*"
        #[clap(long = "input")]
        inputs: Vec<String>,
        /// Hang up once the scripted inputs are exhausted
        #[clap(long)]
        hangup: bool,
        #[clap(long, default_value = "1000")]
        caller: String,
        /// Write the outbound audio to this WAV file
        #[clap(long)]
        record: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    #[serde(default)]
    pub sip: SipConfig,
    #[serde(default)]
    pub pixelebbe: PixelebbeConfig,
    #[serde(default)]
    pub ivr: IvrConfig,
    pub callrecord: Option<CallRecordConfig>,
}

/// Registration identity, consumed by the telephony engine.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    pub user: String,
    pub password: Option<SecretString>,
    pub domain: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PixelebbeConfig {
    pub url: String,
    pub event: String,
    pub public_key: String,
    pub private_key: Option<SecretString>,
    pub grid: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct IvrConfig {
    pub audio_dir: String,
    pub max_retries: u32,
    pub max_digits: usize,
    pub poll_interval_ms: u64,
    /// Overall budget for one input collection, `0` waits until the caller
    /// presses the terminator or hangs up.
    pub input_timeout_secs: u64,
    /// Inclusive range the "waiting" prompt divisor is drawn from; `None`
    /// skips the waiting prompt.
    pub waiting_divisor: Option<(u32, u32)>,
    pub bye_pause_ms: u64,
    pub colors: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum CallRecordConfig {
    Local {
        root: String,
    },
    Http {
        url: String,
        headers: Option<HashMap<String, String>>,
    },
}

pub const DEFAULT_COLORS: [&str; 32] = [
    "6d001a", "be0039", "ff4500", "ffa800", "ffd635", "fff8b8", "00a368", "00cc78", "7eed56",
    "00756f", "009eaa", "00ccc0", "2450a4", "3690ea", "51e9f4", "493ac1", "6a5cff", "94b3ff",
    "811e9f", "b44ac0", "e4abff", "de107f", "ff3881", "ff99aa", "6d482f", "9c6926", "ffb470",
    "000000", "515252", "898d90", "d4d7d9", "ffffff",
];

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            user: "pixelphone".to_string(),
            password: None,
            domain: "pbx.example.com".to_string(),
            port: 5060,
        }
    }
}

impl Default for PixelebbeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            event: "default".to_string(),
            public_key: String::new(),
            private_key: None,
            grid: None,
            timeout_secs: 10,
        }
    }
}

impl Default for IvrConfig {
    fn default() -> Self {
        Self {
            audio_dir: "audio".to_string(),
            max_retries: 3,
            max_digits: 20,
            poll_interval_ms: 100,
            input_timeout_secs: 60,
            waiting_divisor: Some((1, 8)),
            bye_pause_ms: 5000,
            colors: DEFAULT_COLORS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            sip: SipConfig::default(),
            pixelebbe: PixelebbeConfig::default(),
            ivr: IvrConfig::default(),
            callrecord: None,
        }
    }
}

impl PixelebbeConfig {
    /// The drawing server rejects unsigned requests.
    pub fn require_private_key(&self) -> Result<()> {
        use secrecy::ExposeSecret;
        match &self.private_key {
            Some(key) if !key.expose_secret().is_empty() => Ok(()),
            _ => Err(anyhow!(
                "pixelebbe.private_key is not set, configure it or export {}",
                PRIVATE_KEY_ENV
            )),
        }
    }
}

impl IvrConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn input_timeout(&self) -> Option<Duration> {
        match self.input_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn bye_pause(&self) -> Duration {
        Duration::from_millis(self.bye_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(anyhow!("ivr.max_retries must be at least 1"));
        }
        if self.max_digits == 0 {
            return Err(anyhow!("ivr.max_digits must be at least 1"));
        }
        if self.colors.is_empty() {
            return Err(anyhow!("ivr.colors must not be empty"));
        }
        if let Some((lo, hi)) = self.waiting_divisor {
            if lo == 0 || lo > hi {
                return Err(anyhow!(
                    "ivr.waiting_divisor must be a non-empty range of positive integers, got [{}, {}]",
                    lo,
                    hi
                ));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let mut config: Config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow!("{}: {}", e, path))?,
        )?;
        config.apply_env();
        Ok(config)
    }

    /// Load the file given on the command line, which must exist. Without
    /// one, fall back to [`DEFAULT_CONF_PATH`] if present, else defaults.
    pub fn resolve(conf: Option<&str>) -> Result<Self> {
        match conf {
            Some(path) => Config::load(path),
            None if Path::new(DEFAULT_CONF_PATH).exists() => Config::load(DEFAULT_CONF_PATH),
            None => {
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    /// Fill secrets that were left out of the file from the environment.
    pub fn apply_env(&mut self) {
        if self.pixelebbe.private_key.is_none() {
            if let Ok(key) = std::env::var(PRIVATE_KEY_ENV) {
                self.pixelebbe.private_key = Some(SecretString::from(key));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.ivr.validate()?;
        url::Url::parse(&self.pixelebbe.url)
            .map_err(|e| anyhow!("invalid pixelebbe.url {}: {}", self.pixelebbe.url, e))?;
        Ok(())
    }
}
