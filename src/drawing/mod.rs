//! Client for the pixelebbe drawing service.

use crate::call::app::PixelCommand;
use crate::config::PixelebbeConfig;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const SET_PIXEL_PATH: &str = "/api/setpixel";

/// Submits pixel commands to a remote canvas.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DrawingService: Send + Sync {
    /// Returns `true` when the service accepted the pixel. Never fails.
    async fn submit(&self, command: &PixelCommand) -> bool;
}

pub struct PixelebbeClient {
    client: Client,
    endpoint: String,
    event: String,
    public_key: String,
    private_key: SecretString,
    grid: Option<String>,
}

impl PixelebbeClient {
    pub fn new(config: &PixelebbeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::version::get_useragent())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let private_key = match &config.private_key {
            Some(key) => SecretString::from(key.expose_secret().to_string()),
            None => {
                warn!("pixelebbe.private_key is not configured");
                SecretString::from(String::new())
            }
        };
        Ok(Self {
            client,
            endpoint: format!("{}{}", config.url.trim_end_matches('/'), SET_PIXEL_PATH),
            event: config.event.clone(),
            public_key: config.public_key.clone(),
            private_key,
            grid: config.grid.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn query(&self, command: &PixelCommand) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("public_key", self.public_key.clone()),
            ("event", self.event.clone()),
            ("color", command.color.clone()),
            ("x", command.x.to_string()),
            ("y", command.y.to_string()),
        ];
        if let Some(grid) = &self.grid {
            query.push(("grid", grid.clone()));
        }
        query
    }
}

#[async_trait]
impl DrawingService for PixelebbeClient {
    async fn submit(&self, command: &PixelCommand) -> bool {
        let start_time = Instant::now();
        let request = self
            .client
            .post(&self.endpoint)
            .query(&self.query(command))
            .form(&[("private_key", self.private_key.expose_secret())]);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                info!(
                    %command,
                    elapsed = start_time.elapsed().as_millis(),
                    status = status.as_u16(),
                    "set pixel"
                );
                status.is_success()
            }
            Err(e) => {
                warn!(
                    %command,
                    elapsed = start_time.elapsed().as_millis(),
                    "failed to set pixel: {}",
                    e
                );
                false
            }
        }
    }
}
