// vidsme_bridge/image_job/src/config.rs

use std::time::Duration;

use upstream_crypto::signature::{UPSTREAM_APP_ID, UPSTREAM_PUBLIC_KEY_PEM, UPSTREAM_STATIC_SALT};
use upstream_crypto::SignerConfig;

use crate::error::{JobError, Result};

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.vidsme.com/api/texttoimg/v1";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://art-global.yimeta.ai/";

/// Pixel dimensions for one named aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeOption {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl SizeOption {
    fn new(name: &str, width: u32, height: u32) -> Self {
        SizeOption {
            name: name.to_string(),
            width,
            height,
        }
    }
}

/// Immutable settings shared by every component of a job.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream_base_url: String,
    pub image_base_url: String,
    pub app_id: String,
    pub static_salt: String,
    pub public_key_pem: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub request_timeout: Duration,
    pub models: Vec<String>,
    pub default_model: String,
    /// Public model id -> id expected by upstream.
    pub model_aliases: Vec<(String, String)>,
    pub sizes: Vec<SizeOption>,
    pub default_size: String,
    /// Used when a size name is not in `sizes`.
    pub fallback_size: (u32, u32),
    pub prompt_prefix: String,
    pub origin: String,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            app_id: UPSTREAM_APP_ID.to_string(),
            static_salt: UPSTREAM_STATIC_SALT.to_string(),
            public_key_pem: UPSTREAM_PUBLIC_KEY_PEM.to_string(),
            poll_interval: Duration::from_millis(3_000),
            poll_timeout: Duration::from_millis(240_000),
            request_timeout: Duration::from_secs(30),
            models: ["anime", "realistic", "hentai", "hassaku"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            default_model: "anime".to_string(),
            model_aliases: vec![("hassaku".to_string(), "hassaku(hentai)".to_string())],
            sizes: vec![
                SizeOption::new("1:1", 512, 512),
                SizeOption::new("3:2", 768, 512),
                SizeOption::new("2:3", 512, 768),
            ],
            default_size: "2:3".to_string(),
            fallback_size: (512, 768),
            prompt_prefix: "(masterpiece), best quality, expressiveeyes, perfect face, "
                .to_string(),
            origin: "https://chatsweetie.ai".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(JobError::Config("poll interval must be positive".to_string()));
        }
        if self.poll_timeout < self.poll_interval {
            return Err(JobError::Config(format!(
                "poll timeout {:?} is shorter than the poll interval {:?}",
                self.poll_timeout, self.poll_interval
            )));
        }
        if !self.models.contains(&self.default_model) {
            return Err(JobError::Config(format!(
                "default model '{}' is not in the model list",
                self.default_model
            )));
        }
        Ok(())
    }

    pub fn signer_config(&self) -> SignerConfig {
        SignerConfig {
            app_id: self.app_id.clone(),
            static_salt: self.static_salt.clone(),
            public_key_pem: self.public_key_pem.clone(),
        }
    }

    /// The `/task` endpoint used for both submission and polling.
    pub fn task_url(&self) -> String {
        format!("{}/task", self.upstream_base_url)
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}
