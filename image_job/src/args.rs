// vidsme_bridge/image_job/src/args.rs

//! Command-line arguments of the console caller.
//!
//! Each upstream override may also be given through its `VIDSME_*`
//! environment variable; an explicit flag wins over the environment.

use std::time::Duration;

use clap::Parser;

use crate::config::Config;
use crate::error::{JobError, Result};

/// Overrides applied on top of [`Config::default`].
#[derive(Debug, Clone, Default, clap::Args)]
pub struct UpstreamArgs {
    /// Upstream API base; `/task` is appended.
    #[arg(long = "upstream-base-url", env = "VIDSME_UPSTREAM_BASE_URL")]
    pub upstream_base_url: Option<String>,

    /// Prefix joined with the relative `generate_url`.
    #[arg(long = "image-base-url", env = "VIDSME_IMAGE_BASE_URL")]
    pub image_base_url: Option<String>,

    /// PEM public key that wraps the ephemeral signing key.
    #[arg(long = "public-key-pem", env = "VIDSME_PUBLIC_KEY_PEM", hide_env_values = true)]
    pub public_key_pem: Option<String>,

    /// Delay between status polls, in milliseconds.
    #[arg(long = "poll-interval-ms", env = "VIDSME_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Overall polling deadline, in milliseconds.
    #[arg(long = "poll-timeout-ms", env = "VIDSME_POLL_TIMEOUT_MS")]
    pub poll_timeout_ms: Option<u64>,
}

impl TryFrom<UpstreamArgs> for Config {
    type Error = JobError;

    fn try_from(args: UpstreamArgs) -> Result<Self> {
        let mut config = Config::default();
        if let Some(url) = args.upstream_base_url {
            config.upstream_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = args.image_base_url {
            config.image_base_url = url;
        }
        if let Some(pem) = args.public_key_pem {
            config.public_key_pem = pem;
        }
        if let Some(ms) = args.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = args.poll_timeout_ms {
            config.poll_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }
}

/// `image_job [PROMPT [MODEL [SIZE]]] [OPTIONS]`
#[derive(Debug, Clone, Parser)]
#[command(name = "image_job", about = "Generate one image through the vidsme upstream")]
pub struct Cli {
    /// Prompt text. Asked for interactively when omitted.
    pub prompt: Option<String>,

    /// Model id; unknown ids fall back to the default model.
    pub model: Option<String>,

    /// Size name such as `1:1`, `3:2` or `2:3`.
    pub size: Option<String>,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}
