// vidsme_bridge/image_job/src/error.rs

use std::time::Duration;

use thiserror::Error;
use upstream_crypto::CryptoError;

/// Terminal failures of one image job. Each renders as a single message.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Non-200 status or a body that is not JSON.
    #[error("Upstream error ({status}): {excerpt}")]
    Upstream { status: u16, excerpt: String },

    /// JSON reply without a job id, or with a failing application code.
    #[error("Task submission failed: {0}")]
    Submission(String),

    #[error("Upstream job {job_id} failed")]
    JobFailed { job_id: String },

    #[error("Polling job {job_id} timed out after {}s", .elapsed.as_secs())]
    Timeout { job_id: String, elapsed: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        JobError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
