// vidsme_bridge/image_job/src/upstream.rs

//! HTTP transport to the upstream `/task` endpoint and its reply envelopes.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::{JobError, Result};
use crate::request::TaskBody;

/// Application code the upstream puts in `code` on success.
pub const SUCCESS_CODE: i64 = 200;

const EXCERPT_CHARS: usize = 200;

pub type QueryPairs = Vec<(&'static str, String)>;

/// Raw reply: status and body text, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        UpstreamResponse {
            status,
            body: body.into(),
        }
    }

    /// Parses the body as JSON. Non-200 or non-JSON replies become
    /// [`JobError::Upstream`] carrying a short excerpt of the body.
    pub fn json(&self) -> Result<Value> {
        if self.status != 200 {
            return Err(self.upstream_error());
        }
        serde_json::from_str(&self.body).map_err(|_| self.upstream_error())
    }

    fn upstream_error(&self) -> JobError {
        JobError::Upstream {
            status: self.status,
            excerpt: excerpt(&self.body),
        }
    }
}

/// First [`EXCERPT_CHARS`] characters of `body`, marked when cut.
pub fn excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// `{code, msg, data: {job_id}}`
#[derive(Debug, Deserialize)]
pub struct SubmitEnvelope {
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitData {
    pub job_id: Option<Value>,
}

impl SubmitEnvelope {
    /// The job id, accepting either a JSON string or number.
    pub fn job_id(&self) -> Option<String> {
        match self.data.as_ref()?.job_id.as_ref()? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(SUCCESS_CODE)
    }
}

/// `{code, msg, data: {status?, generate_url?}}`
#[derive(Debug, Deserialize)]
pub struct PollEnvelope {
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub data: Option<PollData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollData {
    pub status: Option<String>,
    pub generate_url: Option<String>,
}

impl PollEnvelope {
    pub fn is_success(&self) -> bool {
        self.code == Some(SUCCESS_CODE)
    }
}

/// The two upstream calls a job makes.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `POST /task?<signature>` with a JSON [`TaskBody`].
    async fn submit(&self, query: &QueryPairs, body: &TaskBody) -> Result<UpstreamResponse>;

    /// `GET /task?<signature>&user_id=..&job_id=..`
    async fn poll(&self, query: &QueryPairs) -> Result<UpstreamResponse>;
}

/// [`Upstream`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    task_url: String,
}

impl HttpUpstream {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, header_value(&config.origin)?);
        headers.insert(REFERER, header_value(&format!("{}/", config.origin))?);
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpUpstream {
            client,
            task_url: config.task_url(),
        })
    }

    async fn read(response: reqwest::Response) -> Result<UpstreamResponse> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(UpstreamResponse { status, body })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| JobError::Config(format!("invalid header value '{}': {}", value, e)))
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn submit(&self, query: &QueryPairs, body: &TaskBody) -> Result<UpstreamResponse> {
        let response = self
            .client
            .post(&self.task_url)
            .query(query)
            .json(body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn poll(&self, query: &QueryPairs) -> Result<UpstreamResponse> {
        let response = self.client.get(&self.task_url).query(query).send().await?;
        Self::read(response).await
    }
}
