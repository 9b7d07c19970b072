// vidsme_bridge/image_job/src/job.rs

//! Submission and bounded polling of one upstream image job.
//!
//! ```text
//! Created -> Submitted -> Polling -> { Succeeded | Failed | TimedOut }
//! ```
//!
//! Every HTTP call carries its own freshly generated signature. Transient poll
//! anomalies keep the job in `Polling` until the deadline; the deadline is
//! checked before each new poll, so a poll already in flight always completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use upstream_crypto::RequestSigner;

use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::error::{JobError, Result};
use crate::request::{ImageRequest, TaskBody};
use crate::upstream::{HttpUpstream, PollEnvelope, QueryPairs, SubmitEnvelope, Upstream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Unknown,
    Processing,
    Failed,
    Succeeded,
}

/// Upstream job as known from the replies seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub generate_url: Option<String>,
}

impl Job {
    fn new(job_id: String) -> Self {
        Job {
            job_id,
            status: JobStatus::Unknown,
            generate_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::TimedOut)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Deadline bookkeeping for one job, from submission until a terminal state.
#[derive(Debug, Clone)]
pub struct PollingSession {
    pub job: Job,
    pub start: Duration,
    pub deadline: Duration,
    pub interval: Duration,
    pub polls: u32,
}

impl PollingSession {
    pub fn new(job: Job, start: Duration, timeout: Duration, interval: Duration) -> Self {
        PollingSession {
            job,
            start,
            deadline: start + timeout,
            interval,
            polls: 0,
        }
    }

    pub fn is_expired(&self, now: Duration) -> bool {
        now >= self.deadline
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.start)
    }
}

/// Successful outcome handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Absolute image URL (image base URL + upstream relative path).
    pub url: String,
    /// The job as last reported by the upstream.
    pub job: Job,
    pub polls: u32,
}

/// Interpretation of a single poll reply.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollUpdate {
    Ready(String),
    Failed,
    Pending(Option<String>),
    Transient(String),
}

fn interpret_poll(body: Value) -> PollUpdate {
    let envelope: PollEnvelope = match serde_json::from_value(body) {
        Ok(envelope) => envelope,
        Err(e) => return PollUpdate::Transient(format!("unexpected reply shape: {}", e)),
    };
    if !envelope.is_success() {
        return PollUpdate::Transient(format!(
            "code {:?}: {}",
            envelope.code,
            envelope.msg.unwrap_or_default()
        ));
    }
    let data = envelope.data.unwrap_or_default();
    if let Some(url) = data.generate_url.filter(|url| !url.is_empty()) {
        return PollUpdate::Ready(url);
    }
    if data.status.as_deref() == Some("failed") {
        return PollUpdate::Failed;
    }
    PollUpdate::Pending(data.status)
}

/// Runs image jobs against the upstream. Holds no per-job state; every call
/// to [`JobRunner::run`] owns its own job and session.
#[derive(Clone)]
pub struct JobRunner {
    config: Arc<Config>,
    signer: RequestSigner,
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    pub fn new(
        config: Arc<Config>,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let signer = RequestSigner::new(&config.signer_config())?;
        Ok(JobRunner {
            config,
            signer,
            upstream,
            clock,
        })
    }

    /// Runner backed by `reqwest` and real time.
    pub fn from_config(config: Config) -> Result<Self> {
        let upstream = HttpUpstream::new(&config)?;
        Self::new(
            Arc::new(config),
            Arc::new(upstream),
            Arc::new(TokioClock::new()),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submits one job and polls it to a terminal state.
    pub async fn run(&self, request: ImageRequest) -> Result<GeneratedImage> {
        let mut execution = Execution::new();
        let body = TaskBody::resolve(&request, &self.config);

        let job = match self.submit(&body).await {
            Ok(job) => job,
            Err(err) => {
                execution.transition(JobState::Failed);
                return Err(err);
            }
        };
        execution.transition(JobState::Submitted);
        info!(job_id = %job.job_id, model = %body.model, "upstream job submitted");

        let mut session = PollingSession::new(
            job,
            self.clock.now(),
            self.config.poll_timeout,
            self.config.poll_interval,
        );
        execution.transition(JobState::Polling);

        let outcome = self.poll(&mut session, &body.user_id).await;
        match &outcome {
            Ok(image) => {
                execution.transition(JobState::Succeeded);
                info!(job_id = %image.job.job_id, polls = image.polls, url = %image.url, "image ready");
            }
            Err(JobError::Timeout { .. }) => execution.transition(JobState::TimedOut),
            Err(_) => execution.transition(JobState::Failed),
        }
        outcome
    }

    /// `Created -> Submitted`: one signed creation request.
    async fn submit(&self, body: &TaskBody) -> Result<Job> {
        let signature = self.signer.sign(self.clock.unix_seconds())?;
        let response = self.upstream.submit(&signature.query_pairs(), body).await?;
        let json = response.json()?;

        let envelope: SubmitEnvelope = serde_json::from_value(json.clone())
            .map_err(|_| JobError::Submission(excerpt_json(&json)))?;
        match envelope.job_id() {
            Some(job_id) if envelope.is_success() => Ok(Job::new(job_id)),
            _ => {
                let reason = envelope
                    .msg
                    .filter(|msg| !msg.is_empty())
                    .unwrap_or_else(|| excerpt_json(&json));
                Err(JobError::Submission(reason))
            }
        }
    }

    /// `Polling` self-loop until the job resolves or the deadline passes.
    async fn poll(&self, session: &mut PollingSession, user_id: &str) -> Result<GeneratedImage> {
        loop {
            let now = self.clock.now();
            if session.is_expired(now) {
                let elapsed = session.elapsed(now);
                warn!(
                    job_id = %session.job.job_id,
                    polls = session.polls,
                    last_status = ?session.job.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "polling timed out"
                );
                return Err(JobError::Timeout {
                    job_id: session.job.job_id.clone(),
                    elapsed,
                });
            }

            self.clock.sleep(session.interval).await;
            session.polls += 1;

            let signature = self.signer.sign(self.clock.unix_seconds())?;
            let mut query = signature.query_pairs();
            query.push(("user_id", user_id.to_string()));
            query.push(("job_id", session.job.job_id.clone()));

            match self.poll_once(&query).await {
                PollUpdate::Ready(path) => {
                    session.job.status = JobStatus::Succeeded;
                    let url = format!("{}{}", self.config.image_base_url, path);
                    session.job.generate_url = Some(path);
                    return Ok(GeneratedImage {
                        url,
                        job: session.job.clone(),
                        polls: session.polls,
                    });
                }
                PollUpdate::Failed => {
                    session.job.status = JobStatus::Failed;
                    warn!(
                        job_id = %session.job.job_id,
                        polls = session.polls,
                        status = ?session.job.status,
                        "upstream reported failure"
                    );
                    return Err(JobError::JobFailed {
                        job_id: session.job.job_id.clone(),
                    });
                }
                PollUpdate::Pending(status) => {
                    session.job.status = if status.is_some() {
                        JobStatus::Processing
                    } else {
                        JobStatus::Unknown
                    };
                    debug!(
                        job_id = %session.job.job_id,
                        attempt = session.polls,
                        status = status.as_deref().unwrap_or("-"),
                        "job still pending"
                    );
                }
                PollUpdate::Transient(reason) => {
                    warn!(
                        job_id = %session.job.job_id,
                        attempt = session.polls,
                        %reason,
                        "transient poll failure"
                    );
                }
            }
        }
    }

    async fn poll_once(&self, query: &QueryPairs) -> PollUpdate {
        let response = match self.upstream.poll(query).await {
            Ok(response) => response,
            Err(err) => return PollUpdate::Transient(err.to_string()),
        };
        match response.json() {
            Ok(json) => interpret_poll(json),
            Err(err) => PollUpdate::Transient(err.to_string()),
        }
    }
}

/// State of one run, owned by that run alone.
struct Execution {
    state: JobState,
}

impl Execution {
    fn new() -> Self {
        Execution {
            state: JobState::Created,
        }
    }

    fn transition(&mut self, next: JobState) {
        debug_assert!(
            !self.state.is_terminal(),
            "transition {} -> {} out of a terminal state",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "job state change");
        self.state = next;
    }
}

fn excerpt_json(json: &Value) -> String {
    crate::upstream::excerpt(&json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::upstream::UpstreamResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum PollReply {
        Http(UpstreamResponse),
        TransportError,
    }

    impl PollReply {
        fn ok(body: &str) -> Self {
            PollReply::Http(UpstreamResponse::new(200, body))
        }

        fn status(status: u16, body: &str) -> Self {
            PollReply::Http(UpstreamResponse::new(status, body))
        }
    }

    /// Replays scripted replies; the last poll reply repeats forever.
    struct ScriptedUpstream {
        submit_reply: UpstreamResponse,
        poll_replies: Mutex<VecDeque<PollReply>>,
        submits: Mutex<Vec<QueryPairs>>,
        polls: Mutex<Vec<QueryPairs>>,
    }

    impl ScriptedUpstream {
        fn new(submit_reply: &str, poll_replies: &[&str]) -> Self {
            Self::with_status(200, submit_reply, poll_replies)
        }

        fn with_status(status: u16, submit_reply: &str, poll_replies: &[&str]) -> Self {
            let replies = poll_replies.iter().map(|body| PollReply::ok(body)).collect();
            Self::scripted(UpstreamResponse::new(status, submit_reply), replies)
        }

        fn scripted(submit_reply: UpstreamResponse, poll_replies: Vec<PollReply>) -> Self {
            ScriptedUpstream {
                submit_reply,
                poll_replies: Mutex::new(poll_replies.into()),
                submits: Mutex::new(Vec::new()),
                polls: Mutex::new(Vec::new()),
            }
        }

        fn poll_count(&self) -> usize {
            self.polls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn submit(&self, query: &QueryPairs, _body: &TaskBody) -> Result<UpstreamResponse> {
            self.submits.lock().unwrap().push(query.clone());
            Ok(self.submit_reply.clone())
        }

        async fn poll(&self, query: &QueryPairs) -> Result<UpstreamResponse> {
            self.polls.lock().unwrap().push(query.clone());
            let mut replies = self.poll_replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            };
            match reply.unwrap_or_else(|| PollReply::ok(r#"{"code":200,"data":{}}"#)) {
                PollReply::Http(response) => Ok(response),
                PollReply::TransportError => {
                    Err(JobError::Transport("connection reset by peer".to_string()))
                }
            }
        }
    }

    const SUBMITTED: &str = r#"{"code":200,"msg":"ok","data":{"job_id":"job-42"}}"#;
    const PROCESSING: &str = r#"{"code":200,"data":{"status":"processing"}}"#;

    fn runner(upstream: Arc<ScriptedUpstream>, clock: Arc<ManualClock>) -> JobRunner {
        let config = Config {
            image_base_url: "https://img.example/".to_string(),
            ..Config::default()
        };
        JobRunner::new(Arc::new(config), upstream, clock).unwrap()
    }

    #[tokio::test]
    async fn test_succeeds_on_third_poll() {
        let upstream = Arc::new(ScriptedUpstream::new(
            SUBMITTED,
            &[
                PROCESSING,
                PROCESSING,
                r#"{"code":200,"data":{"status":"succeeded","generate_url":"x/y.png"}}"#,
            ],
        ));
        let clock = Arc::new(ManualClock::new(1_700_000_000));

        let image = runner(upstream.clone(), clock.clone())
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap();

        assert_eq!(image.url, "https://img.example/x/y.png");
        assert_eq!(image.job.job_id, "job-42");
        assert_eq!(image.job.status, JobStatus::Succeeded);
        assert_eq!(image.job.generate_url.as_deref(), Some("x/y.png"));
        assert_eq!(image.polls, 3);
        assert_eq!(upstream.poll_count(), 3);
        assert_eq!(clock.now(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_every_call_gets_a_fresh_signature() {
        let upstream = Arc::new(ScriptedUpstream::new(
            SUBMITTED,
            &[PROCESSING, r#"{"code":200,"data":{"generate_url":"a.png"}}"#],
        ));
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        runner(upstream.clone(), clock)
            .run(ImageRequest::new("a cat").with_user_id("caller"))
            .await
            .unwrap();

        let submits = upstream.submits.lock().unwrap();
        let polls = upstream.polls.lock().unwrap();
        let nonce = |query: &QueryPairs| query[2].1.clone();
        let mut nonces: Vec<String> = submits.iter().chain(polls.iter()).map(nonce).collect();
        assert_eq!(nonces.len(), 3);
        nonces.dedup();
        assert_eq!(nonces.len(), 3);

        let names: Vec<&str> = polls[0].iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            ["app_id", "t", "nonce", "sign", "secret_key", "user_id", "job_id"]
        );
        assert_eq!(polls[0][5].1, "caller");
        assert_eq!(polls[0][6].1, "job-42");
        // Timestamps follow the clock: first poll happens after one interval.
        assert_eq!(submits[0][1].1, "1700000000");
        assert_eq!(polls[0][1].1, "1700000003");
    }

    #[tokio::test]
    async fn test_times_out_when_always_processing() {
        let upstream = Arc::new(ScriptedUpstream::new(SUBMITTED, &[PROCESSING]));
        let clock = Arc::new(ManualClock::new(0));
        let runner = runner(upstream.clone(), clock.clone());
        let timeout = runner.config().poll_timeout;
        let interval = runner.config().poll_interval;

        let err = runner.run(ImageRequest::new("a cat")).await.unwrap_err();
        match err {
            JobError::Timeout { job_id, elapsed } => {
                assert_eq!(job_id, "job-42");
                assert!(elapsed >= timeout);
                assert!(elapsed <= timeout + interval);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(clock.now() >= timeout);
        assert!(clock.now() <= timeout + interval);
        assert_eq!(upstream.poll_count(), 80);
    }

    #[tokio::test]
    async fn test_transient_replies_prolong_polling() {
        let upstream = Arc::new(ScriptedUpstream::new(
            SUBMITTED,
            &[
                "<html>502 Bad Gateway</html>",
                r#"{"code":500,"msg":"busy"}"#,
                r#"{"code":"weird"}"#,
                r#"{"code":200}"#,
                r#"{"code":200,"data":{"generate_url":"done.png"}}"#,
            ],
        ));
        let clock = Arc::new(ManualClock::new(0));
        let image = runner(upstream.clone(), clock)
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap();
        assert_eq!(image.url, "https://img.example/done.png");
        assert_eq!(image.polls, 5);
    }

    #[tokio::test]
    async fn test_non_200_and_transport_errors_are_transient() {
        let upstream = Arc::new(ScriptedUpstream::scripted(
            UpstreamResponse::new(200, SUBMITTED),
            vec![
                // A usable body behind a failing status must not count as success.
                PollReply::status(503, r#"{"code":200,"data":{"generate_url":"early.png"}}"#),
                PollReply::TransportError,
                PollReply::ok(r#"{"code":200,"data":{"generate_url":"ok.png"}}"#),
            ],
        ));
        let clock = Arc::new(ManualClock::new(0));
        let image = runner(upstream.clone(), clock.clone())
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap();
        assert_eq!(image.url, "https://img.example/ok.png");
        assert_eq!(image.job.generate_url.as_deref(), Some("ok.png"));
        assert_eq!(image.polls, 3);
        assert_eq!(upstream.poll_count(), 3);
        assert_eq!(clock.now(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_failed_status_stops_polling() {
        let upstream = Arc::new(ScriptedUpstream::new(
            SUBMITTED,
            &[PROCESSING, r#"{"code":200,"data":{"status":"failed"}}"#, PROCESSING],
        ));
        let clock = Arc::new(ManualClock::new(0));
        let err = runner(upstream.clone(), clock)
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::JobFailed { ref job_id } if job_id == "job-42"));
        assert_eq!(upstream.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_html_submission_reply_is_upstream_error() {
        let upstream = Arc::new(ScriptedUpstream::new("<html>Error</html>", &[PROCESSING]));
        let clock = Arc::new(ManualClock::new(0));
        let err = runner(upstream.clone(), clock)
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap_err();
        match err {
            JobError::Upstream { status, excerpt } => {
                assert_eq!(status, 200);
                assert!(excerpt.contains("<html>Error</html>"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(upstream.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_non_200_submission_is_upstream_error() {
        let upstream = Arc::new(ScriptedUpstream::with_status(
            403,
            r#"{"code":403,"msg":"forbidden"}"#,
            &[PROCESSING],
        ));
        let clock = Arc::new(ManualClock::new(0));
        let err = runner(upstream.clone(), clock)
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Upstream { status: 403, .. }));
        assert_eq!(upstream.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_code_is_submission_error_without_polling() {
        let upstream = Arc::new(ScriptedUpstream::new(
            r#"{"code":500,"msg":"bad request"}"#,
            &[PROCESSING],
        ));
        let clock = Arc::new(ManualClock::new(0));
        let err = runner(upstream.clone(), clock.clone())
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap_err();
        match err {
            JobError::Submission(reason) => assert_eq!(reason, "bad request"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(upstream.poll_count(), 0);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_job_id_is_submission_error() {
        let upstream = Arc::new(ScriptedUpstream::new(r#"{"code":200,"data":{}}"#, &[PROCESSING]));
        let clock = Arc::new(ManualClock::new(0));
        let err = runner(upstream.clone(), clock)
            .run(ImageRequest::new("a cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Submission(ref raw) if raw.contains("\"code\":200")));
        assert_eq!(upstream.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        use crate::upstream::HttpUpstream;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/task"))
            .and(query_param("app_id", "chatsweetie"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SUBMITTED))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/task"))
            .and(query_param("job_id", "job-42"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PROCESSING))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/task"))
            .and(query_param("job_id", "job-42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"code":200,"data":{"generate_url":"out/1.png"}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            upstream_base_url: format!("{}/v1", server.uri()),
            image_base_url: "https://img.example/".to_string(),
            ..Config::default()
        };
        let upstream = HttpUpstream::new(&config).unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let runner = JobRunner::new(Arc::new(config), Arc::new(upstream), clock).unwrap();

        let image = runner.run(ImageRequest::new("a cat")).await.unwrap();
        assert_eq!(image.url, "https://img.example/out/1.png");
        assert_eq!(image.polls, 3);
    }

    #[test]
    fn test_interpret_poll() {
        use serde_json::json;
        assert_eq!(
            interpret_poll(json!({"code":200,"data":{"status":"failed","generate_url":"a.png"}})),
            PollUpdate::Ready("a.png".to_string())
        );
        assert_eq!(
            interpret_poll(json!({"code":200,"data":{"status":"failed"}})),
            PollUpdate::Failed
        );
        assert_eq!(
            interpret_poll(json!({"code":200,"data":{"status":"queued","generate_url":""}})),
            PollUpdate::Pending(Some("queued".to_string()))
        );
        assert_eq!(
            interpret_poll(json!({"code":200,"data":null})),
            PollUpdate::Pending(None)
        );
        assert!(matches!(
            interpret_poll(json!({"code":401,"data":{"status":"failed"}})),
            PollUpdate::Transient(_)
        ));
        assert!(matches!(interpret_poll(json!([1, 2])), PollUpdate::Transient(_)));
    }

    #[test]
    fn test_session_deadline() {
        let session = PollingSession::new(
            Job::new("j".to_string()),
            Duration::from_secs(10),
            Duration::from_secs(240),
            Duration::from_secs(3),
        );
        assert_eq!(session.deadline, Duration::from_secs(250));
        assert!(!session.is_expired(Duration::from_secs(249)));
        assert!(session.is_expired(Duration::from_secs(250)));
        assert_eq!(session.elapsed(Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Polling.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert_eq!(JobState::TimedOut.to_string(), "timed_out");
    }
}
