// vidsme_bridge/image_job/src/lib.rs

//! Signed job submission and bounded polling against the upstream
//! image-generation API.

pub mod args;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod request;
pub mod upstream;

pub use args::{Cli, UpstreamArgs};
pub use clock::{Clock, TokioClock};
pub use config::{Config, SizeOption};
pub use error::{JobError, Result};
pub use job::{GeneratedImage, Job, JobRunner, JobState, JobStatus, PollingSession};
pub use request::{ImageRequest, TaskBody};
pub use upstream::{HttpUpstream, Upstream, UpstreamResponse};
