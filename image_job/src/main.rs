// vidsme_bridge/image_job/src/main.rs

use std::process::ExitCode;

use clap::Parser;
use image_job::{Cli, Config, ImageRequest, JobRunner};
use inquire::{Select, Text};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Request from the positional arguments, or asked for interactively when no
/// prompt was given.
fn read_request(cli: Cli, config: &Config) -> Result<ImageRequest, inquire::InquireError> {
    if let Some(prompt) = cli.prompt {
        let mut request = ImageRequest::new(prompt);
        request.model = cli.model;
        request.size = cli.size;
        return Ok(request);
    }

    let prompt = Text::new("Prompt:").prompt()?;
    let model = Select::new("Model:", config.models().to_vec()).prompt()?;
    let sizes: Vec<String> = config.sizes.iter().map(|s| s.name.clone()).collect();
    let default_size = sizes
        .iter()
        .position(|s| *s == config.default_size)
        .unwrap_or(0);
    let size = Select::new("Size:", sizes)
        .with_starting_cursor(default_size)
        .prompt()?;

    Ok(ImageRequest::new(prompt).with_model(model).with_size(size))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match Config::try_from(cli.upstream.clone()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = match read_request(cli, &config) {
        Ok(request) => request,
        Err(e) => {
            error!("input cancelled: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runner = match JobRunner::from_config(config) {
        Ok(runner) => runner,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match runner.run(request).await {
        Ok(image) => {
            println!("{}", image.url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
