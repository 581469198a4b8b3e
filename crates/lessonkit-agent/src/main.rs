//! `lessonkit-agent [config.json]`
//!
//! Installs and activates the offline worker, then reads commands from stdin
//! until EOF.

use std::path::PathBuf;

use anyhow::{Context, Result};
use lessonkit_agent::{Agent, AgentConfig};
use lessonkit_common::init_logging;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AgentConfig::default_path);

    let mut config = match &path {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AgentConfig::default(),
    };
    config.apply_env_overrides();

    init_logging(config.log_config().context("invalid logging config")?)?;
    info!(origin = %config.origin, "Starting LessonKit agent...");

    let agent = Agent::with_defaults(config)
        .await
        .context("failed to start agent")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        match agent.execute(&line).await {
            Ok(Some(output)) => {
                stdout.write_all(output.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Command failed"),
        }
    }

    let applied = agent.shutdown().await?;
    info!(applied, "LessonKit agent stopped");
    Ok(())
}
