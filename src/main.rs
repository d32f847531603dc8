use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use reopen_logger::config::{self, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so they never mix with logged lines on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reopen_logger=warn".into()),
        )
        .init();

    let config = Config::load()?;
    if let Some(path) = config::config_file_path() {
        tracing::debug!("Config file: {}", path.display());
    }

    let logger = config.build_logger()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => logger.info(line),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Interrupted, shutting down");
                break;
            }
        }
    }

    logger.close();
    Ok(())
}
