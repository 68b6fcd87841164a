#![allow(non_snake_case)]

use std::env;

use anyhow::Context;
use calendarBot::cli;
use calendarBot::config::{AppConfig, Settings};
use calendarBot::runtime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match env::var("CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::default(),
    };
    let settings = Settings::load(&config).context("Invalid configuration")?;

    match settings.run_mode.as_str() {
        "api" => runtime::run_api(settings).await,
        "cli" => cli::cli(settings).await,
        other => anyhow::bail!("Invalid run mode {}", other),
    }
}
