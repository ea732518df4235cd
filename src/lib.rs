pub mod cli;
pub mod commands;
pub mod config;
pub mod device;
pub mod serial;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::AppSettings;
use device::DeviceError;

pub fn run() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let settings = AppSettings::load_or_default(cli.config.as_deref())
    .map_err(|e| DeviceError::Config(e.to_string()))?;
  init_logging(&settings.log_level);

  device::policy::check_process_policy()?;

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("Failed to start async runtime")?;
  runtime.block_on(commands::dispatch(cli, settings))
}

/// RUST_LOG wins over the configured level
fn init_logging(default_level: &str) {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(default_level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}
