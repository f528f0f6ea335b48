use clap::Parser;
use cosplan::{app, config};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cosplan")]
#[command(about = "Progress tracking for cosplay projects")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cosplan/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Project snapshot: a YAML/JSON file or an http(s) URL
  #[arg(short, long)]
  source: Option<String>,

  /// Keep running and print the report whenever the project changes
  #[arg(short, long)]
  watch: bool,

  /// Seconds between refreshes in watch mode
  #[arg(short, long)]
  refresh: Option<u64>,

  /// Also write the report as JSON to this file
  #[arg(short, long)]
  export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _log_guard = init_logging();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let options = app::RunOptions {
    source: args.source,
    export: args.export,
    refresh: args.refresh.map(Duration::from_secs),
  };

  let mut app = app::App::new(&config, options)?;
  if args.watch {
    app.watch().await?;
  } else {
    app.run_once().await?;
  }

  Ok(())
}

/// Log to $XDG_DATA_HOME/cosplan/cosplan.log so stdout only carries the report.
///
/// Without a writable log directory the run continues with logging disabled.
fn init_logging() -> Option<WorkerGuard> {
  let appender = match log_appender() {
    Ok(appender) => appender,
    Err(e) => {
      eprintln!("Warning: file logging disabled: {}", e);
      return None;
    }
  };
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cosplan=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Some(guard)
}

fn log_appender() -> Result<RollingFileAppender> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("cosplan");

  open_log(&log_dir)
}

fn open_log(log_dir: &Path) -> Result<RollingFileAppender> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  RollingFileAppender::builder()
    .rotation(Rotation::NEVER)
    .filename_prefix("cosplan.log")
    .build(log_dir)
    .map_err(|e| eyre!("Failed to open log file in {}: {}", log_dir.display(), e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_open_log_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("cosplan");

    open_log(&log_dir).unwrap();

    assert!(log_dir.join("cosplan.log").exists());
  }

  #[test]
  fn test_open_log_fails_when_directory_cannot_be_created() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();

    let err = open_log(&blocker.join("cosplan")).unwrap_err();

    assert!(err.to_string().starts_with("Failed to create log directory"));
  }
}
