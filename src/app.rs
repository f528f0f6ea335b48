use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::loader::{LoadingState, RetryPolicy};
use crate::project::{ProgressReport, ProjectStore, SnapshotSource};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Command line choices that shape a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  pub source: Option<String>,
  pub export: Option<PathBuf>,
  pub refresh: Option<Duration>,
}

/// Main application state
pub struct App {
  store: ProjectStore,

  /// Where to write the report as JSON, if anywhere
  export: Option<PathBuf>,

  /// Progress of the last export
  exporter: LoadingState,

  refresh_interval: Duration,

  /// Fingerprint of the last printed snapshot
  last_fingerprint: Option<String>,

  /// Last error shown, so watch mode reports each failure once
  last_error: Option<String>,
}

impl App {
  pub fn new(config: &Config, options: RunOptions) -> Result<Self> {
    let location = config.resolve_source(options.source.as_deref())?;
    let source = SnapshotSource::from_location(
      &location,
      Config::api_token(),
      RetryPolicy::from(config.retry),
    )?;
    info!(source = %source.describe(), "using project source");

    Ok(Self {
      store: ProjectStore::new(source, config.cache.stale_time(), config.cache.policy),
      export: options.export,
      exporter: LoadingState::new(),
      refresh_interval: options.refresh.unwrap_or_else(|| config.refresh_interval()),
      last_fingerprint: None,
      last_error: None,
    })
  }

  /// Load the project once and print its report.
  pub async fn run_once(&mut self) -> Result<()> {
    self.refresh().await;

    match self.store.error() {
      Some(error) if self.store.cached().is_none() => Err(eyre!(error)),
      _ => Ok(()),
    }
  }

  /// Keep printing the report whenever the snapshot changes, until Ctrl-C.
  pub async fn watch(&mut self) -> Result<()> {
    let mut events = EventHandler::new(self.refresh_interval);
    info!(interval_secs = self.refresh_interval.as_secs(), "watching project");

    while let Some(event) = events.next().await {
      match event {
        Event::Tick => self.tick().await,
        Event::Quit => break,
      }
    }

    Ok(())
  }

  /// Watch tick. Once a snapshot is loaded every tick re-reads the source, so
  /// changes show up at the refresh interval even inside the staleness window.
  async fn tick(&mut self) {
    if self.store.cached().is_some() {
      self.store.invalidate();
    }
    self.refresh().await;
  }

  /// Fetch when stale, then print and export if the snapshot changed.
  async fn refresh(&mut self) {
    let Some(snapshot) = self.store.snapshot(false).await else {
      self.show_error();
      return;
    };
    self.last_error = None;

    let fingerprint = match snapshot.fingerprint() {
      Ok(fingerprint) => Some(fingerprint),
      Err(e) => {
        warn!(error = %e, "could not fingerprint snapshot");
        None
      }
    };
    if fingerprint.is_some() && fingerprint == self.last_fingerprint {
      return;
    }
    self.last_fingerprint = fingerprint;

    let report = ProgressReport::from_snapshot(&snapshot);
    println!("{}", report);

    if let Some(path) = &self.export {
      let exported = self
        .exporter
        .execute(|| write_report(path, &report))
        .await;
      match (exported, self.exporter.error()) {
        (Some(()), _) => info!(path = %path.display(), "report exported"),
        (None, Some(error)) => eprintln!("Export failed: {}", error),
        (None, None) => {}
      }
    }
  }

  fn show_error(&mut self) {
    let error = self.store.error();
    if error.is_some() && error != self.last_error {
      if let Some(message) = &error {
        if self.store.cached().is_some() {
          eprintln!("Refresh failed, showing last loaded data: {}", message);
        } else {
          eprintln!("Failed to load project: {}", message);
        }
      }
    }
    self.last_error = error;
  }
}

async fn write_report(path: &Path, report: &ProgressReport) -> Result<()> {
  let json = serde_json::to_vec_pretty(report)
    .map_err(|e| eyre!("Failed to serialize report: {}", e))?;

  tokio::fs::write(path, json)
    .await
    .map_err(|e| eyre!("Failed to write report to {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
  use super::*;

  const SNAPSHOT: &str = "project:\n  id: p-9\n  character: Jinx\nresources:\n  - resourceId: r-1\n    name: Rifle\n    status: completed\n";

  fn app_for(dir: &Path, export: Option<PathBuf>) -> App {
    let source = dir.join("jinx.yaml");
    std::fs::write(&source, SNAPSHOT).unwrap();

    App::new(
      &Config::default(),
      RunOptions {
        source: Some(source.display().to_string()),
        export,
        refresh: None,
      },
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_run_once_exports_report() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("report.json");
    let mut app = app_for(dir.path(), Some(export.clone()));

    app.run_once().await.unwrap();

    let json: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(json["character"], "Jinx");
    assert_eq!(json["percent"], 100);
    assert!(app.last_fingerprint.is_some());
    assert!(!app.exporter.is_loading());
  }

  #[tokio::test]
  async fn test_run_once_fails_without_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(
      &Config::default(),
      RunOptions {
        source: Some(dir.path().join("missing.yaml").display().to_string()),
        ..RunOptions::default()
      },
    )
    .unwrap();

    let err = app.run_once().await.unwrap_err();

    assert!(err.to_string().starts_with("Failed to read snapshot"));
    assert!(app.last_error.is_some());
  }

  #[tokio::test]
  async fn test_export_failure_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("no-such-dir").join("report.json");
    let mut app = app_for(dir.path(), Some(export));

    app.run_once().await.unwrap();

    assert!(app
      .exporter
      .error()
      .is_some_and(|e| e.starts_with("Failed to write report")));
  }

  #[tokio::test]
  async fn test_unchanged_snapshot_is_printed_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = app_for(dir.path(), None);

    app.refresh().await;
    let first = app.last_fingerprint.clone();
    app.store.invalidate();
    app.refresh().await;

    assert!(first.is_some());
    assert_eq!(app.last_fingerprint, first);
  }

  #[tokio::test]
  async fn test_watch_tick_rereads_source_inside_stale_window() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = app_for(dir.path(), None);
    assert_eq!(app.refresh_interval, Duration::from_secs(30));

    app.tick().await;
    let first = app.last_fingerprint.clone();
    std::fs::write(dir.path().join("jinx.yaml"), SNAPSHOT.replace("Jinx", "Vi")).unwrap();
    app.tick().await;

    assert!(first.is_some());
    assert_ne!(app.last_fingerprint, first);
    assert_eq!(app.store.cached().unwrap().project.character, "Vi");
    assert!(app.store.error().is_none());
  }
}
