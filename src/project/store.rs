//! Project store that serves snapshots through a `DataLoader`.

use std::time::Duration;

use crate::loader::{CommitPolicy, DataLoader};

use super::report::ProgressReport;
use super::source::SnapshotSource;
use super::types::ProjectSnapshot;

/// Snapshot access with transparent caching.
///
/// Wraps a `SnapshotSource` and reuses the last snapshot until it goes stale.
/// Failed fetches keep the previous snapshot available alongside `error()`.
pub struct ProjectStore {
  source: SnapshotSource,
  loader: DataLoader<ProjectSnapshot>,
}

impl ProjectStore {
  pub fn new(source: SnapshotSource, stale_time: Duration, policy: CommitPolicy) -> Self {
    Self {
      source,
      loader: DataLoader::new()
        .with_stale_time(stale_time)
        .with_policy(policy),
    }
  }

  pub fn source(&self) -> &SnapshotSource {
    &self.source
  }

  /// Current snapshot, fetched if missing, stale or `force` is set.
  pub async fn snapshot(&self, force: bool) -> Option<ProjectSnapshot> {
    self.loader.load(|| self.source.fetch(), force).await
  }

  /// Progress report for the current snapshot.
  pub async fn report(&self, force: bool) -> Option<ProgressReport> {
    self
      .snapshot(force)
      .await
      .map(|snapshot| ProgressReport::from_snapshot(&snapshot))
  }

  /// Snapshot from the last successful fetch, without fetching.
  pub fn cached(&self) -> Option<ProjectSnapshot> {
    self.loader.value()
  }

  pub fn invalidate(&self) {
    self.loader.invalidate();
  }

  pub fn error(&self) -> Option<String> {
    self.loader.error()
  }

  pub fn is_loading(&self) -> bool {
    self.loader.is_loading()
  }

  pub fn is_stale(&self) -> bool {
    self.loader.is_stale()
  }
}
