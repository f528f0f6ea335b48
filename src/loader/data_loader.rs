//! A single cached value with a staleness window and observable loading state.

use serde::Deserialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error};

use super::{describe_failure, set_if_changed};

/// How long a fetched value is reused before `load` fetches again.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

const FALLBACK_ERROR: &str = "Failed to load data";

/// Decides which settled fetch may write into the loader when loads overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitPolicy {
  /// Only the most recently started fetch commits its value, error and loading flag.
  /// Results of superseded fetches are handed back to their own caller and dropped.
  #[default]
  LatestRequest,
  /// Every fetch commits when it settles; the cached value is whichever fetch finished last.
  LastSettled,
}

/// Cached data loader.
///
/// `DataLoader<T>` holds at most one value. `load` returns it directly while it is
/// fresh and calls the supplied fetcher otherwise. Failures never escape `load`:
/// they are recorded in `error()` and the call resolves to `None`, leaving the
/// previous value in place so it can be shown next to the error.
///
/// All methods take `&self`; share a loader behind an `Arc` to drive it from
/// several tasks.
pub struct DataLoader<T> {
  value: watch::Sender<Option<T>>,
  loading: watch::Sender<bool>,
  error: watch::Sender<Option<String>>,
  fetched_at: watch::Sender<Option<Instant>>,
  stale_time: Duration,
  policy: CommitPolicy,
  /// Id of the most recently started fetch
  latest_request: AtomicU64,
}

impl<T: Clone> DataLoader<T> {
  /// Create an empty loader with the default five minute stale time.
  pub fn new() -> Self {
    Self {
      value: watch::Sender::new(None),
      loading: watch::Sender::new(false),
      error: watch::Sender::new(None),
      fetched_at: watch::Sender::new(None),
      stale_time: DEFAULT_STALE_TIME,
      policy: CommitPolicy::default(),
      latest_request: AtomicU64::new(0),
    }
  }

  /// Set how long a fetched value stays fresh.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Set how overlapping fetches are committed.
  pub fn with_policy(mut self, policy: CommitPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn stale_time(&self) -> Duration {
    self.stale_time
  }

  /// The last successfully fetched value.
  pub fn value(&self) -> Option<T> {
    self.value.borrow().clone()
  }

  pub fn is_loading(&self) -> bool {
    *self.loading.borrow()
  }

  /// Description of the last failed fetch, cleared whenever a new fetch starts.
  pub fn error(&self) -> Option<String> {
    self.error.borrow().clone()
  }

  /// When the current value was fetched, `None` if never or since `invalidate`.
  pub fn fetched_at(&self) -> Option<Instant> {
    *self.fetched_at.borrow()
  }

  /// True when nothing was fetched yet or the last fetch is older than the stale time.
  pub fn is_stale(&self) -> bool {
    match self.fetched_at() {
      Some(at) => at.elapsed() > self.stale_time,
      None => true,
    }
  }

  pub fn subscribe_value(&self) -> watch::Receiver<Option<T>> {
    self.value.subscribe()
  }

  pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
    self.loading.subscribe()
  }

  pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
    self.error.subscribe()
  }

  /// Staleness is derived from this timestamp; watch it to re-evaluate `is_stale`.
  pub fn subscribe_fetched_at(&self) -> watch::Receiver<Option<Instant>> {
    self.fetched_at.subscribe()
  }

  /// Return the cached value, fetching a new one when needed.
  ///
  /// 1. Cached, fresh and not forced: return the cached value without calling `fetcher`
  /// 2. Otherwise mark loading, clear the error and await `fetcher`
  /// 3. On success store the value and its fetch time; on failure record the error
  ///
  /// The loading flag is cleared however the call ends, including when the
  /// returned future is dropped before completion.
  pub async fn load<F, Fut, E>(&self, fetcher: F, force_refresh: bool) -> Option<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
  {
    if !force_refresh && !self.is_stale() {
      if let Some(cached) = self.value() {
        debug!("data loader cache hit");
        return Some(cached);
      }
    }

    let request = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(request, force_refresh, "data loader fetching");

    set_if_changed(&self.loading, true);
    set_if_changed(&self.error, None);
    let _settle = Settle {
      loader: self,
      request,
    };

    let result = fetcher().await;
    let commits = self.commits(request);

    match result {
      Ok(data) => {
        if commits {
          self.value.send_replace(Some(data.clone()));
          self.fetched_at.send_replace(Some(Instant::now()));
        } else {
          debug!(request, "discarding superseded fetch result");
        }
        Some(data)
      }
      Err(e) => {
        let message = describe_failure(&e, FALLBACK_ERROR);
        error!(request, error = %message, "data loading failed");
        if commits {
          set_if_changed(&self.error, Some(message));
        }
        None
      }
    }
  }

  /// Force the next `load` to fetch. The current value stays visible meanwhile.
  pub fn invalidate(&self) {
    set_if_changed(&self.fetched_at, None);
  }

  /// Return to the initial empty state.
  ///
  /// Under `CommitPolicy::LatestRequest` fetches still in flight are superseded and
  /// will not write into the loader when they settle.
  pub fn reset(&self) {
    self.latest_request.fetch_add(1, Ordering::SeqCst);
    self.value.send_replace(None);
    set_if_changed(&self.loading, false);
    set_if_changed(&self.error, None);
    set_if_changed(&self.fetched_at, None);
  }
}

impl<T> DataLoader<T> {
  fn commits(&self, request: u64) -> bool {
    match self.policy {
      CommitPolicy::LastSettled => true,
      CommitPolicy::LatestRequest => self.latest_request.load(Ordering::SeqCst) == request,
    }
  }
}

impl<T: Clone> Default for DataLoader<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DataLoader<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DataLoader")
      .field("value", &*self.value.borrow())
      .field("loading", &*self.loading.borrow())
      .field("error", &*self.error.borrow())
      .field("fetched_at", &*self.fetched_at.borrow())
      .field("stale_time", &self.stale_time)
      .field("policy", &self.policy)
      .finish_non_exhaustive()
  }
}

/// Clears the loading flag when a fetch settles, unwinds or is dropped.
struct Settle<'a, T> {
  loader: &'a DataLoader<T>,
  request: u64,
}

impl<T> Drop for Settle<'_, T> {
  fn drop(&mut self) {
    if self.loader.commits(self.request) {
      set_if_changed(&self.loader.loading, false);
    }
  }
}
