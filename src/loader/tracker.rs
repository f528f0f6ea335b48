//! Loading and error state for one-off async calls.

use std::fmt::Display;
use std::future::Future;
use tokio::sync::watch;
use tracing::error;

use super::{describe_failure, set_if_changed};

const FALLBACK_ERROR: &str = "An error occurred";

/// Tracks whether a call is running and how the last one failed.
///
/// Unlike `DataLoader` nothing is retained between calls.
#[derive(Debug)]
pub struct LoadingState {
  loading: watch::Sender<bool>,
  error: watch::Sender<Option<String>>,
}

impl LoadingState {
  pub fn new() -> Self {
    Self {
      loading: watch::Sender::new(false),
      error: watch::Sender::new(None),
    }
  }

  pub fn is_loading(&self) -> bool {
    *self.loading.borrow()
  }

  pub fn error(&self) -> Option<String> {
    self.error.borrow().clone()
  }

  pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
    self.loading.subscribe()
  }

  pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
    self.error.subscribe()
  }

  /// Run `call`, recording its failure instead of returning it.
  pub async fn execute<T, F, Fut, E>(&self, call: F) -> Option<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
  {
    set_if_changed(&self.loading, true);
    set_if_changed(&self.error, None);
    let _done = Done(&self.loading);

    match call().await {
      Ok(result) => Some(result),
      Err(e) => {
        let message = describe_failure(&e, FALLBACK_ERROR);
        error!(error = %message, "call failed");
        set_if_changed(&self.error, Some(message));
        None
      }
    }
  }

  pub fn reset(&self) {
    set_if_changed(&self.loading, false);
    set_if_changed(&self.error, None);
  }
}

impl Default for LoadingState {
  fn default() -> Self {
    Self::new()
  }
}

struct Done<'a>(&'a watch::Sender<bool>);

impl Drop for Done<'_> {
  fn drop(&mut self) {
    set_if_changed(self.0, false);
  }
}
