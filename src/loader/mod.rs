//! Async data loading with cached values and observable state.
//!
//! This module provides:
//! - `DataLoader<T>`: a single cached value with a staleness window, refreshed on demand
//! - `LoadingState`: the same loading/error bookkeeping without a retained value
//! - `retry`: timeouts, exponential backoff and bounded parallelism for flaky backends
//!
//! Every observable field is published on its own `tokio::sync::watch` channel, so a
//! front end can react to `loading` flipping without being woken for value changes.

mod data_loader;
pub mod retry;
mod tracker;

pub use data_loader::{CommitPolicy, DataLoader};
pub use retry::RetryPolicy;
pub use tracker::LoadingState;

use tokio::sync::watch;

/// Publish `new` only if it differs from the current value.
fn set_if_changed<V: PartialEq>(tx: &watch::Sender<V>, new: V) {
  tx.send_if_modified(|current| {
    if *current == new {
      false
    } else {
      *current = new;
      true
    }
  });
}

/// Human readable description of a failure, with a fixed fallback for empty messages.
fn describe_failure<E: std::fmt::Display>(error: &E, fallback: &str) -> String {
  let message = error.to_string();
  if message.trim().is_empty() {
    fallback.to_string()
  } else {
    message
  }
}
