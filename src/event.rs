use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Application events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick for refreshing the project
  Tick,
  /// Ctrl-C or termination requested
  Quit,
}

/// Event handler that produces events from a tick timer and Ctrl-C
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate.
  ///
  /// The first tick fires immediately.
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn tick timer
    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    // Spawn Ctrl-C listener
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        debug!("ctrl-c received");
        let _ = tx.send(Event::Quit);
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_ticks_at_rate() {
    let mut events = EventHandler::new(Duration::from_secs(10));

    assert_eq!(events.next().await, Some(Event::Tick));
    let before = tokio::time::Instant::now();
    assert_eq!(events.next().await, Some(Event::Tick));
    assert_eq!(before.elapsed(), Duration::from_secs(10));
  }
}
