//! Chat channel client interface and an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::ChannelError;
use crate::types::{MessageRef, Notice};

/// Primitives the lifecycle needs from the chat platform.
#[async_trait]
pub trait ChannelClient: Send + Sync {
  /// Post a notice and return a reference usable for pinning.
  async fn post(&self, destination: &str, notice: &Notice) -> Result<MessageRef, ChannelError>;

  async fn pin(&self, destination: &str, message: &MessageRef) -> Result<(), ChannelError>;

  /// Timestamp of the most recently posted pinned message, if any.
  async fn last_pin_timestamp(&self, destination: &str) -> Result<Option<DateTime<Utc>>, ChannelError>;
}

/// One message as seen by [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
  pub destination: String,
  pub notice: Notice,
  pub ts: DateTime<Utc>,
  pub pinned: bool,
}

#[derive(Default)]
struct MemoryChannelState {
  messages: Vec<PostedMessage>,
  /// Pins made outside this client (a person pinning a status update).
  external_pins: HashMap<String, DateTime<Utc>>,
  failing_posts: HashSet<String>,
  failing_pins: HashSet<String>,
  failing_lookups: HashSet<String>,
  delays: HashMap<String, Duration>,
}

/// Channel client that records every post and pin in memory.
///
/// Failures and latency can be injected per destination.
pub struct MemoryChannel {
  clock: Arc<dyn Clock>,
  state: Mutex<MemoryChannelState>,
}

impl Default for MemoryChannel {
  fn default() -> Self {
    Self::new(Arc::new(SystemClock))
  }
}

impl MemoryChannel {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      clock,
      state: Mutex::new(MemoryChannelState::default()),
    }
  }

  pub async fn fail_posts_to(&self, destination: &str) {
    self.state.lock().await.failing_posts.insert(destination.to_string());
  }

  pub async fn fail_pins_to(&self, destination: &str) {
    self.state.lock().await.failing_pins.insert(destination.to_string());
  }

  pub async fn fail_pin_lookups_for(&self, destination: &str) {
    self.state.lock().await.failing_lookups.insert(destination.to_string());
  }

  /// Make every post to `destination` take `delay` before it lands.
  pub async fn delay_posts_to(&self, destination: &str, delay: Duration) {
    self.state.lock().await.delays.insert(destination.to_string(), delay);
  }

  /// Record a pin made by someone else at `ts`.
  pub async fn pin_external(&self, destination: &str, ts: DateTime<Utc>) {
    self
      .state
      .lock()
      .await
      .external_pins
      .insert(destination.to_string(), ts);
  }

  pub async fn messages(&self) -> Vec<PostedMessage> {
    self.state.lock().await.messages.clone()
  }

  pub async fn messages_to(&self, destination: &str) -> Vec<PostedMessage> {
    self
      .state
      .lock()
      .await
      .messages
      .iter()
      .filter(|m| m.destination == destination)
      .cloned()
      .collect()
  }
}

#[async_trait]
impl ChannelClient for MemoryChannel {
  async fn post(&self, destination: &str, notice: &Notice) -> Result<MessageRef, ChannelError> {
    let delay = self.state.lock().await.delays.get(destination).copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let mut state = self.state.lock().await;
    if state.failing_posts.contains(destination) {
      return Err(ChannelError::Rejected {
        destination: destination.to_string(),
        reason: "post refused".into(),
      });
    }

    let ts = self.clock.now();
    state.messages.push(PostedMessage {
      destination: destination.to_string(),
      notice: notice.clone(),
      ts,
      pinned: false,
    });
    debug!(destination, title = %notice.title, "message posted");
    Ok(MessageRef {
      channel: destination.to_string(),
      ts,
    })
  }

  async fn pin(&self, destination: &str, message: &MessageRef) -> Result<(), ChannelError> {
    let mut state = self.state.lock().await;
    if state.failing_pins.contains(destination) {
      return Err(ChannelError::Rejected {
        destination: destination.to_string(),
        reason: "pin refused".into(),
      });
    }

    let posted = state
      .messages
      .iter_mut()
      .rev()
      .find(|m| m.destination == message.channel && m.ts == message.ts)
      .ok_or_else(|| ChannelError::UnknownDestination(message.channel.clone()))?;
    posted.pinned = true;
    Ok(())
  }

  async fn last_pin_timestamp(&self, destination: &str) -> Result<Option<DateTime<Utc>>, ChannelError> {
    let state = self.state.lock().await;
    if state.failing_lookups.contains(destination) {
      return Err(ChannelError::Other(format!("pins unavailable for {}", destination)));
    }

    let own = state
      .messages
      .iter()
      .filter(|m| m.destination == destination && m.pinned)
      .map(|m| m.ts)
      .max();
    let external = state.external_pins.get(destination).copied();
    Ok(own.max(external))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use chrono::TimeZone;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  #[tokio::test]
  async fn post_then_pin_is_visible_as_last_pin() {
    let clock = Arc::new(ManualClock::new(t0()));
    let channel = MemoryChannel::new(clock.clone());
    let notice = Notice::new("status", "all good");

    assert_eq!(channel.last_pin_timestamp("C1").await.unwrap(), None);

    let msg = channel.post("C1", &notice).await.unwrap();
    assert_eq!(channel.last_pin_timestamp("C1").await.unwrap(), None);

    channel.pin("C1", &msg).await.unwrap();
    assert_eq!(channel.last_pin_timestamp("C1").await.unwrap(), Some(t0()));
  }

  #[tokio::test]
  async fn external_pin_wins_when_newer() {
    let clock = Arc::new(ManualClock::new(t0()));
    let channel = MemoryChannel::new(clock);
    let msg = channel.post("C1", &Notice::new("a", "")).await.unwrap();
    channel.pin("C1", &msg).await.unwrap();

    let later = t0() + chrono::TimeDelta::minutes(30);
    channel.pin_external("C1", later).await;
    assert_eq!(channel.last_pin_timestamp("C1").await.unwrap(), Some(later));
  }

  #[tokio::test]
  async fn injected_post_failure_records_nothing() {
    let channel = MemoryChannel::default();
    channel.fail_posts_to("C1").await;
    assert!(channel.post("C1", &Notice::new("a", "")).await.is_err());
    assert!(channel.messages().await.is_empty());
  }
}
