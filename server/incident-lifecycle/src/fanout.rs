//! Concurrent delivery of one notice to several destinations.
//!
//! Each destination runs on its own task: post, then pin the posted message.
//! [`Fanout::deliver`] returns only after every task has settled, so callers
//! that act afterwards (archiving a channel, returning to the requester)
//! never race a delivery still in flight. There is no retry and no deadline.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::ChannelClient;
use crate::error::DeliveryError;
use crate::types::{Destination, MessageRef, Notice};

/// Result of one destination's delivery.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
  pub destination: Destination,
  pub result: Result<MessageRef, DeliveryError>,
}

impl DeliveryOutcome {
  pub fn is_ok(&self) -> bool {
    self.result.is_ok()
  }
}

/// Settled outcomes, in the order destinations were given.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
  pub outcomes: Vec<DeliveryOutcome>,
}

impl FanoutReport {
  pub fn failures(&self) -> impl Iterator<Item = &DeliveryOutcome> {
    self.outcomes.iter().filter(|o| !o.is_ok())
  }

  pub fn failure_count(&self) -> usize {
    self.failures().count()
  }

  pub fn all_delivered(&self) -> bool {
    self.outcomes.iter().all(DeliveryOutcome::is_ok)
  }

  /// First failed primary destination, if any.
  pub fn primary_failure(&self) -> Option<(&Destination, &DeliveryError)> {
    self.outcomes.iter().find_map(|o| match &o.result {
      Err(e) if o.destination.is_primary() => Some((&o.destination, e)),
      _ => None,
    })
  }
}

/// Dispatches notices through a shared [`ChannelClient`].
#[derive(Clone)]
pub struct Fanout {
  client: Arc<dyn ChannelClient>,
}

impl Fanout {
  pub fn new(client: Arc<dyn ChannelClient>) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &Arc<dyn ChannelClient> {
    &self.client
  }

  /// Deliver `notice` to every destination in parallel and wait for all of them.
  pub async fn deliver(&self, notice: &Notice, destinations: &[Destination]) -> FanoutReport {
    if destinations.is_empty() {
      return FanoutReport::default();
    }

    let notice = Arc::new(notice.clone());
    let handles: Vec<_> = destinations
      .iter()
      .cloned()
      .map(|destination| {
        let client = Arc::clone(&self.client);
        let notice = Arc::clone(&notice);
        tokio::spawn(async move { deliver_one(client.as_ref(), &destination, &notice).await })
      })
      .collect();

    let settled = join_all(handles).await;

    let outcomes = destinations
      .iter()
      .cloned()
      .zip(settled)
      .map(|(destination, joined)| {
        let result = joined.unwrap_or_else(|e| Err(DeliveryError::Aborted(e.to_string())));
        if let Err(e) = &result {
          warn!(
            destination = %destination,
            role = ?destination.role,
            error = %e,
            "notice delivery failed"
          );
        }
        DeliveryOutcome { destination, result }
      })
      .collect();

    FanoutReport { outcomes }
  }
}

async fn deliver_one(
  client: &dyn ChannelClient,
  destination: &Destination,
  notice: &Notice,
) -> Result<MessageRef, DeliveryError> {
  let message = client
    .post(&destination.target, notice)
    .await
    .map_err(DeliveryError::Post)?;

  if destination.pin {
    client
      .pin(&destination.target, &message)
      .await
      .map_err(|source| DeliveryError::Pin {
        message: message.clone(),
        source,
      })?;
  }

  debug!(destination = %destination, pinned = destination.pin, "notice delivered");
  Ok(message)
}
