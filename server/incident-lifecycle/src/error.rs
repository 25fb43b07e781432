//! Structured error types for the lifecycle core.

use thiserror::Error;

use crate::types::{Incident, IncidentStatus, MessageRef};

/// Failures reported by an [`crate::store::IncidentStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
  #[error("incident not found for channel {channel_id}")]
  NotFound { channel_id: String },

  #[error("no rows affected for channel {channel_id}")]
  NoRowsAffected { channel_id: String },

  #[error("store: {0}")]
  Backend(String),
}

/// Failures reported by a [`crate::channel::ChannelClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
  #[error("destination not found: {0}")]
  UnknownDestination(String),

  #[error("{destination} rejected the request: {reason}")]
  Rejected { destination: String, reason: String },

  #[error("{0}")]
  Other(String),
}

/// Failure of one destination inside a fan-out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
  #[error("post failed: {0}")]
  Post(#[source] ChannelError),

  /// The message stays posted; only the pin is missing.
  #[error("pin failed for message at {}: {source}", .message.ts)]
  Pin {
    message: MessageRef,
    #[source]
    source: ChannelError,
  },

  #[error("delivery task aborted: {0}")]
  Aborted(String),
}

/// Errors surfaced by transition operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("incident not found for channel {channel_id}")]
  NotFound { channel_id: String },

  #[error("incident {channel_id} is already `{current}`; it cannot become `{attempted}`")]
  InvalidTransition {
    channel_id: String,
    current: IncidentStatus,
    attempted: IncidentStatus,
  },

  #[error("persistence: {0}")]
  Persistence(#[source] StoreError),

  /// The transition was committed but the incident channel never got the notice.
  #[error("incident {} updated but delivery to {destination} failed: {source}", .incident.channel_id)]
  Delivery {
    incident: Box<Incident>,
    destination: String,
    #[source]
    source: DeliveryError,
  },
}

impl LifecycleError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  /// The incident as stored after the transition, when it was committed.
  pub fn committed_incident(&self) -> Option<&Incident> {
    match self {
      Self::Delivery { incident, .. } => Some(incident),
      _ => None,
    }
  }
}

impl From<StoreError> for LifecycleError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound { channel_id } => Self::NotFound { channel_id },
      other => Self::Persistence(other),
    }
  }
}

/// Errors inside a reminder firing. Never terminate the job.
#[derive(Debug, Error)]
pub enum ReminderError {
  #[error("reload: {0}")]
  Store(#[from] StoreError),

  #[error("last pin: {0}")]
  Channel(#[from] ChannelError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("config: {var}={value:?}: {reason}")]
  Invalid {
    var: String,
    value: String,
    reason: String,
  },
}

impl ConfigError {
  pub fn invalid(var: &str, value: &str, reason: impl Into<String>) -> Self {
    Self::Invalid {
      var: var.to_string(),
      value: value.to_string(),
      reason: reason.into(),
    }
  }
}
