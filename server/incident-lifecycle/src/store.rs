//! Incident persistence interface and an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::types::{Incident, IncidentEdit, IncidentStatus, NewIncident, Severity, StatusUpdate};

/// Upper bound on rows returned by [`IncidentStore::list_active`].
pub const LIST_ACTIVE_LIMIT: usize = 100;

#[async_trait]
pub trait IncidentStore: Send + Sync {
  async fn get(&self, channel_id: &str) -> Result<Incident, StoreError>;

  /// Insert a new `open` incident and return its id.
  async fn insert(&self, incident: &NewIncident) -> Result<i64, StoreError>;

  /// Apply a status write only if the current status is one of `expected`.
  ///
  /// Returns the updated record, or `NoRowsAffected` when the status no
  /// longer matches.
  async fn update_status(
    &self,
    channel_id: &str,
    expected: &[IncidentStatus],
    update: &StatusUpdate,
    now: DateTime<Utc>,
  ) -> Result<Incident, StoreError>;

  /// Apply field edits and return the updated record. Never touches status.
  async fn update_fields(
    &self,
    channel_id: &str,
    edit: &IncidentEdit,
    severity: Option<Severity>,
    now: DateTime<Utc>,
  ) -> Result<Incident, StoreError>;

  /// Set or clear the reminder snooze, only while the status is active.
  async fn set_snooze(
    &self,
    channel_id: &str,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Result<Incident, StoreError>;

  /// Incidents in `open` or `resolved`, at most [`LIST_ACTIVE_LIMIT`].
  async fn list_active(&self) -> Result<Vec<Incident>, StoreError>;
}

/// Store that keeps incidents in memory, keyed by channel.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
  next_id: i64,
  by_channel: HashMap<String, Incident>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a full record as-is (restores and fixtures).
  pub async fn put(&self, incident: Incident) {
    let mut state = self.inner.lock().await;
    state.next_id = state.next_id.max(incident.id);
    state.by_channel.insert(incident.channel_id.clone(), incident);
  }

  /// Drop a record entirely. Incidents are never deleted by the lifecycle
  /// itself; this models a record vanishing underneath a running job.
  pub async fn remove(&self, channel_id: &str) -> Option<Incident> {
    self.inner.lock().await.by_channel.remove(channel_id)
  }

  pub async fn len(&self) -> usize {
    self.inner.lock().await.by_channel.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }
}

#[async_trait]
impl IncidentStore for MemoryStore {
  async fn get(&self, channel_id: &str) -> Result<Incident, StoreError> {
    self
      .inner
      .lock()
      .await
      .by_channel
      .get(channel_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound {
        channel_id: channel_id.to_string(),
      })
  }

  async fn insert(&self, new: &NewIncident) -> Result<i64, StoreError> {
    let mut state = self.inner.lock().await;
    if state.by_channel.contains_key(&new.channel_id) {
      return Err(StoreError::Backend(format!(
        "channel {} already bound to an incident",
        new.channel_id
      )));
    }

    state.next_id += 1;
    let id = state.next_id;
    let incident = Incident {
      id,
      channel_id: new.channel_id.clone(),
      channel_name: new.channel_name.clone(),
      title: new.title.clone(),
      product: new.product.clone(),
      severity: new.severity,
      status: IncidentStatus::Open,
      commander: new.commander.clone(),
      author: new.author.clone(),
      description_started: new.description.clone(),
      description_resolved: String::new(),
      description_cancelled: String::new(),
      root_cause: String::new(),
      meeting_url: new.meeting_url.clone(),
      post_mortem_url: None,
      identification_ts: new.identification_ts,
      start_ts: None,
      end_ts: None,
      snoozed_until: None,
      updated_at: Some(new.identification_ts),
    };
    state.by_channel.insert(incident.channel_id.clone(), incident);
    debug!(incident_id = id, channel_id = %new.channel_id, "incident inserted");
    Ok(id)
  }

  async fn update_status(
    &self,
    channel_id: &str,
    expected: &[IncidentStatus],
    update: &StatusUpdate,
    now: DateTime<Utc>,
  ) -> Result<Incident, StoreError> {
    let mut state = self.inner.lock().await;
    let incident = state
      .by_channel
      .get_mut(channel_id)
      .filter(|inc| expected.contains(&inc.status))
      .ok_or_else(|| StoreError::NoRowsAffected {
        channel_id: channel_id.to_string(),
      })?;

    match update {
      StatusUpdate::Cancel { description } => {
        incident.description_cancelled = description.clone();
      }
      StatusUpdate::Resolve { description, end_ts } => {
        incident.description_resolved = description.clone();
        incident.end_ts = Some(*end_ts);
      }
      StatusUpdate::Close {
        root_cause,
        severity,
        start_ts,
      } => {
        incident.root_cause = root_cause.clone();
        if let Some(sev) = severity {
          incident.severity = *sev;
        }
        if let Some(ts) = start_ts {
          incident.start_ts = Some(*ts);
        }
      }
    }
    incident.status = update.target();
    incident.updated_at = Some(now);
    Ok(incident.clone())
  }

  async fn update_fields(
    &self,
    channel_id: &str,
    edit: &IncidentEdit,
    severity: Option<Severity>,
    now: DateTime<Utc>,
  ) -> Result<Incident, StoreError> {
    let mut state = self.inner.lock().await;
    let incident = state
      .by_channel
      .get_mut(channel_id)
      .ok_or_else(|| StoreError::NoRowsAffected {
        channel_id: channel_id.to_string(),
      })?;

    if let Some(v) = &edit.title {
      incident.title = v.clone();
    }
    if let Some(v) = &edit.product {
      incident.product = v.clone();
    }
    if let Some(sev) = severity {
      incident.severity = sev;
    }
    if let Some(v) = &edit.commander {
      incident.commander = v.clone();
    }
    if let Some(v) = &edit.meeting_url {
      incident.meeting_url = Some(v.clone()).filter(|s| !s.is_empty());
    }
    if let Some(v) = &edit.post_mortem_url {
      incident.post_mortem_url = Some(v.clone()).filter(|s| !s.is_empty());
    }
    if let Some(ts) = edit.start_ts {
      incident.start_ts = Some(ts);
    }
    if let Some(v) = &edit.root_cause {
      incident.root_cause = v.clone();
    }
    if let Some(v) = &edit.description {
      incident.description_started = v.clone();
    }
    incident.updated_at = Some(now);
    Ok(incident.clone())
  }

  async fn set_snooze(
    &self,
    channel_id: &str,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Result<Incident, StoreError> {
    let mut state = self.inner.lock().await;
    let incident = state
      .by_channel
      .get_mut(channel_id)
      .filter(|inc| inc.status.is_active())
      .ok_or_else(|| StoreError::NoRowsAffected {
        channel_id: channel_id.to_string(),
      })?;
    incident.snoozed_until = until;
    incident.updated_at = Some(now);
    Ok(incident.clone())
  }

  async fn list_active(&self) -> Result<Vec<Incident>, StoreError> {
    let state = self.inner.lock().await;
    let mut active: Vec<Incident> = state
      .by_channel
      .values()
      .filter(|inc| inc.status.is_active())
      .cloned()
      .collect();
    active.sort_by_key(|inc| inc.id);
    active.truncate(LIST_ACTIVE_LIMIT);
    Ok(active)
  }
}
