//! Status transition rules and input validation.

use chrono::{DateTime, Utc};

use crate::error::LifecycleError;
use crate::types::{IncidentDraft, IncidentStatus, NewIncident, Severity};

/// Legal edges of the lifecycle graph.
pub fn is_allowed(from: IncidentStatus, to: IncidentStatus) -> bool {
  use IncidentStatus::*;
  matches!(
    (from, to),
    (Open, Resolved) | (Open, Canceled) | (Open, Closed) | (Resolved, Closed)
  )
}

/// Statuses from which `to` may be reached.
pub fn sources_of(to: IncidentStatus) -> &'static [IncidentStatus] {
  use IncidentStatus::*;
  match to {
    Resolved | Canceled => &[Open],
    Closed => &[Open, Resolved],
    Open => &[],
  }
}

/// Check an edge for the incident bound to `channel_id`.
pub fn check(
  channel_id: &str,
  current: IncidentStatus,
  attempted: IncidentStatus,
) -> Result<(), LifecycleError> {
  if is_allowed(current, attempted) {
    Ok(())
  } else {
    Err(LifecycleError::InvalidTransition {
      channel_id: channel_id.to_string(),
      current,
      attempted,
    })
  }
}

/// Validate a draft and stamp it with the identification timestamp.
pub fn validate_draft(draft: &IncidentDraft, now: DateTime<Utc>) -> Result<NewIncident, LifecycleError> {
  let channel_id = required("channel_id", &draft.channel_id)?;
  let title = required("title", &draft.title)?;
  let description = required("description", &draft.description)?;
  let commander = required("commander", &draft.commander)?;
  let author = required("author", &draft.author)?;

  let severity = match draft.severity_level {
    Some(level) => Severity::from_level(level)
      .ok_or_else(|| LifecycleError::validation("severity_level", "expected 0..=3"))?,
    None => return Err(LifecycleError::validation("severity_level", "must be set")),
  };

  let channel_name = if draft.channel_name.trim().is_empty() {
    channel_id.clone()
  } else {
    draft.channel_name.trim().to_string()
  };

  Ok(NewIncident {
    channel_id,
    channel_name,
    title,
    product: draft.product.trim().to_string(),
    severity,
    commander,
    author,
    description,
    meeting_url: non_empty(draft.meeting_url.as_deref()),
    identification_ts: now,
  })
}

/// Parse an optional severity level supplied with close/edit.
pub fn parse_severity(level: Option<i64>) -> Result<Option<Severity>, LifecycleError> {
  level
    .map(|l| Severity::from_level(l).ok_or_else(|| LifecycleError::validation("severity_level", "expected 0..=3")))
    .transpose()
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, LifecycleError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(LifecycleError::validation(field, "must not be empty"));
  }
  Ok(trimmed.to_string())
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
  value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
