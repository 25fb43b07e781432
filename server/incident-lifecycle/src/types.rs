//! Core types for the incident lifecycle (records, transition inputs, delivery targets).

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::clock;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
  Open,
  Resolved,
  Closed,
  Canceled,
}

impl IncidentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Resolved => "resolved",
      Self::Closed => "closed",
      Self::Canceled => "canceled",
    }
  }

  /// `closed` and `canceled` are final.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Closed | Self::Canceled)
  }

  /// Statuses that keep a reminder job alive.
  pub fn is_active(self) -> bool {
    matches!(self, Self::Open | Self::Resolved)
  }
}

impl fmt::Display for IncidentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Sev0,
  Sev1,
  Sev2,
  Sev3,
}

impl Severity {
  pub fn from_level(level: i64) -> Option<Self> {
    match level {
      0 => Some(Self::Sev0),
      1 => Some(Self::Sev1),
      2 => Some(Self::Sev2),
      3 => Some(Self::Sev3),
      _ => None,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Sev0 => "SEV0 - All hands on deck",
      Self::Sev1 => "SEV1 - Critical impact to many users",
      Self::Sev2 => "SEV2 - Minor issue that impacts ability to use product",
      Self::Sev3 => "SEV3 - Minor issue not impacting ability to use product",
    }
  }
}

// ---------------------------------------------------------------------------
// Incident record
// ---------------------------------------------------------------------------

/// The tracked incident, as persisted by the store.
///
/// `channel_id` is the 1:1 communication channel and never changes after
/// creation. Status only moves through the transition rules in
/// [`crate::transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
  pub id: i64,
  pub channel_id: String,
  pub channel_name: String,
  pub title: String,
  pub product: String,
  pub severity: Severity,
  pub status: IncidentStatus,
  /// User ref of the accountable owner.
  pub commander: String,
  pub author: String,
  pub description_started: String,
  #[serde(default)]
  pub description_resolved: String,
  #[serde(default)]
  pub description_cancelled: String,
  #[serde(default)]
  pub root_cause: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub meeting_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub post_mortem_url: Option<String>,
  pub identification_ts: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_ts: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_ts: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub snoozed_until: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Transition inputs
// ---------------------------------------------------------------------------

/// Everything needed to open an incident. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentDraft {
  pub channel_id: String,
  #[serde(default)]
  pub channel_name: String,
  pub title: String,
  pub description: String,
  #[serde(default)]
  pub severity_level: Option<i64>,
  #[serde(default)]
  pub product: String,
  pub commander: String,
  pub author: String,
  #[serde(default)]
  pub meeting_url: Option<String>,
}

/// Validated draft plus the identification timestamp, as handed to the store.
#[derive(Debug, Clone)]
pub struct NewIncident {
  pub channel_id: String,
  pub channel_name: String,
  pub title: String,
  pub product: String,
  pub severity: Severity,
  pub commander: String,
  pub author: String,
  pub description: String,
  pub meeting_url: Option<String>,
  pub identification_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseRequest {
  pub channel_id: String,
  pub root_cause: String,
  /// Absent keeps the current severity.
  #[serde(default)]
  pub severity_level: Option<i64>,
  /// Absent keeps the current start timestamp.
  #[serde(default, deserialize_with = "start_ts_opt")]
  pub start_ts: Option<DateTime<Utc>>,
  #[serde(default)]
  pub requester: Option<String>,
}

/// Field-level edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentEdit {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub product: Option<String>,
  #[serde(default)]
  pub severity_level: Option<i64>,
  #[serde(default)]
  pub commander: Option<String>,
  #[serde(default)]
  pub meeting_url: Option<String>,
  #[serde(default)]
  pub post_mortem_url: Option<String>,
  #[serde(default, deserialize_with = "start_ts_opt")]
  pub start_ts: Option<DateTime<Utc>>,
  #[serde(default)]
  pub root_cause: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
}

/// Human-entered start timestamp: [`clock::START_TS_LAYOUT`] or RFC 3339. Blank means absent.
fn start_ts_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  raw
    .filter(|s| !s.trim().is_empty())
    .map(|s| {
      clock::parse_start_ts(&s)
        .ok_or_else(|| de::Error::custom(format!("start_ts {:?}: expected {}", s, clock::START_TS_LAYOUT)))
    })
    .transpose()
}

/// Status-changing write applied by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
  Cancel {
    description: String,
  },
  Resolve {
    description: String,
    end_ts: DateTime<Utc>,
  },
  Close {
    root_cause: String,
    severity: Option<Severity>,
    start_ts: Option<DateTime<Utc>>,
  },
}

impl StatusUpdate {
  pub fn target(&self) -> IncidentStatus {
    match self {
      Self::Cancel { .. } => IncidentStatus::Canceled,
      Self::Resolve { .. } => IncidentStatus::Resolved,
      Self::Close { .. } => IncidentStatus::Closed,
    }
  }
}

// ---------------------------------------------------------------------------
// Delivery targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationRole {
  /// The incident's own channel.
  Primary,
  /// Shared product channel or a direct message to a user.
  Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
  pub target: String,
  pub role: DestinationRole,
  pub pin: bool,
}

impl Destination {
  pub fn primary(target: impl Into<String>) -> Self {
    Self {
      target: target.into(),
      role: DestinationRole::Primary,
      pin: true,
    }
  }

  pub fn auxiliary(target: impl Into<String>) -> Self {
    Self {
      target: target.into(),
      role: DestinationRole::Auxiliary,
      pin: true,
    }
  }

  /// Deliver without pinning the posted message.
  pub fn post_only(mut self) -> Self {
    self.pin = false;
    self
  }

  pub fn is_primary(&self) -> bool {
    self.role == DestinationRole::Primary
  }
}

impl fmt::Display for Destination {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.target)
  }
}

/// Reference to a posted message, as returned by the channel client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MessageRef {
  pub channel: String,
  pub ts: DateTime<Utc>,
}

/// A rendered notice. Opaque to fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
  pub title: String,
  pub body: String,
}

impl Notice {
  pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      body: body.into(),
    }
  }

  /// Title and body as one message.
  pub fn text(&self) -> String {
    if self.body.is_empty() {
      self.title.clone()
    } else {
      format!("{}\n{}", self.title, self.body)
    }
  }
}
