//! Per-status reminder rules: interval, notice template, suppression.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::clock;
use crate::config::Config;
use crate::types::{Incident, IncidentStatus};

/// Why a firing sent nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
  Snoozed { until: DateTime<Utc> },
  /// Resolved too recently; `hours_since_end` is truncated to whole hours.
  WithinGrace { hours_since_end: i64, grace_hours: i64 },
  /// Someone pinned a status update within the current interval.
  FreshPin { pinned_at: DateTime<Utc> },
}

impl fmt::Display for Suppression {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Snoozed { until } => write!(f, "snoozed until {}", until.to_rfc3339()),
      Self::WithinGrace {
        hours_since_end,
        grace_hours,
      } => write!(f, "resolved {}h ago, grace {}h", hours_since_end, grace_hours),
      Self::FreshPin { pinned_at } => write!(f, "pinned at {}", pinned_at.to_rfc3339()),
    }
  }
}

/// Reminder behavior while an incident sits in one status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRule {
  pub interval: Duration,
  pub template: String,
  /// Quiet period after `end_ts`, in whole hours. Only resolved incidents have one.
  pub grace_hours: Option<i64>,
}

impl StatusRule {
  /// Suppression decidable from the incident record alone.
  pub fn record_suppression(&self, incident: &Incident, now: DateTime<Utc>) -> Option<Suppression> {
    if let Some(until) = incident.snoozed_until.filter(|until| *until > now) {
      return Some(Suppression::Snoozed { until });
    }

    let grace_hours = self.grace_hours?;
    let end = incident.end_ts?;
    let hours_since_end = clock::whole_hours_since(end, now);
    if hours_since_end <= grace_hours {
      return Some(Suppression::WithinGrace {
        hours_since_end,
        grace_hours,
      });
    }
    None
  }

  /// Suppression when the channel's last pin is newer than one interval ago.
  pub fn pin_suppression(&self, last_pin: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Suppression> {
    last_pin
      .filter(|pinned_at| clock::is_within(*pinned_at, now, self.interval))
      .map(|pinned_at| Suppression::FreshPin { pinned_at })
  }
}

/// Closed lookup from status to [`StatusRule`]. Terminal statuses have none.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderPolicy {
  open: StatusRule,
  resolved: StatusRule,
}

impl ReminderPolicy {
  pub fn new(open: StatusRule, resolved: StatusRule) -> Self {
    Self { open, resolved }
  }

  pub fn from_config(config: &Config) -> Self {
    Self {
      open: StatusRule {
        interval: config.reminder_open_interval,
        template: config.reminder_open_message.clone(),
        grace_hours: None,
      },
      resolved: StatusRule {
        interval: config.reminder_resolved_interval,
        template: config.reminder_resolved_message.clone(),
        grace_hours: Some(config.sla_hours_to_close),
      },
    }
  }

  pub fn rule(&self, status: IncidentStatus) -> Option<&StatusRule> {
    match status {
      IncidentStatus::Open => Some(&self.open),
      IncidentStatus::Resolved => Some(&self.resolved),
      IncidentStatus::Closed | IncidentStatus::Canceled => None,
    }
  }
}
