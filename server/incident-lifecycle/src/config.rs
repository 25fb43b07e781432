//! Lifecycle configuration with sane defaults, overridable from the environment.

use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_REMINDER_OPEN_SECONDS: &str = "INCIDENT_REMINDER_OPEN_STATUS_SECONDS";
pub const ENV_REMINDER_RESOLVED_SECONDS: &str = "INCIDENT_REMINDER_RESOLVED_STATUS_SECONDS";
pub const ENV_SLA_HOURS_TO_CLOSE: &str = "INCIDENT_SLA_HOURS_TO_CLOSE";
pub const ENV_REMINDER_OPEN_MSG: &str = "INCIDENT_REMINDER_OPEN_NOTIFY_MSG";
pub const ENV_REMINDER_RESOLVED_MSG: &str = "INCIDENT_REMINDER_RESOLVED_NOTIFY_MSG";
pub const ENV_PRODUCT_CHANNEL_ID: &str = "INCIDENT_PRODUCT_CHANNEL_ID";
pub const ENV_NOTIFY_ON_OPEN: &str = "INCIDENT_NOTIFY_ON_OPEN";
pub const ENV_NOTIFY_ON_RESOLVE: &str = "INCIDENT_NOTIFY_ON_RESOLVE";
pub const ENV_NOTIFY_ON_CLOSE: &str = "INCIDENT_NOTIFY_ON_CLOSE";
pub const ENV_NOTIFY_ON_CANCEL: &str = "INCIDENT_NOTIFY_ON_CANCEL";

/// Reminder cadence, notice templates and auxiliary routing.
#[derive(Debug, Clone)]
pub struct Config {
  /// Reminder recurrence while an incident is open.
  pub reminder_open_interval: Duration,
  /// Reminder recurrence once resolved. Longer than the open interval.
  pub reminder_resolved_interval: Duration,
  /// Whole hours after resolution during which resolved reminders stay quiet.
  pub sla_hours_to_close: i64,
  pub reminder_open_message: String,
  pub reminder_resolved_message: String,
  /// Shared product channel; `None` disables auxiliary notices.
  pub product_channel: Option<String>,
  pub notify_on_open: bool,
  pub notify_on_resolve: bool,
  pub notify_on_close: bool,
  pub notify_on_cancel: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      reminder_open_interval: Duration::from_secs(7200),
      reminder_resolved_interval: Duration::from_secs(86400),
      sla_hours_to_close: 168,
      reminder_open_message: "Incident Status: Open - Update the status of this incident, \
                              just pin a message with status on the channel."
        .into(),
      reminder_resolved_message: "Incident Status: Resolved - Update the status of this incident, \
                                  just pin a message with status on the channel."
        .into(),
      product_channel: None,
      notify_on_open: true,
      notify_on_resolve: true,
      notify_on_close: true,
      notify_on_cancel: true,
    }
  }
}

impl Config {
  /// Build from process environment variables, falling back to defaults.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build from an arbitrary key lookup (environment, file, test map).
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(v) = lookup(ENV_REMINDER_OPEN_SECONDS) {
      config.reminder_open_interval = parse_interval(ENV_REMINDER_OPEN_SECONDS, &v)?;
    }
    if let Some(v) = lookup(ENV_REMINDER_RESOLVED_SECONDS) {
      config.reminder_resolved_interval = parse_interval(ENV_REMINDER_RESOLVED_SECONDS, &v)?;
    }
    if config.reminder_resolved_interval <= config.reminder_open_interval {
      return Err(ConfigError::invalid(
        ENV_REMINDER_RESOLVED_SECONDS,
        &config.reminder_resolved_interval.as_secs().to_string(),
        format!(
          "must be longer than the open interval ({}s)",
          config.reminder_open_interval.as_secs()
        ),
      ));
    }
    if let Some(v) = lookup(ENV_SLA_HOURS_TO_CLOSE) {
      config.sla_hours_to_close = v
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|h| *h >= 0)
        .ok_or_else(|| ConfigError::invalid(ENV_SLA_HOURS_TO_CLOSE, &v, "expected hours >= 0"))?;
    }
    if let Some(v) = lookup(ENV_REMINDER_OPEN_MSG).filter(|v| !v.trim().is_empty()) {
      config.reminder_open_message = v;
    }
    if let Some(v) = lookup(ENV_REMINDER_RESOLVED_MSG).filter(|v| !v.trim().is_empty()) {
      config.reminder_resolved_message = v;
    }
    config.product_channel = lookup(ENV_PRODUCT_CHANNEL_ID)
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty());

    for (var, flag) in [
      (ENV_NOTIFY_ON_OPEN, &mut config.notify_on_open),
      (ENV_NOTIFY_ON_RESOLVE, &mut config.notify_on_resolve),
      (ENV_NOTIFY_ON_CLOSE, &mut config.notify_on_close),
      (ENV_NOTIFY_ON_CANCEL, &mut config.notify_on_cancel),
    ] {
      if let Some(v) = lookup(var) {
        *flag = parse_bool(var, &v)?;
      }
    }

    Ok(config)
  }
}

fn parse_interval(var: &str, value: &str) -> Result<Duration, ConfigError> {
  match value.trim().parse::<u64>() {
    Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
    _ => Err(ConfigError::invalid(var, value, "expected seconds > 0")),
  }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
  match value.trim().to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" => Ok(true),
    "false" | "0" | "no" => Ok(false),
    _ => Err(ConfigError::invalid(var, value, "expected true|false")),
  }
}
