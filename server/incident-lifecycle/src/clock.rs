//! Time source and timestamp helpers shared by the engine and the scheduler.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Layout accepted for human-entered start timestamps, e.g. `2024-03-01T14:05:00-0300`.
pub const START_TS_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Wall-clock source. Injected so transitions and firings can be replayed.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  pub fn set(&self, ts: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(|e| e.into_inner()) = ts;
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(next) = now.checked_add_signed(to_time_delta(by)) {
      *now = next;
    }
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Convert a std interval to a chrono delta, saturating on overflow.
pub fn to_time_delta(d: Duration) -> TimeDelta {
  TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// Whole hours elapsed from `since` to `now`, truncated toward zero.
pub fn whole_hours_since(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
  (now - since).num_hours()
}

/// True when `ts` is strictly newer than `now - window`.
///
/// A timestamp exactly `window` old counts as stale.
pub fn is_within(ts: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
  match now.checked_sub_signed(to_time_delta(window)) {
    Some(threshold) => ts > threshold,
    None => true,
  }
}

/// Parse a start timestamp in [`START_TS_LAYOUT`] (RFC 3339 also accepted), normalized to UTC.
pub fn parse_start_ts(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  DateTime::parse_from_str(s, START_TS_LAYOUT)
    .or_else(|_| DateTime::parse_from_rfc3339(s))
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Human-readable timestamp for notices.
pub fn display(ts: &DateTime<Utc>) -> String {
  ts.to_rfc2822()
}
