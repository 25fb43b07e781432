//! One reminder job and its firing decision.
//!
//! [`ReminderJob::fire`] is a single evaluation step with an explicit `now`.
//! The timer loop around it lives in [`crate::scheduler`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{DeliveryError, ReminderError, StoreError};
use crate::fanout::Fanout;
use crate::notice;
use crate::policy::{ReminderPolicy, StatusRule, Suppression};
use crate::store::IncidentStore;
use crate::types::{Destination, Incident, IncidentStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
  Terminal(IncidentStatus),
  /// The store no longer knows the incident.
  Vanished,
}

/// What a single firing did.
#[derive(Debug)]
pub enum FiringOutcome {
  /// Reminder posted to the incident channel.
  Reminded,
  Suppressed(Suppression),
  /// Non-terminal status differs from the armed one; carries the fresh record.
  StatusChanged(Incident),
  Stop(StopReason),
  /// Could not read state this cycle; retried at the next interval.
  Skipped(ReminderError),
  /// Reminder was due but the post failed; retried at the next interval.
  DeliveryFailed(DeliveryError),
}

impl FiringOutcome {
  /// Whether the job keeps its timer armed after this outcome.
  pub fn keeps_running(&self) -> bool {
    !matches!(self, Self::StatusChanged(_) | Self::Stop(_))
  }
}

/// Reminder job armed for one incident in one status.
pub struct ReminderJob {
  incident_id: i64,
  channel_id: String,
  status: IncidentStatus,
  rule: StatusRule,
  store: Arc<dyn IncidentStore>,
  fanout: Fanout,
}

impl ReminderJob {
  /// Arm a job for `incident` in its current status. `None` for terminal statuses.
  pub fn new(
    incident: &Incident,
    policy: &ReminderPolicy,
    store: Arc<dyn IncidentStore>,
    fanout: Fanout,
  ) -> Option<Self> {
    let rule = policy.rule(incident.status)?.clone();
    Some(Self {
      incident_id: incident.id,
      channel_id: incident.channel_id.clone(),
      status: incident.status,
      rule,
      store,
      fanout,
    })
  }

  pub fn incident_id(&self) -> i64 {
    self.incident_id
  }

  pub fn channel_id(&self) -> &str {
    &self.channel_id
  }

  pub fn armed_status(&self) -> IncidentStatus {
    self.status
  }

  pub fn interval(&self) -> Duration {
    self.rule.interval
  }

  /// Evaluate the incident once and send a reminder if one is due.
  pub async fn fire(&self, now: DateTime<Utc>) -> FiringOutcome {
    let incident = match self.store.get(&self.channel_id).await {
      Ok(incident) => incident,
      Err(StoreError::NotFound { .. }) => {
        info!(
          incident_id = self.incident_id,
          channel_id = %self.channel_id,
          "incident vanished, stopping reminder"
        );
        return FiringOutcome::Stop(StopReason::Vanished);
      }
      Err(e) => {
        error!(
          incident_id = self.incident_id,
          channel_id = %self.channel_id,
          error = %e,
          "reminder reload failed"
        );
        return FiringOutcome::Skipped(e.into());
      }
    };

    if incident.status.is_terminal() {
      info!(
        incident_id = self.incident_id,
        channel_id = %self.channel_id,
        status = %incident.status,
        "incident finished, stopping reminder"
      );
      return FiringOutcome::Stop(StopReason::Terminal(incident.status));
    }

    if incident.status != self.status {
      info!(
        incident_id = self.incident_id,
        channel_id = %self.channel_id,
        armed = %self.status,
        status = %incident.status,
        "status changed, re-arming reminder"
      );
      return FiringOutcome::StatusChanged(incident);
    }

    if let Some(reason) = self.rule.record_suppression(&incident, now) {
      return self.suppressed(reason);
    }

    let last_pin = match self.fanout.client().last_pin_timestamp(&self.channel_id).await {
      Ok(ts) => ts,
      Err(e) => {
        error!(
          incident_id = self.incident_id,
          channel_id = %self.channel_id,
          error = %e,
          "last pin lookup failed"
        );
        return FiringOutcome::Skipped(e.into());
      }
    };
    if let Some(reason) = self.rule.pin_suppression(last_pin, now) {
      return self.suppressed(reason);
    }

    let reminder = notice::reminder(&self.rule.template, &incident);
    // Post-only: a pinned reminder would read as a fresh status update next cycle.
    let destination = Destination::primary(self.channel_id.clone()).post_only();
    let report = self.fanout.deliver(&reminder, &[destination]).await;

    match report.primary_failure() {
      Some((_, e)) => {
        warn!(
          incident_id = self.incident_id,
          channel_id = %self.channel_id,
          error = %e,
          "reminder not delivered"
        );
        FiringOutcome::DeliveryFailed(e.clone())
      }
      None => {
        info!(
          incident_id = self.incident_id,
          channel_id = %self.channel_id,
          status = %self.status,
          "reminder sent"
        );
        FiringOutcome::Reminded
      }
    }
  }

  fn suppressed(&self, reason: Suppression) -> FiringOutcome {
    info!(
      incident_id = self.incident_id,
      channel_id = %self.channel_id,
      reason = %reason,
      "reminder suppressed"
    );
    FiringOutcome::Suppressed(reason)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::MemoryChannel;
  use crate::clock::ManualClock;
  use crate::config::Config;
  use crate::store::MemoryStore;
  use crate::types::{NewIncident, Severity, StatusUpdate};
  use chrono::{TimeDelta, TimeZone};

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  fn secs(n: i64) -> TimeDelta {
    TimeDelta::seconds(n)
  }

  struct Fixture {
    store: Arc<MemoryStore>,
    channel: Arc<MemoryChannel>,
    policy: ReminderPolicy,
  }

  impl Fixture {
    async fn new() -> Self {
      let store = Arc::new(MemoryStore::new());
      store
        .insert(&NewIncident {
          channel_id: "C1".into(),
          channel_name: "inc-1".into(),
          title: "Checkout down".into(),
          product: "payments".into(),
          severity: Severity::Sev1,
          commander: "U1".into(),
          author: "U2".into(),
          description: "500s".into(),
          meeting_url: None,
          identification_ts: t0(),
        })
        .await
        .unwrap();
      Self {
        store,
        channel: Arc::new(MemoryChannel::new(Arc::new(ManualClock::new(t0())))),
        policy: ReminderPolicy::from_config(&Config {
          sla_hours_to_close: 24,
          ..Config::default()
        }),
      }
    }

    async fn job(&self) -> ReminderJob {
      let incident = self.store.get("C1").await.unwrap();
      ReminderJob::new(
        &incident,
        &self.policy,
        self.store.clone(),
        Fanout::new(self.channel.clone()),
      )
      .unwrap()
    }

    async fn apply(&self, from: IncidentStatus, update: StatusUpdate) {
      self
        .store
        .update_status("C1", &[from], &update, t0())
        .await
        .unwrap();
    }
  }

  #[tokio::test]
  async fn fires_open_template_when_nothing_pinned() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    assert_eq!(job.interval(), Duration::from_secs(7200));

    let outcome = job.fire(t0() + secs(7200)).await;
    assert!(matches!(outcome, FiringOutcome::Reminded));

    let sent = fx.channel.messages_to("C1").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].notice.title, Config::default().reminder_open_message);
    assert!(!sent[0].pinned);
  }

  #[tokio::test]
  async fn fresher_pin_suppresses_until_it_ages_out() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.channel.pin_external("C1", t0() + secs(3600)).await;

    let outcome = job.fire(t0() + secs(7200)).await;
    assert!(matches!(outcome, FiringOutcome::Suppressed(Suppression::FreshPin { .. })));
    assert!(fx.channel.messages().await.is_empty());

    let outcome = job.fire(t0() + secs(10800)).await;
    assert!(matches!(outcome, FiringOutcome::Reminded));
  }

  #[tokio::test]
  async fn snooze_suppresses_until_it_passes() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.store
      .set_snooze("C1", Some(t0() + secs(9000)), t0())
      .await
      .unwrap();

    let outcome = job.fire(t0() + secs(7200)).await;
    assert!(matches!(outcome, FiringOutcome::Suppressed(Suppression::Snoozed { .. })));

    let outcome = job.fire(t0() + secs(14400)).await;
    assert!(matches!(outcome, FiringOutcome::Reminded));
  }

  #[tokio::test]
  async fn terminal_status_stops_without_notice() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.apply(
      IncidentStatus::Open,
      StatusUpdate::Close {
        root_cause: "deploy".into(),
        severity: None,
        start_ts: None,
      },
    )
    .await;

    let outcome = job.fire(t0() + secs(7200)).await;
    assert!(matches!(
      outcome,
      FiringOutcome::Stop(StopReason::Terminal(IncidentStatus::Closed))
    ));
    assert!(!outcome.keeps_running());
    assert!(fx.channel.messages().await.is_empty());
  }

  #[tokio::test]
  async fn resolve_is_reported_as_status_change() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.apply(
      IncidentStatus::Open,
      StatusUpdate::Resolve {
        description: "rolled back".into(),
        end_ts: t0() + secs(60),
      },
    )
    .await;

    match job.fire(t0() + secs(7200)).await {
      FiringOutcome::StatusChanged(incident) => assert_eq!(incident.status, IncidentStatus::Resolved),
      other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(fx.channel.messages().await.is_empty());
  }

  #[tokio::test]
  async fn resolved_job_waits_for_grace_window() {
    let fx = Fixture::new().await;
    fx.apply(
      IncidentStatus::Open,
      StatusUpdate::Resolve {
        description: "rolled back".into(),
        end_ts: t0(),
      },
    )
    .await;
    let job = fx.job().await;
    assert_eq!(job.armed_status(), IncidentStatus::Resolved);

    let within = job.fire(t0() + TimeDelta::hours(24) + TimeDelta::minutes(30)).await;
    assert!(matches!(within, FiringOutcome::Suppressed(Suppression::WithinGrace { .. })));

    let after = job.fire(t0() + TimeDelta::hours(25)).await;
    assert!(matches!(after, FiringOutcome::Reminded));
    let sent = fx.channel.messages_to("C1").await;
    assert_eq!(sent[0].notice.title, Config::default().reminder_resolved_message);
  }

  #[tokio::test]
  async fn vanished_incident_stops_job() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.store.remove("C1").await;
    assert!(matches!(
      job.fire(t0() + secs(7200)).await,
      FiringOutcome::Stop(StopReason::Vanished)
    ));
  }

  #[tokio::test]
  async fn pin_lookup_failure_skips_cycle() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.channel.fail_pin_lookups_for("C1").await;

    let outcome = job.fire(t0() + secs(7200)).await;
    assert!(matches!(outcome, FiringOutcome::Skipped(ReminderError::Channel(_))));
    assert!(outcome.keeps_running());
  }

  #[tokio::test]
  async fn delivery_failure_keeps_job_running() {
    let fx = Fixture::new().await;
    let job = fx.job().await;
    fx.channel.fail_posts_to("C1").await;

    let outcome = job.fire(t0() + secs(7200)).await;
    assert!(matches!(outcome, FiringOutcome::DeliveryFailed(_)));
    assert!(outcome.keeps_running());
  }
}
