//! Lifecycle engine: validates transitions, persists them, drives the
//! reminder scheduler and announces the result.
//!
//! Every status-changing operation runs the same pipeline:
//! read → check edge → conditional write → scheduler action → fan-out.
//! A failed write stops the pipeline. A failed primary delivery is reported
//! after the fact, with the committed record attached.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::channel::{ChannelClient, MemoryChannel};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{DeliveryError, LifecycleError};
use crate::fanout::{Fanout, FanoutReport};
use crate::notice;
use crate::policy::ReminderPolicy;
use crate::scheduler::ReminderScheduler;
use crate::store::{IncidentStore, MemoryStore};
use crate::transition;
use crate::types::*;

/// Result of [`LifecycleEngine::edit`].
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
  pub incident: Incident,
  /// Commander, meeting URL or post-mortem URL changed; the channel topic is stale.
  pub topic_changed: bool,
}

/// The incident lifecycle engine. Cheap to share behind an `Arc`.
pub struct LifecycleEngine {
  config: Config,
  store: Arc<dyn IncidentStore>,
  fanout: Fanout,
  scheduler: ReminderScheduler,
  clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
  pub fn new(
    config: Config,
    store: Arc<dyn IncidentStore>,
    channel: Arc<dyn ChannelClient>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let fanout = Fanout::new(channel);
    let scheduler = ReminderScheduler::new(
      Arc::clone(&store),
      fanout.clone(),
      ReminderPolicy::from_config(&config),
      Arc::clone(&clock),
    );
    Self {
      config,
      store,
      fanout,
      scheduler,
      clock,
    }
  }

  /// In-memory store and channel, wall clock, default config.
  pub fn with_defaults() -> Self {
    Self::new(
      Config::default(),
      Arc::new(MemoryStore::new()),
      Arc::new(MemoryChannel::default()),
      Arc::new(SystemClock),
    )
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn scheduler(&self) -> &ReminderScheduler {
    &self.scheduler
  }

  /// Open a new incident and arm its reminder.
  pub async fn open(&self, draft: &IncidentDraft) -> Result<Incident, LifecycleError> {
    let now = self.clock.now();
    let new = transition::validate_draft(draft, now)?;
    let id = self.store.insert(&new).await.map_err(LifecycleError::Persistence)?;
    let incident = self.store.get(&new.channel_id).await?;
    info!(
      incident_id = id,
      channel_id = %incident.channel_id,
      severity = ?incident.severity,
      "incident opened"
    );

    if !self.scheduler.start(&incident).await {
      warn!(
        incident_id = id,
        channel_id = %incident.channel_id,
        "no reminder job armed for open incident"
      );
    }

    let destinations = self.destinations(&incident, self.config.notify_on_open);
    self.announce(incident, notice::opened, destinations).await
  }

  /// Cancel an open incident. Stops its reminder.
  pub async fn cancel(&self, channel_id: &str, reason: &str) -> Result<Incident, LifecycleError> {
    let update = StatusUpdate::Cancel {
      description: reason.trim().to_string(),
    };
    let incident = self.transition(channel_id, update).await?;
    self.scheduler.stop(incident.id).await;

    let destinations = self.destinations(&incident, self.config.notify_on_cancel);
    self.announce(incident, notice::canceled, destinations).await
  }

  /// Resolve an open incident.
  ///
  /// The reminder job is left alone; it re-arms with the resolved interval
  /// the next time it fires.
  pub async fn resolve(
    &self,
    channel_id: &str,
    description: &str,
    requester: Option<&str>,
  ) -> Result<Incident, LifecycleError> {
    let update = StatusUpdate::Resolve {
      description: description.trim().to_string(),
      end_ts: self.clock.now(),
    };
    let incident = self.transition(channel_id, update).await?;

    let mut destinations = self.destinations(&incident, self.config.notify_on_resolve);
    if let Some(user) = transition::non_empty(requester) {
      destinations.push(Destination::auxiliary(user).post_only());
    }
    self.announce(incident, notice::resolved, destinations).await
  }

  /// Close an open or resolved incident. Stops its reminder.
  pub async fn close(&self, request: &CloseRequest) -> Result<Incident, LifecycleError> {
    let root_cause = transition::required("root_cause", &request.root_cause)?;
    let severity = transition::parse_severity(request.severity_level)?;
    let update = StatusUpdate::Close {
      root_cause,
      severity,
      start_ts: request.start_ts,
    };
    let incident = self.transition(&request.channel_id, update).await?;
    self.scheduler.stop(incident.id).await;

    let destinations = self.destinations(&incident, self.config.notify_on_close);
    let requester = transition::non_empty(request.requester.as_deref());

    let channel_notice = notice::closed(&incident);
    let confirmation = notice::closed_by_requester(&incident);
    let (report, confirmed) = tokio::join!(
      self.fanout.deliver(&channel_notice, &destinations),
      async {
        match &requester {
          Some(user) => {
            self
              .fanout
              .deliver(&confirmation, &[Destination::auxiliary(user.clone()).post_only()])
              .await
          }
          None => FanoutReport::default(),
        }
      }
    );
    if !confirmed.all_delivered() {
      warn!(channel_id = %incident.channel_id, "close confirmation not delivered to requester");
    }
    self.settle(incident, &report)
  }

  /// Apply field edits. Status and the reminder job are untouched.
  pub async fn edit(
    &self,
    channel_id: &str,
    edit: &IncidentEdit,
    editor: &str,
  ) -> Result<EditOutcome, LifecycleError> {
    let edit = IncidentEdit {
      title: edit
        .title
        .as_deref()
        .map(|v| transition::required("title", v))
        .transpose()?,
      commander: edit
        .commander
        .as_deref()
        .map(|v| transition::required("commander", v))
        .transpose()?,
      ..edit.clone()
    };
    let severity = transition::parse_severity(edit.severity_level)?;

    let before = self.store.get(channel_id).await?;
    let after = self
      .store
      .update_fields(channel_id, &edit, severity, self.clock.now())
      .await
      .map_err(LifecycleError::Persistence)?;

    let topic_changed = before.commander != after.commander
      || before.meeting_url != after.meeting_url
      || before.post_mortem_url != after.post_mortem_url;
    info!(
      incident_id = after.id,
      channel_id = %after.channel_id,
      editor,
      topic_changed,
      "incident edited"
    );

    let rendered = notice::edited(&after, editor);
    let report = self
      .fanout
      .deliver(&rendered, &[Destination::primary(after.channel_id.clone())])
      .await;
    let incident = self.settle(after, &report)?;
    Ok(EditOutcome {
      incident,
      topic_changed,
    })
  }

  /// Silence reminders until `until`. Only for open or resolved incidents.
  pub async fn snooze(&self, channel_id: &str, until: DateTime<Utc>) -> Result<Incident, LifecycleError> {
    let now = self.clock.now();
    if until <= now {
      return Err(LifecycleError::validation("until", "must be in the future"));
    }
    self.set_snooze(channel_id, Some(until), now).await
  }

  pub async fn unsnooze(&self, channel_id: &str) -> Result<Incident, LifecycleError> {
    self.set_snooze(channel_id, None, self.clock.now()).await
  }

  pub async fn get(&self, channel_id: &str) -> Result<Incident, LifecycleError> {
    Ok(self.store.get(channel_id).await?)
  }

  pub async fn list_active(&self) -> Result<Vec<Incident>, LifecycleError> {
    Ok(self.store.list_active().await?)
  }

  /// Post the active incident list to `destination` and return it.
  pub async fn show_active(&self, destination: &str) -> Result<Vec<Incident>, LifecycleError> {
    let incidents = self.store.list_active().await?;
    self.inform(destination, notice::active_list(&incidents)).await;
    Ok(incidents)
  }

  /// Post the status and timeline of one incident to `destination`.
  pub async fn show_status(&self, channel_id: &str, destination: &str) -> Result<Incident, LifecycleError> {
    let incident = self.store.get(channel_id).await?;
    self.inform(destination, notice::status_summary(&incident)).await;
    Ok(incident)
  }

  /// Tell `destination` that an operation failed. Posted, never pinned.
  pub async fn notify_failure(&self, destination: &str, err: &LifecycleError) -> Result<(), DeliveryError> {
    let rendered = notice::failure(&err.to_string());
    let report = self
      .fanout
      .deliver(&rendered, &[Destination::primary(destination).post_only()])
      .await;
    match report.primary_failure() {
      Some((_, e)) => Err(e.clone()),
      None => Ok(()),
    }
  }

  /// Stop every reminder job.
  pub async fn shutdown(&self) {
    self.scheduler.shutdown().await;
  }

  // -------------------------------------------------------------------------

  /// Read, check the edge, then write conditionally on the legal source statuses.
  async fn transition(&self, channel_id: &str, update: StatusUpdate) -> Result<Incident, LifecycleError> {
    let target = update.target();
    let current = self.store.get(channel_id).await?;
    if let Err(e) = transition::check(channel_id, current.status, target) {
      warn!(channel_id, current = %current.status, attempted = %target, "transition rejected");
      return Err(e);
    }

    let updated = self
      .store
      .update_status(channel_id, transition::sources_of(target), &update, self.clock.now())
      .await
      .map_err(|e| {
        error!(channel_id, attempted = %target, error = %e, "status write failed");
        LifecycleError::Persistence(e)
      })?;

    info!(
      incident_id = updated.id,
      channel_id,
      from = %current.status,
      to = %updated.status,
      "incident transitioned"
    );
    Ok(updated)
  }

  async fn set_snooze(
    &self,
    channel_id: &str,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Result<Incident, LifecycleError> {
    let current = self.store.get(channel_id).await?;
    if current.status.is_terminal() {
      return Err(LifecycleError::validation(
        "status",
        &format!("incident is already {}", current.status),
      ));
    }
    let incident = self
      .store
      .set_snooze(channel_id, until, now)
      .await
      .map_err(LifecycleError::Persistence)?;
    info!(
      incident_id = incident.id,
      channel_id,
      until = ?incident.snoozed_until,
      "reminder snooze updated"
    );
    Ok(incident)
  }

  /// Informational post; a failure is only logged.
  async fn inform(&self, destination: &str, rendered: Notice) {
    let report = self
      .fanout
      .deliver(&rendered, &[Destination::auxiliary(destination).post_only()])
      .await;
    if !report.all_delivered() {
      warn!(destination, "informational notice not delivered");
    }
  }

  /// Primary channel, plus the product channel when `notify_aux` is set and one is configured.
  fn destinations(&self, incident: &Incident, notify_aux: bool) -> Vec<Destination> {
    let mut destinations = vec![Destination::primary(incident.channel_id.clone())];
    if notify_aux {
      if let Some(product) = &self.config.product_channel {
        destinations.push(Destination::auxiliary(product.clone()));
      }
    }
    destinations
  }

  async fn announce(
    &self,
    incident: Incident,
    render: fn(&Incident) -> Notice,
    destinations: Vec<Destination>,
  ) -> Result<Incident, LifecycleError> {
    let rendered = render(&incident);
    let report = self.fanout.deliver(&rendered, &destinations).await;
    self.settle(incident, &report)
  }

  /// Primary failure fails the operation; auxiliary failures were already logged by fan-out.
  fn settle(&self, incident: Incident, report: &FanoutReport) -> Result<Incident, LifecycleError> {
    if let Some((destination, e)) = report.primary_failure() {
      error!(
        incident_id = incident.id,
        destination = %destination,
        error = %e,
        "incident channel not notified"
      );
      return Err(LifecycleError::Delivery {
        destination: destination.target.clone(),
        source: e.clone(),
        incident: Box::new(incident),
      });
    }
    Ok(incident)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use chrono::{TimeDelta, TimeZone};

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  struct Harness {
    engine: LifecycleEngine,
    store: Arc<MemoryStore>,
    channel: Arc<MemoryChannel>,
    clock: Arc<ManualClock>,
  }

  fn harness(config: Config) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(MemoryChannel::new(clock.clone()));
    let engine = LifecycleEngine::new(config, store.clone(), channel.clone(), clock.clone());
    Harness {
      engine,
      store,
      channel,
      clock,
    }
  }

  fn with_product_channel() -> Config {
    Config {
      product_channel: Some("C-PRODUCT".into()),
      ..Config::default()
    }
  }

  fn draft(channel: &str) -> IncidentDraft {
    IncidentDraft {
      channel_id: channel.into(),
      channel_name: format!("inc-{}", channel),
      title: "Checkout down".into(),
      description: "500s on checkout".into(),
      severity_level: Some(1),
      product: "payments".into(),
      commander: "U-CMD".into(),
      author: "U-AUTH".into(),
      meeting_url: None,
    }
  }

  fn close_request(channel: &str) -> CloseRequest {
    CloseRequest {
      channel_id: channel.into(),
      root_cause: "bad deploy".into(),
      severity_level: None,
      start_ts: None,
      requester: None,
    }
  }

  #[tokio::test]
  async fn open_persists_arms_and_announces() {
    let h = harness(with_product_channel());
    let incident = h.engine.open(&draft("C1")).await.unwrap();

    assert_eq!(incident.status, IncidentStatus::Open);
    assert_eq!(incident.identification_ts, t0());
    assert!(h.engine.scheduler().job_for(incident.id).await.is_some());

    let primary = h.channel.messages_to("C1").await;
    assert_eq!(primary.len(), 1);
    assert!(primary[0].pinned);
    assert_eq!(h.channel.messages_to("C-PRODUCT").await.len(), 1);
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn open_rejects_missing_commander() {
    let h = harness(Config::default());
    let mut d = draft("C1");
    d.commander = " ".into();

    let err = h.engine.open(&d).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation { ref field, .. } if field == "commander"));
    assert!(h.store.is_empty().await);
  }

  #[tokio::test]
  async fn notify_flags_gate_the_product_channel() {
    let h = harness(Config {
      notify_on_open: false,
      ..with_product_channel()
    });
    h.engine.open(&draft("C1")).await.unwrap();
    assert!(h.channel.messages_to("C-PRODUCT").await.is_empty());
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn cancel_stops_the_job() {
    let h = harness(Config::default());
    let opened = h.engine.open(&draft("C1")).await.unwrap();

    let canceled = h.engine.cancel("C1", "opened by accident").await.unwrap();
    assert_eq!(canceled.status, IncidentStatus::Canceled);
    assert_eq!(canceled.description_cancelled, "opened by accident");
    assert!(h.engine.scheduler().job_for(opened.id).await.is_none());
  }

  #[tokio::test]
  async fn cancel_after_resolve_is_rejected_and_leaves_record() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();
    h.engine.resolve("C1", "rolled back", None).await.unwrap();
    let before = h.store.get("C1").await.unwrap();

    let err = h.engine.cancel("C1", "nevermind").await.unwrap_err();
    assert!(matches!(
      err,
      LifecycleError::InvalidTransition {
        current: IncidentStatus::Resolved,
        ..
      }
    ));
    assert_eq!(h.store.get("C1").await.unwrap(), before);
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn resolve_sets_end_ts_and_messages_requester() {
    let h = harness(with_product_channel());
    let opened = h.engine.open(&draft("C1")).await.unwrap();
    h.clock.advance(std::time::Duration::from_secs(600));

    let resolved = h.engine.resolve("C1", "rolled back", Some("U-REQ")).await.unwrap();
    assert_eq!(resolved.end_ts, Some(t0() + TimeDelta::seconds(600)));
    assert_eq!(resolved.description_resolved, "rolled back");

    let dm = h.channel.messages_to("U-REQ").await;
    assert_eq!(dm.len(), 1);
    assert!(!dm[0].pinned);
    // Job keeps its open arming until it next fires.
    let job = h.engine.scheduler().job_for(opened.id).await.unwrap();
    assert_eq!(job.status, IncidentStatus::Open);
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn double_resolve_fails() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();
    h.engine.resolve("C1", "fixed", None).await.unwrap();
    let err = h.engine.resolve("C1", "fixed again", None).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn close_keeps_unset_fields_and_confirms_to_requester() {
    let h = harness(Config::default());
    let opened = h.engine.open(&draft("C1")).await.unwrap();

    let mut req = close_request("C1");
    req.requester = Some("U-REQ".into());
    let closed = h.engine.close(&req).await.unwrap();

    assert_eq!(closed.status, IncidentStatus::Closed);
    assert_eq!(closed.severity, Severity::Sev1);
    assert_eq!(closed.root_cause, "bad deploy");
    assert!(h.engine.scheduler().job_for(opened.id).await.is_none());
    let dm = h.channel.messages_to("U-REQ").await;
    assert_eq!(dm.len(), 1);
    assert!(dm[0].notice.title.contains("closed by you"));
  }

  #[tokio::test]
  async fn close_requires_root_cause_and_valid_severity() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();

    let mut req = close_request("C1");
    req.root_cause = String::new();
    assert!(matches!(
      h.engine.close(&req).await.unwrap_err(),
      LifecycleError::Validation { .. }
    ));

    let mut req = close_request("C1");
    req.severity_level = Some(9);
    assert!(matches!(
      h.engine.close(&req).await.unwrap_err(),
      LifecycleError::Validation { .. }
    ));
    assert_eq!(h.store.get("C1").await.unwrap().status, IncidentStatus::Open);
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn closing_twice_fails_without_second_fanout() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();
    h.engine.close(&close_request("C1")).await.unwrap();
    let sent = h.channel.messages().await.len();

    let err = h.engine.close(&close_request("C1")).await.unwrap_err();
    assert!(matches!(
      err,
      LifecycleError::InvalidTransition {
        current: IncidentStatus::Closed,
        ..
      }
    ));
    assert_eq!(h.channel.messages().await.len(), sent);
  }

  #[tokio::test]
  async fn unknown_channel_is_not_found() {
    let h = harness(Config::default());
    assert!(matches!(
      h.engine.cancel("C-NOPE", "x").await.unwrap_err(),
      LifecycleError::NotFound { .. }
    ));
  }

  #[tokio::test]
  async fn primary_failure_reports_committed_incident() {
    let h = harness(with_product_channel());
    h.engine.open(&draft("C1")).await.unwrap();
    h.channel.fail_posts_to("C1").await;

    let err = h.engine.resolve("C1", "fixed", None).await.unwrap_err();
    let committed = err.committed_incident().unwrap();
    assert_eq!(committed.status, IncidentStatus::Resolved);
    assert_eq!(h.store.get("C1").await.unwrap().status, IncidentStatus::Resolved);
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn auxiliary_failure_is_not_fatal() {
    let h = harness(with_product_channel());
    h.engine.open(&draft("C1")).await.unwrap();
    h.channel.fail_posts_to("C-PRODUCT").await;

    let resolved = h.engine.resolve("C1", "fixed", None).await.unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn edit_reports_topic_change_and_works_after_close() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();

    let outcome = h
      .engine
      .edit(
        "C1",
        &IncidentEdit {
          title: Some("Checkout degraded".into()),
          ..IncidentEdit::default()
        },
        "U-ED",
      )
      .await
      .unwrap();
    assert!(!outcome.topic_changed);
    assert_eq!(outcome.incident.title, "Checkout degraded");

    h.engine.close(&close_request("C1")).await.unwrap();
    let outcome = h
      .engine
      .edit(
        "C1",
        &IncidentEdit {
          post_mortem_url: Some("https://docs/pm-1".into()),
          ..IncidentEdit::default()
        },
        "U-ED",
      )
      .await
      .unwrap();
    assert!(outcome.topic_changed);
    assert_eq!(outcome.incident.status, IncidentStatus::Closed);
  }

  #[tokio::test]
  async fn edit_stores_trimmed_title_and_commander() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();

    let outcome = h
      .engine
      .edit(
        "C1",
        &IncidentEdit {
          title: Some("  Checkout degraded  ".into()),
          commander: Some(" U-NEW ".into()),
          ..IncidentEdit::default()
        },
        "U-ED",
      )
      .await
      .unwrap();
    assert_eq!(outcome.incident.title, "Checkout degraded");
    assert_eq!(outcome.incident.commander, "U-NEW");
    assert!(outcome.topic_changed);

    let stored = h.store.get("C1").await.unwrap();
    assert_eq!(stored.title, "Checkout degraded");
    assert_eq!(stored.commander, "U-NEW");

    let err = h
      .engine
      .edit(
        "C1",
        &IncidentEdit {
          commander: Some("   ".into()),
          ..IncidentEdit::default()
        },
        "U-ED",
      )
      .await
      .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation { ref field, .. } if field == "commander"));
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn open_after_shutdown_commits_without_a_job() {
    let h = harness(Config::default());
    h.engine.shutdown().await;

    let incident = h.engine.open(&draft("C1")).await.unwrap();
    assert_eq!(incident.status, IncidentStatus::Open);
    assert!(h.engine.scheduler().job_for(incident.id).await.is_none());
    assert_eq!(h.channel.messages_to("C1").await.len(), 1);
  }

  #[tokio::test]
  async fn snooze_must_be_in_future_and_incident_active() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();

    assert!(matches!(
      h.engine.snooze("C1", t0()).await.unwrap_err(),
      LifecycleError::Validation { .. }
    ));
    let until = t0() + TimeDelta::hours(4);
    assert_eq!(h.engine.snooze("C1", until).await.unwrap().snoozed_until, Some(until));
    assert_eq!(h.engine.unsnooze("C1").await.unwrap().snoozed_until, None);

    h.engine.cancel("C1", "dup").await.unwrap();
    assert!(h.engine.snooze("C1", until).await.is_err());
  }

  #[tokio::test]
  async fn show_commands_post_to_the_asker() {
    let h = harness(Config::default());
    h.engine.open(&draft("C1")).await.unwrap();
    h.engine.open(&draft("C2")).await.unwrap();
    h.engine.cancel("C2", "dup").await.unwrap();

    let active = h.engine.show_active("U-ASK").await.unwrap();
    assert_eq!(active.len(), 1);
    let status = h.engine.show_status("C2", "U-ASK").await.unwrap();
    assert_eq!(status.status, IncidentStatus::Canceled);

    let sent = h.channel.messages_to("U-ASK").await;
    assert_eq!(sent.len(), 2);
    assert!(sent[0].notice.body.contains("<#C1>"));
    assert!(sent[1].notice.body.contains("`canceled`"));
    assert!(sent.iter().all(|m| !m.pinned));
    h.engine.shutdown().await;
  }

  #[tokio::test]
  async fn failure_notice_is_posted_unpinned() {
    let h = harness(Config::default());
    let err = h.engine.cancel("C-NOPE", "x").await.unwrap_err();

    h.engine.notify_failure("U-REQ", &err).await.unwrap();
    let sent = h.channel.messages_to("U-REQ").await;
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].pinned);
    assert!(sent[0].notice.body.contains("C-NOPE"));
  }
}
