//! Reminder scheduler: one timer task per active incident.
//!
//! The registry maps incident id to the live job's handle. Every entry
//! carries a generation number; a job task only removes or replaces the
//! entry that still holds its own generation, so a stopped or superseded
//! task can never clobber its successor. Stopping a job cancels its token,
//! which prevents future firings but leaves a firing already in progress
//! to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::fanout::Fanout;
use crate::policy::ReminderPolicy;
use crate::reminder::{FiringOutcome, ReminderJob};
use crate::store::IncidentStore;
use crate::types::{Incident, IncidentStatus};

/// Snapshot of one live job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
  pub incident_id: i64,
  pub channel_id: String,
  pub status: IncidentStatus,
  pub interval: Duration,
  pub generation: u64,
}

struct JobHandle {
  info: JobInfo,
  token: CancellationToken,
}

#[derive(Default)]
struct Registry {
  next_generation: u64,
  jobs: HashMap<i64, JobHandle>,
}

struct SchedulerInner {
  store: Arc<dyn IncidentStore>,
  fanout: Fanout,
  policy: ReminderPolicy,
  clock: Arc<dyn Clock>,
  registry: Mutex<Registry>,
  /// Parent of every job token.
  shutdown: CancellationToken,
}

/// Shared scheduler context. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct ReminderScheduler {
  inner: Arc<SchedulerInner>,
}

impl ReminderScheduler {
  pub fn new(
    store: Arc<dyn IncidentStore>,
    fanout: Fanout,
    policy: ReminderPolicy,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      inner: Arc::new(SchedulerInner {
        store,
        fanout,
        policy,
        clock,
        registry: Mutex::new(Registry::default()),
        shutdown: CancellationToken::new(),
      }),
    }
  }

  pub fn policy(&self) -> &ReminderPolicy {
    &self.inner.policy
  }

  /// Arm a job for `incident`, replacing any job already registered for it.
  ///
  /// Returns `false` (and registers nothing) for terminal incidents.
  pub async fn start(&self, incident: &Incident) -> bool {
    let mut registry = self.inner.registry.lock().await;
    self.arm(&mut registry, incident)
  }

  /// Stop the job for `incident_id`. Returns whether one was live.
  pub async fn stop(&self, incident_id: i64) -> bool {
    let removed = self.inner.registry.lock().await.jobs.remove(&incident_id);
    match removed {
      Some(handle) => {
        handle.token.cancel();
        info!(
          incident_id,
          channel_id = %handle.info.channel_id,
          "reminder job stopped"
        );
        true
      }
      None => false,
    }
  }

  /// Arm one job per incident the store reports as active.
  ///
  /// Run once at process start; jobs are not persisted.
  pub async fn start_all(&self) -> Result<usize, StoreError> {
    let incidents = self.inner.store.list_active().await.map_err(|e| {
      error!(error = %e, "listing active incidents failed");
      e
    })?;

    let mut registry = self.inner.registry.lock().await;
    let started = incidents
      .iter()
      .filter(|incident| self.arm(&mut registry, incident))
      .count();
    info!(started, "reminder jobs restored");
    Ok(started)
  }

  pub async fn live_jobs(&self) -> Vec<JobInfo> {
    let registry = self.inner.registry.lock().await;
    let mut jobs: Vec<JobInfo> = registry.jobs.values().map(|h| h.info.clone()).collect();
    jobs.sort_by_key(|j| j.incident_id);
    jobs
  }

  pub async fn job_for(&self, incident_id: i64) -> Option<JobInfo> {
    self
      .inner
      .registry
      .lock()
      .await
      .jobs
      .get(&incident_id)
      .map(|h| h.info.clone())
  }

  /// Stop every job and refuse new ones.
  pub async fn shutdown(&self) {
    self.inner.shutdown.cancel();
    let mut registry = self.inner.registry.lock().await;
    let stopped = registry.jobs.len();
    registry.jobs.clear();
    info!(stopped, "reminder scheduler shut down");
  }

  fn arm(&self, registry: &mut Registry, incident: &Incident) -> bool {
    if self.inner.shutdown.is_cancelled() {
      debug!(incident_id = incident.id, "scheduler shut down, not arming");
      return false;
    }

    let job = match ReminderJob::new(
      incident,
      &self.inner.policy,
      Arc::clone(&self.inner.store),
      self.inner.fanout.clone(),
    ) {
      Some(job) => job,
      None => return false,
    };

    registry.next_generation += 1;
    let generation = registry.next_generation;
    let token = self.inner.shutdown.child_token();
    let info = JobInfo {
      incident_id: incident.id,
      channel_id: incident.channel_id.clone(),
      status: incident.status,
      interval: job.interval(),
      generation,
    };

    if let Some(previous) = registry.jobs.insert(
      incident.id,
      JobHandle {
        info: info.clone(),
        token: token.clone(),
      },
    ) {
      previous.token.cancel();
    }

    info!(
      incident_id = incident.id,
      channel_id = %incident.channel_id,
      status = %incident.status,
      interval_secs = info.interval.as_secs(),
      generation,
      "reminder job started"
    );

    tokio::spawn(self.clone().run(job, token, generation));
    true
  }

  async fn run(self, job: ReminderJob, token: CancellationToken, generation: u64) {
    let interval = job.interval();
    loop {
      tokio::select! {
        biased;
        _ = token.cancelled() => {
          debug!(incident_id = job.incident_id(), generation, "reminder timer cancelled");
          return;
        }
        _ = tokio::time::sleep(interval) => {}
      }

      let now = self.inner.clock.now();
      match job.fire(now).await {
        FiringOutcome::Stop(reason) => {
          debug!(incident_id = job.incident_id(), ?reason, "reminder job finished");
          self.retire(job.incident_id(), generation).await;
          return;
        }
        FiringOutcome::StatusChanged(incident) => {
          self.follow(&incident, generation).await;
          return;
        }
        _ => {}
      }
    }
  }

  /// Remove the entry if it still belongs to `generation`.
  async fn retire(&self, incident_id: i64, generation: u64) {
    let mut registry = self.inner.registry.lock().await;
    if registry
      .jobs
      .get(&incident_id)
      .map_or(false, |h| h.info.generation == generation)
    {
      registry.jobs.remove(&incident_id);
    }
  }

  /// Replace the job of `generation` with one armed for the incident's new status.
  async fn follow(&self, incident: &Incident, generation: u64) {
    let mut registry = self.inner.registry.lock().await;
    let owns_entry = registry
      .jobs
      .get(&incident.id)
      .map_or(false, |h| h.info.generation == generation);
    if !owns_entry {
      debug!(
        incident_id = incident.id,
        generation, "job superseded or stopped, not re-arming"
      );
      return;
    }
    if !self.arm(&mut registry, incident) {
      registry.jobs.remove(&incident.id);
    }
  }
}
