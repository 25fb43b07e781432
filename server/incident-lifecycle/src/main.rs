//! Binary entrypoint: read JSON-lines commands from stdin, write JSON-lines results to stdout.
//!
//! Each input line is one command, tagged by `op`:
//! `open`, `cancel`, `resolve`, `close`, `edit`, `snooze`, `unsnooze`,
//! `get`, `list`, `jobs`. Each produces exactly one output line: the
//! resulting record(s), or an error object.
//!
//! Store and chat are in memory; reminder jobs run for as long as the
//! process does. Logs go to stderr (`RUST_LOG`, default `info`).

use chrono::{DateTime, Utc};
use incident_lifecycle::{
  types::{CloseRequest, IncidentEdit},
  Config, Incident, IncidentDraft, IncidentStatus, LifecycleEngine, LifecycleError, MemoryChannel, MemoryStore,
  SystemClock,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
  Open(IncidentDraft),
  Cancel {
    channel_id: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    requester: Option<String>,
  },
  Resolve {
    channel_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    requester: Option<String>,
  },
  Close(CloseRequest),
  Edit {
    channel_id: String,
    editor: String,
    #[serde(default)]
    fields: IncidentEdit,
  },
  Snooze {
    channel_id: String,
    until: DateTime<Utc>,
    #[serde(default)]
    requester: Option<String>,
  },
  Unsnooze {
    channel_id: String,
    #[serde(default)]
    requester: Option<String>,
  },
  /// `to` also posts the status summary to that destination.
  Get {
    channel_id: String,
    #[serde(default)]
    to: Option<String>,
  },
  /// `to` also posts the active list to that destination.
  List {
    #[serde(default)]
    to: Option<String>,
  },
  Jobs,
}

impl Command {
  /// User to notify when the command fails.
  fn requester(&self) -> Option<&str> {
    match self {
      Self::Open(draft) => Some(draft.author.as_str()),
      Self::Cancel { requester, .. }
      | Self::Resolve { requester, .. }
      | Self::Snooze { requester, .. }
      | Self::Unsnooze { requester, .. } => requester.as_deref(),
      Self::Close(req) => req.requester.as_deref(),
      Self::Edit { editor, .. } => Some(editor.as_str()),
      Self::Get { .. } | Self::List { .. } | Self::Jobs => None,
    }
  }
}

#[derive(Debug, Serialize)]
struct JobLine {
  incident_id: i64,
  channel_id: String,
  status: IncidentStatus,
  interval_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum Output {
  Incident {
    incident: Incident,
  },
  Edited {
    incident: Incident,
    topic_changed: bool,
  },
  Incidents {
    incidents: Vec<Incident>,
  },
  Jobs {
    jobs: Vec<JobLine>,
  },
  Error {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    /// Present when the transition was committed but the incident channel was not notified.
    #[serde(skip_serializing_if = "Option::is_none")]
    incident: Option<Incident>,
  },
}

impl Output {
  fn error(message: impl Into<String>) -> Self {
    Self::Error {
      error: message.into(),
      field: None,
      incident: None,
    }
  }
}

impl From<&LifecycleError> for Output {
  fn from(err: &LifecycleError) -> Self {
    match err {
      LifecycleError::Validation { field, reason } => Self::Error {
        error: reason.clone(),
        field: Some(field.clone()),
        incident: None,
      },
      other => Self::Error {
        error: other.to_string(),
        field: None,
        incident: other.committed_incident().cloned(),
      },
    }
  }
}

async fn execute(engine: &LifecycleEngine, command: &Command) -> Result<Output, LifecycleError> {
  let output = match command {
    Command::Open(draft) => Output::Incident {
      incident: engine.open(draft).await?,
    },
    Command::Cancel { channel_id, reason, .. } => Output::Incident {
      incident: engine.cancel(channel_id, reason).await?,
    },
    Command::Resolve {
      channel_id,
      description,
      requester,
    } => Output::Incident {
      incident: engine.resolve(channel_id, description, requester.as_deref()).await?,
    },
    Command::Close(request) => Output::Incident {
      incident: engine.close(request).await?,
    },
    Command::Edit {
      channel_id,
      editor,
      fields,
    } => {
      let outcome = engine.edit(channel_id, fields, editor).await?;
      Output::Edited {
        incident: outcome.incident,
        topic_changed: outcome.topic_changed,
      }
    }
    Command::Snooze { channel_id, until, .. } => Output::Incident {
      incident: engine.snooze(channel_id, *until).await?,
    },
    Command::Unsnooze { channel_id, .. } => Output::Incident {
      incident: engine.unsnooze(channel_id).await?,
    },
    Command::Get { channel_id, to } => Output::Incident {
      incident: match to {
        Some(destination) => engine.show_status(channel_id, destination).await?,
        None => engine.get(channel_id).await?,
      },
    },
    Command::List { to } => Output::Incidents {
      incidents: match to {
        Some(destination) => engine.show_active(destination).await?,
        None => engine.list_active().await?,
      },
    },
    Command::Jobs => Output::Jobs {
      jobs: engine
        .scheduler()
        .live_jobs()
        .await
        .into_iter()
        .map(|j| JobLine {
          incident_id: j.incident_id,
          channel_id: j.channel_id,
          status: j.status,
          interval_secs: j.interval.as_secs(),
        })
        .collect(),
    },
  };
  Ok(output)
}

/// Run one command. On failure the requester, if any, gets an unpinned notice.
async fn run(engine: &LifecycleEngine, command: &Command) -> Output {
  match execute(engine, command).await {
    Ok(output) => output,
    Err(e) => {
      if let Some(requester) = command.requester() {
        if let Err(delivery) = engine.notify_failure(requester, &e).await {
          warn!(requester, error = %delivery, "failure notice not delivered");
        }
      }
      Output::from(&e)
    }
  }
}

fn emit(out: &mut impl Write, output: &Output) -> std::io::Result<()> {
  serde_json::to_writer(&mut *out, output)?;
  writeln!(out)?;
  out.flush()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let config = Config::from_env()?;
  info!(
    open_interval_secs = config.reminder_open_interval.as_secs(),
    resolved_interval_secs = config.reminder_resolved_interval.as_secs(),
    sla_hours_to_close = config.sla_hours_to_close,
    product_channel = ?config.product_channel,
    "incident-lifecycle starting"
  );

  let engine = LifecycleEngine::new(
    config,
    Arc::new(MemoryStore::new()),
    Arc::new(MemoryChannel::default()),
    Arc::new(SystemClock),
  );
  engine.scheduler().start_all().await?;

  let stdout = std::io::stdout();
  let mut out = std::io::BufWriter::new(stdout.lock());
  let mut lines = BufReader::new(tokio::io::stdin()).lines();

  while let Some(line) = lines.next_line().await? {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let command: Command = match serde_json::from_str(trimmed) {
      Ok(c) => c,
      Err(e) => {
        emit(&mut out, &Output::error(format!("json parse: {}", e)))?;
        continue;
      }
    };

    let output = run(&engine, &command).await;
    emit(&mut out, &output)?;
  }

  engine.shutdown().await;
  Ok(())
}
