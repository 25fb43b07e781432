//! Rendering of lifecycle notices.
//!
//! Cards follow one shape: a one-line title, then body lines. Fan-out treats
//! the result as opaque.

use crate::clock;
use crate::types::{Incident, IncidentStatus, Notice};

fn card(title: String, lines: Vec<String>) -> Notice {
  Notice::new(title, lines.join("\n"))
}

fn channel_line(incident: &Incident) -> String {
  format!("*Channel:* #{}", incident.channel_name)
}

pub fn opened(incident: &Incident) -> Notice {
  let mut lines = vec![
    format!("*Incident ID:* {}", incident.id),
    format!("*Title:* {}", incident.title),
    format!("*Severity:* {}", incident.severity.label()),
  ];
  if !incident.product.is_empty() {
    lines.push(format!("*Product:* {}", incident.product));
  }
  lines.push(format!("*Channel:* <#{}>", incident.channel_id));
  lines.push(format!("*Commander:* <@{}>", incident.commander));
  lines.push(format!("*Description:* `{}`", incident.description_started));
  if let Some(url) = &incident.meeting_url {
    lines.push(format!("*Incident Room:* {}", url));
  }

  card(
    format!("An Incident has been opened by <@{}>", incident.author),
    lines,
  )
}

pub fn resolved(incident: &Incident) -> Notice {
  let mut lines = vec![channel_line(incident)];
  if let Some(url) = &incident.post_mortem_url {
    lines.push(format!("*Post Mortem:* <{}|post mortem link>", url));
  }
  if !incident.description_resolved.is_empty() {
    lines.push(format!("\n*Description:*\n{}", incident.description_resolved));
  }

  card(
    format!(
      ":large_blue_circle: *Incident #{} - {}* has been resolved",
      incident.id, incident.title
    ),
    lines,
  )
}

pub fn closed(incident: &Incident) -> Notice {
  let mut lines = vec![
    channel_line(incident),
    format!("*Severity:* {}", incident.severity.label()),
  ];
  if let Some(start) = &incident.start_ts {
    lines.push(format!("*Started:* {}", clock::display(start)));
  }
  if let Some(url) = &incident.post_mortem_url {
    lines.push(format!("*Post Mortem:* <{}|post mortem link>", url));
  }
  if !incident.root_cause.is_empty() {
    lines.push(format!("\n*Root Cause:*\n{}", incident.root_cause));
  }

  card(
    format!(
      ":white_check_mark: *Incident #{} - {}* has been closed",
      incident.id, incident.title
    ),
    lines,
  )
}

/// Private confirmation sent to whoever closed the incident.
pub fn closed_by_requester(incident: &Incident) -> Notice {
  Notice::new(
    format!("The Incident <#{}> has been closed by you", incident.channel_id),
    "",
  )
}

pub fn canceled(incident: &Incident) -> Notice {
  let mut lines = vec![channel_line(incident)];
  if !incident.description_cancelled.is_empty() {
    lines.push(format!("\n*Description:*\n{}", incident.description_cancelled));
  }

  card(
    format!(
      ":no_entry: *Incident #{} - {}* has been canceled",
      incident.id, incident.title
    ),
    lines,
  )
}

pub fn edited(incident: &Incident, editor: &str) -> Notice {
  let mut lines = vec![
    format!("*Title:* {}", incident.title),
    format!("*Severity:* {}", incident.severity.label()),
    format!("*Commander:* <@{}>", incident.commander),
    format!("*Description:* `{}`", incident.description_started),
  ];
  if let Some(url) = &incident.meeting_url {
    lines.push(format!("*Meeting:* {}", url));
  }
  if let Some(start) = &incident.start_ts {
    lines.push(format!("*Started:* {}", clock::display(start)));
  }

  card(format!("An Incident has been edited by <@{}>", editor), lines)
}

/// Reminder asking the channel for a status update.
pub fn reminder(template: &str, incident: &Incident) -> Notice {
  Notice::new(
    template.to_string(),
    format!("*Incident #{} - {}*", incident.id, incident.title),
  )
}

/// Explicit failure notice for a requester whose action did not go through.
pub fn failure(text: &str) -> Notice {
  Notice::new(":warning: *Error*", text.to_string())
}

/// Active incident listing.
pub fn active_list(incidents: &[Incident]) -> Notice {
  if incidents.is_empty() {
    return Notice::new("There are no active incidents", "");
  }
  let lines = incidents
    .iter()
    .map(|inc| format!("- <#{}> `{}` {}", inc.channel_id, inc.status, inc.title))
    .collect();
  card("Current active incidents:".to_string(), lines)
}

/// Status and timeline summary of one incident.
pub fn status_summary(incident: &Incident) -> Notice {
  let mut lines = vec![format!("*Status:* `{}`", incident.status)];
  if let Some(start) = &incident.start_ts {
    lines.push(format!("*Incident Initial Time:* {}", clock::display(start)));
  }
  lines.push(format!(
    "*Incident Identification Time:* {}",
    clock::display(&incident.identification_ts)
  ));
  if let Some(end) = &incident.end_ts {
    lines.push(format!("*Incident End Time:* {}", clock::display(end)));
  }
  if incident.status == IncidentStatus::Open || incident.status == IncidentStatus::Resolved {
    if let Some(until) = &incident.snoozed_until {
      lines.push(format!("*Reminders snoozed until:* {}", clock::display(until)));
    }
  }

  card(format!("*Incident #{} - {}*", incident.id, incident.title), lines)
}
