use crate::broadcast::mark_delivered;
use crate::clock::{Clock, WorkHours};
use crate::db::Db;
use crate::error::HiveError;
use crate::models::{WakeAction, WakeItem, WakePayload};
use crate::presence::PresenceTracker;
use rusqlite::params;

/// Pending follow-ups older than this are promoted from `normal` to `high`
/// priority. Not read from config; 24h is a fixed decision documented in
/// DESIGN.md.
const PENDING_PROMOTE_HOURS: i64 = 24;

/// Pure function, no store access: an item is suppressed when its project
/// defines working hours and `now` (in the project's timezone) falls
/// outside `[start, end)`. Items with no project, or `includeOffHours`, are
/// never suppressed.
fn suppressed_by_work_hours(
    clock: &dyn Clock,
    start: Option<&str>,
    end: Option<&str>,
    timezone: &str,
    include_off_hours: bool,
) -> bool {
    if include_off_hours {
        return false;
    }
    let (Some(start), Some(end)) = (start, end) else { return false };
    let Some(start_t) = crate::clock::parse_hhmm(start) else { return false };
    let Some(end_t) = crate::clock::parse_hhmm(end) else { return false };
    let wh = WorkHours { start: start_t, end: end_t, timezone: crate::clock::parse_tz(timezone) };
    !wh.contains(clock.now())
}

pub fn get_wake_items(
    db: &Db,
    presence: &PresenceTracker,
    clock: &dyn Clock,
    base_url: Option<&str>,
    identity: &str,
    include_off_hours: bool,
) -> Result<WakePayload, HiveError> {
    let mut items = Vec::new();
    let mut categories = std::collections::BTreeSet::new();
    let mut delivered_buzz: Vec<String> = Vec::new();

    {
        let conn = db.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, sender, title, urgent, created_at FROM mailbox_messages WHERE recipient = ?1 AND status = 'unread'",
        )?;
        let rows: Vec<(i64, String, String, bool, String)> = stmt
            .query_map(params![identity], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
            .filter_map(|r| r.ok())
            .collect();
        for (id, sender, title, urgent, created_at) in rows {
            items.push(WakeItem {
                source: "message".to_string(),
                id: id.to_string(),
                priority: if urgent { "high" } else { "normal" }.to_string(),
                action: "Read and respond to this message.".to_string(),
                data: serde_json::json!({"id": id, "sender": sender, "title": title, "createdAt": created_at}),
                project_id: None,
            });
            categories.insert("message");
        }
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT id, sender, title, waiting_since FROM mailbox_messages WHERE response_waiting = 1 AND waiting_responder = ?1",
        )?;
        let rows: Vec<(i64, String, String, String)> = stmt
            .query_map(params![identity], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
            .filter_map(|r| r.ok())
            .collect();
        for (id, sender, title, waiting_since) in rows {
            let age_hours = chrono::DateTime::parse_from_rfc3339(&waiting_since)
                .map(|t| (clock.now() - t.with_timezone(&chrono::Utc)).num_hours())
                .unwrap_or(0);
            items.push(WakeItem {
                source: "message_pending".to_string(),
                id: id.to_string(),
                priority: if age_hours >= PENDING_PROMOTE_HOURS { "high" } else { "normal" }.to_string(),
                action: format!("You marked this for follow-up {age_hours}h ago. Deliver or clear pending."),
                data: serde_json::json!({"id": id, "sender": sender, "title": title, "waitingSince": waiting_since}),
                project_id: None,
            });
            categories.insert("message_pending");
        }
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT t.id, t.project_id, t.title, t.status, p.work_hours_start, p.work_hours_end, p.work_hours_timezone
             FROM swarm_tasks t LEFT JOIN swarm_projects p ON p.id = t.project_id
             WHERE t.assignee_user_id = ?1 AND t.status IN ('ready', 'in_progress', 'review')",
        )?;
        let rows: Vec<(String, Option<String>, String, String, Option<String>, Option<String>, Option<String>)> = stmt
            .query_map(params![identity], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        for (id, project_id, title, status, wh_start, wh_end, wh_tz) in rows {
            let tz = wh_tz.unwrap_or_else(|| "UTC".to_string());
            if suppressed_by_work_hours(clock, wh_start.as_deref(), wh_end.as_deref(), &tz, include_off_hours) {
                continue;
            }
            let action = match status.as_str() {
                "ready" => "Pick it up.",
                "in_progress" => "Verify and update.",
                "review" => "Review and approve/reject.",
                _ => "Take action.",
            };
            items.push(WakeItem {
                source: "swarm".to_string(),
                id: id.clone(),
                priority: "normal".to_string(),
                action: action.to_string(),
                data: serde_json::json!({"id": id, "title": title, "status": status}),
                project_id,
            });
            categories.insert("swarm");
        }

        let mut stmt = conn.prepare(
            "SELECT e.id, e.app_name, e.title, e.received_at, w.wake_agent, w.notify_agent
             FROM broadcast_events e JOIN broadcast_webhooks w ON w.id = e.webhook_id
             WHERE (w.wake_agent = ?1 OR w.notify_agent = ?1)
               AND NOT (',' || e.delivered_to_wake || ',') LIKE ('%,' || ?1 || ',%')",
        )?;
        let rows: Vec<(String, String, String, String, Option<String>, Option<String>)> = stmt
            .query_map(params![identity], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        for (id, app_name, title, received_at, wake_agent, notify_agent) in rows {
            let is_wake_role = wake_agent.as_deref() == Some(identity);
            let action = if is_wake_role {
                "Create a swarm task in ready to investigate this alert."
            } else if notify_agent.as_deref() == Some(identity) {
                "Review for awareness."
            } else {
                continue;
            };
            items.push(WakeItem {
                source: "buzz".to_string(),
                id: id.clone(),
                priority: if is_wake_role { "high" } else { "normal" }.to_string(),
                action: action.to_string(),
                data: serde_json::json!({"id": id, "appName": app_name, "title": title, "receivedAt": received_at}),
                project_id: None,
            });
            categories.insert("buzz");
            delivered_buzz.push(id);
        }

        let stale_hours: i64 = conn
            .query_row(
                "SELECT stale_trigger_hours FROM mailbox_tokens WHERE backup_agent = ?1 AND revoked_at IS NULL LIMIT 1",
                params![identity],
                |r| r.get::<_, Option<i64>>(0),
            )
            .ok()
            .flatten()
            .unwrap_or(24);

        let mut stmt = conn.prepare("SELECT identity FROM mailbox_tokens WHERE backup_agent = ?1 AND revoked_at IS NULL")?;
        let backups: Vec<String> = stmt.query_map(params![identity], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
        for agent in backups {
            let (online, last_seen, _) = presence.status(&agent);
            if online {
                continue;
            }
            let stale = chrono::DateTime::parse_from_rfc3339(&last_seen)
                .map(|t| (clock.now() - t.with_timezone(&chrono::Utc)).num_hours() >= stale_hours)
                .unwrap_or(true);
            if stale {
                items.push(WakeItem {
                    source: "backup".to_string(),
                    id: agent.clone(),
                    priority: "normal".to_string(),
                    action: format!("Check if {agent} is offline and notify the team."),
                    data: serde_json::json!({"agent": agent, "lastSeen": last_seen}),
                    project_id: None,
                });
                categories.insert("backup");
            }
        }
    }

    for id in &delivered_buzz {
        mark_delivered(db, id, identity)?;
    }

    let actions = categories
        .into_iter()
        .map(|category| WakeAction {
            category: category.to_string(),
            skill_url: format!("{}/api/skills/{category}", base_url.unwrap_or("")),
        })
        .collect::<Vec<_>>();

    let summary = if items.is_empty() {
        None
    } else {
        Some(format!("{} item(s) waiting for {identity}", items.len()))
    };

    Ok(WakePayload { items, actions, summary, timestamp: clock.now().to_rfc3339() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    #[test]
    fn include_off_hours_disables_suppression() {
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap());
        assert!(!suppressed_by_work_hours(&clock, Some("09:00"), Some("17:00"), "UTC", true));
    }

    #[test]
    fn outside_window_is_suppressed_unless_overridden() {
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap());
        assert!(suppressed_by_work_hours(&clock, Some("09:00"), Some("17:00"), "UTC", false));
    }

    #[test]
    fn missing_work_hours_never_suppresses() {
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap());
        assert!(!suppressed_by_work_hours(&clock, None, None, "UTC", false));
    }
}
