use crate::db::Db;
use crate::error::HiveError;
use crate::events::{EventBus, HiveEvent};
use crate::models::{
    CreateProjectInput, CreateTaskInput, ReorderTaskInput, SwarmProject, SwarmTask, SwarmTaskEvent, TaskFilter,
    UpdateProjectInput, UpdateTaskInput,
};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_project(row: &Row) -> rusqlite::Result<SwarmProject> {
    Ok(SwarmProject {
        id: row.get(0)?,
        title: row.get(1)?,
        color: row.get(2)?,
        description: row.get(3)?,
        project_lead_user_id: row.get(4)?,
        developer_lead_user_id: row.get(5)?,
        work_hours_start: row.get(6)?,
        work_hours_end: row.get(7)?,
        work_hours_timezone: row.get(8)?,
        blocking_mode: row.get(9)?,
        archived_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

const PROJECT_COLUMNS: &str = "id, title, color, description, project_lead_user_id, developer_lead_user_id, \
    work_hours_start, work_hours_end, work_hours_timezone, blocking_mode, archived_at, created_at";

pub fn create_project(db: &Db, input: &CreateProjectInput) -> Result<SwarmProject, HiveError> {
    let conn = db.conn.lock().unwrap();
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO swarm_projects (id, title, color, description, project_lead_user_id, developer_lead_user_id,
            work_hours_start, work_hours_end, work_hours_timezone, blocking_mode, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![&id, &input.title, &input.color, &input.description, &input.project_lead_user_id, &input.developer_lead_user_id,
            &input.work_hours_start, &input.work_hours_end, &input.work_hours_timezone, input.blocking_mode, &now],
    )?;
    conn.query_row(&format!("SELECT {PROJECT_COLUMNS} FROM swarm_projects WHERE id = ?1"), params![&id], row_to_project)
        .map_err(|e| e.into())
}

pub fn list_projects(db: &Db, include_archived: bool) -> Result<Vec<SwarmProject>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!(
        "SELECT {PROJECT_COLUMNS} FROM swarm_projects WHERE ?1 OR archived_at IS NULL ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![include_archived], row_to_project)?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}

pub fn get_project(db: &Db, id: &str) -> Result<SwarmProject, HiveError> {
    let conn = db.conn.lock().unwrap();
    conn.query_row(&format!("SELECT {PROJECT_COLUMNS} FROM swarm_projects WHERE id = ?1"), params![id], row_to_project)
        .optional()?
        .ok_or_else(|| HiveError::NotFound("project not found".to_string()))
}

pub fn update_project(db: &Db, id: &str, input: &UpdateProjectInput) -> Result<SwarmProject, HiveError> {
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "UPDATE swarm_projects SET
            title = COALESCE(?2, title), color = COALESCE(?3, color), description = COALESCE(?4, description),
            project_lead_user_id = COALESCE(?5, project_lead_user_id), developer_lead_user_id = COALESCE(?6, developer_lead_user_id),
            work_hours_start = COALESCE(?7, work_hours_start), work_hours_end = COALESCE(?8, work_hours_end),
            work_hours_timezone = COALESCE(?9, work_hours_timezone), blocking_mode = COALESCE(?10, blocking_mode)
         WHERE id = ?1",
        params![id, input.title, input.color, input.description, input.project_lead_user_id, input.developer_lead_user_id,
            input.work_hours_start, input.work_hours_end, input.work_hours_timezone, input.blocking_mode],
    )?;
    get_project(db, id)
}

pub fn archive_project(db: &Db, id: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute("UPDATE swarm_projects SET archived_at = ?1 WHERE id = ?2", params![now, id])?;
    Ok(())
}

fn row_to_task(row: &Row) -> rusqlite::Result<SwarmTask> {
    Ok(SwarmTask {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        detail: row.get(3)?,
        follow_up: row.get(4)?,
        issue_url: row.get(5)?,
        creator_user_id: row.get(6)?,
        assignee_user_id: row.get(7)?,
        status: row.get(8)?,
        sort_key: row.get(9)?,
        on_or_after_at: row.get(10)?,
        must_be_done_after_task_id: row.get(11)?,
        next_task_id: row.get(12)?,
        next_task_assignee_user_id: row.get(13)?,
        recurring_template_id: row.get(14)?,
        recurring_instance_at: row.get(15)?,
        completed_at: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

const TASK_COLUMNS: &str = "id, project_id, title, detail, follow_up, issue_url, creator_user_id, assignee_user_id, \
    status, sort_key, on_or_after_at, must_be_done_after_task_id, next_task_id, next_task_assignee_user_id, \
    recurring_template_id, recurring_instance_at, completed_at, created_at, updated_at";

pub fn create_task(db: &Db, bus: &EventBus, creator: &str, input: &CreateTaskInput) -> Result<SwarmTask, HiveError> {
    let conn = db.conn.lock().unwrap();
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let max_sort: f64 = conn
        .query_row("SELECT COALESCE(MAX(sort_key), 0) FROM swarm_tasks WHERE project_id IS ?1", params![input.project_id], |r| r.get(0))
        .unwrap_or(0.0);

    conn.execute(
        "INSERT INTO swarm_tasks (id, project_id, title, detail, follow_up, issue_url, creator_user_id, assignee_user_id,
            status, sort_key, on_or_after_at, must_be_done_after_task_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![&id, &input.project_id, &input.title, &input.detail, &input.follow_up, &input.issue_url, creator,
            &input.assignee_user_id, &input.status, max_sort + 1.0, &input.on_or_after_at, &input.must_be_done_after_task_id, &now],
    )?;

    let task: SwarmTask = conn.query_row(&format!("SELECT {TASK_COLUMNS} FROM swarm_tasks WHERE id = ?1"), params![&id], row_to_task)?;
    append_event(&conn, &id, creator, "created", None, Some(&task))?;

    drop(conn);
    bus.emit(crate::events::CHANNEL_SWARM, HiveEvent::SwarmTaskCreated(task.clone()));
    Ok(task)
}

fn append_event(
    conn: &rusqlite::Connection,
    task_id: &str,
    actor: &str,
    kind: &str,
    before: Option<&SwarmTask>,
    after: Option<&SwarmTask>,
) -> Result<(), HiveError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let before_json = before.map(|t| serde_json::to_string(t).unwrap_or_default());
    let after_json = after.map(|t| serde_json::to_string(t).unwrap_or_default());
    conn.execute(
        "INSERT INTO swarm_task_events (id, task_id, actor_user_id, kind, before_state, after_state, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![&id, task_id, actor, kind, before_json, after_json, now],
    )?;
    Ok(())
}

/// Fixed status precedence for listing order: in-flight work floats to the
/// top, terminal work sinks to the bottom, regardless of which project a
/// task belongs to.
const STATUS_ORDER_CASE: &str = "CASE status
    WHEN 'in_progress' THEN 0
    WHEN 'review' THEN 1
    WHEN 'ready' THEN 2
    WHEN 'queued' THEN 3
    WHEN 'holding' THEN 4
    WHEN 'complete' THEN 5
    ELSE 6 END";

pub fn list_tasks(db: &Db, filter: &TaskFilter) -> Result<Vec<SwarmTask>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let statuses = filter.statuses.clone();
    let exclude_complete = statuses.is_none() && !filter.include_completed;

    let mut sql = format!(
        "SELECT {TASK_COLUMNS} FROM swarm_tasks WHERE (?1 IS NULL OR project_id = ?1) AND (?2 IS NULL OR assignee_user_id = ?2)"
    );
    if exclude_complete {
        sql.push_str(" AND status != 'complete'");
    }
    sql.push_str(&format!(" ORDER BY {STATUS_ORDER_CASE} ASC, sort_key ASC, created_at ASC"));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows: Vec<SwarmTask> = stmt
        .query_map(params![filter.project_id, filter.assignee], row_to_task)?
        .filter_map(|r| r.ok())
        .collect();

    if let Some(ref statuses) = statuses {
        rows.retain(|t| statuses.contains(&t.status));
    }

    Ok(rows)
}

pub fn get_task(db: &Db, id: &str) -> Result<SwarmTask, HiveError> {
    let conn = db.conn.lock().unwrap();
    conn.query_row(&format!("SELECT {TASK_COLUMNS} FROM swarm_tasks WHERE id = ?1"), params![id], row_to_task)
        .optional()?
        .ok_or_else(|| HiveError::NotFound("task not found".to_string()))
}

/// Status is unconstrained (any → any); the only side effects are
/// `completedAt` bookkeeping and the per-change audit event.
pub fn update_task(db: &Db, bus: &EventBus, id: &str, actor: &str, input: &UpdateTaskInput) -> Result<SwarmTask, HiveError> {
    let conn = db.conn.lock().unwrap();
    let before: SwarmTask = conn
        .query_row(&format!("SELECT {TASK_COLUMNS} FROM swarm_tasks WHERE id = ?1"), params![id], row_to_task)
        .optional()?
        .ok_or_else(|| HiveError::NotFound("task not found".to_string()))?;

    let now = chrono::Utc::now().to_rfc3339();
    let new_status = input.status.clone().unwrap_or_else(|| before.status.clone());
    let (completed_at, clear_completed) = match (before.status.as_str(), new_status.as_str()) {
        (prev, "complete") if prev != "complete" => (Some(now.clone()), false),
        (prev, next) if prev == "complete" && next != "complete" => (None, true),
        _ => (before.completed_at.clone(), false),
    };

    conn.execute(
        "UPDATE swarm_tasks SET
            title = COALESCE(?2, title), detail = COALESCE(?3, detail), follow_up = COALESCE(?4, follow_up),
            issue_url = COALESCE(?5, issue_url), assignee_user_id = COALESCE(?6, assignee_user_id),
            status = COALESCE(?7, status), on_or_after_at = COALESCE(?8, on_or_after_at),
            must_be_done_after_task_id = COALESCE(?9, must_be_done_after_task_id),
            next_task_id = COALESCE(?10, next_task_id), next_task_assignee_user_id = COALESCE(?11, next_task_assignee_user_id),
            completed_at = CASE WHEN ?12 THEN NULL ELSE COALESCE(?13, completed_at) END,
            updated_at = ?14
         WHERE id = ?1",
        params![id, input.title, input.detail, input.follow_up, input.issue_url, input.assignee_user_id, input.status,
            input.on_or_after_at, input.must_be_done_after_task_id, input.next_task_id, input.next_task_assignee_user_id,
            clear_completed, completed_at, now],
    )?;

    let after: SwarmTask = conn.query_row(&format!("SELECT {TASK_COLUMNS} FROM swarm_tasks WHERE id = ?1"), params![id], row_to_task)?;
    let kind = if before.status != after.status {
        "status_changed"
    } else if before.assignee_user_id != after.assignee_user_id {
        "reassigned"
    } else {
        "updated"
    };
    append_event(&conn, id, actor, kind, Some(&before), Some(&after))?;

    drop(conn);
    bus.emit(crate::events::CHANNEL_SWARM, HiveEvent::SwarmTaskUpdated(after.clone()));
    Ok(after)
}

pub fn delete_task(db: &Db, bus: &EventBus, id: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let changed = conn.execute("DELETE FROM swarm_tasks WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(HiveError::NotFound("task not found".to_string()));
    }
    drop(conn);
    bus.emit(crate::events::CHANNEL_SWARM, HiveEvent::SwarmTaskDeleted { id: id.to_string() });
    Ok(())
}

/// Recomputes `sortKey` to sit strictly before `beforeTaskId` (or after the
/// current max when `null`), a numeric free-ordering scheme rather than a
/// full integer-gap renumbering pass.
pub fn reorder_task(db: &Db, id: &str, input: &ReorderTaskInput) -> Result<SwarmTask, HiveError> {
    let conn = db.conn.lock().unwrap();
    let project_id: Option<String> = conn
        .query_row("SELECT project_id FROM swarm_tasks WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| HiveError::NotFound("task not found".to_string()))?;

    let new_sort_key = match &input.before_task_id {
        Some(before_id) => {
            let before_sort: f64 = conn
                .query_row("SELECT sort_key FROM swarm_tasks WHERE id = ?1", params![before_id], |r| r.get(0))
                .optional()?
                .ok_or_else(|| HiveError::NotFound("beforeTaskId not found".to_string()))?;
            let prior_sort: Option<f64> = conn
                .query_row(
                    "SELECT MAX(sort_key) FROM swarm_tasks WHERE project_id IS ?1 AND sort_key < ?2",
                    params![project_id, before_sort],
                    |r| r.get(0),
                )
                .unwrap_or(None);
            match prior_sort {
                Some(p) => (p + before_sort) / 2.0,
                None => before_sort - 1.0,
            }
        }
        None => {
            let max_sort: f64 = conn
                .query_row("SELECT COALESCE(MAX(sort_key), 0) FROM swarm_tasks WHERE project_id IS ?1", params![project_id], |r| r.get(0))
                .unwrap_or(0.0);
            max_sort + 1.0
        }
    };

    conn.execute("UPDATE swarm_tasks SET sort_key = ?1 WHERE id = ?2", params![new_sort_key, id])?;
    conn.query_row(&format!("SELECT {TASK_COLUMNS} FROM swarm_tasks WHERE id = ?1"), params![id], row_to_task)
        .map_err(|e| e.into())
}

pub fn list_task_events(db: &Db, task_id: &str) -> Result<Vec<SwarmTaskEvent>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, task_id, actor_user_id, kind, before_state, after_state, created_at FROM swarm_task_events
         WHERE task_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt
        .query_map(params![task_id], |row| {
            let before_str: Option<String> = row.get(4)?;
            let after_str: Option<String> = row.get(5)?;
            Ok(SwarmTaskEvent {
                id: row.get(0)?,
                task_id: row.get(1)?,
                actor_user_id: row.get(2)?,
                kind: row.get(3)?,
                before_state: before_str.and_then(|s| serde_json::from_str(&s).ok()),
                after_state: after_str.and_then(|s| serde_json::from_str(&s).ok()),
                created_at: row.get(6)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use crate::events::EventBus;

    fn test_db() -> Db {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn);
        Db { conn: std::sync::Mutex::new(conn) }
    }

    #[test]
    fn listing_order_follows_fixed_status_precedence() {
        let db = test_db();
        let bus = EventBus::new();
        let mut make = |title: &str, status: &str| {
            let mut input = CreateTaskInput {
                project_id: None,
                title: title.to_string(),
                detail: None,
                follow_up: None,
                issue_url: None,
                assignee_user_id: None,
                status: "queued".to_string(),
                on_or_after_at: None,
                must_be_done_after_task_id: None,
            };
            input.status = status.to_string();
            create_task(&db, &bus, "alice", &input).unwrap()
        };

        make("holding task", "holding");
        make("queued task", "queued");
        make("ready task", "ready");
        make("review task", "review");
        make("in progress task", "in_progress");
        make("complete task", "complete");

        let tasks = list_tasks(&db, &TaskFilter { include_completed: true, ..Default::default() }).unwrap();
        let order: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            order,
            vec!["in progress task", "review task", "ready task", "queued task", "holding task", "complete task"]
        );
    }
}
