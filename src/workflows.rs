use crate::db::Db;
use crate::error::HiveError;
use crate::models::{CreateWorkflowInput, Workflow};
use crate::webhooks::check_outbound_url;
use rusqlite::params;
use std::time::Duration;

fn row_to_workflow(row: &rusqlite::Row) -> rusqlite::Result<Workflow> {
    Ok(Workflow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        tagged_users: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const COLUMNS: &str = "id, task_id, title, url, tagged_users, created_at";

fn encode_tagged_users(users: &[String]) -> Option<String> {
    if users.is_empty() {
        None
    } else {
        Some(serde_json::to_string(users).unwrap_or_default())
    }
}

fn decode_tagged_users(raw: &Option<String>) -> Vec<String> {
    raw.as_deref().and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

/// A workflow is visible to `viewer` when `taggedUsers` is null/empty (meaning
/// everyone) or when `viewer` appears in the set.
fn visible_to(workflow: &Workflow, viewer: &str) -> bool {
    let tagged = decode_tagged_users(&workflow.tagged_users);
    tagged.is_empty() || tagged.iter().any(|u| u == viewer)
}

pub fn create_workflow(db: &Db, task_id: &str, input: &CreateWorkflowInput) -> Result<Workflow, HiveError> {
    let conn = db.conn.lock().unwrap();
    conn.query_row("SELECT 1 FROM swarm_tasks WHERE id = ?1", params![task_id], |_| Ok(()))
        .map_err(|_| HiveError::NotFound("task not found".to_string()))?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let tagged = encode_tagged_users(&input.tagged_users);
    conn.execute(
        "INSERT INTO workflows (id, task_id, title, url, tagged_users, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, task_id, &input.title, &input.url, &tagged, &now],
    )?;

    conn.query_row(&format!("SELECT {COLUMNS} FROM workflows WHERE id = ?1"), params![&id], row_to_workflow)
        .map_err(|e| e.into())
}

pub fn list_workflows(db: &Db, task_id: &str, viewer: &str) -> Result<Vec<Workflow>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM workflows WHERE task_id = ?1 ORDER BY created_at ASC"))?;
    let rows: Vec<Workflow> = stmt.query_map(params![task_id], row_to_workflow)?.filter_map(|r| r.ok()).collect();
    Ok(rows.into_iter().filter(|w| visible_to(w, viewer)).collect())
}

pub fn delete_workflow(db: &Db, id: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let changed = conn.execute("DELETE FROM workflows WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(HiveError::NotFound("workflow not found".to_string()));
    }
    Ok(())
}

/// Fetches the referenced document's body, guarded against SSRF the same way
/// outbound webhook deliveries are, with a shorter 8s budget and no
/// redirect-following (cross-origin redirection is how an open fetcher turns
/// into an SSRF oracle).
pub async fn fetch_document(url: &str, allowed_hosts: &[String]) -> Result<String, HiveError> {
    let checked = check_outbound_url(url, allowed_hosts).map_err(|e| HiveError::BadRequest(e.to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(8))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| HiveError::Internal(e.to_string()))?;

    let resp = client
        .get(checked)
        .send()
        .await
        .map_err(|e| HiveError::BadGateway(format!("workflow document fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(HiveError::BadGateway(format!("workflow document returned {}", resp.status())));
    }

    resp.text().await.map_err(|e| HiveError::BadGateway(format!("workflow document body read failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;

    fn test_db() -> Db {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn);
        let db = Db { conn: std::sync::Mutex::new(conn) };
        let c = db.conn.lock().unwrap();
        c.execute(
            "INSERT INTO swarm_tasks (id, title, creator_user_id, status, sort_key, created_at, updated_at) VALUES ('t1', 'task', 'alice', 'queued', 1.0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        drop(c);
        db
    }

    #[test]
    fn untagged_workflow_is_visible_to_everyone() {
        let db = test_db();
        create_workflow(&db, "t1", &CreateWorkflowInput { title: "doc".into(), url: "https://example.com/doc".into(), tagged_users: vec![] }).unwrap();
        let visible = list_workflows(&db, "t1", "bob").unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn tagged_workflow_is_hidden_from_non_tagged_viewers() {
        let db = test_db();
        create_workflow(
            &db,
            "t1",
            &CreateWorkflowInput { title: "doc".into(), url: "https://example.com/doc".into(), tagged_users: vec!["alice".into()] },
        )
        .unwrap();
        assert_eq!(list_workflows(&db, "t1", "alice").unwrap().len(), 1);
        assert_eq!(list_workflows(&db, "t1", "bob").unwrap().len(), 0);
    }

    #[test]
    fn create_workflow_rejects_unknown_task() {
        let db = test_db();
        let result = create_workflow(&db, "missing", &CreateWorkflowInput { title: "doc".into(), url: "https://example.com".into(), tagged_users: vec![] });
        assert!(result.is_err());
    }
}
