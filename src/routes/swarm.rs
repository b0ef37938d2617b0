use crate::auth::AuthContext;
use crate::clock::SystemClock;
use crate::config::HiveConfig;
use crate::db::Db;
use crate::error::HiveResult;
use crate::events::EventBus;
use crate::models::{
    CreateProjectInput, CreateTaskInput, CreateWorkflowInput, PresenceStatus, ReorderTaskInput, SwarmProject,
    SwarmTask, SwarmTaskEvent, TaskFilter, UpdateProjectInput, UpdateTaskInput, WakePayload, Workflow,
};
use crate::presence::PresenceTracker;
use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};
use std::collections::HashMap;
use std::sync::Arc;

use super::require_admin;

#[post("/api/swarm/projects", format = "json", data = "<body>")]
pub fn create_project(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, body: Json<CreateProjectInput>) -> HiveResult<Json<SwarmProject>> {
    require_admin(&ctx)?;
    let project = crate::swarm::create_project(db, &body)?;
    Ok(Json(project))
}

#[get("/api/swarm/projects?<include_archived>")]
pub fn list_projects(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, include_archived: Option<bool>) -> HiveResult<Json<Vec<SwarmProject>>> {
    let projects = crate::swarm::list_projects(db, include_archived.unwrap_or(false))?;
    Ok(Json(projects))
}

#[patch("/api/swarm/projects/<id>", format = "json", data = "<body>")]
pub fn update_project(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str, body: Json<UpdateProjectInput>) -> HiveResult<Json<SwarmProject>> {
    require_admin(&ctx)?;
    let project = crate::swarm::update_project(db, id, &body)?;
    Ok(Json(project))
}

#[delete("/api/swarm/projects/<id>")]
pub fn archive_project(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    require_admin(&ctx)?;
    crate::swarm::archive_project(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[post("/api/swarm/tasks", format = "json", data = "<body>")]
pub fn create_task(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    bus: &State<Arc<EventBus>>,
    ctx: AuthContext,
    body: Json<CreateTaskInput>,
) -> HiveResult<Json<SwarmTask>> {
    let task = crate::swarm::create_task(db, bus, &ctx.identity, &body)?;
    Ok(Json(task))
}

#[get("/api/swarm/tasks?<project_id>&<assignee>&<include_completed>")]
pub fn list_tasks(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    _ctx: AuthContext,
    project_id: Option<String>,
    assignee: Option<String>,
    include_completed: Option<bool>,
) -> HiveResult<Json<Vec<SwarmTask>>> {
    let filter = TaskFilter { statuses: None, assignee, project_id, include_completed: include_completed.unwrap_or(false) };
    let tasks = crate::swarm::list_tasks(db, &filter)?;
    Ok(Json(tasks))
}

#[patch("/api/swarm/tasks/<id>", format = "json", data = "<body>")]
pub fn update_task(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    bus: &State<Arc<EventBus>>,
    ctx: AuthContext,
    id: &str,
    body: Json<UpdateTaskInput>,
) -> HiveResult<Json<SwarmTask>> {
    let task = crate::swarm::update_task(db, bus, id, &ctx.identity, &body)?;
    Ok(Json(task))
}

#[delete("/api/swarm/tasks/<id>")]
pub fn delete_task(_rl: super::RateLimited, db: &State<Arc<Db>>, bus: &State<Arc<EventBus>>, _ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    crate::swarm::delete_task(db, bus, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[post("/api/swarm/tasks/<id>/reorder", format = "json", data = "<body>")]
pub fn reorder_task(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: &str, body: Json<ReorderTaskInput>) -> HiveResult<Json<SwarmTask>> {
    let task = crate::swarm::reorder_task(db, id, &body)?;
    Ok(Json(task))
}

#[get("/api/swarm/tasks/<id>/events")]
pub fn list_task_events(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: &str) -> HiveResult<Json<Vec<SwarmTaskEvent>>> {
    let events = crate::swarm::list_task_events(db, id)?;
    Ok(Json(events))
}

#[post("/api/swarm/tasks/<id>/workflows", format = "json", data = "<body>")]
pub fn create_workflow(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: &str, body: Json<CreateWorkflowInput>) -> HiveResult<Json<Workflow>> {
    let workflow = crate::workflows::create_workflow(db, id, &body)?;
    Ok(Json(workflow))
}

#[get("/api/swarm/tasks/<id>/workflows")]
pub fn list_workflows(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str) -> HiveResult<Json<Vec<Workflow>>> {
    let workflows = crate::workflows::list_workflows(db, id, &ctx.identity)?;
    Ok(Json(workflows))
}

#[delete("/api/swarm/workflows/<id>")]
pub fn delete_workflow(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    crate::workflows::delete_workflow(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[get("/api/presence")]
pub fn list_presence(_rl: super::RateLimited, db: &State<Arc<Db>>, presence: &State<Arc<PresenceTracker>>, _ctx: AuthContext) -> HiveResult<Json<HashMap<String, PresenceStatus>>> {
    let mut out = HashMap::new();
    for (identity, (online, last_seen, source)) in presence.all() {
        let unread = crate::mailbox::unread_count(db, &identity).unwrap_or(0);
        out.insert(identity, PresenceStatus { online, last_seen, source, unread });
    }
    Ok(Json(out))
}

#[get("/api/wake?<include_off_hours>")]
pub fn get_wake(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    presence: &State<Arc<PresenceTracker>>,
    config: &State<HiveConfig>,
    ctx: AuthContext,
    include_off_hours: Option<bool>,
) -> HiveResult<Json<WakePayload>> {
    let clock = SystemClock;
    let payload = crate::wake::get_wake_items(
        db,
        presence,
        &clock,
        config.base_url.as_deref(),
        &ctx.identity,
        include_off_hours.unwrap_or(false),
    )?;
    Ok(Json(payload))
}
