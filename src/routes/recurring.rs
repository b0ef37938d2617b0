use crate::auth::AuthContext;
use crate::clock::SystemClock;
use crate::db::Db;
use crate::error::HiveResult;
use crate::events::EventBus;
use crate::models::{CreateRecurringTemplateInput, RecurringTemplate};
use rocket::serde::json::Json;
use rocket::{delete, get, post, State};
use std::sync::Arc;

use super::require_admin;

#[post("/api/swarm/recurring", format = "json", data = "<body>")]
pub fn create_recurring_template(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, body: Json<CreateRecurringTemplateInput>) -> HiveResult<Json<RecurringTemplate>> {
    require_admin(&ctx)?;
    let template = crate::scheduler::create_template(db, &body)?;
    Ok(Json(template))
}

#[get("/api/swarm/recurring")]
pub fn list_recurring_templates(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext) -> HiveResult<Json<Vec<RecurringTemplate>>> {
    let templates = crate::scheduler::list_templates(db)?;
    Ok(Json(templates))
}

#[post("/api/swarm/recurring/<id>/toggle?<enabled>")]
pub fn toggle_recurring_template(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str, enabled: bool) -> HiveResult<Json<serde_json::Value>> {
    require_admin(&ctx)?;
    crate::scheduler::set_enabled(db, id, enabled)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[delete("/api/swarm/recurring/<id>")]
pub fn delete_recurring_template(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    require_admin(&ctx)?;
    crate::scheduler::delete_template(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

/// Manual kick of the scheduler tick loop, for admins who don't want to wait
/// out the 60s background interval.
#[post("/api/swarm/recurring/tick")]
pub fn tick_recurring(_rl: super::RateLimited, db: &State<Arc<Db>>, bus: &State<Arc<EventBus>>, ctx: AuthContext) -> HiveResult<Json<serde_json::Value>> {
    require_admin(&ctx)?;
    let clock = SystemClock;
    crate::scheduler::tick(db, bus, &clock);
    Ok(Json(serde_json::json!({"ok": true})))
}
