use crate::auth::AuthContext;
use crate::db::Db;
use crate::error::HiveResult;
use crate::models::{CreatePageInput, NotebookPage, UpdatePageInput};
use rocket::serde::json::Json;
use rocket::{get, post, put, State};
use std::sync::Arc;

pub use crate::notebook_ws::notebook_ws;

#[post("/api/notebook/pages", format = "json", data = "<body>")]
pub fn create_page(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, body: Json<CreatePageInput>) -> HiveResult<Json<NotebookPage>> {
    let page = crate::notebook::create_page(db, &ctx.identity, &body)?;
    Ok(Json(page))
}

#[get("/api/notebook/pages?<include_archived>")]
pub fn list_pages(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, include_archived: Option<bool>) -> HiveResult<Json<Vec<NotebookPage>>> {
    let pages = crate::notebook::list_pages(db, include_archived.unwrap_or(false))?;
    Ok(Json(pages))
}

#[get("/api/notebook/pages/<id>")]
pub fn get_page(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: &str) -> HiveResult<Json<NotebookPage>> {
    let page = crate::notebook::get_page(db, id)?;
    Ok(Json(page))
}

#[put("/api/notebook/pages/<id>", format = "json", data = "<body>")]
pub fn update_page(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    ctx: AuthContext,
    id: &str,
    body: Json<UpdatePageInput>,
) -> HiveResult<Json<NotebookPage>> {
    let page = crate::notebook::update_page(db, id, &ctx.identity, &body)?;
    Ok(Json(page))
}

#[post("/api/notebook/pages/<id>/archive")]
pub fn archive_page(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    crate::notebook::archive_page(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}
