pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod mailbox;
pub mod models;
pub mod notebook;
pub mod notebook_ws;
pub mod presence;
pub mod rate_limit;
pub mod routes;
pub mod scheduler;
pub mod swarm;
pub mod wake;
pub mod webhooks;
pub mod workflows;

use auth::AuthCache;
use config::HiveConfig;
use db::Db;
use events::EventBus;
use notebook::NotebookRegistry;
use presence::PresenceTracker;
use rate_limit::{RateLimitConfig, RateLimiter};
use rocket_cors::CorsOptions;
use std::sync::Arc;
use std::time::Duration;
use webhooks::WebhookConfigCache;

/// Entry point used by `main.rs`: reads `HiveConfig` from the environment
/// and builds the Rocket instance from it.
pub fn rocket() -> Result<rocket::Rocket<rocket::Build>, config::ConfigError> {
    let config = HiveConfig::from_env()?;
    Ok(build_rocket(config))
}

/// Test-facing entry point: a caller-supplied config (typically pointed at
/// a throwaway SQLite file) rather than one read from the environment.
pub fn rocket_with_config(config: HiveConfig) -> rocket::Rocket<rocket::Build> {
    build_rocket(config)
}

fn build_rocket(config: HiveConfig) -> rocket::Rocket<rocket::Build> {
    let db = Arc::new(Db::new(&config.database_path));
    auth::reconcile_superuser(&db, &config);

    let bus = Arc::new(EventBus::new());
    let auth_cache = Arc::new(AuthCache::new(config.auth_cache_ttl_secs));
    let webhook_cache = Arc::new(WebhookConfigCache::new(config.webhook_cache_ttl_secs));
    let presence = Arc::new(PresenceTracker::new());
    let rate_limit_config = RateLimitConfig::from_env();
    let rate_limiter = Arc::new(RateLimiter::new(rate_limit_config));
    let notebook_registry = Arc::new(NotebookRegistry::new());
    let http_client = webhooks::http_client(&config);

    let scheduler_db = Arc::clone(&db);
    let scheduler_bus = Arc::clone(&bus);
    let scheduler_tick_secs = config.scheduler_tick_secs;

    let presence_sweeper = Arc::clone(&presence);
    let presence_stale_secs = config.presence_stale_secs;

    let rate_limit_sweeper = Arc::clone(&rate_limiter);

    let cors = CorsOptions::default().to_cors().expect("failed to build CORS fairing");

    // Large enough for base64-attached broadcast/workflow payloads without
    // opening the door to unbounded request bodies.
    let figment = rocket::Config::figment().merge(("limits.json", 10 * 1024 * 1024));

    rocket::custom(figment)
        .manage(db)
        .manage(config)
        .manage(bus)
        .manage(auth_cache)
        .manage(webhook_cache)
        .manage(presence)
        .manage(rate_limiter)
        .manage(notebook_registry)
        .manage(http_client)
        .attach(cors)
        .attach(routes::Presence)
        .attach(routes::RateLimitFairing)
        .register("/", rocket::catchers![routes::not_found, routes::too_many_requests])
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::doctor,
                routes::skill_md,
                routes::verify,
                routes::register,
                routes::create_invite,
                routes::rotate_token,
                routes::revoke_token,
                routes::stream,
                routes::list_messages,
                routes::send_message,
                routes::ack_message,
                routes::reply_message,
                routes::mark_pending,
                routes::clear_pending,
                routes::list_channels,
                routes::create_channel,
                routes::list_chat_messages,
                routes::send_chat_message,
                routes::mark_channel_read,
                routes::notify_typing,
                routes::create_project,
                routes::list_projects,
                routes::update_project,
                routes::archive_project,
                routes::create_task,
                routes::list_tasks,
                routes::update_task,
                routes::delete_task,
                routes::reorder_task,
                routes::list_task_events,
                routes::create_workflow,
                routes::list_workflows,
                routes::delete_workflow,
                routes::list_presence,
                routes::get_wake,
                routes::create_broadcast_webhook,
                routes::list_broadcast_webhooks,
                routes::update_broadcast_webhook,
                routes::delete_broadcast_webhook,
                routes::list_broadcast_events,
                routes::ingest,
                routes::create_recurring_template,
                routes::list_recurring_templates,
                routes::toggle_recurring_template,
                routes::delete_recurring_template,
                routes::tick_recurring,
                routes::create_page,
                routes::list_pages,
                routes::get_page,
                routes::update_page,
                routes::archive_page,
                routes::notebook_ws,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Recurring Task Scheduler", move |_rocket| {
            Box::pin(async move {
                scheduler::spawn(scheduler_db, scheduler_bus, scheduler_tick_secs);
                tracing::info!(tick_secs = scheduler_tick_secs, "recurring task scheduler started");
            })
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Presence Sweeper", move |_rocket| {
            Box::pin(async move {
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(presence_stale_secs.max(1)));
                    loop {
                        interval.tick().await;
                        presence_sweeper.sweep(presence_stale_secs);
                    }
                });
                tracing::info!("presence sweeper started");
            })
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Rate Limit Sweeper", move |_rocket| {
            Box::pin(async move {
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(300));
                    loop {
                        interval.tick().await;
                        rate_limit_sweeper.sweep();
                    }
                });
                tracing::info!("rate limit sweeper started");
            })
        }))
}
