use rusqlite::Connection;
use std::sync::Mutex;

/// The relational store. A single SQLite connection behind a mutex — there
/// is no concurrent-writer requirement WAL mode can't satisfy for a
/// single-process deployment.
pub struct Db {
    pub conn: Mutex<Connection>,
}

pub fn generate_token() -> String {
    format!("{:032x}{:032x}", uuid::Uuid::new_v4().as_u128(), uuid::Uuid::new_v4().as_u128())
}

pub fn generate_short_token() -> String {
    format!("{:032x}", uuid::Uuid::new_v4().as_u128())
}

impl Db {
    pub fn new(path: &str) -> Self {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).expect("failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let db = Db { conn: Mutex::new(conn) };
        db.migrate();
        db
    }

    pub fn open_background(path: &str) -> Connection {
        let conn = Connection::open(path).expect("background task: failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;").ok();
        conn
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        run_migrations(&conn);
    }
}

pub fn run_migrations(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_agent INTEGER NOT NULL DEFAULT 1,
            avatar_url TEXT,
            archived_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mailbox_tokens (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            identity TEXT NOT NULL REFERENCES users(id),
            label TEXT NOT NULL DEFAULT '',
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_used_at TEXT,
            revoked_at TEXT,
            expires_at TEXT,
            webhook_url TEXT,
            webhook_token TEXT,
            backup_agent TEXT,
            stale_trigger_hours INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_tokens_identity ON mailbox_tokens(identity);
        CREATE INDEX IF NOT EXISTS idx_tokens_backup_agent ON mailbox_tokens(backup_agent);

        CREATE TABLE IF NOT EXISTS invites (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            identity_hint TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            max_uses INTEGER NOT NULL DEFAULT 1,
            use_count INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mailbox_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sender TEXT NOT NULL,
            recipient TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT,
            status TEXT NOT NULL DEFAULT 'unread',
            urgent INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            viewed_at TEXT,
            thread_id TEXT,
            reply_to_message_id INTEGER,
            dedupe_key TEXT,
            metadata TEXT,
            response_waiting INTEGER NOT NULL DEFAULT 0,
            waiting_responder TEXT,
            waiting_since TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_messages_recipient ON mailbox_messages(recipient, status);
        CREATE INDEX IF NOT EXISTS idx_messages_sender ON mailbox_messages(sender);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedupe
            ON mailbox_messages(sender, recipient, dedupe_key) WHERE dedupe_key IS NOT NULL;

        CREATE TABLE IF NOT EXISTS chat_channels (
            id TEXT PRIMARY KEY,
            channel_type TEXT NOT NULL,
            name TEXT,
            dm_key TEXT UNIQUE,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_members (
            channel_id TEXT NOT NULL REFERENCES chat_channels(id) ON DELETE CASCADE,
            identity TEXT NOT NULL,
            last_read_at TEXT,
            PRIMARY KEY (channel_id, identity)
        );
        CREATE INDEX IF NOT EXISTS idx_chat_members_identity ON chat_members(identity);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL REFERENCES chat_channels(id) ON DELETE CASCADE,
            sender TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_channel ON chat_messages(channel_id, created_at);

        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            tagged_users TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workflows_task ON workflows(task_id);

        CREATE TABLE IF NOT EXISTS swarm_projects (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            color TEXT NOT NULL,
            description TEXT,
            project_lead_user_id TEXT NOT NULL,
            developer_lead_user_id TEXT NOT NULL,
            work_hours_start TEXT,
            work_hours_end TEXT,
            work_hours_timezone TEXT NOT NULL DEFAULT 'UTC',
            blocking_mode INTEGER NOT NULL DEFAULT 0,
            archived_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS swarm_tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT REFERENCES swarm_projects(id),
            title TEXT NOT NULL,
            detail TEXT,
            follow_up TEXT,
            issue_url TEXT,
            creator_user_id TEXT NOT NULL,
            assignee_user_id TEXT,
            status TEXT NOT NULL DEFAULT 'queued',
            sort_key REAL NOT NULL DEFAULT 0,
            on_or_after_at TEXT,
            must_be_done_after_task_id TEXT,
            next_task_id TEXT,
            next_task_assignee_user_id TEXT,
            recurring_template_id TEXT,
            recurring_instance_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON swarm_tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON swarm_tasks(assignee_user_id, status);

        CREATE TABLE IF NOT EXISTS swarm_task_events (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES swarm_tasks(id) ON DELETE CASCADE,
            actor_user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            before_state TEXT,
            after_state TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_task_events_task ON swarm_task_events(task_id, created_at);

        CREATE TABLE IF NOT EXISTS broadcast_webhooks (
            id TEXT PRIMARY KEY,
            app_name TEXT NOT NULL,
            token TEXT NOT NULL,
            title TEXT NOT NULL,
            owner TEXT NOT NULL,
            for_users TEXT,
            wake_agent TEXT,
            notify_agent TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_hit_at TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(app_name, token)
        );

        CREATE TABLE IF NOT EXISTS broadcast_events (
            id TEXT PRIMARY KEY,
            webhook_id TEXT NOT NULL REFERENCES broadcast_webhooks(id) ON DELETE CASCADE,
            app_name TEXT NOT NULL,
            title TEXT NOT NULL,
            for_users TEXT,
            content_type TEXT,
            body_text TEXT,
            body_json TEXT,
            signature TEXT NOT NULL,
            received_at TEXT NOT NULL,
            delivered_to_wake TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_broadcast_events_webhook ON broadcast_events(webhook_id, received_at);

        CREATE TABLE IF NOT EXISTS recurring_templates (
            id TEXT PRIMARY KEY,
            project_id TEXT,
            title TEXT NOT NULL,
            detail TEXT,
            assignee_user_id TEXT,
            cron_expr TEXT NOT NULL,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            initial_status TEXT NOT NULL DEFAULT 'queued',
            enabled INTEGER NOT NULL DEFAULT 1,
            last_tick_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notebook_pages (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            created_by TEXT NOT NULL,
            tagged_users TEXT,
            tags TEXT,
            locked INTEGER NOT NULL DEFAULT 0,
            locked_by TEXT,
            expires_at TEXT,
            review_at TEXT,
            archived_at TEXT,
            updated_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        ",
    )
    .expect("failed to run migrations");
}
