use serde::{Deserialize, Serialize};

// --- Identity ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub is_admin: bool,
    pub is_agent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct MailboxToken {
    pub id: String,
    pub identity: String,
    pub label: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_trigger_hours: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub token_id: String,
    pub identity: String,
    pub is_admin: bool,
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Invite {
    pub id: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_hint: Option<String>,
    pub is_admin: bool,
    pub max_uses: i64,
    pub use_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvite {
    #[serde(default)]
    pub identity_hint: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_max_uses")]
    pub max_uses: i64,
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

fn default_max_uses() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub code: String,
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub identity: String,
    pub token: String,
    pub is_admin: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub identity: String,
    pub is_admin: bool,
}

// --- Mailbox ---

#[derive(Debug, Serialize, Clone)]
pub struct MailboxMessage {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub status: String,
    pub urgent: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub response_waiting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_responder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_since: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageInput {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyInput {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MailboxMessage>,
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
}

// --- Chat ---

#[derive(Debug, Serialize, Clone)]
pub struct ChatChannel {
    pub id: String,
    pub channel_type: String, // "dm" | "group"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatMember {
    pub channel_id: String,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    pub sender: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelInput {
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendChatMessageInput {
    pub body: String,
}

// --- Workflows ---

#[derive(Debug, Serialize, Clone)]
pub struct Workflow {
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagged_users: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowInput {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tagged_users: Vec<String>,
}

// --- Swarm ---

#[derive(Debug, Serialize, Clone)]
pub struct SwarmProject {
    pub id: String,
    pub title: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project_lead_user_id: String,
    pub developer_lead_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_hours_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_hours_end: Option<String>,
    pub work_hours_timezone: String,
    pub blocking_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectInput {
    pub title: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
    pub project_lead_user_id: String,
    pub developer_lead_user_id: String,
    #[serde(default)]
    pub work_hours_start: Option<String>,
    #[serde(default)]
    pub work_hours_end: Option<String>,
    #[serde(default = "default_tz")]
    pub work_hours_timezone: String,
    #[serde(default)]
    pub blocking_mode: bool,
}

fn default_color() -> String {
    "#6366f1".to_string()
}
fn default_tz() -> String {
    "UTC".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProjectInput {
    pub title: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub project_lead_user_id: Option<String>,
    pub developer_lead_user_id: Option<String>,
    pub work_hours_start: Option<String>,
    pub work_hours_end: Option<String>,
    pub work_hours_timezone: Option<String>,
    pub blocking_mode: Option<bool>,
}

#[derive(Debug, Serialize, Clone)]
pub struct SwarmTask {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    pub creator_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_user_id: Option<String>,
    pub status: String,
    pub sort_key: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_or_after_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_be_done_after_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_task_assignee_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_instance_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskInput {
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub assignee_user_id: Option<String>,
    #[serde(default = "default_task_status")]
    pub status: String,
    #[serde(default)]
    pub on_or_after_at: Option<String>,
    #[serde(default)]
    pub must_be_done_after_task_id: Option<String>,
}

fn default_task_status() -> String {
    "queued".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub follow_up: Option<String>,
    pub issue_url: Option<String>,
    pub assignee_user_id: Option<String>,
    pub status: Option<String>,
    pub on_or_after_at: Option<String>,
    pub must_be_done_after_task_id: Option<String>,
    pub next_task_id: Option<String>,
    pub next_task_assignee_user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderTaskInput {
    pub before_task_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskFilter {
    pub statuses: Option<Vec<String>>,
    pub assignee: Option<String>,
    pub project_id: Option<String>,
    #[serde(default)]
    pub include_completed: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct SwarmTaskEvent {
    pub id: String,
    pub task_id: String,
    pub actor_user_id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<serde_json::Value>,
    pub created_at: String,
}

// --- Broadcast (buzz) ---

#[derive(Debug, Serialize, Clone)]
pub struct BroadcastWebhook {
    pub id: String,
    pub app_name: String,
    pub token: String,
    pub title: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_users: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_agent: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hit_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBroadcastWebhookInput {
    pub app_name: String,
    pub title: String,
    #[serde(default)]
    pub for_users: Vec<String>,
    #[serde(default)]
    pub wake_agent: Option<String>,
    #[serde(default)]
    pub notify_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateBroadcastWebhookInput {
    pub title: Option<String>,
    pub for_users: Option<Vec<String>>,
    pub wake_agent: Option<String>,
    pub notify_agent: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize, Clone)]
pub struct BroadcastEvent {
    pub id: String,
    pub webhook_id: String,
    pub app_name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_users: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_json: Option<serde_json::Value>,
    pub received_at: String,
    /// Comma-joined set of identities this event has been surfaced to via wake.
    #[serde(skip)]
    pub delivered_to_wake: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub event_id: String,
    pub suppressed: bool,
}

// --- Recurring templates ---

#[derive(Debug, Serialize, Clone)]
pub struct RecurringTemplate {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_user_id: Option<String>,
    pub cron_expr: String,
    pub timezone: String,
    pub initial_status: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecurringTemplateInput {
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub assignee_user_id: Option<String>,
    pub cron_expr: String,
    #[serde(default = "default_tz")]
    pub timezone: String,
    #[serde(default = "default_task_status")]
    pub initial_status: String,
}

// --- Notebook ---

#[derive(Debug, Serialize, Clone)]
pub struct NotebookPage {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagged_users: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePageInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tagged_users: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePageInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub locked: Option<bool>,
    pub tagged_users: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub expires_at: Option<String>,
    pub review_at: Option<String>,
}

// --- Presence ---

#[derive(Debug, Serialize, Clone)]
pub struct PresenceStatus {
    pub online: bool,
    pub last_seen: String,
    pub source: String,
    pub unread: i64,
}

// --- Wake ---

#[derive(Debug, Serialize, Clone)]
pub struct WakeItem {
    pub source: String,
    pub id: String,
    pub priority: String,
    pub action: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct WakeAction {
    pub category: String,
    pub skill_url: String,
}

#[derive(Debug, Serialize)]
pub struct WakePayload {
    pub items: Vec<WakeItem>,
    pub actions: Vec<WakeAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: String,
}
