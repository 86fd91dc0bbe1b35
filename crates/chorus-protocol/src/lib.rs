use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const PROTOCOL_VERSION: &str = "0.1";

pub const MSG_PING: &str = "ping";
pub const MSG_ATTACH: &str = "attach";

pub const MSG_PROJECT_LIST: &str = "project.list";

pub const MSG_AGENT_LIST: &str = "agent.list";
pub const MSG_AGENT_ABORT: &str = "agent.abort";
pub const MSG_AGENT_SEND_MESSAGE: &str = "agent.send_message";
pub const MSG_AGENT_CHAT_HISTORY: &str = "agent.chat_history";

pub const MSG_MANAGER_STOP: &str = "manager.stop";
pub const MSG_MANAGER_SEND_MESSAGE: &str = "manager.send_message";
pub const MSG_MANAGER_CHAT_HISTORY: &str = "manager.chat_history";

pub const MSG_PLAN_START: &str = "plan.start";
pub const MSG_PLAN_STOP: &str = "plan.stop";
pub const MSG_PLAN_SEND_MESSAGE: &str = "plan.send_message";
pub const MSG_PLAN_CHAT_HISTORY: &str = "plan.chat_history";

pub const MSG_PERMISSION_RESPOND: &str = "permission.respond";
pub const MSG_PERMISSION_LIST: &str = "permission.list";

pub const MSG_QUESTION_RESPOND: &str = "question.respond";
pub const MSG_QUESTION_LIST: &str = "question.list";

pub const MSG_ACTION_APPROVE: &str = "action.approve";
pub const MSG_ACTION_REJECT: &str = "action.reject";
pub const MSG_ACTION_LIST: &str = "action.list";

pub const MSG_STATS: &str = "stats";

pub const EVT_HEARTBEAT: &str = "heartbeat";

pub const EVT_AGENT_LIST: &str = "agent.list";
pub const EVT_AGENT_CREATED: &str = "agent.created";
pub const EVT_AGENT_UPDATED: &str = "agent.updated";
pub const EVT_AGENT_DELETED: &str = "agent.deleted";
pub const EVT_AGENT_CHAT: &str = "agent.chat";

pub const EVT_MANAGER_CREATED: &str = "manager.created";
pub const EVT_MANAGER_UPDATED: &str = "manager.updated";
pub const EVT_MANAGER_DELETED: &str = "manager.deleted";
pub const EVT_MANAGER_CHAT: &str = "manager.chat";

pub const EVT_PLANNER_CREATED: &str = "planner.created";
pub const EVT_PLANNER_UPDATED: &str = "planner.updated";
pub const EVT_PLANNER_DELETED: &str = "planner.deleted";
pub const EVT_PLANNER_CHAT: &str = "planner.chat";

pub const EVT_PERMISSION_REQUESTED: &str = "permission.requested";
pub const EVT_PERMISSION_RESOLVED: &str = "permission.resolved";
pub const EVT_QUESTION_REQUESTED: &str = "question.requested";
pub const EVT_QUESTION_RESOLVED: &str = "question.resolved";
pub const EVT_ACTION_STAGED: &str = "action.staged";
pub const EVT_ACTION_RESOLVED: &str = "action.resolved";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub version: String,
    pub protocol: String,
    pub pid: u32,
    #[serde(default)]
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttachRequest {
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub now_ms: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    #[default]
    Coding,
    Planner,
    Manager,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Starting,
    Running,
    Idle,
    Done,
    Error,
}

impl AgentState {
    pub fn is_active(self) -> bool {
        matches!(self, AgentState::Starting | AgentState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub role: AgentRole,
    pub state: AgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// RFC 3339 timestamp. Older daemons omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCreatedEvent {
    pub agent: AgentInfo,
}

/// Field update for an existing agent. Absent fields are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentUpdatedEvent {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AgentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDeletedEvent {
    #[serde(default)]
    pub agent_id: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    pub ts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentChatEvent {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub project: String,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAbortRequest {
    pub agent_id: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSendMessageRequest {
    pub agent_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentChatHistoryRequest {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ManagerStopRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSendMessageRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ManagerChatHistoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStartRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStartResponse {
    pub id: String,
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStopRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSendMessageRequest {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChatHistoryRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub backend: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectInfo>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub project: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub requested_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRespondPayload {
    pub id: String,
    pub behavior: PermissionBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionListResponse {
    pub requests: Vec<PermissionRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub question: String,
    pub header: String,
    #[serde(rename = "multiSelect", default)]
    pub multi_select: bool,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuestion {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub project: String,
    pub questions: Vec<QuestionItem>,
    #[serde(default)]
    pub requested_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuestionRespondPayload {
    pub id: String,
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuestionListResponse {
    pub requests: Vec<UserQuestion>,
}

/// An action proposed by the daemon (send a message, quit, ...) that waits
/// for an operator decision before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAction {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub project: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub staged_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionApproveRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRejectRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionListResponse {
    pub actions: Vec<StagedAction>,
}

/// Payload of `permission.resolved`, `question.resolved` and `action.resolved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UsageStats {
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub percent: i32,
    #[serde(default)]
    pub window_end: String,
    #[serde(default)]
    pub time_left: String,
    #[serde(default)]
    pub plan_limit: i64,
    #[serde(default)]
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub commit_count: u32,
    #[serde(default)]
    pub usage: UsageStats,
}
