use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context as _};
use chorus_core::paths::ChorusPaths;
use chorus_protocol::{
    ActionApproveRequest, ActionListResponse, ActionRejectRequest, AgentAbortRequest,
    AgentChatHistoryRequest, AgentListResponse, AgentSendMessageRequest, ChatHistoryResponse,
    ManagerChatHistoryRequest, ManagerSendMessageRequest, ManagerStopRequest, PermissionBehavior,
    PermissionListResponse, PermissionRespondPayload, PingResponse, PlanChatHistoryRequest,
    PlanSendMessageRequest, PlanStartRequest, PlanStartResponse, PlanStopRequest,
    ProjectListResponse, Request, Response, StatsRequest, StatsResponse,
    UserQuestionListResponse, UserQuestionRespondPayload, MSG_ACTION_APPROVE, MSG_ACTION_LIST,
    MSG_ACTION_REJECT, MSG_AGENT_ABORT, MSG_AGENT_CHAT_HISTORY, MSG_AGENT_LIST,
    MSG_AGENT_SEND_MESSAGE, MSG_MANAGER_CHAT_HISTORY, MSG_MANAGER_SEND_MESSAGE, MSG_MANAGER_STOP,
    MSG_PERMISSION_LIST, MSG_PERMISSION_RESPOND, MSG_PING, MSG_PLAN_CHAT_HISTORY,
    MSG_PLAN_SEND_MESSAGE, MSG_PLAN_START, MSG_PLAN_STOP, MSG_PROJECT_LIST, MSG_QUESTION_LIST,
    MSG_QUESTION_RESPOND, MSG_STATS,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{BufReader, BufWriter};
use tokio::net::UnixStream;

use crate::ipc::jsonl::{read_jsonl, write_jsonl};

pub async fn ping(paths: &ChorusPaths) -> anyhow::Result<PingResponse> {
    call(paths, MSG_PING, &()).await
}

pub async fn project_list(paths: &ChorusPaths) -> anyhow::Result<ProjectListResponse> {
    call(paths, MSG_PROJECT_LIST, &()).await
}

pub async fn agent_list(paths: &ChorusPaths) -> anyhow::Result<AgentListResponse> {
    call(paths, MSG_AGENT_LIST, &()).await
}

pub async fn agent_chat_history(
    paths: &ChorusPaths,
    agent_id: String,
    limit: Option<u32>,
) -> anyhow::Result<ChatHistoryResponse> {
    let payload = AgentChatHistoryRequest { agent_id, limit };
    call(paths, MSG_AGENT_CHAT_HISTORY, &payload).await
}

pub async fn agent_send_message(
    paths: &ChorusPaths,
    agent_id: String,
    message: String,
) -> anyhow::Result<()> {
    let payload = AgentSendMessageRequest { agent_id, message };
    call_unit(paths, MSG_AGENT_SEND_MESSAGE, &payload).await
}

pub async fn agent_abort(paths: &ChorusPaths, agent_id: String, force: bool) -> anyhow::Result<()> {
    call_unit(paths, MSG_AGENT_ABORT, &AgentAbortRequest { agent_id, force }).await
}

pub async fn manager_chat_history(
    paths: &ChorusPaths,
    limit: Option<u32>,
) -> anyhow::Result<ChatHistoryResponse> {
    call(paths, MSG_MANAGER_CHAT_HISTORY, &ManagerChatHistoryRequest { limit }).await
}

pub async fn manager_send_message(paths: &ChorusPaths, message: String) -> anyhow::Result<()> {
    call_unit(paths, MSG_MANAGER_SEND_MESSAGE, &ManagerSendMessageRequest { message }).await
}

pub async fn manager_stop(paths: &ChorusPaths, force: bool) -> anyhow::Result<()> {
    call_unit(paths, MSG_MANAGER_STOP, &ManagerStopRequest { force }).await
}

pub async fn plan_start(
    paths: &ChorusPaths,
    project: Option<String>,
    prompt: String,
) -> anyhow::Result<PlanStartResponse> {
    call(paths, MSG_PLAN_START, &PlanStartRequest { project, prompt }).await
}

pub async fn plan_stop(paths: &ChorusPaths, id: String) -> anyhow::Result<()> {
    call_unit(paths, MSG_PLAN_STOP, &PlanStopRequest { id }).await
}

pub async fn plan_send_message(
    paths: &ChorusPaths,
    id: String,
    message: String,
) -> anyhow::Result<()> {
    call_unit(paths, MSG_PLAN_SEND_MESSAGE, &PlanSendMessageRequest { id, message }).await
}

pub async fn plan_chat_history(
    paths: &ChorusPaths,
    id: String,
    limit: Option<u32>,
) -> anyhow::Result<ChatHistoryResponse> {
    call(paths, MSG_PLAN_CHAT_HISTORY, &PlanChatHistoryRequest { id, limit }).await
}

pub async fn permission_list(paths: &ChorusPaths) -> anyhow::Result<PermissionListResponse> {
    call(paths, MSG_PERMISSION_LIST, &()).await
}

pub async fn permission_respond(
    paths: &ChorusPaths,
    id: String,
    behavior: PermissionBehavior,
    message: Option<String>,
) -> anyhow::Result<()> {
    let payload = PermissionRespondPayload {
        id,
        behavior,
        message,
    };
    call_unit(paths, MSG_PERMISSION_RESPOND, &payload).await
}

pub async fn question_list(paths: &ChorusPaths) -> anyhow::Result<UserQuestionListResponse> {
    call(paths, MSG_QUESTION_LIST, &()).await
}

pub async fn question_respond(
    paths: &ChorusPaths,
    id: String,
    answers: BTreeMap<String, String>,
) -> anyhow::Result<()> {
    let payload = UserQuestionRespondPayload { id, answers };
    call_unit(paths, MSG_QUESTION_RESPOND, &payload).await
}

pub async fn action_list(paths: &ChorusPaths) -> anyhow::Result<ActionListResponse> {
    call(paths, MSG_ACTION_LIST, &()).await
}

pub async fn action_approve(paths: &ChorusPaths, id: String) -> anyhow::Result<()> {
    call_unit(paths, MSG_ACTION_APPROVE, &ActionApproveRequest { id }).await
}

pub async fn action_reject(
    paths: &ChorusPaths,
    id: String,
    reason: Option<String>,
) -> anyhow::Result<()> {
    call_unit(paths, MSG_ACTION_REJECT, &ActionRejectRequest { id, reason }).await
}

pub async fn stats(paths: &ChorusPaths, project: Option<String>) -> anyhow::Result<StatsResponse> {
    call(paths, MSG_STATS, &StatsRequest { project }).await
}

/// Sends one request and decodes the response payload as `R`.
async fn call<P, R>(paths: &ChorusPaths, msg_type: &str, payload: &P) -> anyhow::Result<R>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let resp = checked(paths, msg_type, payload).await?;
    serde_json::from_value(resp.payload).with_context(|| format!("parse {msg_type} payload"))
}

async fn call_unit<P>(paths: &ChorusPaths, msg_type: &str, payload: &P) -> anyhow::Result<()>
where
    P: Serialize + ?Sized,
{
    checked(paths, msg_type, payload).await.map(|_| ())
}

async fn checked<P>(paths: &ChorusPaths, msg_type: &str, payload: &P) -> anyhow::Result<Response>
where
    P: Serialize + ?Sized,
{
    let req = Request {
        r#type: msg_type.to_owned(),
        id: new_request_id(msg_type),
        payload: encode_payload(payload)?,
    };
    let resp = request(paths, req).await?;
    if !resp.success {
        return Err(anyhow!(resp
            .error
            .unwrap_or_else(|| format!("{msg_type} failed"))));
    }
    Ok(resp)
}

/// Unit payloads go out as `null`, like a bare request.
fn encode_payload<P: Serialize + ?Sized>(payload: &P) -> anyhow::Result<serde_json::Value> {
    serde_json::to_value(payload).context("serialize payload")
}

/// One request/response exchange over a fresh connection.
pub async fn request(paths: &ChorusPaths, req: Request) -> anyhow::Result<Response> {
    let socket = &paths.socket_path;
    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("connect: {}", socket.display()))?;

    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    write_jsonl(&mut writer, &req)
        .await
        .with_context(|| format!("write {}", req.r#type))?;

    read_jsonl(&mut reader)
        .await
        .with_context(|| format!("read {} response", req.r#type))?
        .ok_or_else(|| anyhow!("unexpected EOF reading {} response", req.r#type))
}

pub(crate) fn new_request_id(prefix: &str) -> String {
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}-{now_ns}")
}
