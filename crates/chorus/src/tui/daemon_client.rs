use std::collections::BTreeMap;

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use chorus_core::paths::ChorusPaths;
use chorus_protocol::{
    ActionListResponse, AgentListResponse, AttachRequest, ChatHistoryResponse, Event,
    PermissionBehavior, PermissionListResponse, ProjectListResponse, Request, Response,
    StatsResponse, UserQuestionListResponse, MSG_ATTACH,
};
use tokio::io::{AsyncBufRead, BufReader, BufWriter};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use crate::client::{self, new_request_id};
use crate::ipc::jsonl::{read_jsonl, write_jsonl};

use super::client::{decode_event, DaemonEvent, EventStream, TuiClient};
use super::roster::AgentRef;

/// `TuiClient` over the daemon's Unix socket. Every call opens its own
/// connection; the event stream keeps one open.
#[derive(Debug, Clone)]
pub struct DaemonTuiClient {
    paths: ChorusPaths,
}

impl DaemonTuiClient {
    pub fn new(paths: ChorusPaths) -> Self {
        Self { paths }
    }
}

/// Reads until the attach response, skipping any events that race ahead of it.
async fn await_attach<R>(reader: &mut R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let value: serde_json::Value = read_jsonl(reader)
            .await
            .context("read attach response")?
            .ok_or_else(|| anyhow!("connection closed before attach completed"))?;
        if value.get("success").is_none() {
            continue;
        }
        let resp: Response = serde_json::from_value(value).context("parse attach response")?;
        if resp.success {
            return Ok(());
        }
        return Err(anyhow!(resp
            .error
            .unwrap_or_else(|| "attach failed".to_owned())));
    }
}

/// Forwards decoded events until the connection ends, then reports why.
async fn pump_events<R>(mut reader: R, tx: mpsc::UnboundedSender<anyhow::Result<DaemonEvent>>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let value = match read_jsonl::<_, serde_json::Value>(&mut reader).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                let _ = tx.send(Err(anyhow!("event stream closed")));
                return;
            }
            Err(err) => {
                let _ = tx.send(Err(anyhow!(err).context("read event")));
                return;
            }
        };
        if value.get("success").is_some() {
            continue;
        }
        let Ok(evt) = serde_json::from_value::<Event>(value) else {
            continue;
        };
        let event_type = evt.r#type.clone();
        let Some(decoded) = decode_event(evt) else {
            tracing::trace!(event_type = %event_type, "skipping event");
            continue;
        };
        if tx.send(Ok(decoded)).is_err() {
            return;
        }
    }
}

#[async_trait]
impl TuiClient for DaemonTuiClient {
    async fn stream_events(&self, projects: Vec<String>) -> anyhow::Result<EventStream> {
        let socket = &self.paths.socket_path;
        let stream = UnixStream::connect(socket)
            .await
            .with_context(|| format!("connect: {}", socket.display()))?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);

        let attach = Request {
            r#type: MSG_ATTACH.to_owned(),
            id: new_request_id("attach"),
            payload: serde_json::to_value(AttachRequest { projects })
                .context("serialize attach request")?,
        };
        write_jsonl(&mut writer, &attach)
            .await
            .context("write attach request")?;
        await_attach(&mut reader).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(async move {
            // The daemon drops the subscription when the write half closes.
            let _writer = writer;
            pump_events(reader, tx).await;
        });
        Ok(EventStream::new(rx, join))
    }

    async fn agent_list(&self) -> anyhow::Result<AgentListResponse> {
        client::agent_list(&self.paths).await
    }

    async fn agent_chat_history(
        &self,
        agent: AgentRef,
        limit: Option<u32>,
    ) -> anyhow::Result<ChatHistoryResponse> {
        match agent {
            AgentRef::Agent(id) => client::agent_chat_history(&self.paths, id, limit).await,
            AgentRef::Manager => client::manager_chat_history(&self.paths, limit).await,
            AgentRef::Planner(id) => client::plan_chat_history(&self.paths, id, limit).await,
        }
    }

    async fn agent_send_message(&self, agent: AgentRef, message: String) -> anyhow::Result<()> {
        match agent {
            AgentRef::Agent(id) => client::agent_send_message(&self.paths, id, message).await,
            AgentRef::Manager => client::manager_send_message(&self.paths, message).await,
            AgentRef::Planner(id) => client::plan_send_message(&self.paths, id, message).await,
        }
    }

    async fn agent_abort(&self, agent: AgentRef, force: bool) -> anyhow::Result<()> {
        match agent {
            AgentRef::Agent(id) => client::agent_abort(&self.paths, id, force).await,
            AgentRef::Manager => client::manager_stop(&self.paths, force).await,
            AgentRef::Planner(id) => client::plan_stop(&self.paths, id).await,
        }
    }

    async fn permission_respond(
        &self,
        id: String,
        behavior: PermissionBehavior,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        client::permission_respond(&self.paths, id, behavior, reason).await
    }

    async fn question_respond(
        &self,
        id: String,
        answers: BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        client::question_respond(&self.paths, id, answers).await
    }

    async fn action_approve(&self, id: String) -> anyhow::Result<()> {
        client::action_approve(&self.paths, id).await
    }

    async fn action_reject(&self, id: String, reason: Option<String>) -> anyhow::Result<()> {
        client::action_reject(&self.paths, id, reason).await
    }

    async fn plan_start(&self, project: Option<String>, prompt: String) -> anyhow::Result<String> {
        Ok(client::plan_start(&self.paths, project, prompt).await?.id)
    }

    async fn project_list(&self) -> anyhow::Result<ProjectListResponse> {
        client::project_list(&self.paths).await
    }

    async fn permission_list(&self) -> anyhow::Result<PermissionListResponse> {
        client::permission_list(&self.paths).await
    }

    async fn question_list(&self) -> anyhow::Result<UserQuestionListResponse> {
        client::question_list(&self.paths).await
    }

    async fn action_list(&self) -> anyhow::Result<ActionListResponse> {
        client::action_list(&self.paths).await
    }

    async fn stats(&self) -> anyhow::Result<StatsResponse> {
        client::stats(&self.paths, None).await
    }
}
