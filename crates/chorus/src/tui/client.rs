use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chorus_protocol::{
    ActionListResponse, AgentChatEvent, AgentCreatedEvent, AgentDeletedEvent, AgentInfo,
    AgentListResponse, AgentRole, AgentUpdatedEvent, ChatHistoryResponse, ChatMessage, Event,
    HeartbeatEvent, PermissionBehavior, PermissionListResponse, PermissionRequest,
    ProjectListResponse, ResolvedEvent, StagedAction, StatsResponse, UserQuestion,
    UserQuestionListResponse, EVT_ACTION_RESOLVED, EVT_ACTION_STAGED, EVT_AGENT_CHAT,
    EVT_AGENT_CREATED, EVT_AGENT_DELETED, EVT_AGENT_LIST, EVT_AGENT_UPDATED, EVT_HEARTBEAT,
    EVT_MANAGER_CHAT, EVT_MANAGER_CREATED, EVT_MANAGER_DELETED, EVT_MANAGER_UPDATED,
    EVT_PERMISSION_REQUESTED, EVT_PERMISSION_RESOLVED, EVT_PLANNER_CHAT, EVT_PLANNER_CREATED,
    EVT_PLANNER_DELETED, EVT_PLANNER_UPDATED, EVT_QUESTION_REQUESTED, EVT_QUESTION_RESOLVED,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::roster::AgentRef;

/// A stream event after decoding, tagged with the role its type implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    Heartbeat {
        now_ms: u64,
    },
    RosterReplaced(Vec<AgentInfo>),
    AgentCreated {
        role: AgentRole,
        agent: AgentInfo,
    },
    AgentUpdated {
        role: AgentRole,
        update: AgentUpdatedEvent,
    },
    AgentDeleted {
        role: AgentRole,
        agent_id: String,
    },
    Chat {
        role: AgentRole,
        agent_id: String,
        message: ChatMessage,
    },
    PermissionRequested(PermissionRequest),
    PermissionResolved {
        id: String,
    },
    QuestionRequested(UserQuestion),
    QuestionResolved {
        id: String,
    },
    ActionStaged(StagedAction),
    ActionResolved {
        id: String,
    },
}

/// Decodes a wire event. Unknown types and malformed payloads yield `None`.
pub fn decode_event(evt: Event) -> Option<DaemonEvent> {
    let Event {
        r#type, payload, ..
    } = evt;

    let role_of = |prefix: &str| match prefix {
        "manager" => AgentRole::Manager,
        "planner" => AgentRole::Planner,
        _ => AgentRole::Coding,
    };

    let decoded = match r#type.as_str() {
        EVT_HEARTBEAT => {
            let hb: HeartbeatEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::Heartbeat { now_ms: hb.now_ms }
        }
        EVT_AGENT_LIST => {
            let list: AgentListResponse = serde_json::from_value(payload).ok()?;
            DaemonEvent::RosterReplaced(list.agents)
        }
        EVT_AGENT_CREATED | EVT_MANAGER_CREATED | EVT_PLANNER_CREATED => {
            let created: AgentCreatedEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::AgentCreated {
                role: role_of(type_prefix(&r#type)),
                agent: created.agent,
            }
        }
        EVT_AGENT_UPDATED | EVT_MANAGER_UPDATED | EVT_PLANNER_UPDATED => {
            let update: AgentUpdatedEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::AgentUpdated {
                role: role_of(type_prefix(&r#type)),
                update,
            }
        }
        EVT_AGENT_DELETED | EVT_MANAGER_DELETED | EVT_PLANNER_DELETED => {
            let deleted: AgentDeletedEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::AgentDeleted {
                role: role_of(type_prefix(&r#type)),
                agent_id: deleted.agent_id,
            }
        }
        EVT_AGENT_CHAT | EVT_MANAGER_CHAT | EVT_PLANNER_CHAT => {
            let chat: AgentChatEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::Chat {
                role: role_of(type_prefix(&r#type)),
                agent_id: chat.agent_id,
                message: chat.message,
            }
        }
        EVT_PERMISSION_REQUESTED => {
            DaemonEvent::PermissionRequested(serde_json::from_value(payload).ok()?)
        }
        EVT_PERMISSION_RESOLVED => {
            let r: ResolvedEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::PermissionResolved { id: r.id }
        }
        EVT_QUESTION_REQUESTED => {
            DaemonEvent::QuestionRequested(serde_json::from_value(payload).ok()?)
        }
        EVT_QUESTION_RESOLVED => {
            let r: ResolvedEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::QuestionResolved { id: r.id }
        }
        EVT_ACTION_STAGED => DaemonEvent::ActionStaged(serde_json::from_value(payload).ok()?),
        EVT_ACTION_RESOLVED => {
            let r: ResolvedEvent = serde_json::from_value(payload).ok()?;
            DaemonEvent::ActionResolved { id: r.id }
        }
        _ => return None,
    };
    Some(decoded)
}

fn type_prefix(event_type: &str) -> &str {
    event_type.split('.').next().unwrap_or(event_type)
}

/// Attached event stream. Dropping it stops the reader task and closes the
/// connection.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Result<DaemonEvent>>,
    join: Option<JoinHandle<()>>,
}

impl EventStream {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Result<DaemonEvent>>,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            join: Some(join),
        }
    }

    /// A stream fed from a channel with no reader task behind it.
    #[cfg(test)]
    pub fn from_channel(rx: mpsc::UnboundedReceiver<Result<DaemonEvent>>) -> Self {
        Self { rx, join: None }
    }

    /// `None` once the reader has gone away.
    pub async fn recv(&mut self) -> Option<Result<DaemonEvent>> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

/// Everything the supervision client needs from the daemon.
#[async_trait]
pub trait TuiClient: Send + Sync {
    async fn stream_events(&self, projects: Vec<String>) -> Result<EventStream>;
    async fn agent_list(&self) -> Result<AgentListResponse>;
    async fn agent_chat_history(
        &self,
        agent: AgentRef,
        limit: Option<u32>,
    ) -> Result<ChatHistoryResponse>;
    async fn agent_send_message(&self, agent: AgentRef, message: String) -> Result<()>;
    async fn agent_abort(&self, agent: AgentRef, force: bool) -> Result<()>;
    async fn permission_respond(
        &self,
        id: String,
        behavior: PermissionBehavior,
        reason: Option<String>,
    ) -> Result<()>;
    async fn question_respond(&self, id: String, answers: BTreeMap<String, String>) -> Result<()>;
    async fn action_approve(&self, id: String) -> Result<()>;
    async fn action_reject(&self, id: String, reason: Option<String>) -> Result<()>;
    /// Returns the new planner's backend id.
    async fn plan_start(&self, project: Option<String>, prompt: String) -> Result<String>;
    async fn project_list(&self) -> Result<ProjectListResponse>;
    async fn permission_list(&self) -> Result<PermissionListResponse>;
    async fn question_list(&self) -> Result<UserQuestionListResponse>;
    async fn action_list(&self) -> Result<ActionListResponse>;
    async fn stats(&self) -> Result<StatsResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evt(t: &str, payload: serde_json::Value) -> Event {
        Event {
            r#type: t.to_owned(),
            id: String::new(),
            payload,
        }
    }

    #[test]
    fn role_follows_event_prefix() {
        let got = decode_event(evt(
            "planner.updated",
            json!({"agent_id": "p1", "state": "running"}),
        ));
        assert!(matches!(
            got,
            Some(DaemonEvent::AgentUpdated { role: AgentRole::Planner, ref update }) if update.agent_id == "p1"
        ));

        let got = decode_event(evt("manager.deleted", json!({"agent_id": "m"})));
        assert_eq!(
            got,
            Some(DaemonEvent::AgentDeleted {
                role: AgentRole::Manager,
                agent_id: "m".to_owned()
            })
        );
    }

    #[test]
    fn chat_and_pending_events_decode() {
        let got = decode_event(evt(
            "agent.chat",
            json!({"agent_id": "a-1", "message": {"role": "assistant", "content": "hi", "ts_ms": 3}}),
        ));
        assert!(matches!(got, Some(DaemonEvent::Chat { role: AgentRole::Coding, .. })));

        let got = decode_event(evt(
            "action.staged",
            json!({"id": "s1", "agent_id": "manager", "type": "send_message", "summary": "x"}),
        ));
        assert!(matches!(got, Some(DaemonEvent::ActionStaged(ref s)) if s.id == "s1"));

        let got = decode_event(evt("question.resolved", json!({"id": "q1"})));
        assert_eq!(got, Some(DaemonEvent::QuestionResolved { id: "q1".to_owned() }));
    }

    #[test]
    fn unknown_or_malformed_events_are_skipped() {
        assert_eq!(decode_event(evt("orchestration.tick", json!({}))), None);
        assert_eq!(decode_event(evt("agent.created", json!({"nope": 1}))), None);
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_reader() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });
        drop(EventStream::new(rx, join));
        assert!(alive_rx.await.is_err());
    }
}
