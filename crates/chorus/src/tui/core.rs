use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chorus_core::config::TuiConfig;
use chorus_protocol::{
    AgentInfo, AgentRole, ChatMessage, ChatRole, PermissionBehavior, PermissionRequest,
    ProjectInfo, StagedAction, StatsResponse, UserQuestion,
};

use super::chat::{ChatBuffer, Viewport};
use super::client::DaemonEvent;
use super::connection::{ConnectionState, ConnectionSupervisor, Reconnect};
use super::editor::Editor;
use super::mode::{Focus, Mode, ModeError, ModeKind, ModeState};
use super::pending::{Attention, Pending, PendingItem};
use super::roster::{to_display_id, AgentStatus, Roster};

pub const ERROR_TTL: Duration = Duration::from_secs(5);
pub const DENY_REASON: &str = "denied by operator";
pub const REJECT_REASON: &str = "rejected by operator";

const INPUT_MAX_ROWS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub history_limit: u32,
    pub stats_interval_ms: u64,
    pub reconnect_max_attempts: u32,
}

impl Settings {
    pub fn from_config(cfg: &TuiConfig) -> Self {
        Self {
            history_limit: cfg.effective_history_limit(),
            stats_interval_ms: cfg.effective_stats_interval_secs().saturating_mul(1000),
            reconnect_max_attempts: cfg.effective_reconnect_max_attempts(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&TuiConfig::default())
    }
}

/// The one user-facing error. A newer error replaces it and its timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub text: String,
    pub token: u64,
}

/// Progress through a multi-part question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub request_id: String,
    pub question_index: usize,
    pub option_index: usize,
    pub answers: BTreeMap<String, String>,
    /// Free-text answer being typed after choosing "Other".
    pub other: Option<String>,
}

impl QuestionDraft {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            question_index: 0,
            option_index: 0,
            answers: BTreeMap::new(),
            other: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    pub width: u16,
    pub height: u16,
    pub now_ms: u64,
    pub next_stats_ms: u64,
    pub frame: u64,

    pub modes: ModeState,
    pub connection: ConnectionSupervisor,

    pub roster: Roster,
    pub selected: Option<String>,
    pub chats: HashMap<String, ChatBuffer>,
    pub editor: Editor,
    pub pending: Pending,
    pub question_draft: Option<QuestionDraft>,

    /// Projects the stream is attached to; empty means all.
    pub projects: Vec<String>,
    pub known_projects: Vec<ProjectInfo>,
    pub stats: Option<StatsResponse>,

    pub show_tool_events: bool,
    pub error: Option<ErrorNotice>,
    error_seq: u64,
    pub status: Option<String>,
    pub settings: Settings,
}

impl Model {
    pub fn new(projects: Vec<String>, settings: Settings) -> Self {
        Self {
            width: 0,
            height: 0,
            now_ms: 0,
            next_stats_ms: 0,
            frame: 0,
            modes: ModeState::default(),
            connection: ConnectionSupervisor::new(settings.reconnect_max_attempts),
            roster: Roster::default(),
            selected: None,
            chats: HashMap::new(),
            editor: Editor::default(),
            pending: Pending::default(),
            question_draft: None,
            projects,
            known_projects: Vec::new(),
            stats: None,
            show_tool_events: false,
            error: None,
            error_seq: 0,
            status: None,
            settings,
        }
    }

    pub fn mode(&self) -> &Mode {
        self.modes.mode()
    }

    pub fn focus(&self) -> Focus {
        self.modes.focus()
    }

    pub fn selected_agent(&self) -> Option<&AgentStatus> {
        self.roster.get(self.selected.as_deref()?)
    }

    pub fn selected_chat(&self) -> Option<&ChatBuffer> {
        self.chats.get(self.selected.as_deref()?)
    }

    pub fn attention(&self) -> Option<Attention<'_>> {
        self.pending.attention_for(self.selected.as_deref()?)
    }

    /// The question the draft belongs to, if it is still pending.
    pub fn active_question(&self) -> Option<(&UserQuestion, &QuestionDraft)> {
        let draft = self.question_draft.as_ref()?;
        let question = self.pending.questions().get(&draft.request_id)?;
        Some((question, draft))
    }

    /// Whether the input panel is on screen.
    pub fn input_visible(&self) -> bool {
        matches!(self.mode(), Mode::Input | Mode::PlanPrompt { .. })
    }

    fn set_error(&mut self, text: impl Into<String>, effects: &mut Vec<Effect>) {
        let text = text.into();
        tracing::warn!(error = %text, "operator-visible error");
        self.error_seq += 1;
        self.error = Some(ErrorNotice {
            text,
            token: self.error_seq,
        });
        effects.push(Effect::ExpireError {
            token: self.error_seq,
            after: ERROR_TTL,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Tab,
    MoveUp,
    MoveDown,
    GoTop,
    GoBottom,
    PageUp,
    PageDown,
    Enter,
    ShiftEnter,
    Backspace,
    Char(char),
    Cancel,
}

#[derive(Debug, Clone)]
pub enum Msg {
    Init,
    Resize {
        width: u16,
        height: u16,
    },
    Tick {
        now_ms: u64,
    },
    Action(Action),
    Paste(String),

    RosterLoaded {
        resync: bool,
        result: Result<Vec<AgentInfo>, String>,
    },
    ChatHistoryLoaded {
        agent_id: String,
        result: Result<Vec<ChatMessage>, String>,
    },
    MessageSent {
        agent_id: String,
        message: String,
        result: Result<(), String>,
    },
    PermissionResponded {
        id: String,
        result: Result<(), String>,
    },
    QuestionResponded {
        id: String,
        result: Result<(), String>,
    },
    ActionResponded {
        id: String,
        result: Result<(), String>,
    },
    AbortFinished {
        agent_id: String,
        result: Result<(), String>,
    },
    /// Carries the new planner's backend id.
    PlanStarted(Result<String, String>),
    ProjectsLoaded(Result<Vec<ProjectInfo>, String>),
    StatsLoaded(Result<StatsResponse, String>),
    PermissionsLoaded(Result<Vec<PermissionRequest>, String>),
    QuestionsLoaded(Result<Vec<UserQuestion>, String>),
    ActionsLoaded(Result<Vec<StagedAction>, String>),

    StreamConnected {
        epoch: u64,
    },
    StreamConnectFailed {
        epoch: u64,
        reason: String,
    },
    StreamEvent {
        epoch: u64,
        event: DaemonEvent,
    },
    StreamFailed {
        epoch: u64,
        reason: String,
    },
    ReconnectDue {
        epoch: u64,
    },
    ErrorExpired {
        token: u64,
    },
}

/// Work for the runtime. Agent ids are display ids; the runtime maps them
/// back to daemon ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ConnectStream {
        epoch: u64,
        projects: Vec<String>,
    },
    ListenStream {
        epoch: u64,
    },
    ScheduleReconnect {
        epoch: u64,
        after: Duration,
    },
    ExpireError {
        token: u64,
        after: Duration,
    },
    FetchRoster {
        resync: bool,
    },
    FetchChatHistory {
        agent_id: String,
        limit: u32,
    },
    SendMessage {
        agent_id: String,
        message: String,
    },
    RespondPermission {
        id: String,
        behavior: PermissionBehavior,
        reason: Option<String>,
    },
    RespondQuestion {
        id: String,
        answers: BTreeMap<String, String>,
    },
    ApproveAction {
        id: String,
    },
    RejectAction {
        id: String,
        reason: Option<String>,
    },
    AbortAgent {
        agent_id: String,
        force: bool,
    },
    StartPlan {
        project: Option<String>,
        prompt: String,
    },
    FetchProjects,
    FetchStats,
    FetchPermissions,
    FetchQuestions,
    FetchActions,
    Quit,
}

pub fn reduce(mut model: Model, msg: Msg) -> (Model, Vec<Effect>) {
    let mut effects = Vec::new();

    match msg {
        Msg::Init => {
            let epoch = model.connection.begin_attempt();
            effects.push(Effect::ConnectStream {
                epoch,
                projects: model.projects.clone(),
            });
            effects.push(Effect::FetchProjects);
            effects.push(Effect::FetchStats);
        }
        Msg::Resize { width, height } => {
            model.width = width;
            model.height = height;
            rewrap_all(&mut model);
        }
        Msg::Tick { now_ms } => {
            model.now_ms = now_ms;
            model.frame = model.frame.wrapping_add(1);
            if model.next_stats_ms == 0 {
                model.next_stats_ms = now_ms.saturating_add(model.settings.stats_interval_ms);
            } else if now_ms >= model.next_stats_ms {
                model.next_stats_ms = now_ms.saturating_add(model.settings.stats_interval_ms);
                effects.push(Effect::FetchStats);
            }
        }
        Msg::Action(action) => handle_action(&mut model, &mut effects, action),
        Msg::Paste(text) => match model.modes.kind() {
            ModeKind::Input | ModeKind::PlanPrompt => model.editor.insert_str(&text),
            ModeKind::UserQuestion => {
                if let Some(other) = model
                    .question_draft
                    .as_mut()
                    .and_then(|d| d.other.as_mut())
                {
                    other.push_str(&text);
                }
            }
            _ => {}
        },

        Msg::RosterLoaded {
            resync: true,
            result,
        } => match result {
            // The reconnect only counts once the roster is back.
            Ok(agents) => {
                let epoch = model.connection.epoch();
                model.connection.on_connected();
                model.status = None;
                apply_roster(&mut model, &mut effects, agents);
                let pruned = model
                    .pending
                    .prune(|agent| model.roster.contains(agent));
                if pruned > 0 {
                    tracing::info!(pruned, "dropped pending items for departed agents");
                }
                sync_question_draft(&mut model);
                tracing::info!(epoch, agents = model.roster.len(), "roster resynced");

                effects.push(Effect::ListenStream { epoch });
                effects.push(Effect::FetchPermissions);
                effects.push(Effect::FetchQuestions);
                effects.push(Effect::FetchActions);
            }
            Err(err) => {
                model.set_error(format!("agent list: {err}"), &mut effects);
                stream_lost(&mut model, &mut effects, format!("resync failed: {err}"));
            }
        },
        Msg::RosterLoaded {
            resync: false,
            result,
        } => match result {
            Ok(agents) => apply_roster(&mut model, &mut effects, agents),
            Err(err) => model.set_error(format!("agent list: {err}"), &mut effects),
        },
        Msg::ChatHistoryLoaded { agent_id, result } => match result {
            Ok(history) => {
                let vp = chat_viewport(&model);
                model
                    .chats
                    .entry(agent_id)
                    .or_default()
                    .merge_history(history, vp);
            }
            Err(err) => model.set_error(format!("chat history: {err}"), &mut effects),
        },
        Msg::MessageSent {
            agent_id,
            message,
            result,
        } => {
            if let Err(err) = result {
                // Hand the text back if the operator is still on that agent
                // and has not started a new one.
                let same_target = model.selected.as_deref() == Some(agent_id.as_str());
                if same_target && model.input_visible() && model.editor.is_empty() {
                    model.editor.restore(message);
                }
                let vp = chat_viewport(&model);
                let note = ChatMessage {
                    role: ChatRole::System,
                    content: format!("send failed: {err}"),
                    tool_name: None,
                    tool_input: None,
                    tool_result: None,
                    is_error: true,
                    ts_ms: model.now_ms,
                };
                model.chats.entry(agent_id).or_default().append(note, vp);
                model.set_error(format!("send: {err}"), &mut effects);
            }
        }
        Msg::PermissionResponded { id, result } => match result {
            Ok(()) => {
                model.pending.resolve_permission(&id);
            }
            Err(err) => {
                model.set_error(format!("permission: {err}"), &mut effects);
                effects.push(Effect::FetchPermissions);
            }
        },
        Msg::QuestionResponded { id, result } => match result {
            Ok(()) => {
                model.pending.resolve_question(&id);
                sync_question_draft(&mut model);
            }
            Err(err) => {
                model.set_error(format!("question: {err}"), &mut effects);
                effects.push(Effect::FetchQuestions);
            }
        },
        Msg::ActionResponded { id, result } => match result {
            Ok(()) => {
                model.pending.resolve_action(&id);
            }
            Err(err) => {
                model.set_error(format!("staged action: {err}"), &mut effects);
                effects.push(Effect::FetchActions);
            }
        },
        Msg::AbortFinished { agent_id, result } => match result {
            Ok(()) => {
                model.status = Some(format!("stop requested for {agent_id}"));
                effects.push(Effect::FetchRoster { resync: false });
            }
            Err(err) => model.set_error(format!("abort {agent_id}: {err}"), &mut effects),
        },
        Msg::PlanStarted(result) => match result {
            Ok(backend_id) => {
                let display_id = to_display_id(AgentRole::Planner, &backend_id);
                model.status = Some(format!("planner {backend_id} started"));
                model.roster.set_pending_select(display_id);
                consume_pending_select(&mut model, &mut effects);
            }
            Err(err) => model.set_error(format!("plan start: {err}"), &mut effects),
        },
        Msg::ProjectsLoaded(result) => match result {
            Ok(projects) => {
                model.known_projects = projects;
                if model.modes.plan_picker().is_some() {
                    let names = project_names(&model.known_projects);
                    log_mode_error(model.modes.replace_plan_projects(names));
                }
            }
            Err(err) => model.set_error(format!("project list: {err}"), &mut effects),
        },
        Msg::StatsLoaded(result) => match result {
            Ok(stats) => model.stats = Some(stats),
            Err(err) => tracing::debug!(error = %err, "stats refresh failed"),
        },
        Msg::PermissionsLoaded(result) => match result {
            Ok(mut items) => {
                for item in &mut items {
                    rekey(&model.roster, item);
                }
                model.pending.replace_permissions(items);
            }
            Err(err) => model.set_error(format!("permission list: {err}"), &mut effects),
        },
        Msg::QuestionsLoaded(result) => match result {
            Ok(mut items) => {
                for item in &mut items {
                    rekey(&model.roster, item);
                }
                model.pending.replace_questions(items);
                sync_question_draft(&mut model);
            }
            Err(err) => model.set_error(format!("question list: {err}"), &mut effects),
        },
        Msg::ActionsLoaded(result) => match result {
            Ok(mut items) => {
                for item in &mut items {
                    rekey(&model.roster, item);
                }
                model.pending.replace_actions(items);
            }
            Err(err) => model.set_error(format!("action list: {err}"), &mut effects),
        },

        Msg::StreamConnected { epoch } => {
            if !model.connection.is_current(epoch) {
                tracing::debug!(epoch, "ignoring stale stream connect");
                return (model, effects);
            }
            let attempts = model.connection.attempt();
            tracing::info!(epoch, attempts, "event stream attached");
            effects.push(Effect::FetchRoster { resync: true });
        }
        Msg::StreamConnectFailed { epoch, reason } | Msg::StreamFailed { epoch, reason } => {
            if !model.connection.is_current(epoch) {
                tracing::debug!(epoch, "ignoring stale stream failure");
                return (model, effects);
            }
            stream_lost(&mut model, &mut effects, reason);
        }
        Msg::StreamEvent { epoch, event } => {
            if !model.connection.is_current(epoch) {
                return (model, effects);
            }
            apply_event(&mut model, &mut effects, event);
            effects.push(Effect::ListenStream { epoch });
        }
        Msg::ReconnectDue { epoch } => {
            if model.connection.is_current(epoch)
                && model.connection.state() == ConnectionState::Reconnecting
            {
                let epoch = model.connection.begin_attempt();
                effects.push(Effect::ConnectStream {
                    epoch,
                    projects: model.projects.clone(),
                });
            }
        }
        Msg::ErrorExpired { token } => {
            if model.error.as_ref().is_some_and(|e| e.token == token) {
                model.error = None;
            }
        }
    }

    (model, effects)
}

fn stream_lost(model: &mut Model, effects: &mut Vec<Effect>, reason: String) {
    match model.connection.on_failure() {
        Reconnect::After(after) => {
            let attempt = model.connection.attempt();
            let max = model.connection.max_attempts();
            tracing::warn!(%reason, attempt, delay_ms = after.as_millis() as u64, "event stream lost");
            model.status = Some(format!("reconnecting ({attempt}/{max})"));
            effects.push(Effect::ScheduleReconnect {
                epoch: model.connection.epoch(),
                after,
            });
        }
        Reconnect::GaveUp => {
            model.status = None;
            model.set_error(format!("disconnected: {reason} (r to reconnect)"), effects);
        }
    }
}

fn apply_event(model: &mut Model, effects: &mut Vec<Effect>, event: DaemonEvent) {
    match event {
        DaemonEvent::Heartbeat { .. } => {}
        DaemonEvent::RosterReplaced(agents) => apply_roster(model, effects, agents),
        DaemonEvent::AgentCreated { role, agent } => {
            let status = AgentStatus::from_info(agent, role, model.now_ms);
            let id = status.id.clone();
            model.roster.upsert(status);
            if model.roster.pending_select() == Some(id.as_str()) {
                consume_pending_select(model, effects);
            } else if model.selected.is_none() {
                select_agent(model, effects, Some(id), true);
            }
        }
        DaemonEvent::AgentUpdated { role, update } => {
            if !model.roster.apply_update(role, &update) {
                tracing::debug!(agent_id = %update.agent_id, "update for unknown agent");
            }
        }
        DaemonEvent::AgentDeleted { role, agent_id } => {
            let id = to_display_id(role, &agent_id);
            remove_agent(model, effects, &id);
        }
        DaemonEvent::Chat {
            role,
            agent_id,
            message,
        } => {
            let id = match role {
                AgentRole::Coding => model.roster.resolve_display_id(&agent_id),
                _ => to_display_id(role, &agent_id),
            };
            let vp = chat_viewport(model);
            model.chats.entry(id).or_default().append(message, vp);
        }
        DaemonEvent::PermissionRequested(mut req) => {
            rekey(&model.roster, &mut req);
            model.pending.add_permission(req);
        }
        DaemonEvent::PermissionResolved { id } => {
            model.pending.resolve_permission(&id);
        }
        DaemonEvent::QuestionRequested(mut req) => {
            rekey(&model.roster, &mut req);
            model.pending.add_question(req);
        }
        DaemonEvent::QuestionResolved { id } => {
            model.pending.resolve_question(&id);
            sync_question_draft(model);
        }
        DaemonEvent::ActionStaged(mut action) => {
            rekey(&model.roster, &mut action);
            model.pending.add_action(action);
        }
        DaemonEvent::ActionResolved { id } => {
            model.pending.resolve_action(&id);
        }
    }
}

/// Full replace. Keeps the selection when its agent survives, otherwise
/// falls back to the first agent.
fn apply_roster(model: &mut Model, effects: &mut Vec<Effect>, mut agents: Vec<AgentInfo>) {
    if !model.projects.is_empty() {
        agents.retain(|a| a.role == AgentRole::Manager || model.projects.contains(&a.project));
    }
    model.roster.replace(agents, model.now_ms);

    let roster = &model.roster;
    model.chats.retain(|id, _| roster.contains(id));
    release_departed(model);

    if let Some(id) = model.roster.take_pending_select() {
        select_agent(model, effects, Some(id), true);
    } else {
        if model.roster.pending_select().is_some() {
            tracing::debug!("planner auto-select abandoned");
            model.roster.abandon_pending_select();
        }
        match model.selected.clone() {
            Some(id) if model.roster.contains(&id) => {
                let loaded = model.chats.get(&id).is_some_and(ChatBuffer::history_loaded);
                if !loaded {
                    push_history_fetch(model, effects, id);
                }
            }
            _ => {
                let first = model.roster.first_id().map(str::to_owned);
                select_agent(model, effects, first, true);
            }
        }
    }
    sync_question_draft(model);
}

fn remove_agent(model: &mut Model, effects: &mut Vec<Effect>, id: &str) {
    let Some(idx) = model.roster.remove(id) else {
        return;
    };
    model.chats.remove(id);
    model.pending.prune(|agent| agent != id);
    release_departed(model);

    if model.selected.as_deref() == Some(id) {
        let next = model.roster.successor(idx).map(str::to_owned);
        select_agent(model, effects, next, true);
    }
    sync_question_draft(model);
}

/// Cancels an abort confirm whose agent is no longer in the roster.
fn release_departed(model: &mut Model) {
    let abort_gone = model
        .modes
        .abort_target()
        .is_some_and(|target| !model.roster.contains(target));
    if abort_gone {
        tracing::debug!("abort target left the roster");
        log_mode_error(model.modes.cancel_abort());
    }
}

/// Changes the detail view. `refetch` forces a history fetch even when the
/// buffer already has one. Input is bound to the selected agent, so moving
/// the selection closes it.
fn select_agent(model: &mut Model, effects: &mut Vec<Effect>, id: Option<String>, refetch: bool) {
    if model.selected != id && model.mode() == &Mode::Input {
        tracing::debug!("selection moved while typing; leaving input");
        log_mode_error(model.modes.exit_input());
    }
    model.selected = id.clone();
    let Some(id) = id else {
        return;
    };
    let loaded = model.chats.get(&id).is_some_and(ChatBuffer::history_loaded);
    if refetch || !loaded {
        push_history_fetch(model, effects, id);
    }
}

fn push_history_fetch(model: &Model, effects: &mut Vec<Effect>, agent_id: String) {
    effects.push(Effect::FetchChatHistory {
        agent_id,
        limit: model.settings.history_limit,
    });
}

fn consume_pending_select(model: &mut Model, effects: &mut Vec<Effect>) {
    if let Some(id) = model.roster.take_pending_select() {
        tracing::debug!(agent_id = %id, "auto-selecting new planner");
        select_agent(model, effects, Some(id), true);
    }
}

/// Drops the question draft once its question is gone, leaving the
/// question mode with it.
/// Points a pending item at its owner's display id.
fn rekey<T: PendingItem>(roster: &Roster, item: &mut T) {
    let id = roster.resolve_display_id(item.agent_id());
    item.set_agent_id(id);
}

fn sync_question_draft(model: &mut Model) {
    let stale = model.question_draft.as_ref().is_some_and(|d| {
        model
            .pending
            .questions()
            .get(&d.request_id)
            .map_or(true, |q| model.selected.as_deref() != Some(q.agent_id.as_str()))
    });
    if stale {
        model.question_draft = None;
    }
    if model.question_draft.is_none() && model.mode() == &Mode::UserQuestion {
        log_mode_error(model.modes.exit_user_question());
    }
}

fn rewrap_all(model: &mut Model) {
    let vp = chat_viewport(model);
    for chat in model.chats.values_mut() {
        chat.rewrap(vp);
    }
}

fn project_names(projects: &[ProjectInfo]) -> Vec<String> {
    projects.iter().map(|p| p.name.clone()).collect()
}

fn log_mode_error<T>(result: Result<T, ModeError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::debug!(error = %err, "mode transition rejected");
            None
        }
    }
}

fn handle_action(model: &mut Model, effects: &mut Vec<Effect>, action: Action) {
    if action == Action::Quit {
        effects.push(Effect::Quit);
        return;
    }
    match model.modes.kind() {
        ModeKind::Input => input_key(model, effects, action),
        ModeKind::PlanPrompt => plan_prompt_key(model, effects, action),
        ModeKind::AbortConfirm => abort_key(model, effects, action),
        ModeKind::PlanProjectSelect => plan_select_key(model, action),
        ModeKind::UserQuestion => question_key(model, effects, action),
        ModeKind::Normal => normal_key(model, effects, action),
    }
}

fn normal_key(model: &mut Model, effects: &mut Vec<Effect>, action: Action) {
    match action {
        Action::Tab => {
            log_mode_error(model.modes.cycle_focus());
        }
        Action::MoveDown | Action::Char('j') => move_cursor(model, effects, Step::Down),
        Action::MoveUp | Action::Char('k') => move_cursor(model, effects, Step::Up),
        Action::GoTop | Action::Char('g') => move_cursor(model, effects, Step::Top),
        Action::GoBottom | Action::Char('G') => move_cursor(model, effects, Step::Bottom),
        Action::PageUp if model.focus() == Focus::ChatView => {
            move_cursor(model, effects, Step::PageUp)
        }
        Action::PageDown if model.focus() == Focus::ChatView => {
            move_cursor(model, effects, Step::PageDown)
        }
        Action::Enter => {
            if model.selected.is_some() {
                log_mode_error(model.modes.enter_input());
            }
        }
        Action::Cancel => {
            model.error = None;
            model.status = None;
        }
        Action::Char('q') => effects.push(Effect::Quit),
        Action::Char('t') => {
            model.show_tool_events = !model.show_tool_events;
            rewrap_all(model);
        }
        Action::Char('r') => match model.connection.manual_reconnect() {
            Some(epoch) => {
                tracing::info!(epoch, "manual reconnect");
                model.status = Some("reconnecting".to_owned());
                effects.push(Effect::ConnectStream {
                    epoch,
                    projects: model.projects.clone(),
                });
            }
            None => tracing::debug!("manual reconnect ignored while not disconnected"),
        },
        Action::Char('p') => {
            let names = project_names(&model.known_projects);
            if log_mode_error(model.modes.enter_plan_project_select(names)).is_some() {
                effects.push(Effect::FetchProjects);
            }
        }
        Action::Char('x') => {
            if let Some(id) = model.selected.clone() {
                log_mode_error(model.modes.enter_abort_confirm(&id));
            }
        }
        Action::Char('y') => approve(model, effects),
        Action::Char('n') => reject(model, effects),
        _ => {}
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Up,
    Down,
    Top,
    Bottom,
    PageUp,
    PageDown,
}

/// Moves the roster selection or scrolls the chat, depending on focus.
fn move_cursor(model: &mut Model, effects: &mut Vec<Effect>, step: Step) {
    if model.focus() == Focus::ChatView {
        let height = chat_viewport(model).height;
        let Some(chat) = model.selected.as_ref().and_then(|id| model.chats.get_mut(id)) else {
            return;
        };
        match step {
            Step::Up => chat.scroll_up(1),
            Step::Down => chat.scroll_down(1, height),
            Step::PageUp => chat.scroll_up(height.max(1)),
            Step::PageDown => chat.scroll_down(height.max(1), height),
            Step::Top => chat.jump_top(),
            Step::Bottom => chat.jump_bottom(height),
        }
        return;
    }

    if model.roster.is_empty() {
        return;
    }
    let last = model.roster.len() - 1;
    let current = model
        .selected
        .as_deref()
        .and_then(|id| model.roster.index_of(id));
    let target = match (step, current) {
        (Step::Top, _) | (Step::Up | Step::PageUp, None) => 0,
        (Step::Bottom, _) => last,
        (Step::Down | Step::PageDown, None) => 0,
        (Step::Up | Step::PageUp, Some(idx)) => idx.saturating_sub(1),
        (Step::Down | Step::PageDown, Some(idx)) => (idx + 1).min(last),
    };
    if current == Some(target) {
        return;
    }
    let id = model.roster.agents()[target].id.clone();
    select_agent(model, effects, Some(id), false);
}

fn approve(model: &mut Model, effects: &mut Vec<Effect>) {
    let Some(attention) = model.attention() else {
        return;
    };
    match attention {
        Attention::Question(q) => {
            if q.questions.is_empty() {
                effects.push(Effect::RespondQuestion {
                    id: q.id.clone(),
                    answers: BTreeMap::new(),
                });
                return;
            }
            let draft = QuestionDraft::new(q.id.clone());
            if log_mode_error(model.modes.enter_user_question()).is_some() {
                model.question_draft = Some(draft);
            }
        }
        Attention::Permission(p) => effects.push(Effect::RespondPermission {
            id: p.id.clone(),
            behavior: PermissionBehavior::Allow,
            reason: None,
        }),
        Attention::Action(a) => effects.push(Effect::ApproveAction { id: a.id.clone() }),
    }
}

fn reject(model: &mut Model, effects: &mut Vec<Effect>) {
    match model.attention() {
        // A question has no reject; it is answered or left open.
        Some(Attention::Question(_)) | None => {}
        Some(Attention::Permission(p)) => effects.push(Effect::RespondPermission {
            id: p.id.clone(),
            behavior: PermissionBehavior::Deny,
            reason: Some(DENY_REASON.to_owned()),
        }),
        Some(Attention::Action(a)) => effects.push(Effect::RejectAction {
            id: a.id.clone(),
            reason: Some(REJECT_REASON.to_owned()),
        }),
    }
}

fn edit_key(editor: &mut Editor, action: Action) {
    match action {
        Action::Char(ch) => editor.insert_char(ch),
        Action::ShiftEnter => editor.insert_newline(),
        Action::Backspace => editor.backspace(),
        Action::MoveUp => editor.history_prev(),
        Action::MoveDown => editor.history_next(),
        _ => {}
    }
}

fn input_key(model: &mut Model, effects: &mut Vec<Effect>, action: Action) {
    match action {
        Action::Enter => {
            let Some(agent_id) = model.selected.clone() else {
                return;
            };
            let Some(text) = model.editor.take_submit() else {
                return;
            };
            let vp = chat_viewport(model);
            let echo = ChatMessage {
                role: ChatRole::User,
                content: text.clone(),
                tool_name: None,
                tool_input: None,
                tool_result: None,
                is_error: false,
                ts_ms: model.now_ms,
            };
            let chat = model.chats.entry(agent_id.clone()).or_default();
            chat.append(echo, vp);
            chat.jump_bottom(vp.height);
            effects.push(Effect::SendMessage {
                agent_id,
                message: text,
            });
        }
        Action::Tab => {
            log_mode_error(model.modes.exit_input());
        }
        Action::Cancel => {
            model.editor.clear();
            log_mode_error(model.modes.exit_input());
        }
        other => edit_key(&mut model.editor, other),
    }
}

fn plan_prompt_key(model: &mut Model, effects: &mut Vec<Effect>, action: Action) {
    match action {
        Action::Enter => {
            let Some(prompt) = model.editor.take_submit() else {
                return;
            };
            if let Some(project) = log_mode_error(model.modes.exit_plan_prompt()) {
                model.status = Some(format!("starting planner for {project}"));
                effects.push(Effect::StartPlan {
                    project: Some(project),
                    prompt,
                });
            }
        }
        Action::Tab | Action::Cancel => {
            model.editor.clear();
            log_mode_error(model.modes.cancel_plan_prompt());
        }
        other => edit_key(&mut model.editor, other),
    }
}

fn abort_key(model: &mut Model, effects: &mut Vec<Effect>, action: Action) {
    let force = match action {
        Action::Char('y') => false,
        Action::Char('f') => true,
        Action::Char('n') | Action::Cancel => {
            log_mode_error(model.modes.cancel_abort());
            return;
        }
        _ => return,
    };
    if let Some(agent_id) = log_mode_error(model.modes.confirm_abort()) {
        tracing::info!(agent_id = %agent_id, force, "abort requested");
        effects.push(Effect::AbortAgent { agent_id, force });
    }
}

fn plan_select_key(model: &mut Model, action: Action) {
    let filter = model
        .modes
        .plan_picker()
        .map(|p| p.filter.clone())
        .unwrap_or_default();
    match action {
        Action::Char(ch) => {
            let mut next = filter;
            next.push(ch);
            log_mode_error(model.modes.set_plan_filter(&next));
        }
        Action::Backspace => {
            let mut next = filter;
            next.pop();
            log_mode_error(model.modes.set_plan_filter(&next));
        }
        Action::MoveUp => {
            log_mode_error(model.modes.plan_up());
        }
        Action::MoveDown => {
            log_mode_error(model.modes.plan_down());
        }
        Action::Enter => {
            if log_mode_error(model.modes.select_plan_project()).is_some() {
                model.editor.clear();
            }
        }
        Action::Cancel => {
            log_mode_error(model.modes.cancel_plan_project_select());
        }
        _ => {}
    }
}

fn question_key(model: &mut Model, effects: &mut Vec<Effect>, action: Action) {
    let Some((question, draft)) = model.active_question() else {
        model.question_draft = None;
        log_mode_error(model.modes.exit_user_question());
        return;
    };
    let Some(item) = question.questions.get(draft.question_index) else {
        return;
    };
    let question_count = question.questions.len();
    // The extra slot past the real options is "Other".
    let other_index = item.options.len();
    let key = if item.header.trim().is_empty() {
        item.question.clone()
    } else {
        item.header.clone()
    };
    let chosen = item.options.get(draft.option_index).map(|o| o.label.clone());

    let Some(draft) = model.question_draft.as_mut() else {
        return;
    };

    if let Some(other) = draft.other.as_mut() {
        match action {
            Action::Char(ch) => other.push(ch),
            Action::Backspace => {
                other.pop();
            }
            Action::Cancel => draft.other = None,
            Action::Enter => {
                let text = other.trim().to_owned();
                if !text.is_empty() {
                    draft.other = None;
                    record_answer(model, effects, key, text, question_count);
                }
            }
            _ => {}
        }
        return;
    }

    match action {
        Action::MoveDown | Action::Char('j') => {
            draft.option_index = (draft.option_index + 1).min(other_index);
        }
        Action::MoveUp | Action::Char('k') => {
            draft.option_index = draft.option_index.saturating_sub(1);
        }
        Action::Enter | Action::Char('y') => match chosen {
            Some(label) => record_answer(model, effects, key, label, question_count),
            None => draft.other = Some(String::new()),
        },
        Action::Cancel => {
            model.question_draft = None;
            log_mode_error(model.modes.exit_user_question());
        }
        _ => {}
    }
}

/// Stores one answer and moves on; after the last question the answers go
/// out and the mode closes.
fn record_answer(
    model: &mut Model,
    effects: &mut Vec<Effect>,
    key: String,
    answer: String,
    question_count: usize,
) {
    let Some(draft) = model.question_draft.as_mut() else {
        return;
    };
    draft.answers.insert(key, answer);
    draft.question_index += 1;
    draft.option_index = 0;
    if draft.question_index < question_count {
        return;
    }
    if let Some(done) = model.question_draft.take() {
        effects.push(Effect::RespondQuestion {
            id: done.request_id,
            answers: done.answers,
        });
    }
    log_mode_error(model.modes.exit_user_question());
}

/// Panel sizes for the current terminal, shared with the view so wrapping
/// and drawing agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panels {
    pub list_width: u16,
    pub chat_width: u16,
    pub body_height: u16,
    pub input_height: u16,
}

pub fn panels(model: &Model) -> Panels {
    let width = model.width;
    let list_width = ((u32::from(width) * 3 / 10) as u16).max(20).min(width / 2);
    let chat_width = width - list_width;
    // One row each for the header and the help line.
    let body_height = model.height.saturating_sub(2);
    let input_height = if model.input_visible() {
        let rows = model
            .editor
            .rows(usize::from(chat_width.saturating_sub(2)))
            .clamp(1, INPUT_MAX_ROWS);
        rows as u16 + 2
    } else {
        0
    };
    Panels {
        list_width,
        chat_width,
        body_height,
        input_height: input_height.min(body_height),
    }
}

/// Inner size of the chat panel.
pub fn chat_viewport(model: &Model) -> Viewport {
    let p = panels(model);
    Viewport {
        width: usize::from(p.chat_width.saturating_sub(2)),
        height: usize::from(
            p.body_height
                .saturating_sub(p.input_height)
                .saturating_sub(2),
        ),
        show_tools: model.show_tool_events,
    }
}

/// Key hints for the footer, by mode.
pub fn help_items(model: &Model) -> Vec<(&'static str, &'static str)> {
    match model.mode() {
        Mode::Normal => {
            let mut items = vec![("tab", "focus"), ("j/k", "move"), ("enter", "message")];
            if model.attention().is_some() {
                items.push(("y/n", "approve/reject"));
            }
            items.extend([
                ("x", "abort"),
                ("p", "plan"),
                ("t", "tools"),
                ("r", "reconnect"),
                ("q", "quit"),
            ]);
            items
        }
        Mode::Input => vec![
            ("enter", "send"),
            ("shift+enter", "newline"),
            ("up/down", "history"),
            ("tab", "leave"),
            ("esc", "cancel"),
        ],
        Mode::PlanPrompt { .. } => vec![
            ("enter", "start planner"),
            ("shift+enter", "newline"),
            ("esc", "cancel"),
        ],
        Mode::AbortConfirm { .. } => vec![("y", "abort"), ("f", "force"), ("n/esc", "cancel")],
        Mode::PlanProjectSelect(_) => vec![
            ("type", "filter"),
            ("up/down", "move"),
            ("enter", "select"),
            ("esc", "cancel"),
        ],
        Mode::UserQuestion => {
            let typing = model
                .question_draft
                .as_ref()
                .is_some_and(|d| d.other.is_some());
            if typing {
                vec![("enter", "answer"), ("esc", "back")]
            } else {
                vec![("j/k", "choose"), ("enter", "answer"), ("esc", "leave")]
            }
        }
    }
}
