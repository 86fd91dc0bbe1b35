use std::future::Future;
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chorus_core::timestamp::now_ms;
use crossterm::event::{Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, terminal};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::{mpsc, Mutex};

use super::client::{EventStream, TuiClient};
use super::core::{reduce, Action, Effect, Model, Msg, Settings};
use super::roster::to_backend_id;
use super::view;

const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// The attached stream and the epoch it was opened under. A listener takes
/// it out for one event and puts it back unless a newer one replaced it.
type StreamSlot = Arc<Mutex<Option<(u64, EventStream)>>>;

struct TerminalGuard {
    stdout: Stdout,
}

impl TerminalGuard {
    fn enter() -> Result<(Self, Terminal<CrosstermBackend<Stdout>>)> {
        enable_raw_mode().context("enable raw mode")?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableBracketedPaste,
            terminal::Clear(terminal::ClearType::All)
        )
        .context("enter alt screen")?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend).context("create terminal")?;

        Ok((
            Self {
                stdout: io::stdout(),
            },
            terminal,
        ))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, DisableBracketedPaste, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

pub async fn run(
    client: Arc<dyn TuiClient>,
    projects: Vec<String>,
    settings: Settings,
) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    let (guard, mut terminal) = TerminalGuard::enter()?;

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Msg>();
    spawn_input_pump(msg_tx.clone(), shutdown.clone());
    spawn_tick_pump(msg_tx.clone(), shutdown.clone());

    let slot: StreamSlot = Arc::new(Mutex::new(None));

    let mut model = Model::new(projects, settings);
    let size = terminal.size().context("terminal size")?;
    (model, _) = reduce(
        model,
        Msg::Resize {
            width: size.width,
            height: size.height,
        },
    );
    (model, _) = reduce(model, Msg::Tick { now_ms: now_ms() });

    let (next, effects) = reduce(model, Msg::Init);
    model = next;
    let mut quit = dispatch(effects, &client, &msg_tx, &slot);
    terminal.draw(|f| view::draw(f, &model)).context("draw")?;

    while !quit {
        let Some(msg) = msg_rx.recv().await else {
            break;
        };
        let (next, effects) = reduce(model, msg);
        model = next;
        quit = dispatch(effects, &client, &msg_tx, &slot);
        terminal.draw(|f| view::draw(f, &model)).context("draw")?;
    }

    shutdown.store(true, Ordering::Relaxed);
    // Drops a parked stream. One held by an in-flight listener closes when
    // the runtime shuts down and drops that task.
    slot.lock().await.take();
    drop(guard);
    tracing::info!("tui exited");
    Ok(())
}

fn spawn_input_pump(tx: mpsc::UnboundedSender<Msg>, shutdown: Arc<AtomicBool>) {
    tokio::task::spawn_blocking(move || {
        while !shutdown.load(Ordering::Relaxed) {
            let ready = match crossterm::event::poll(Duration::from_millis(50)) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if !ready {
                continue;
            }

            let evt = match crossterm::event::read() {
                Ok(evt) => evt,
                Err(_) => continue,
            };

            let msg = match evt {
                CEvent::Key(key) => map_key(key).map(Msg::Action),
                CEvent::Paste(text) => Some(Msg::Paste(text)),
                CEvent::Resize(w, h) => Some(Msg::Resize {
                    width: w,
                    height: h,
                }),
                _ => None,
            };

            if let Some(msg) = msg {
                if tx.send(msg).is_err() {
                    break;
                }
            }
        }
    });
}

fn spawn_tick_pump(tx: mpsc::UnboundedSender<Msg>, shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            if tx.send(Msg::Tick { now_ms: now_ms() }).is_err() {
                return;
            }
        }
    });
}

fn map_key(key: KeyEvent) -> Option<Action> {
    if !matches!(key.kind, KeyEventKind::Press) {
        return None;
    }

    if matches!(key.code, KeyCode::Char('c')) && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match key.code {
        KeyCode::Tab => Some(Action::Tab),
        KeyCode::Esc => Some(Action::Cancel),
        KeyCode::Up => Some(Action::MoveUp),
        KeyCode::Down => Some(Action::MoveDown),
        KeyCode::Home => Some(Action::GoTop),
        KeyCode::End => Some(Action::GoBottom),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Enter => {
            if key.modifiers.contains(KeyModifiers::SHIFT) {
                Some(Action::ShiftEnter)
            } else {
                Some(Action::Enter)
            }
        }
        KeyCode::Char(c) => {
            if key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
            {
                None
            } else {
                Some(Action::Char(c))
            }
        }
        _ => None,
    }
}

fn err_text(err: anyhow::Error) -> String {
    format!("{err:#}")
}

/// Runs `fut` detached and feeds its message back into the loop.
fn spawn_msg<F>(tx: &mpsc::UnboundedSender<Msg>, fut: F)
where
    F: Future<Output = Option<Msg>> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        if let Some(msg) = fut.await {
            let _ = tx.send(msg);
        }
    });
}

/// Starts every effect as its own task. Returns true when the loop should
/// stop.
fn dispatch(
    effects: Vec<Effect>,
    client: &Arc<dyn TuiClient>,
    tx: &mpsc::UnboundedSender<Msg>,
    slot: &StreamSlot,
) -> bool {
    let mut quit = false;
    for effect in effects {
        let client = Arc::clone(client);
        match effect {
            Effect::Quit => quit = true,
            Effect::ConnectStream { epoch, projects } => {
                let slot = Arc::clone(slot);
                spawn_msg(tx, async move {
                    Some(connect_stream(client.as_ref(), &slot, epoch, projects).await)
                });
            }
            Effect::ListenStream { epoch } => {
                let slot = Arc::clone(slot);
                spawn_msg(tx, async move { listen_once(&slot, epoch).await });
            }
            Effect::ScheduleReconnect { epoch, after } => spawn_msg(tx, async move {
                tokio::time::sleep(after).await;
                Some(Msg::ReconnectDue { epoch })
            }),
            Effect::ExpireError { token, after } => spawn_msg(tx, async move {
                tokio::time::sleep(after).await;
                Some(Msg::ErrorExpired { token })
            }),
            Effect::FetchRoster { resync } => spawn_msg(tx, async move {
                let result = client
                    .agent_list()
                    .await
                    .map(|resp| resp.agents)
                    .map_err(err_text);
                Some(Msg::RosterLoaded { resync, result })
            }),
            Effect::FetchChatHistory { agent_id, limit } => spawn_msg(tx, async move {
                let result = client
                    .agent_chat_history(to_backend_id(&agent_id), Some(limit))
                    .await
                    .map(|resp| resp.messages)
                    .map_err(err_text);
                Some(Msg::ChatHistoryLoaded { agent_id, result })
            }),
            Effect::SendMessage { agent_id, message } => spawn_msg(tx, async move {
                let result = client
                    .agent_send_message(to_backend_id(&agent_id), message.clone())
                    .await
                    .map_err(err_text);
                Some(Msg::MessageSent {
                    agent_id,
                    message,
                    result,
                })
            }),
            Effect::RespondPermission {
                id,
                behavior,
                reason,
            } => spawn_msg(tx, async move {
                let result = client
                    .permission_respond(id.clone(), behavior, reason)
                    .await
                    .map_err(err_text);
                Some(Msg::PermissionResponded { id, result })
            }),
            Effect::RespondQuestion { id, answers } => spawn_msg(tx, async move {
                let result = client
                    .question_respond(id.clone(), answers)
                    .await
                    .map_err(err_text);
                Some(Msg::QuestionResponded { id, result })
            }),
            Effect::ApproveAction { id } => spawn_msg(tx, async move {
                let result = client.action_approve(id.clone()).await.map_err(err_text);
                Some(Msg::ActionResponded { id, result })
            }),
            Effect::RejectAction { id, reason } => spawn_msg(tx, async move {
                let result = client
                    .action_reject(id.clone(), reason)
                    .await
                    .map_err(err_text);
                Some(Msg::ActionResponded { id, result })
            }),
            Effect::AbortAgent { agent_id, force } => spawn_msg(tx, async move {
                let result = client
                    .agent_abort(to_backend_id(&agent_id), force)
                    .await
                    .map_err(err_text);
                Some(Msg::AbortFinished { agent_id, result })
            }),
            Effect::StartPlan { project, prompt } => spawn_msg(tx, async move {
                let result = client.plan_start(project, prompt).await.map_err(err_text);
                Some(Msg::PlanStarted(result))
            }),
            Effect::FetchProjects => spawn_msg(tx, async move {
                let result = client
                    .project_list()
                    .await
                    .map(|resp| resp.projects)
                    .map_err(err_text);
                Some(Msg::ProjectsLoaded(result))
            }),
            Effect::FetchStats => spawn_msg(tx, async move {
                Some(Msg::StatsLoaded(client.stats().await.map_err(err_text)))
            }),
            Effect::FetchPermissions => spawn_msg(tx, async move {
                let result = client
                    .permission_list()
                    .await
                    .map(|resp| resp.requests)
                    .map_err(err_text);
                Some(Msg::PermissionsLoaded(result))
            }),
            Effect::FetchQuestions => spawn_msg(tx, async move {
                let result = client
                    .question_list()
                    .await
                    .map(|resp| resp.requests)
                    .map_err(err_text);
                Some(Msg::QuestionsLoaded(result))
            }),
            Effect::FetchActions => spawn_msg(tx, async move {
                let result = client
                    .action_list()
                    .await
                    .map(|resp| resp.actions)
                    .map_err(err_text);
                Some(Msg::ActionsLoaded(result))
            }),
        }
    }
    quit
}

/// Opens a stream and installs it under `epoch`, unless a newer attempt
/// already won.
async fn connect_stream(
    client: &dyn TuiClient,
    slot: &StreamSlot,
    epoch: u64,
    projects: Vec<String>,
) -> Msg {
    match client.stream_events(projects).await {
        Ok(stream) => {
            let mut current = slot.lock().await;
            if current.as_ref().is_some_and(|(installed, _)| *installed > epoch) {
                tracing::debug!(epoch, "dropping stream from superseded attempt");
            } else {
                *current = Some((epoch, stream));
            }
            Msg::StreamConnected { epoch }
        }
        Err(err) => Msg::StreamConnectFailed {
            epoch,
            reason: err_text(err),
        },
    }
}

/// Waits for one event on the stream attached under `epoch`. `None` when a
/// different stream is installed.
async fn listen_once(slot: &StreamSlot, epoch: u64) -> Option<Msg> {
    let mut stream = {
        let mut current = slot.lock().await;
        match current.take() {
            Some((installed, stream)) if installed == epoch => stream,
            other => {
                *current = other;
                return None;
            }
        }
    };

    match stream.recv().await {
        Some(Ok(event)) => {
            let mut current = slot.lock().await;
            if current.is_none() {
                *current = Some((epoch, stream));
            }
            Some(Msg::StreamEvent { epoch, event })
        }
        Some(Err(err)) => Some(Msg::StreamFailed {
            epoch,
            reason: err_text(err),
        }),
        None => Some(Msg::StreamFailed {
            epoch,
            reason: "event stream closed".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use anyhow::bail;
    use async_trait::async_trait;
    use chorus_protocol::{
        ActionListResponse, AgentListResponse, ChatHistoryResponse, PermissionBehavior,
        PermissionListResponse, ProjectListResponse, StatsResponse, UserQuestionListResponse,
    };

    use crate::tui::client::DaemonEvent;
    use crate::tui::roster::AgentRef;

    /// Hands out channel-backed streams; every other call fails.
    struct StreamOnly {
        streams: std::sync::Mutex<Vec<EventStream>>,
    }

    #[async_trait]
    impl TuiClient for StreamOnly {
        async fn stream_events(&self, _projects: Vec<String>) -> Result<EventStream> {
            match self.streams.lock().unwrap().pop() {
                Some(stream) => Ok(stream),
                None => bail!("connection refused"),
            }
        }
        async fn agent_list(&self) -> Result<AgentListResponse> {
            bail!("unused")
        }
        async fn agent_chat_history(
            &self,
            _agent: AgentRef,
            _limit: Option<u32>,
        ) -> Result<ChatHistoryResponse> {
            bail!("unused")
        }
        async fn agent_send_message(&self, _agent: AgentRef, _message: String) -> Result<()> {
            bail!("unused")
        }
        async fn agent_abort(&self, _agent: AgentRef, _force: bool) -> Result<()> {
            bail!("unused")
        }
        async fn permission_respond(
            &self,
            _id: String,
            _behavior: PermissionBehavior,
            _reason: Option<String>,
        ) -> Result<()> {
            bail!("unused")
        }
        async fn question_respond(
            &self,
            _id: String,
            _answers: BTreeMap<String, String>,
        ) -> Result<()> {
            bail!("unused")
        }
        async fn action_approve(&self, _id: String) -> Result<()> {
            bail!("unused")
        }
        async fn action_reject(&self, _id: String, _reason: Option<String>) -> Result<()> {
            bail!("unused")
        }
        async fn plan_start(&self, _project: Option<String>, _prompt: String) -> Result<String> {
            bail!("unused")
        }
        async fn project_list(&self) -> Result<ProjectListResponse> {
            bail!("unused")
        }
        async fn permission_list(&self) -> Result<PermissionListResponse> {
            bail!("unused")
        }
        async fn question_list(&self) -> Result<UserQuestionListResponse> {
            bail!("unused")
        }
        async fn action_list(&self) -> Result<ActionListResponse> {
            bail!("unused")
        }
        async fn stats(&self) -> Result<StatsResponse> {
            bail!("unused")
        }
    }

    fn channel_stream() -> (mpsc::UnboundedSender<Result<DaemonEvent>>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, EventStream::from_channel(rx))
    }

    fn empty_slot() -> StreamSlot {
        Arc::new(Mutex::new(None))
    }

    async fn installed_epoch(slot: &StreamSlot) -> Option<u64> {
        slot.lock().await.as_ref().map(|(epoch, _)| *epoch)
    }

    #[test]
    fn keymap_maps_expected_actions() {
        let cases = [
            (KeyCode::Char('q'), KeyModifiers::NONE, Some(Action::Char('q'))),
            (KeyCode::Char('c'), KeyModifiers::CONTROL, Some(Action::Quit)),
            (KeyCode::Char('x'), KeyModifiers::ALT, None),
            (KeyCode::Tab, KeyModifiers::NONE, Some(Action::Tab)),
            (KeyCode::Enter, KeyModifiers::NONE, Some(Action::Enter)),
            (KeyCode::Enter, KeyModifiers::SHIFT, Some(Action::ShiftEnter)),
            (KeyCode::Esc, KeyModifiers::NONE, Some(Action::Cancel)),
            (KeyCode::Char('j'), KeyModifiers::NONE, Some(Action::Char('j'))),
            (KeyCode::Down, KeyModifiers::NONE, Some(Action::MoveDown)),
            (KeyCode::Up, KeyModifiers::NONE, Some(Action::MoveUp)),
            (KeyCode::Home, KeyModifiers::NONE, Some(Action::GoTop)),
            (KeyCode::End, KeyModifiers::NONE, Some(Action::GoBottom)),
            (KeyCode::PageUp, KeyModifiers::NONE, Some(Action::PageUp)),
            (KeyCode::PageDown, KeyModifiers::NONE, Some(Action::PageDown)),
            (KeyCode::Backspace, KeyModifiers::NONE, Some(Action::Backspace)),
            (KeyCode::F(1), KeyModifiers::NONE, None),
        ];
        for (code, modifiers, want) in cases {
            assert_eq!(map_key(KeyEvent::new(code, modifiers)), want, "{code:?}");
        }
    }

    #[tokio::test]
    async fn connect_installs_stream_under_its_epoch() {
        let (_tx, stream) = channel_stream();
        let client = StreamOnly {
            streams: std::sync::Mutex::new(vec![stream]),
        };
        let slot = empty_slot();

        let msg = connect_stream(&client, &slot, 3, Vec::new()).await;
        assert!(matches!(msg, Msg::StreamConnected { epoch: 3 }));
        assert_eq!(installed_epoch(&slot).await, Some(3));

        let msg = connect_stream(&client, &slot, 4, Vec::new()).await;
        assert!(
            matches!(msg, Msg::StreamConnectFailed { epoch: 4, ref reason } if reason == "connection refused")
        );
        assert_eq!(installed_epoch(&slot).await, Some(3));
    }

    #[tokio::test]
    async fn superseded_connect_does_not_replace_newer_stream() {
        let (_old_tx, old) = channel_stream();
        let (_new_tx, new) = channel_stream();
        let client = StreamOnly {
            streams: std::sync::Mutex::new(vec![old]),
        };
        let slot = empty_slot();
        *slot.lock().await = Some((5, new));

        connect_stream(&client, &slot, 4, Vec::new()).await;
        assert_eq!(installed_epoch(&slot).await, Some(5));
    }

    #[tokio::test]
    async fn listener_returns_the_stream_after_each_event() {
        let (tx, stream) = channel_stream();
        let slot = empty_slot();
        *slot.lock().await = Some((1, stream));

        tx.send(Ok(DaemonEvent::Heartbeat { now_ms: 7 })).unwrap();
        let msg = listen_once(&slot, 1).await;
        assert!(matches!(
            msg,
            Some(Msg::StreamEvent {
                epoch: 1,
                event: DaemonEvent::Heartbeat { now_ms: 7 }
            })
        ));
        assert_eq!(installed_epoch(&slot).await, Some(1));

        drop(tx);
        let msg = listen_once(&slot, 1).await;
        assert!(matches!(msg, Some(Msg::StreamFailed { epoch: 1, .. })));
        assert_eq!(installed_epoch(&slot).await, None);
    }

    #[tokio::test]
    async fn stale_listener_leaves_the_current_stream_alone() {
        let (_tx, stream) = channel_stream();
        let slot = empty_slot();
        *slot.lock().await = Some((2, stream));

        assert!(listen_once(&slot, 1).await.is_none());
        assert_eq!(installed_epoch(&slot).await, Some(2));
    }

    #[tokio::test]
    async fn stream_held_by_a_listener_closes_when_its_task_is_dropped() {
        let (tx, stream) = channel_stream();
        let slot = empty_slot();
        *slot.lock().await = Some((1, stream));

        let listener = tokio::spawn({
            let slot = slot.clone();
            async move { listen_once(&slot, 1).await }
        });
        while installed_epoch(&slot).await.is_some() {
            tokio::task::yield_now().await;
        }

        // Nothing parked for shutdown to take; the listener owns the stream.
        assert!(slot.lock().await.take().is_none());
        assert!(!tx.is_closed());

        listener.abort();
        assert!(listener.await.unwrap_err().is_cancelled());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn dispatched_timers_come_back_as_messages() {
        let client: Arc<dyn TuiClient> = Arc::new(StreamOnly {
            streams: std::sync::Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let quit = dispatch(
            vec![
                Effect::ExpireError {
                    token: 9,
                    after: Duration::from_millis(1),
                },
                Effect::FetchStats,
            ],
            &client,
            &tx,
            &empty_slot(),
        );
        assert!(!quit);

        let mut saw_expiry = false;
        let mut saw_stats_error = false;
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                Msg::ErrorExpired { token: 9 } => saw_expiry = true,
                Msg::StatsLoaded(Err(err)) => saw_stats_error = err == "unused",
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(saw_expiry && saw_stats_error);

        assert!(dispatch(vec![Effect::Quit], &client, &tx, &empty_slot()));
    }
}
