use chorus_core::timestamp::format_age;
use chorus_protocol::{AgentRole, AgentState, ChatRole, PermissionRequest, StagedAction, UserQuestion};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use super::chat::BADGE_WIDTH;
use super::connection::ConnectionState;
use super::core::{help_items, panels, Model};
use super::mode::{Focus, Mode, PlanPicker};
use super::pending::Attention;
use super::roster::AgentStatus;

pub fn draw(frame: &mut Frame<'_>, model: &Model) {
    frame.render_widget(Clear, frame.size());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.size());

    draw_header(frame, model, chunks[0]);
    draw_main(frame, model, chunks[1]);
    draw_footer(frame, model, chunks[2]);
}

fn draw_header(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let conn = match model.connection.state() {
        ConnectionState::Connected => {
            Span::styled("● connected", Style::default().fg(Color::Green))
        }
        ConnectionState::Reconnecting => Span::styled(
            format!(
                "◌ reconnecting {}/{}",
                model.connection.attempt(),
                model.connection.max_attempts()
            ),
            Style::default().fg(Color::Yellow),
        ),
        ConnectionState::Disconnected => {
            Span::styled("● disconnected", Style::default().fg(Color::Red))
        }
    };

    let gray = Style::default().fg(Color::Gray);
    let mut spans = vec![
        Span::styled("chorus", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        conn,
        Span::raw("  "),
        Span::styled(
            format!(
                "agents: {}/{}",
                model.roster.running_count(),
                model.roster.len()
            ),
            gray,
        ),
        Span::raw("  "),
        Span::styled(format!("pending: {}", model.pending.total()), gray),
    ];
    if let Some(stats) = model.stats.as_ref() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("commits: {}", stats.commit_count),
            gray,
        ));
        spans.push(Span::raw("  "));
        let usage = if stats.usage.time_left.is_empty() {
            format!("usage: {}%", stats.usage.percent)
        } else {
            format!(
                "usage: {}% ({} left)",
                stats.usage.percent, stats.usage.time_left
            )
        };
        spans.push(Span::styled(usage, usage_style(stats.usage.percent)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn usage_style(percent: i32) -> Style {
    match percent {
        p if p >= 90 => Style::default().fg(Color::Red),
        p if p >= 70 => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Gray),
    }
}

fn draw_main(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let p = panels(model);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(p.list_width), Constraint::Min(0)])
        .split(area);

    draw_agents(frame, model, columns[0]);

    if p.input_height == 0 {
        draw_chat(frame, model, columns[1]);
        return;
    }
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(p.input_height)])
        .split(columns[1]);
    draw_chat(frame, model, rows[0]);
    draw_input(frame, model, rows[1]);
}

fn focused_block(title: String, focused: bool) -> Block<'static> {
    let block = Block::default().title(title).borders(Borders::ALL);
    if focused {
        block.border_style(Style::default().fg(Color::Cyan))
    } else {
        block
    }
}

fn draw_agents(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let focused = model.focus() == Focus::AgentList && model.modes.is_normal();
    let block = focused_block("Agents".to_owned(), focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if model.roster.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "No agents",
                Style::default().fg(Color::Gray),
            ))),
            inner,
        );
        return;
    }

    let mut lines = Vec::new();
    for agent in model.roster.agents() {
        let selected = model.selected.as_deref() == Some(agent.id.as_str());
        let flagged = model.pending.needs_attention(&agent.id);
        let prefix = if selected { "▶ " } else { "  " };
        let mut line = vec![
            Span::raw(prefix),
            Span::styled(state_icon(agent.state, model.frame), state_style(agent.state)),
            Span::raw(" "),
        ];

        let (role_label, role_style) = role_label(agent.role);
        line.push(Span::styled(format!("{role_label:<3}"), role_style));
        line.push(Span::raw(" "));
        line.push(Span::styled(
            agent.id.clone(),
            role_style.add_modifier(Modifier::BOLD),
        ));

        if flagged {
            if let Some(attention) = model.pending.attention_for(&agent.id) {
                line.push(Span::raw(" "));
                line.push(attention_marker(attention));
            }
        }

        line.push(Span::raw(" "));
        line.push(Span::styled(
            agent_meta(agent, model.now_ms),
            Style::default().fg(Color::Gray),
        ));
        if !agent.label().is_empty() {
            line.push(Span::raw(" "));
            line.push(Span::raw(agent.label().to_owned()));
        }

        let style = match (selected, flagged) {
            (true, _) => Style::default().bg(Color::DarkGray),
            (false, true) => Style::default().add_modifier(Modifier::BOLD),
            (false, false) => Style::default(),
        };
        lines.push(Line::from(line).style(style));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn agent_meta(agent: &AgentStatus, now_ms: u64) -> String {
    let backend = agent.backend.as_deref().unwrap_or("-");
    format!(
        "{backend} {} {}",
        format_age(agent.started_at_ms, now_ms),
        agent.project
    )
}

fn role_label(role: AgentRole) -> (&'static str, Style) {
    match role {
        AgentRole::Manager => ("mgr", Style::default().fg(Color::Magenta)),
        AgentRole::Planner => ("pln", Style::default().fg(Color::Cyan)),
        AgentRole::Coding => ("cod", Style::default()),
    }
}

fn attention_marker(attention: Attention<'_>) -> Span<'static> {
    let (mark, color) = match attention {
        Attention::Question(_) => ("Q", Color::Yellow),
        Attention::Permission(_) => ("P", Color::Red),
        Attention::Action(_) => ("A", Color::Magenta),
    };
    Span::styled(mark, Style::default().fg(color).add_modifier(Modifier::BOLD))
}

fn state_icon(state: AgentState, frame: u64) -> &'static str {
    match state {
        AgentState::Starting => "◌",
        AgentState::Running => spinner_frame(frame),
        AgentState::Idle => "○",
        AgentState::Done => "✓",
        AgentState::Error => "×",
    }
}

fn spinner_frame(frame: u64) -> &'static str {
    const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    SPINNER[(frame % SPINNER.len() as u64) as usize]
}

fn state_style(state: AgentState) -> Style {
    match state {
        AgentState::Starting => Style::default().fg(Color::Yellow),
        AgentState::Running => Style::default().fg(Color::Cyan),
        AgentState::Idle => Style::default().fg(Color::Gray),
        AgentState::Done => Style::default().fg(Color::Green),
        AgentState::Error => Style::default().fg(Color::Red),
    }
}

fn role_badge(role: ChatRole) -> (&'static str, Style) {
    match role {
        ChatRole::User => ("[U]", Style::default().fg(Color::Yellow)),
        ChatRole::Assistant => ("[A]", Style::default().fg(Color::Cyan)),
        ChatRole::Tool => ("[T]", Style::default().fg(Color::Magenta)),
        ChatRole::System => ("[S]", Style::default().fg(Color::Gray)),
    }
}

fn draw_chat(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let title = match model.selected_agent() {
        Some(agent) => format!("Chat {}", agent.id),
        None => "Chat".to_owned(),
    };
    let focused = model.focus() == Focus::ChatView && model.modes.is_normal();
    let block = focused_block(title, focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let placeholder = match (model.selected_agent(), model.selected_chat()) {
        (None, _) => Some("Select an agent to view chat"),
        (Some(_), None) => Some("Loading history…"),
        (Some(_), Some(buf)) if buf.lines().is_empty() => Some("No messages yet"),
        _ => None,
    };
    if let Some(text) = placeholder {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                text,
                Style::default().fg(Color::Gray),
            ))),
            inner,
        );
    } else if let Some(buf) = model.selected_chat() {
        let spacer = " ".repeat(BADGE_WIDTH);
        let mut lines = Vec::new();
        for line in buf.visible(usize::from(inner.height)) {
            let mut spans = Vec::new();
            if line.lead {
                let (badge, style) = role_badge(line.role);
                spans.push(Span::styled(badge, style.add_modifier(Modifier::BOLD)));
                spans.push(Span::raw(" "));
            } else {
                spans.push(Span::raw(spacer.clone()));
            }
            let text_style = if line.is_error {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            spans.push(Span::styled(line.text.clone(), text_style));
            lines.push(Line::from(spans));
        }
        frame.render_widget(Paragraph::new(lines), inner);
    }

    match model.mode() {
        Mode::AbortConfirm { agent_id } => draw_abort_overlay(frame, model, inner, agent_id),
        Mode::PlanProjectSelect(picker) => draw_picker_overlay(frame, inner, picker),
        Mode::Normal | Mode::UserQuestion => draw_attention_overlay(frame, model, inner),
        Mode::Input | Mode::PlanPrompt { .. } => {}
    }
}

fn draw_input(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let (title, placeholder) = match model.mode() {
        Mode::PlanPrompt { project } => (
            format!("Plan for {project}"),
            "Describe what you want planned…",
        ),
        _ => ("Message".to_owned(), "Type a message…"),
    };
    let block = focused_block(title, model.focus() == Focus::InputLine);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if model.editor.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                placeholder,
                Style::default().fg(Color::DarkGray),
            ))),
            inner,
        );
        return;
    }

    let mut content = model.editor.text().to_owned();
    content.push('█');
    frame.render_widget(Paragraph::new(content).wrap(Wrap { trim: false }), inner);
}

fn draw_footer(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    if let Some(error) = model.error.as_ref() {
        let line = Line::from(vec![
            Span::styled("Error: ", Style::default().fg(Color::Red)),
            Span::raw(error.text.clone()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let mut spans = Vec::new();
    if let Some(status) = model.status.as_ref() {
        spans.push(Span::styled(
            status.clone(),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw("  "));
    }
    for (idx, (key, desc)) in help_items(model).into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(key, Style::default().add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(": "));
        spans.push(Span::styled(desc, Style::default().fg(Color::Gray)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// A rect of at most `width` x `height` centered in `area`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// A rect of at most `height` rows along the bottom of `area`.
fn bottom(area: Rect, height: u16) -> Rect {
    let height = height.min(area.height);
    Rect {
        x: area.x,
        y: area.y + area.height - height,
        width: area.width,
        height,
    }
}

fn key_hint(pairs: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (idx, (key, desc)) in pairs.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw("   "));
        }
        spans.push(Span::styled(*key, Style::default().add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(format!(" {desc}")));
    }
    Line::from(spans)
}

fn draw_abort_overlay(frame: &mut Frame<'_>, model: &Model, area: Rect, agent_id: &str) {
    let overlay = centered(area, 60, 5);
    frame.render_widget(Clear, overlay);

    let title = match model.roster.get(agent_id).map(|a| a.role) {
        Some(AgentRole::Planner) => format!("Stop planner {agent_id}"),
        Some(AgentRole::Manager) => "Stop manager".to_owned(),
        _ => format!("Abort agent {agent_id}"),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);

    let hint = key_hint(&[("y", "abort"), ("f", "force"), ("n", "cancel")]);
    frame.render_widget(Paragraph::new(hint), inner);
}

fn draw_picker_overlay(frame: &mut Frame<'_>, area: Rect, picker: &PlanPicker) {
    let overlay = centered(area, 60, 14);
    frame.render_widget(Clear, overlay);

    let block = Block::default()
        .title("Start planner")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);

    let mut lines = vec![Line::from(vec![
        Span::styled("filter: ", Style::default().fg(Color::Gray)),
        Span::raw(picker.filter.clone()),
        Span::raw("█"),
    ])];
    if picker.filtered.is_empty() {
        lines.push(Line::from(Span::styled(
            "no matching projects",
            Style::default().fg(Color::Gray),
        )));
    }
    // Keep the highlighted row on screen.
    let rows = usize::from(inner.height.saturating_sub(2)).max(1);
    let skip = picker.index.saturating_sub(rows - 1);
    for (idx, name) in picker.filtered.iter().enumerate().skip(skip).take(rows) {
        let selected = idx == picker.index;
        let prefix = if selected { "▶ " } else { "  " };
        let style = if selected {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::raw(prefix),
            Span::styled(name.clone(), style),
        ]));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_attention_overlay(frame: &mut Frame<'_>, model: &Model, area: Rect) {
    let Some(attention) = model.attention() else {
        return;
    };
    match attention {
        Attention::Question(q) => {
            let height = q
                .questions
                .iter()
                .map(|item| item.options.len() as u16)
                .max()
                .unwrap_or(0)
                .saturating_add(5);
            let overlay = bottom(area, height);
            frame.render_widget(Clear, overlay);
            draw_question(frame, model, overlay, q);
        }
        Attention::Permission(p) => {
            let overlay = bottom(area, 5);
            frame.render_widget(Clear, overlay);
            draw_permission(frame, overlay, p);
        }
        Attention::Action(a) => {
            let overlay = bottom(area, 5);
            frame.render_widget(Clear, overlay);
            draw_action(frame, overlay, a);
        }
    }
}

fn draw_permission(frame: &mut Frame<'_>, area: Rect, req: &PermissionRequest) {
    let block = Block::default()
        .title(format!("Permission: {}", req.tool_name))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(Span::raw(permission_summary(req))),
        key_hint(&[("y", "allow"), ("n", "deny")]),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn permission_summary(req: &PermissionRequest) -> String {
    for field in ["command", "file_path", "path", "url"] {
        if let Some(value) = req.tool_input.get(field).and_then(|v| v.as_str()) {
            return format!("{}: {value}", req.tool_name);
        }
    }
    match serde_json::to_string(&req.tool_input) {
        Ok(compact) => format!("{}: {compact}", req.tool_name),
        Err(_) => req.tool_name.clone(),
    }
}

fn draw_action(frame: &mut Frame<'_>, area: Rect, action: &StagedAction) {
    let block = Block::default()
        .title(format!("Staged: {}", action.action_type))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(Span::raw(action.summary.clone())),
        key_hint(&[("y", "approve"), ("n", "reject")]),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn draw_question(frame: &mut Frame<'_>, model: &Model, area: Rect, req: &UserQuestion) {
    let block = Block::default()
        .title("Question")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if req.questions.is_empty() {
        let lines = vec![
            Line::from(Span::styled(
                "No questions provided",
                Style::default().fg(Color::Gray),
            )),
            key_hint(&[("y", "acknowledge")]),
        ];
        frame.render_widget(Paragraph::new(lines), inner);
        return;
    }

    let draft = model
        .question_draft
        .as_ref()
        .filter(|d| d.request_id == req.id);
    let (q_idx, opt_idx) = draft.map_or((0, 0), |d| (d.question_index, d.option_index));
    let q_idx = q_idx.min(req.questions.len() - 1);
    let item = &req.questions[q_idx];
    let other_index = item.options.len();
    let opt_idx = opt_idx.min(other_index);
    let answering = draft.is_some();

    let mut lines = vec![Line::from(vec![Span::styled(
        format!("{} ({}/{})", item.question, q_idx + 1, req.questions.len()),
        Style::default().add_modifier(Modifier::BOLD),
    )])];

    let highlight = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    for (idx, opt) in item.options.iter().enumerate() {
        let selected = answering && idx == opt_idx;
        lines.push(Line::from(vec![
            Span::raw(if selected { "▶ " } else { "  " }),
            Span::styled(
                opt.label.clone(),
                if selected { highlight } else { Style::default() },
            ),
            Span::raw(" "),
            Span::styled(opt.description.clone(), Style::default().fg(Color::Gray)),
        ]));
    }

    let other_selected = answering && opt_idx == other_index;
    let other_text = match draft.and_then(|d| d.other.as_deref()) {
        Some(typed) => format!("Other: {typed}█"),
        None => "Other…".to_owned(),
    };
    lines.push(Line::from(vec![
        Span::raw(if other_selected { "▶ " } else { "  " }),
        Span::styled(
            other_text,
            if other_selected { highlight } else { Style::default() },
        ),
    ]));

    let hint = if answering {
        key_hint(&[("j/k", "choose"), ("enter", "answer"), ("esc", "leave")])
    } else {
        key_hint(&[("y", "answer")])
    };
    lines.push(hint);

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    use chorus_protocol::{AgentInfo, ChatMessage, QuestionItem, QuestionOption};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use crate::tui::client::DaemonEvent;
    use crate::tui::core::{reduce, Action, Msg, Settings};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buf = terminal.backend().buffer();
        let area = buf.area;
        let mut out = String::new();
        for y in 0..area.height {
            for x in 0..area.width {
                out.push_str(buf.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    fn render(model: &Model, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, model)).unwrap();
        buffer_text(&terminal)
    }

    fn agent(id: &str, role: AgentRole, state: AgentState) -> AgentInfo {
        AgentInfo {
            id: id.to_owned(),
            project: "demo".to_owned(),
            role,
            state,
            task: Some(format!("task {id}")),
            description: None,
            started_at: None,
            backend: Some("codex".to_owned()),
        }
    }

    fn with_roster(width: u16, height: u16, agents: Vec<AgentInfo>) -> Model {
        let mut model = Model::new(Vec::new(), Settings::default());
        for msg in [
            Msg::Resize { width, height },
            Msg::Init,
            Msg::StreamConnected { epoch: 1 },
            Msg::RosterLoaded {
                resync: true,
                result: Ok(agents),
            },
        ] {
            model = reduce(model, msg).0;
        }
        model
    }

    fn apply(model: Model, msg: Msg) -> Model {
        reduce(model, msg).0
    }

    fn event(model: Model, event: DaemonEvent) -> Model {
        apply(model, Msg::StreamEvent { epoch: 1, event })
    }

    #[test]
    fn renders_empty_scaffold() {
        let model = with_roster(80, 24, Vec::new());
        let text = render(&model, 80, 24);
        assert!(text.contains("chorus"));
        assert!(text.contains("connected"));
        assert!(text.contains("Agents"));
        assert!(text.contains("No agents"));
        assert!(text.contains("Chat"));
        assert!(text.contains("quit"));
    }

    #[test]
    fn renders_roster_rows_with_roles_and_markers() {
        let model = with_roster(
            100,
            16,
            vec![
                agent("a-1", AgentRole::Coding, AgentState::Running),
                agent("m", AgentRole::Manager, AgentState::Idle),
                agent("p1", AgentRole::Planner, AgentState::Done),
            ],
        );
        let model = event(
            model,
            DaemonEvent::PermissionRequested(PermissionRequest {
                id: "perm".to_owned(),
                agent_id: "a-1".to_owned(),
                project: "demo".to_owned(),
                tool_name: "Bash".to_owned(),
                tool_input: serde_json::json!({"command": "cargo publish"}),
                requested_at_ms: 0,
            }),
        );

        let text = render(&model, 100, 16);
        assert!(text.contains("mgr"));
        assert!(text.contains("planner:p1"));
        assert!(text.contains("a-1 P"));
        assert!(text.contains("✓"));
        assert!(text.contains("agents: 1/3"));
        assert!(text.contains("pending: 1"));
    }

    #[test]
    fn rows_needing_attention_are_bold() {
        let model = with_roster(
            100,
            16,
            vec![
                agent("a-1", AgentRole::Coding, AgentState::Running),
                agent("a-2", AgentRole::Coding, AgentState::Running),
                agent("a-3", AgentRole::Coding, AgentState::Running),
            ],
        );
        let model = event(
            model,
            DaemonEvent::PermissionRequested(PermissionRequest {
                id: "perm".to_owned(),
                agent_id: "a-3".to_owned(),
                project: "demo".to_owned(),
                tool_name: "Bash".to_owned(),
                tool_input: serde_json::json!({"command": "rm -rf target"}),
                requested_at_ms: 0,
            }),
        );

        let mut terminal = Terminal::new(TestBackend::new(100, 16)).unwrap();
        terminal.draw(|f| draw(f, &model)).unwrap();
        let text = buffer_text(&terminal);
        let buf = terminal.backend().buffer();
        let row = |id: &str| text.lines().position(|l| l.contains(id)).unwrap() as u16;
        let (x, _) = (0..buf.area.width)
            .flat_map(|x| (0..buf.area.height).map(move |y| (x, y)))
            .find(|&(x, y)| buf.get(x, y).symbol() == "▶")
            .unwrap();

        assert!(buf.get(x, row("a-3")).modifier.contains(Modifier::BOLD));
        assert!(!buf.get(x, row("a-2")).modifier.contains(Modifier::BOLD));
        assert!(text.contains("a-3 P"));
        assert!(!text.contains("a-2 P"));
    }

    #[test]
    fn renders_chat_with_role_badges() {
        let model = with_roster(
            80,
            14,
            vec![agent("a-1", AgentRole::Coding, AgentState::Running)],
        );
        let model = apply(
            model,
            Msg::ChatHistoryLoaded {
                agent_id: "a-1".to_owned(),
                result: Ok(vec![ChatMessage {
                    role: ChatRole::Assistant,
                    content: "hello world".to_owned(),
                    tool_name: None,
                    tool_input: None,
                    tool_result: None,
                    is_error: false,
                    ts_ms: 1,
                }]),
            },
        );

        let text = render(&model, 80, 14);
        assert!(text.contains("Chat a-1"));
        assert!(text.contains("[A] hello world"));
    }

    #[test]
    fn input_panel_grows_with_the_buffer() {
        let model = with_roster(
            80,
            20,
            vec![agent("a-1", AgentRole::Coding, AgentState::Running)],
        );
        let model = apply(model, Msg::Action(Action::Enter));
        let model = apply(model, Msg::Paste("hello".to_owned()));
        let row_of = |text: &str| text.lines().position(|l| l.contains("Message")).unwrap();
        let y1 = row_of(&render(&model, 80, 20));

        let model = apply(model, Msg::Paste("\nworld".to_owned()));
        let y2 = row_of(&render(&model, 80, 20));
        assert!(y2 < y1);
    }

    #[test]
    fn question_overlay_shows_options_and_other() {
        let model = with_roster(
            100,
            20,
            vec![agent("a-1", AgentRole::Coding, AgentState::Running)],
        );
        let model = event(
            model,
            DaemonEvent::QuestionRequested(UserQuestion {
                id: "q1".to_owned(),
                agent_id: "a-1".to_owned(),
                project: "demo".to_owned(),
                questions: vec![QuestionItem {
                    question: "Which database?".to_owned(),
                    header: "DB".to_owned(),
                    multi_select: false,
                    options: vec![QuestionOption {
                        label: "postgres".to_owned(),
                        description: "the usual".to_owned(),
                    }],
                }],
                requested_at_ms: 0,
            }),
        );
        let model = apply(model, Msg::Action(Action::Char('y')));

        let text = render(&model, 100, 20);
        assert!(text.contains("Which database? (1/1)"));
        assert!(text.contains("▶ postgres"));
        assert!(text.contains("Other…"));
    }

    #[test]
    fn abort_and_picker_overlays() {
        let model = with_roster(
            100,
            20,
            vec![agent("p1", AgentRole::Planner, AgentState::Running)],
        );
        let confirming = apply(model.clone(), Msg::Action(Action::Char('x')));
        assert!(render(&confirming, 100, 20).contains("Stop planner planner:p1"));

        let picking = apply(model, Msg::Action(Action::Char('p')));
        let text = render(&picking, 100, 20);
        assert!(text.contains("Start planner"));
        assert!(text.contains("no matching projects"));
    }

    #[test]
    fn footer_prefers_the_error() {
        let model = with_roster(80, 10, Vec::new());
        let model = apply(model, Msg::ProjectsLoaded(Err("daemon gone".to_owned())));
        let text = render(&model, 80, 10);
        assert!(text.contains("Error: project list: daemon gone"));
    }

    #[test]
    fn tiny_terminals_do_not_panic() {
        let model = with_roster(
            10,
            4,
            vec![agent("a-1", AgentRole::Coding, AgentState::Running)],
        );
        let model = apply(model, Msg::Action(Action::Char('x')));
        render(&model, 10, 4);
        render(&model, 1, 1);
    }
}
