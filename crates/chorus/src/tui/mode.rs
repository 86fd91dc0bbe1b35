use std::fmt;

use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Focus {
    AgentList,
    ChatView,
    InputLine,
}

/// Project picker shown before a planner prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanPicker {
    pub projects: Vec<String>,
    pub filter: String,
    pub filtered: Vec<String>,
    pub index: usize,
}

impl PlanPicker {
    pub fn new(projects: Vec<String>) -> Self {
        let filtered = projects.clone();
        Self {
            projects,
            filter: String::new(),
            filtered,
            index: 0,
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.filtered.get(self.index).map(String::as_str)
    }

    fn refilter(&mut self) {
        self.filtered = filter_projects(&self.projects, &self.filter);
    }

    fn clamp(&mut self) {
        self.index = self.index.min(self.filtered.len().saturating_sub(1));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Input,
    AbortConfirm {
        agent_id: String,
    },
    UserQuestion,
    PlanProjectSelect(PlanPicker),
    PlanPrompt {
        project: String,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeKind {
    Normal,
    Input,
    AbortConfirm,
    UserQuestion,
    PlanProjectSelect,
    PlanPrompt,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeKind::Normal => "normal",
            ModeKind::Input => "input",
            ModeKind::AbortConfirm => "abort-confirm",
            ModeKind::UserQuestion => "user-question",
            ModeKind::PlanProjectSelect => "plan-project-select",
            ModeKind::PlanPrompt => "plan-prompt",
        };
        f.write_str(s)
    }
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Normal => ModeKind::Normal,
            Mode::Input => ModeKind::Input,
            Mode::AbortConfirm { .. } => ModeKind::AbortConfirm,
            Mode::UserQuestion => ModeKind::UserQuestion,
            Mode::PlanProjectSelect(_) => ModeKind::PlanProjectSelect,
            Mode::PlanPrompt { .. } => ModeKind::PlanPrompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("cannot {op} while in {from} mode")]
    InvalidTransition { from: ModeKind, op: &'static str },
    #[error("already in {0} mode")]
    AlreadyInMode(ModeKind),
    #[error("abort confirmation needs an agent id")]
    MissingAgentId,
    #[error("no project selected")]
    NoSelection,
}

/// The interaction mode plus the focused panel.
///
/// Focus only moves freely in `Normal`. Every other mode pins it on entry and
/// sets it again on exit, so the pair is always consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeState {
    mode: Mode,
    focus: Focus,
}

impl Default for ModeState {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            focus: Focus::AgentList,
        }
    }
}

impl ModeState {
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn is_normal(&self) -> bool {
        self.mode == Mode::Normal
    }

    pub fn plan_picker(&self) -> Option<&PlanPicker> {
        match &self.mode {
            Mode::PlanProjectSelect(picker) => Some(picker),
            _ => None,
        }
    }

    pub fn abort_target(&self) -> Option<&str> {
        match &self.mode {
            Mode::AbortConfirm { agent_id } => Some(agent_id),
            _ => None,
        }
    }

    fn invalid(&self, op: &'static str) -> ModeError {
        ModeError::InvalidTransition {
            from: self.kind(),
            op,
        }
    }

    fn require_normal(&self, op: &'static str) -> Result<(), ModeError> {
        if self.is_normal() {
            Ok(())
        } else {
            Err(self.invalid(op))
        }
    }

    /// Entry check shared by the modal states: re-entering is `AlreadyInMode`,
    /// coming from any other non-normal mode is `InvalidTransition`.
    fn require_enterable(&self, target: ModeKind, op: &'static str) -> Result<(), ModeError> {
        let current = self.kind();
        if current == target {
            return Err(ModeError::AlreadyInMode(target));
        }
        self.require_normal(op)
    }

    pub fn set_focus(&mut self, focus: Focus) -> Result<(), ModeError> {
        self.require_normal("set focus")?;
        if focus == Focus::InputLine {
            return Err(self.invalid("focus the input line"));
        }
        self.focus = focus;
        Ok(())
    }

    pub fn cycle_focus(&mut self) -> Result<Focus, ModeError> {
        self.require_normal("cycle focus")?;
        self.focus = match self.focus {
            Focus::AgentList => Focus::ChatView,
            Focus::ChatView | Focus::InputLine => Focus::AgentList,
        };
        Ok(self.focus)
    }

    pub fn enter_input(&mut self) -> Result<(), ModeError> {
        self.require_enterable(ModeKind::Input, "enter input")?;
        self.mode = Mode::Input;
        self.focus = Focus::InputLine;
        Ok(())
    }

    pub fn exit_input(&mut self) -> Result<(), ModeError> {
        if self.mode != Mode::Input {
            return Err(self.invalid("exit input"));
        }
        self.mode = Mode::Normal;
        self.focus = Focus::ChatView;
        Ok(())
    }

    pub fn enter_abort_confirm(&mut self, agent_id: &str) -> Result<(), ModeError> {
        if agent_id.trim().is_empty() {
            return Err(ModeError::MissingAgentId);
        }
        self.require_enterable(ModeKind::AbortConfirm, "confirm abort")?;
        self.mode = Mode::AbortConfirm {
            agent_id: agent_id.to_owned(),
        };
        Ok(())
    }

    pub fn confirm_abort(&mut self) -> Result<String, ModeError> {
        match std::mem::take(&mut self.mode) {
            Mode::AbortConfirm { agent_id } => Ok(agent_id),
            other => {
                self.mode = other;
                Err(self.invalid("confirm abort"))
            }
        }
    }

    pub fn cancel_abort(&mut self) -> Result<(), ModeError> {
        self.confirm_abort()
            .map(|_| ())
            .map_err(|_| self.invalid("cancel abort"))
    }

    pub fn enter_user_question(&mut self) -> Result<(), ModeError> {
        self.require_enterable(ModeKind::UserQuestion, "answer a question")?;
        self.mode = Mode::UserQuestion;
        self.focus = Focus::ChatView;
        Ok(())
    }

    pub fn exit_user_question(&mut self) -> Result<(), ModeError> {
        if self.mode != Mode::UserQuestion {
            return Err(self.invalid("leave the question"));
        }
        self.mode = Mode::Normal;
        self.focus = Focus::ChatView;
        Ok(())
    }

    pub fn enter_plan_project_select(&mut self, projects: Vec<String>) -> Result<(), ModeError> {
        self.require_enterable(ModeKind::PlanProjectSelect, "pick a project")?;
        self.mode = Mode::PlanProjectSelect(PlanPicker::new(projects));
        Ok(())
    }

    fn picker_mut(&mut self, op: &'static str) -> Result<&mut PlanPicker, ModeError> {
        let from = self.kind();
        match &mut self.mode {
            Mode::PlanProjectSelect(picker) => Ok(picker),
            _ => Err(ModeError::InvalidTransition { from, op }),
        }
    }

    pub fn plan_up(&mut self) -> Result<(), ModeError> {
        let picker = self.picker_mut("move the project selection")?;
        picker.index = picker.index.saturating_sub(1);
        Ok(())
    }

    pub fn plan_down(&mut self) -> Result<(), ModeError> {
        let picker = self.picker_mut("move the project selection")?;
        picker.index = picker.index.saturating_add(1);
        picker.clamp();
        Ok(())
    }

    pub fn set_plan_filter(&mut self, filter: &str) -> Result<(), ModeError> {
        let picker = self.picker_mut("filter projects")?;
        picker.filter = filter.to_owned();
        picker.refilter();
        picker.index = 0;
        Ok(())
    }

    pub fn replace_plan_projects(&mut self, projects: Vec<String>) -> Result<(), ModeError> {
        let picker = self.picker_mut("replace projects")?;
        picker.projects = projects;
        picker.refilter();
        picker.clamp();
        Ok(())
    }

    /// Moves on to the prompt for the highlighted project.
    pub fn select_plan_project(&mut self) -> Result<String, ModeError> {
        let picker = self.picker_mut("select a project")?;
        let project = picker.selected().ok_or(ModeError::NoSelection)?.to_owned();
        self.mode = Mode::PlanPrompt {
            project: project.clone(),
        };
        self.focus = Focus::InputLine;
        Ok(project)
    }

    pub fn cancel_plan_project_select(&mut self) -> Result<(), ModeError> {
        self.picker_mut("cancel project selection")?;
        self.mode = Mode::Normal;
        Ok(())
    }

    pub fn exit_plan_prompt(&mut self) -> Result<String, ModeError> {
        match std::mem::take(&mut self.mode) {
            Mode::PlanPrompt { project } => {
                self.focus = Focus::ChatView;
                Ok(project)
            }
            other => {
                self.mode = other;
                Err(self.invalid("submit the plan prompt"))
            }
        }
    }

    pub fn cancel_plan_prompt(&mut self) -> Result<(), ModeError> {
        self.exit_plan_prompt()
            .map(|_| ())
            .map_err(|_| self.invalid("cancel the plan prompt"))
    }

    pub fn validate(&self) -> Result<(), ModeError> {
        match (&self.mode, self.focus) {
            (Mode::AbortConfirm { agent_id }, _) if agent_id.trim().is_empty() => {
                Err(ModeError::MissingAgentId)
            }
            (Mode::Input | Mode::PlanPrompt { .. }, focus) if focus != Focus::InputLine => {
                Err(self.invalid("leave the input line"))
            }
            (Mode::Normal, Focus::InputLine) => Err(self.invalid("focus the input line")),
            _ => Ok(()),
        }
    }
}

/// Case-insensitive subsequence match. An empty pattern matches everything.
pub fn fuzzy_match(text: &str, pattern: &str) -> bool {
    let mut haystack = text.chars().flat_map(char::to_lowercase);
    pattern
        .chars()
        .flat_map(char::to_lowercase)
        .all(|want| haystack.any(|c| c == want))
}

pub fn filter_projects(projects: &[String], filter: &str) -> Vec<String> {
    projects
        .iter()
        .filter(|p| fuzzy_match(p, filter))
        .cloned()
        .collect()
}
