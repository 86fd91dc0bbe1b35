use chorus_core::timestamp::start_ms_or;
use chorus_protocol::{AgentInfo, AgentRole, AgentState, AgentUpdatedEvent};

pub const MANAGER_ID: &str = "manager";
pub const PLANNER_PREFIX: &str = "planner:";

/// Where a call for a displayed agent has to go on the daemon side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRef {
    Agent(String),
    Manager,
    Planner(String),
}

pub fn to_display_id(role: AgentRole, backend_id: &str) -> String {
    match role {
        AgentRole::Manager => MANAGER_ID.to_owned(),
        AgentRole::Planner if backend_id.starts_with(PLANNER_PREFIX) => backend_id.to_owned(),
        AgentRole::Planner => format!("{PLANNER_PREFIX}{backend_id}"),
        AgentRole::Coding => backend_id.to_owned(),
    }
}

pub fn to_backend_id(display_id: &str) -> AgentRef {
    if display_id == MANAGER_ID {
        return AgentRef::Manager;
    }
    match display_id.strip_prefix(PLANNER_PREFIX) {
        Some(id) => AgentRef::Planner(id.to_owned()),
        None => AgentRef::Agent(display_id.to_owned()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    pub id: String,
    pub backend_id: String,
    pub role: AgentRole,
    pub project: String,
    pub state: AgentState,
    pub task: Option<String>,
    pub description: Option<String>,
    pub started_at_ms: u64,
    pub backend: Option<String>,
}

impl AgentStatus {
    /// `role` comes from the event kind when there is one, so a
    /// `manager.created` payload is keyed as the manager whatever it says.
    pub fn from_info(info: AgentInfo, role: AgentRole, now_ms: u64) -> Self {
        let started_at_ms = start_ms_or(info.started_at.as_deref(), now_ms);
        Self {
            id: to_display_id(role, &info.id),
            backend_id: info.id,
            role,
            project: info.project,
            state: info.state,
            task: info.task.filter(|s| !s.trim().is_empty()),
            description: info.description.filter(|s| !s.trim().is_empty()),
            started_at_ms,
            backend: info.backend,
        }
    }

    pub fn label(&self) -> &str {
        self.task
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or("")
    }
}

/// Ordered agent records, manager first.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    agents: Vec<AgentStatus>,
    running: usize,
    pending_select: Option<String>,
}

impl Roster {
    pub fn agents(&self) -> &[AgentStatus] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AgentStatus> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn first_id(&self) -> Option<&str> {
        self.agents.first().map(|a| a.id.as_str())
    }

    fn recount(&mut self) {
        self.running = self.agents.iter().filter(|a| a.state.is_active()).count();
    }

    /// Replaces every record with a fresh snapshot. Roles come from the
    /// records themselves.
    pub fn replace(&mut self, infos: Vec<AgentInfo>, now_ms: u64) {
        let mut agents: Vec<AgentStatus> = Vec::with_capacity(infos.len());
        for info in infos {
            let role = info.role;
            let status = AgentStatus::from_info(info, role, now_ms);
            match agents.iter().position(|a| a.id == status.id) {
                Some(idx) => agents[idx] = status,
                None => agents.push(status),
            }
        }
        if let Some(idx) = agents.iter().position(|a| a.role == AgentRole::Manager) {
            let manager = agents.remove(idx);
            agents.insert(0, manager);
        }
        self.agents = agents;
        self.recount();
    }

    /// Inserts a record, or replaces an existing one with the same id in
    /// place. Returns true when the id was new.
    pub fn upsert(&mut self, agent: AgentStatus) -> bool {
        let inserted = match self.index_of(&agent.id) {
            Some(idx) => {
                self.agents[idx] = agent;
                false
            }
            None => {
                if agent.role == AgentRole::Manager {
                    self.agents.insert(0, agent);
                } else {
                    self.agents.push(agent);
                }
                true
            }
        };
        self.recount();
        inserted
    }

    /// Applies a partial update. Unknown ids are ignored; returns whether a
    /// record changed.
    pub fn apply_update(&mut self, role: AgentRole, update: &AgentUpdatedEvent) -> bool {
        let id = to_display_id(role, &update.agent_id);
        let Some(agent) = self.agents.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        if let Some(state) = update.state {
            agent.state = state;
        }
        if let Some(task) = &update.task {
            agent.task = (!task.trim().is_empty()).then(|| task.clone());
        }
        if let Some(description) = &update.description {
            agent.description = (!description.trim().is_empty()).then(|| description.clone());
        }
        self.recount();
        true
    }

    /// Removes a record and returns the index it occupied.
    pub fn remove(&mut self, id: &str) -> Option<usize> {
        let idx = self.index_of(id)?;
        self.agents.remove(idx);
        self.recount();
        Some(idx)
    }

    /// The agent that takes over a vacated slot, clamped to the end.
    pub fn successor(&self, index: usize) -> Option<&str> {
        let last = self.agents.len().checked_sub(1)?;
        self.agents.get(index.min(last)).map(|a| a.id.as_str())
    }

    /// Maps an id seen in a pending item or chat event to the display id
    /// used in the roster. Unknown ids pass through unchanged.
    pub fn resolve_display_id(&self, backend_id: &str) -> String {
        if self.contains(backend_id) {
            return backend_id.to_owned();
        }
        if let Some(agent) = self.agents.iter().find(|a| a.backend_id == backend_id) {
            return agent.id.clone();
        }
        backend_id.to_owned()
    }

    pub fn set_pending_select(&mut self, display_id: String) {
        self.pending_select = Some(display_id);
    }

    pub fn pending_select(&self) -> Option<&str> {
        self.pending_select.as_deref()
    }

    /// Consumes the auto-select intent once its agent shows up.
    pub fn take_pending_select(&mut self) -> Option<String> {
        let id = self.pending_select.as_deref()?;
        if !self.contains(id) {
            return None;
        }
        self.pending_select.take()
    }

    pub fn abandon_pending_select(&mut self) {
        self.pending_select = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, role: AgentRole, state: AgentState) -> AgentInfo {
        AgentInfo {
            id: id.to_owned(),
            project: "demo".to_owned(),
            role,
            state,
            task: None,
            description: None,
            started_at: None,
            backend: None,
        }
    }

    fn ids(roster: &Roster) -> Vec<&str> {
        roster.agents().iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn display_ids_round_trip() {
        assert_eq!(to_display_id(AgentRole::Planner, "p1"), "planner:p1");
        assert_eq!(to_display_id(AgentRole::Planner, "planner:p1"), "planner:p1");
        assert_eq!(to_display_id(AgentRole::Manager, "mgr-42"), MANAGER_ID);
        assert_eq!(to_display_id(AgentRole::Coding, "a-1"), "a-1");

        assert_eq!(
            to_backend_id(&to_display_id(AgentRole::Planner, "p1")),
            AgentRef::Planner("p1".to_owned())
        );
        assert_eq!(to_backend_id("manager"), AgentRef::Manager);
        assert_eq!(to_backend_id("a-1"), AgentRef::Agent("a-1".to_owned()));
    }

    #[test]
    fn replace_puts_manager_first_and_keeps_order() {
        let mut roster = Roster::default();
        roster.replace(
            vec![
                info("b", AgentRole::Coding, AgentState::Running),
                info("p1", AgentRole::Planner, AgentState::Idle),
                info("m", AgentRole::Manager, AgentState::Running),
                info("a", AgentRole::Coding, AgentState::Done),
            ],
            0,
        );
        assert_eq!(ids(&roster), vec!["manager", "b", "planner:p1", "a"]);
        assert_eq!(roster.running_count(), 2);
    }

    #[test]
    fn manager_create_prepends_and_others_append() {
        let mut roster = Roster::default();
        roster.upsert(AgentStatus::from_info(
            info("a", AgentRole::Coding, AgentState::Starting),
            AgentRole::Coding,
            0,
        ));
        roster.upsert(AgentStatus::from_info(
            info("mgr", AgentRole::Coding, AgentState::Running),
            AgentRole::Manager,
            0,
        ));
        roster.upsert(AgentStatus::from_info(
            info("b", AgentRole::Coding, AgentState::Idle),
            AgentRole::Coding,
            0,
        ));
        assert_eq!(ids(&roster), vec!["manager", "a", "b"]);
        assert_eq!(roster.running_count(), 2);
    }

    #[test]
    fn create_with_existing_id_replaces_in_place() {
        let mut roster = Roster::default();
        roster.replace(
            vec![
                info("a", AgentRole::Coding, AgentState::Running),
                info("b", AgentRole::Coding, AgentState::Running),
            ],
            0,
        );
        let inserted = roster.upsert(AgentStatus::from_info(
            info("a", AgentRole::Coding, AgentState::Done),
            AgentRole::Coding,
            0,
        ));
        assert!(!inserted);
        assert_eq!(ids(&roster), vec!["a", "b"]);
        assert_eq!(roster.get("a").unwrap().state, AgentState::Done);
        assert_eq!(roster.running_count(), 1);
    }

    #[test]
    fn updates_to_unknown_ids_are_ignored() {
        let mut roster = Roster::default();
        roster.replace(vec![info("a", AgentRole::Coding, AgentState::Idle)], 0);
        let changed = roster.apply_update(
            AgentRole::Coding,
            &AgentUpdatedEvent {
                agent_id: "ghost".to_owned(),
                state: Some(AgentState::Running),
                ..AgentUpdatedEvent::default()
            },
        );
        assert!(!changed);
        assert_eq!(ids(&roster), vec!["a"]);
        assert_eq!(roster.running_count(), 0);
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut roster = Roster::default();
        let mut a = info("p1", AgentRole::Planner, AgentState::Idle);
        a.task = Some("design".to_owned());
        roster.replace(vec![a], 0);

        assert!(roster.apply_update(
            AgentRole::Planner,
            &AgentUpdatedEvent {
                agent_id: "p1".to_owned(),
                state: Some(AgentState::Running),
                ..AgentUpdatedEvent::default()
            },
        ));
        let got = roster.get("planner:p1").unwrap();
        assert_eq!(got.state, AgentState::Running);
        assert_eq!(got.task.as_deref(), Some("design"));
        assert_eq!(roster.running_count(), 1);
    }

    #[test]
    fn start_time_falls_back_to_processing_time() {
        let mut good = info("a", AgentRole::Coding, AgentState::Running);
        good.started_at = Some("1970-01-01T00:00:10Z".to_owned());
        let mut bad = info("b", AgentRole::Coding, AgentState::Running);
        bad.started_at = Some("not a time".to_owned());
        let missing = info("c", AgentRole::Coding, AgentState::Running);

        let mut roster = Roster::default();
        roster.replace(vec![good, bad, missing], 99_000);
        assert_eq!(roster.get("a").unwrap().started_at_ms, 10_000);
        assert_eq!(roster.get("b").unwrap().started_at_ms, 99_000);
        assert_eq!(roster.get("c").unwrap().started_at_ms, 99_000);
    }

    #[test]
    fn remove_reports_slot_and_successor_clamps() {
        let mut roster = Roster::default();
        roster.replace(
            vec![
                info("a", AgentRole::Coding, AgentState::Running),
                info("b", AgentRole::Coding, AgentState::Running),
                info("c", AgentRole::Coding, AgentState::Running),
            ],
            0,
        );
        assert_eq!(roster.remove("b"), Some(1));
        assert_eq!(roster.successor(1), Some("c"));
        assert_eq!(roster.remove("c"), Some(1));
        assert_eq!(roster.successor(1), Some("a"));
        assert_eq!(roster.remove("zzz"), None);
        assert_eq!(roster.remove("a"), Some(0));
        assert_eq!(roster.successor(0), None);
        assert_eq!(roster.running_count(), 0);
    }

    #[test]
    fn resolves_backend_ids_to_display_ids() {
        let mut roster = Roster::default();
        roster.replace(
            vec![
                info("p1", AgentRole::Planner, AgentState::Running),
                info("mgr-1", AgentRole::Manager, AgentState::Running),
                info("a", AgentRole::Coding, AgentState::Running),
            ],
            0,
        );
        assert_eq!(roster.resolve_display_id("p1"), "planner:p1");
        assert_eq!(roster.resolve_display_id("mgr-1"), "manager");
        assert_eq!(roster.resolve_display_id("a"), "a");
        assert_eq!(roster.resolve_display_id("planner:p1"), "planner:p1");
        assert_eq!(roster.resolve_display_id("unknown"), "unknown");
    }

    #[test]
    fn pending_select_waits_for_its_agent() {
        let mut roster = Roster::default();
        roster.set_pending_select("planner:p9".to_owned());
        assert_eq!(roster.take_pending_select(), None);
        assert_eq!(roster.pending_select(), Some("planner:p9"));

        roster.upsert(AgentStatus::from_info(
            info("p9", AgentRole::Planner, AgentState::Starting),
            AgentRole::Planner,
            0,
        ));
        assert_eq!(roster.take_pending_select().as_deref(), Some("planner:p9"));
        assert_eq!(roster.pending_select(), None);
    }
}
