use std::collections::BTreeSet;

use chorus_protocol::{PermissionRequest, StagedAction, UserQuestion};

/// An item waiting on an operator decision, keyed by an opaque id and owned
/// by one agent.
pub trait PendingItem {
    fn id(&self) -> &str;
    fn agent_id(&self) -> &str;
    fn set_agent_id(&mut self, agent_id: String);
}

impl PendingItem for PermissionRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn set_agent_id(&mut self, agent_id: String) {
        self.agent_id = agent_id;
    }
}

impl PendingItem for UserQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn set_agent_id(&mut self, agent_id: String) {
        self.agent_id = agent_id;
    }
}

impl PendingItem for StagedAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn set_agent_id(&mut self, agent_id: String) {
        self.agent_id = agent_id;
    }
}

/// Pending items of one kind in arrival order.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    items: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: PendingItem> Registry<T> {
    /// Returns false when an item with the same id is already present.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.iter().any(|i| i.id() == item.id()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let idx = self.items.iter().position(|i| i.id() == id)?;
        Some(self.items.remove(idx))
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|i| i.id() == id)
    }

    /// The oldest item owned by `agent_id`.
    pub fn for_agent(&self, agent_id: &str) -> Option<&T> {
        self.items.iter().find(|i| i.agent_id() == agent_id)
    }

    #[cfg(test)]
    pub fn count_for(&self, agent_id: &str) -> usize {
        self.items.iter().filter(|i| i.agent_id() == agent_id).count()
    }

    /// Keeps items whose agent satisfies `keep`; returns how many were dropped.
    pub fn retain_agents(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|i| keep(i.agent_id()));
        before - self.items.len()
    }

    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            self.push(item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// The item the approve/reject keys act on for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attention<'a> {
    Question(&'a UserQuestion),
    Permission(&'a PermissionRequest),
    Action(&'a StagedAction),
}

#[derive(Debug, Clone, Default)]
pub struct Pending {
    permissions: Registry<PermissionRequest>,
    questions: Registry<UserQuestion>,
    actions: Registry<StagedAction>,
    attention: BTreeSet<String>,
}

impl Pending {
    pub fn permissions(&self) -> &Registry<PermissionRequest> {
        &self.permissions
    }

    pub fn questions(&self) -> &Registry<UserQuestion> {
        &self.questions
    }

    pub fn actions(&self) -> &Registry<StagedAction> {
        &self.actions
    }

    /// Agents with at least one pending item of any kind.
    #[cfg(test)]
    pub fn attention(&self) -> &BTreeSet<String> {
        &self.attention
    }

    pub fn needs_attention(&self, agent_id: &str) -> bool {
        self.attention.contains(agent_id)
    }

    pub fn total(&self) -> usize {
        self.permissions.len() + self.questions.len() + self.actions.len()
    }

    fn recompute(&mut self) {
        self.attention = self
            .permissions
            .iter()
            .map(PendingItem::agent_id)
            .chain(self.questions.iter().map(PendingItem::agent_id))
            .chain(self.actions.iter().map(PendingItem::agent_id))
            .map(str::to_owned)
            .collect();
    }

    /// Question beats permission beats staged action.
    pub fn attention_for(&self, agent_id: &str) -> Option<Attention<'_>> {
        if let Some(q) = self.questions.for_agent(agent_id) {
            return Some(Attention::Question(q));
        }
        if let Some(p) = self.permissions.for_agent(agent_id) {
            return Some(Attention::Permission(p));
        }
        self.actions.for_agent(agent_id).map(Attention::Action)
    }

    pub fn add_permission(&mut self, req: PermissionRequest) -> bool {
        let added = self.permissions.push(req);
        self.recompute();
        added
    }

    pub fn add_question(&mut self, req: UserQuestion) -> bool {
        let added = self.questions.push(req);
        self.recompute();
        added
    }

    pub fn add_action(&mut self, action: StagedAction) -> bool {
        let added = self.actions.push(action);
        self.recompute();
        added
    }

    pub fn resolve_permission(&mut self, id: &str) -> Option<PermissionRequest> {
        let removed = self.permissions.remove(id);
        self.recompute();
        removed
    }

    pub fn resolve_question(&mut self, id: &str) -> Option<UserQuestion> {
        let removed = self.questions.remove(id);
        self.recompute();
        removed
    }

    pub fn resolve_action(&mut self, id: &str) -> Option<StagedAction> {
        let removed = self.actions.remove(id);
        self.recompute();
        removed
    }

    pub fn replace_permissions(&mut self, items: Vec<PermissionRequest>) {
        self.permissions.replace_all(items);
        self.recompute();
    }

    pub fn replace_questions(&mut self, items: Vec<UserQuestion>) {
        self.questions.replace_all(items);
        self.recompute();
    }

    pub fn replace_actions(&mut self, items: Vec<StagedAction>) {
        self.actions.replace_all(items);
        self.recompute();
    }

    /// Drops items of every kind whose agent fails `keep`. Returns the
    /// number removed.
    pub fn prune(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let removed = self.permissions.retain_agents(&keep)
            + self.questions.retain_agents(&keep)
            + self.actions.retain_agents(&keep);
        self.recompute();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_protocol::{QuestionItem, QuestionOption};

    fn permission(id: &str, agent: &str) -> PermissionRequest {
        PermissionRequest {
            id: id.to_owned(),
            agent_id: agent.to_owned(),
            project: "demo".to_owned(),
            tool_name: "Bash".to_owned(),
            tool_input: serde_json::json!({"command": "ls"}),
            requested_at_ms: 0,
        }
    }

    fn question(id: &str, agent: &str) -> UserQuestion {
        UserQuestion {
            id: id.to_owned(),
            agent_id: agent.to_owned(),
            project: "demo".to_owned(),
            questions: vec![QuestionItem {
                question: "Which db?".to_owned(),
                header: "db".to_owned(),
                multi_select: false,
                options: vec![QuestionOption {
                    label: "sqlite".to_owned(),
                    description: String::new(),
                }],
            }],
            requested_at_ms: 0,
        }
    }

    fn action(id: &str, agent: &str) -> StagedAction {
        StagedAction {
            id: id.to_owned(),
            agent_id: agent.to_owned(),
            project: "demo".to_owned(),
            action_type: "git.push".to_owned(),
            summary: "push main".to_owned(),
            staged_at_ms: 0,
        }
    }

    #[test]
    fn push_dedupes_by_id() {
        let mut reg = Registry::default();
        assert!(reg.push(permission("p1", "a")));
        assert!(!reg.push(permission("p1", "b")));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("p1").unwrap().agent_id, "a");
    }

    #[test]
    fn for_agent_returns_first_match() {
        let mut reg = Registry::default();
        reg.push(permission("p1", "a"));
        reg.push(permission("p2", "b"));
        reg.push(permission("p3", "a"));
        assert_eq!(reg.for_agent("a").unwrap().id, "p1");
        assert_eq!(reg.count_for("a"), 2);
        reg.remove("p1");
        assert_eq!(reg.for_agent("a").unwrap().id, "p3");
        assert!(reg.for_agent("zzz").is_none());
    }

    #[test]
    fn precedence_is_question_then_permission_then_action() {
        let mut pending = Pending::default();
        pending.add_action(action("s1", "a"));
        assert!(matches!(pending.attention_for("a"), Some(Attention::Action(s)) if s.id == "s1"));

        pending.add_permission(permission("p1", "a"));
        assert!(
            matches!(pending.attention_for("a"), Some(Attention::Permission(p)) if p.id == "p1")
        );

        pending.add_question(question("q1", "a"));
        assert!(matches!(pending.attention_for("a"), Some(Attention::Question(q)) if q.id == "q1"));

        pending.resolve_question("q1");
        assert!(matches!(
            pending.attention_for("a"),
            Some(Attention::Permission(_))
        ));
        pending.resolve_permission("p1");
        assert!(matches!(pending.attention_for("a"), Some(Attention::Action(_))));
        pending.resolve_action("s1");
        assert!(pending.attention_for("a").is_none());
    }

    #[test]
    fn other_agents_items_do_not_leak() {
        let mut pending = Pending::default();
        pending.add_question(question("q1", "b"));
        pending.add_permission(permission("p1", "a"));
        assert!(matches!(
            pending.attention_for("a"),
            Some(Attention::Permission(_))
        ));
    }

    #[test]
    fn attention_set_tracks_mutations() {
        let mut pending = Pending::default();
        pending.add_permission(permission("p1", "a"));
        pending.add_action(action("s1", "b"));
        assert!(pending.needs_attention("a"));
        assert!(pending.needs_attention("b"));
        assert!(!pending.needs_attention("c"));

        pending.resolve_permission("p1");
        assert!(!pending.needs_attention("a"));
        assert_eq!(pending.attention().len(), 1);
    }

    #[test]
    fn prune_drops_every_kind_for_gone_agents() {
        let mut pending = Pending::default();
        pending.add_permission(permission("p1", "gone"));
        pending.add_permission(permission("p2", "kept"));
        pending.add_question(question("q1", "gone"));
        pending.add_action(action("s1", "gone"));

        let removed = pending.prune(|agent| agent == "kept");
        assert_eq!(removed, 3);
        assert_eq!(pending.total(), 1);
        assert!(!pending.needs_attention("gone"));
        assert!(pending.needs_attention("kept"));
    }

    #[test]
    fn replace_swaps_the_whole_list() {
        let mut pending = Pending::default();
        pending.add_question(question("q1", "a"));
        pending.replace_questions(vec![question("q2", "b"), question("q2", "b")]);
        assert_eq!(pending.questions().len(), 1);
        assert!(pending.questions().get("q1").is_none());
        assert!(pending.needs_attention("b"));
        assert!(!pending.needs_attention("a"));
    }
}
