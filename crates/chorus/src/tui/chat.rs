use chorus_protocol::{ChatMessage, ChatRole};
use unicode_width::UnicodeWidthChar;

/// Columns reserved in front of every line for the role badge.
pub const BADGE_WIDTH: usize = 4;

const DEDUPE_WINDOW: usize = 8;
const TOOL_INPUT_MAX: usize = 80;
const TOOL_RESULT_MAX_LINES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub role: ChatRole,
    pub text: String,
    /// First line of a message; the view draws the badge here.
    pub lead: bool,
    pub is_error: bool,
}

/// Transcript of one agent plus its wrapped rendering and scroll position.
#[derive(Debug, Clone)]
pub struct ChatBuffer {
    messages: Vec<ChatMessage>,
    lines: Vec<ChatLine>,
    scroll_top: usize,
    follow_tail: bool,
    history_loaded: bool,
}

impl Default for ChatBuffer {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            lines: Vec::new(),
            scroll_top: 0,
            follow_tail: true,
            history_loaded: false,
        }
    }
}

/// Wrap settings shared by every buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: usize,
    pub height: usize,
    pub show_tools: bool,
}

impl ChatBuffer {
    #[cfg(test)]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn lines(&self) -> &[ChatLine] {
        &self.lines
    }

    #[cfg(test)]
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    #[cfg(test)]
    pub fn follows_tail(&self) -> bool {
        self.follow_tail
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn visible(&self, height: usize) -> &[ChatLine] {
        let start = self.scroll_top.min(self.lines.len());
        let end = (start + height).min(self.lines.len());
        &self.lines[start..end]
    }

    pub fn append(&mut self, message: ChatMessage, vp: Viewport) {
        let dup = self
            .messages
            .iter()
            .rev()
            .take(DEDUPE_WINDOW)
            .any(|m| same_message(m, &message));
        if dup {
            return;
        }
        self.messages.push(message);
        self.rewrap(vp);
    }

    /// Folds a fetched history into whatever streamed in meanwhile.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>, vp: Viewport) {
        let mut all = history;
        all.append(&mut self.messages);
        all.sort_by_key(|m| m.ts_ms);

        let mut merged: Vec<ChatMessage> = Vec::with_capacity(all.len());
        for msg in all {
            let dup = merged
                .iter()
                .rev()
                .take(DEDUPE_WINDOW)
                .any(|m| same_message(m, &msg));
            if !dup {
                merged.push(msg);
            }
        }
        self.messages = merged;
        self.history_loaded = true;
        self.rewrap(vp);
    }

    pub fn rewrap(&mut self, vp: Viewport) {
        self.lines = render(&self.messages, vp.width, vp.show_tools);
        let max = max_scroll(self.lines.len(), vp.height);
        if self.follow_tail {
            self.scroll_top = max;
        } else {
            self.scroll_top = self.scroll_top.min(max);
        }
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.follow_tail = false;
        self.scroll_top = self.scroll_top.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize, height: usize) {
        let max = max_scroll(self.lines.len(), height);
        self.scroll_top = (self.scroll_top + n).min(max);
        self.follow_tail = self.scroll_top == max;
    }

    pub fn jump_top(&mut self) {
        self.follow_tail = false;
        self.scroll_top = 0;
    }

    pub fn jump_bottom(&mut self, height: usize) {
        self.scroll_top = max_scroll(self.lines.len(), height);
        self.follow_tail = true;
    }
}

fn max_scroll(lines: usize, height: usize) -> usize {
    lines.saturating_sub(height.max(1))
}

fn same_message(a: &ChatMessage, b: &ChatMessage) -> bool {
    if a.role != b.role || a.content != b.content {
        return false;
    }
    if a.role == ChatRole::Tool
        && (a.tool_name != b.tool_name
            || a.tool_input != b.tool_input
            || a.tool_result != b.tool_result)
    {
        return false;
    }
    // The local echo of a sent message and the daemon's copy carry
    // slightly different timestamps.
    a.ts_ms == b.ts_ms || (a.role == ChatRole::User && a.ts_ms.abs_diff(b.ts_ms) <= 2_000)
}

fn render(messages: &[ChatMessage], width: usize, show_tools: bool) -> Vec<ChatLine> {
    let width = width.saturating_sub(BADGE_WIDTH).max(1);
    let mut out = Vec::new();
    let mut prev: Option<ChatRole> = None;

    for msg in messages {
        if msg.role == ChatRole::Tool && !show_tools {
            continue;
        }
        let text = match msg.role {
            ChatRole::Tool => tool_text(msg),
            _ => msg.content.clone(),
        };
        if prev.is_some_and(|r| r != ChatRole::Tool || msg.role != ChatRole::Tool) {
            out.push(ChatLine {
                role: ChatRole::System,
                text: String::new(),
                lead: false,
                is_error: false,
            });
        }
        prev = Some(msg.role);

        let rows = wrap(&text, width);
        for (idx, row) in rows.into_iter().enumerate() {
            out.push(ChatLine {
                role: msg.role,
                text: row,
                lead: idx == 0,
                is_error: msg.is_error,
            });
        }
    }
    out
}

fn tool_text(msg: &ChatMessage) -> String {
    let name = msg.tool_name.as_deref().unwrap_or("tool");
    let input = msg
        .tool_input
        .as_deref()
        .map(|s| truncate(&s.replace('\n', " "), TOOL_INPUT_MAX))
        .unwrap_or_default();
    let mut text = format!("[{name}] {}", input.trim());
    if let Some(result) = msg.tool_result.as_deref().filter(|r| !r.trim().is_empty()) {
        let mut lines: Vec<&str> = result.lines().collect();
        let cut = lines.len() > TOOL_RESULT_MAX_LINES;
        lines.truncate(TOOL_RESULT_MAX_LINES);
        text.push_str("\n-> ");
        text.push_str(&lines.join("\n   "));
        if cut {
            text.push_str("\n   ...");
        }
    }
    text
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Greedy word wrap on display width. Words wider than a row are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for line in text.split('\n') {
        let mut row = String::new();
        let mut cells = 0usize;
        for (idx, word) in line.split(' ').enumerate() {
            let word_cells: usize = word.chars().map(|c| c.width().unwrap_or(0)).sum();
            if idx > 0 {
                if cells + 1 + word_cells <= width {
                    row.push(' ');
                    row.push_str(word);
                    cells += 1 + word_cells;
                    continue;
                }
                rows.push(std::mem::take(&mut row));
                cells = 0;
            }
            for ch in word.chars() {
                let w = ch.width().unwrap_or(0);
                if cells + w > width && !row.is_empty() {
                    rows.push(std::mem::take(&mut row));
                    cells = 0;
                }
                row.push(ch);
                cells += w;
            }
        }
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp() -> Viewport {
        Viewport {
            width: 40,
            height: 3,
            show_tools: false,
        }
    }

    fn msg(role: ChatRole, content: &str, ts_ms: u64) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_owned(),
            tool_name: None,
            tool_input: None,
            tool_result: None,
            is_error: false,
            ts_ms,
        }
    }

    fn tool(ts_ms: u64) -> ChatMessage {
        ChatMessage {
            tool_name: Some("Bash".to_owned()),
            tool_input: Some("cargo fmt".to_owned()),
            tool_result: Some("ok".to_owned()),
            ..msg(ChatRole::Tool, "", ts_ms)
        }
    }

    #[test]
    fn wrap_breaks_on_spaces() {
        assert_eq!(wrap("hello world", 5), vec!["hello", "world"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("a\nb", 10), vec!["a", "b"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn merge_history_dedupes_and_sorts() {
        let mut buf = ChatBuffer::default();
        buf.append(msg(ChatRole::Assistant, "live", 30), vp());
        buf.append(msg(ChatRole::User, "hi", 11), vp());
        buf.merge_history(
            vec![
                msg(ChatRole::User, "hi", 10),
                msg(ChatRole::Assistant, "hello", 20),
            ],
            vp(),
        );
        let got: Vec<&str> = buf.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(got, vec!["hi", "hello", "live"]);
        assert!(buf.history_loaded());
    }

    #[test]
    fn duplicate_append_is_dropped() {
        let mut buf = ChatBuffer::default();
        buf.append(msg(ChatRole::Assistant, "x", 5), vp());
        buf.append(msg(ChatRole::Assistant, "x", 5), vp());
        assert_eq!(buf.messages().len(), 1);
    }

    #[test]
    fn tool_events_hidden_unless_enabled() {
        let mut buf = ChatBuffer::default();
        buf.append(msg(ChatRole::Assistant, "running", 1), vp());
        buf.append(tool(2), vp());
        assert!(buf.lines().iter().all(|l| l.role != ChatRole::Tool));

        buf.rewrap(Viewport {
            show_tools: true,
            ..vp()
        });
        let tool_lines: Vec<&str> = buf
            .lines()
            .iter()
            .filter(|l| l.role == ChatRole::Tool)
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(tool_lines, vec!["[Bash] cargo fmt", "-> ok"]);
    }

    #[test]
    fn follows_tail_until_scrolled_up() {
        let mut buf = ChatBuffer::default();
        for i in 0..5 {
            buf.append(msg(ChatRole::Assistant, &format!("m{i}"), i), vp());
        }
        // Five messages plus four spacer lines.
        assert_eq!(buf.lines().len(), 9);
        assert_eq!(buf.scroll_top(), 6);

        buf.scroll_up(2);
        assert!(!buf.follows_tail());
        buf.append(msg(ChatRole::Assistant, "new", 10), vp());
        assert_eq!(buf.scroll_top(), 4);

        buf.scroll_down(100, 3);
        assert!(buf.follows_tail());
        assert_eq!(buf.scroll_top(), 8);

        buf.jump_top();
        assert_eq!(buf.visible(3)[0].text, "m0");
    }
}
