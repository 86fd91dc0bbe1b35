use unicode_width::UnicodeWidthStr;

const HISTORY_LIMIT: usize = 100;

/// Multi-line input buffer with a submit history.
///
/// Walking back through history stashes the unsent draft; walking forward
/// past the newest entry brings it back.
#[derive(Debug, Clone, Default)]
pub struct Editor {
    text: String,
    history: Vec<String>,
    cursor: Option<usize>,
    draft: Option<String>,
}

impl Editor {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    #[cfg(test)]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    #[cfg(test)]
    pub fn browsing_history(&self) -> bool {
        self.cursor.is_some()
    }

    fn edited(&mut self) {
        self.cursor = None;
        self.draft = None;
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.edited();
    }

    /// Puts text back after a rejected submit.
    pub fn restore(&mut self, text: String) {
        self.text = text;
        self.edited();
    }

    pub fn insert_char(&mut self, ch: char) {
        self.text.push(ch);
        self.edited();
    }

    pub fn insert_str(&mut self, s: &str) {
        self.text.push_str(&s.replace("\r\n", "\n").replace('\r', "\n"));
        self.edited();
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn backspace(&mut self) {
        self.text.pop();
        self.edited();
    }

    pub fn history_prev(&mut self) {
        let Some(last) = self.history.len().checked_sub(1) else {
            return;
        };
        let idx = match self.cursor {
            None => {
                self.draft = Some(std::mem::take(&mut self.text));
                last
            }
            Some(idx) => idx.saturating_sub(1),
        };
        self.cursor = Some(idx);
        self.text = self.history[idx].clone();
    }

    pub fn history_next(&mut self) {
        let Some(idx) = self.cursor else {
            return;
        };
        if idx + 1 < self.history.len() {
            self.cursor = Some(idx + 1);
            self.text = self.history[idx + 1].clone();
            return;
        }
        self.cursor = None;
        self.text = self.draft.take().unwrap_or_default();
    }

    /// Takes the buffer for sending. Blank input is left in place.
    pub fn take_submit(&mut self) -> Option<String> {
        if self.text.trim().is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        self.edited();
        if self.history.last() != Some(&text) {
            self.history.push(text.clone());
            if self.history.len() > HISTORY_LIMIT {
                self.history.remove(0);
            }
        }
        Some(text)
    }

    /// Rows the buffer occupies at `width` columns, counting the cursor cell.
    pub fn rows(&self, width: usize) -> usize {
        wrapped_rows(&self.text, width)
    }
}

pub fn wrapped_rows(text: &str, width: usize) -> usize {
    let mut lines = text.split('\n').peekable();
    let mut rows = 0usize;
    while let Some(line) = lines.next() {
        let mut cells = UnicodeWidthStr::width(line);
        if lines.peek().is_none() {
            cells += 1;
        }
        rows += match width {
            0 => 1,
            w => cells.saturating_sub(1) / w + 1,
        };
    }
    rows.max(1)
}
