/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Editable text with a cursor counted in characters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    text: String,
    cursor: usize,
}

impl TextInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `text`, cursor at the end
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    /// Add `s` after the existing text and leave the cursor at the very end
    pub fn append(&mut self, s: &str) {
        self.text.push_str(s);
        self.cursor = self.len();
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    /// Start of the current line
    pub fn move_home(&mut self) {
        let (_, col) = self.cursor_line_col();
        self.cursor -= col;
    }

    /// End of the current line
    pub fn move_end(&mut self) {
        let (row, col) = self.cursor_line_col();
        let line_len = self.text.split('\n').nth(row).map_or(0, |l| l.chars().count());
        self.cursor += line_len - col;
    }

    pub fn move_up(&mut self) {
        let (row, col) = self.cursor_line_col();
        if row > 0 {
            self.move_to(row - 1, col);
        }
    }

    pub fn move_down(&mut self) {
        let (row, col) = self.cursor_line_col();
        if row + 1 < self.line_count() {
            self.move_to(row + 1, col);
        }
    }

    fn move_to(&mut self, row: usize, col: usize) {
        let mut cursor = 0;
        for (i, line) in self.text.split('\n').enumerate() {
            let len = line.chars().count();
            if i == row {
                self.cursor = cursor + col.min(len);
                return;
            }
            cursor += len + 1;
        }
    }

    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Zero-based (line, column) of the cursor
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before: String = self.text.chars().take(self.cursor).collect();
        let row = before.matches('\n').count();
        let col = before.rsplit('\n').next().map_or(0, |l| l.chars().count());
        (row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_backspace_multibyte() {
        let mut input = TextInput::new();
        for c in "héllo".chars() {
            input.insert_char(c);
        }
        input.move_left();
        input.move_left();
        input.insert_char('あ');
        assert_eq!(input.text(), "hélあlo");
        input.backspace();
        input.backspace();
        assert_eq!(input.text(), "hélo");
        assert_eq!(input.cursor(), 2);
    }

    #[test]
    fn test_delete_at_end_is_noop() {
        let mut input = TextInput::with_text("ab");
        input.delete();
        assert_eq!(input.text(), "ab");
        input.move_home();
        input.delete();
        assert_eq!(input.text(), "b");
    }

    #[test]
    fn test_line_navigation() {
        let mut input = TextInput::with_text("first line\nab\nthird");
        assert_eq!(input.line_count(), 3);
        assert_eq!(input.cursor_line_col(), (2, 5));

        input.move_up();
        assert_eq!(input.cursor_line_col(), (1, 2));
        input.move_up();
        assert_eq!(input.cursor_line_col(), (0, 2));
        input.move_end();
        assert_eq!(input.cursor_line_col(), (0, 10));
        input.move_down();
        assert_eq!(input.cursor_line_col(), (1, 2));
        input.move_home();
        assert_eq!(input.cursor_line_col(), (1, 0));
    }

    #[test]
    fn test_newline_insert_and_clear() {
        let mut input = TextInput::with_text("a");
        input.insert_char('\n');
        input.insert_char('b');
        assert_eq!(input.cursor_line_col(), (1, 1));
        assert_eq!(input.text(), "a\nb");
        input.clear();
        assert_eq!(input.text(), "");
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn test_append_ignores_cursor_position() {
        let mut input = TextInput::with_text("see below
thanks");
        input.move_up();
        input.move_home();
        input.append("\n[file]");
        assert_eq!(input.text(), "see below\nthanks\n[file]");
        assert_eq!(input.cursor_line_col(), (2, 6));
    }
}
