use crate::ui::conversation::commands::{CommandEntry, ParsedCommand, command_entries, parse_slash_command};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Most palette rows shown at once
const PALETTE_ROWS: usize = 5;

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    /// The prompt text changed
    Edited(String),
    None,
}

/// Prompt text with a byte cursor that always sits on a char boundary
#[derive(Debug, Clone, Default)]
pub struct PromptBuffer {
    text: String,
    cursor: usize,
}

impl PromptBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn replace(&mut self, text: &str) {
        self.text = text.to_string();
        self.cursor = self.text.len();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    fn backspace(&mut self) -> bool {
        match self.text[..self.cursor].chars().next_back() {
            Some(c) => {
                self.cursor -= c.len_utf8();
                self.text.remove(self.cursor);
                true
            }
            None => false,
        }
    }

    fn delete(&mut self) -> bool {
        if self.cursor < self.text.len() {
            self.text.remove(self.cursor);
            true
        } else {
            false
        }
    }

    fn left(&mut self) {
        if let Some(c) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
        }
    }

    fn right(&mut self) {
        if let Some(c) = self.text[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }
}

/// Slash-command completion list shown while typing `/...`
#[derive(Debug, Clone, Default)]
struct CommandPalette {
    matches: Vec<CommandEntry>,
    selected: usize,
    open: bool,
}

impl CommandPalette {
    /// Open, filter or close the palette for the current prompt.
    fn sync(&mut self, prompt: &str) {
        let Some(prefix) = prompt.strip_prefix('/').filter(|rest| !rest.contains(char::is_whitespace)) else {
            self.close();
            return;
        };

        let prefix = prefix.to_lowercase();
        self.matches = command_entries()
            .into_iter()
            .filter(|entry| entry.keyword.starts_with(&prefix))
            .collect();
        if !self.open {
            self.selected = 0;
        }
        self.open = true;
        self.selected = self.selected.min(self.matches.len().saturating_sub(1));
    }

    fn close(&mut self) {
        *self = Self::default();
    }

    fn step(&mut self, delta: isize) {
        if !self.matches.is_empty() {
            self.selected = (self.selected as isize + delta).rem_euclid(self.matches.len() as isize) as usize;
        }
    }

    fn current(&self) -> Option<&CommandEntry> {
        self.matches.get(self.selected)
    }

    /// Drawn directly above `anchor`, the composer box.
    fn render(&self, anchor: Rect, buf: &mut Buffer) {
        let height = (self.matches.len().min(PALETTE_ROWS) + 2) as u16;
        if height < 3 || anchor.y < height {
            return;
        }
        let area = Rect {
            y: anchor.y - height,
            height,
            ..anchor
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Commands")
            .style(Style::default().fg(Color::Blue));
        let inner = block.inner(area);
        block.render(area, buf);

        let rows = PALETTE_ROWS.min(inner.height as usize);
        for (row, entry) in self.matches.iter().take(rows).enumerate() {
            let keyword_style = if row == self.selected {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let line = Line::from(vec![
                Span::styled(format!("/{}", entry.keyword), keyword_style),
                Span::raw("  "),
                Span::styled(entry.description, Style::default().fg(Color::Gray)),
            ]);
            buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
        }
    }
}

/// Single-line prompt input with a slash-command palette
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    prompt: PromptBuffer,
    palette: CommandPalette,
    placeholder: String,
    has_focus: bool,
    locked: bool,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            prompt: PromptBuffer::default(),
            palette: CommandPalette::default(),
            placeholder: placeholder.into(),
            has_focus: true,
            locked: false,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        if self.palette.open {
            match key.code {
                KeyCode::Up => {
                    self.palette.step(-1);
                    return ComposerResult::None;
                }
                KeyCode::Down => {
                    self.palette.step(1);
                    return ComposerResult::None;
                }
                KeyCode::Esc => {
                    self.palette.close();
                    return ComposerResult::None;
                }
                KeyCode::Tab | KeyCode::Enter if self.complete_command() => {
                    return ComposerResult::None;
                }
                _ => {}
            }
        }

        let edited = match key.code {
            KeyCode::Enter => return self.submit(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.prompt.insert(c);
                true
            }
            KeyCode::Backspace => self.prompt.backspace(),
            KeyCode::Delete => self.prompt.delete(),
            KeyCode::Left => {
                self.prompt.left();
                false
            }
            KeyCode::Right => {
                self.prompt.right();
                false
            }
            KeyCode::Home => {
                self.prompt.cursor = 0;
                false
            }
            KeyCode::End => {
                self.prompt.cursor = self.prompt.text.len();
                false
            }
            _ => false,
        };

        if !edited {
            return ComposerResult::None;
        }
        self.palette.sync(self.prompt.text());
        ComposerResult::Edited(self.prompt.text().to_string())
    }

    fn submit(&mut self) -> ComposerResult {
        if self.prompt.text().trim().is_empty() {
            return ComposerResult::None;
        }

        if let Some(command) = parse_slash_command(self.prompt.text()) {
            self.prompt.take();
            self.palette.close();
            return ComposerResult::Command(command);
        }
        if self.prompt.text().trim_start().starts_with('/') {
            return ComposerResult::None;
        }

        // Prompts wait while the previous answer is still arriving.
        if self.locked {
            return ComposerResult::None;
        }

        self.palette.close();
        ComposerResult::Submitted(self.prompt.take())
    }

    /// Replace the prompt with the highlighted command. False when nothing matched.
    fn complete_command(&mut self) -> bool {
        let Some(keyword) = self.palette.current().map(|entry| entry.keyword) else {
            return false;
        };
        self.prompt.replace(&format!("/{}", keyword));
        self.palette.close();
        true
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Block submissions (commands still go through)
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn is_palette_open(&self) -> bool {
        self.palette.open
    }

    pub fn content(&self) -> &str {
        self.prompt.text()
    }

    /// Replace the prompt, cursor at the end.
    pub fn set_content(&mut self, content: &str) {
        self.prompt.replace(content);
        self.palette.close();
    }

    pub fn clear(&mut self) {
        self.set_content("");
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }
        let (title, border) = match (self.locked, self.has_focus) {
            (true, _) => ("⏳ Wait - the assistant is answering", Color::Yellow),
            (false, true) => ("🩺 Ask a medical question", Color::Green),
            (false, false) => ("🩺 Ask a medical question", Color::Gray),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(border));
        let inner = block.inner(area);
        block.render(area, buf);

        let line = if self.prompt.text().is_empty() {
            Line::from(Span::styled(self.placeholder.as_str(), Style::default().fg(Color::DarkGray)))
        } else {
            let (before, after) = self.prompt.text().split_at(self.prompt.cursor());
            let style = Style::default().fg(Color::White);
            let mut spans = vec![Span::styled(before, style)];
            if self.has_focus {
                spans.push(Span::styled("▌", Style::default().fg(Color::Green)));
            }
            spans.push(Span::styled(after, style));
            Line::from(spans)
        };
        if inner.height > 0 {
            buf.set_line(inner.x, inner.y, &line, inner.width);
        }

        if self.palette.open {
            self.palette.render(area, buf);
        }
    }
}
