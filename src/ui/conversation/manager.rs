use crate::engine::ChatEngine;
use crate::error::EngineError;
use crate::events::AppEvent;
use crate::streaming::TickOutcome;
use crate::ui::conversation::history::MessageStatus;
use crate::ui::conversation::{
    ComposerResult, ConversationComposer, ConversationHistory, ConversationSidebar, ParsedCommand,
    SlashCommand, get_help_text,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Widget},
};
use std::time::Instant;

const SIDEBAR_WIDTH: u16 = 28;
const MAX_SUGGESTIONS: usize = 5;
const SCROLL_STEP: usize = 5;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Ties the engine to the chat widgets and routes input between them
pub struct ConversationManager {
    engine: ChatEngine,
    history: ConversationHistory,
    composer: ConversationComposer,
    selected_suggestion: Option<usize>,
    show_help: bool,
    status: Option<String>,
    started: Instant,
}

impl ConversationManager {
    pub fn new(engine: ChatEngine) -> Self {
        let mut manager = Self {
            engine,
            history: ConversationHistory::new(),
            composer: ConversationComposer::new("Type to see suggestions..."),
            selected_suggestion: None,
            show_help: false,
            status: None,
            started: Instant::now(),
        };
        manager.sync_lock();
        manager
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub fn composer(&self) -> &ConversationComposer {
        &self.composer
    }

    pub fn selected_suggestion(&self) -> Option<usize> {
        self.selected_suggestion
    }

    pub fn is_help_visible(&self) -> bool {
        self.show_help
    }

    /// Local status line (not an error)
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let action = match key.code {
            KeyCode::Char('c') if ctrl => ConversationAction::Exit,
            KeyCode::Char('n') if ctrl => {
                self.new_chat();
                ConversationAction::None
            }
            KeyCode::Char('d') if ctrl => {
                self.run_command(SlashCommand::Delete)
            }
            KeyCode::Up if ctrl => {
                self.switch_conversation(-1);
                ConversationAction::None
            }
            KeyCode::Down if ctrl => {
                self.switch_conversation(1);
                ConversationAction::None
            }
            KeyCode::PageUp => {
                self.history.scroll_up(SCROLL_STEP);
                ConversationAction::None
            }
            KeyCode::PageDown => {
                self.history.scroll_down(SCROLL_STEP);
                ConversationAction::None
            }
            KeyCode::Esc if !self.composer.is_palette_open() => {
                self.show_help = false;
                self.status = None;
                self.engine.dismiss_notice();
                ConversationAction::None
            }
            KeyCode::Up if !self.composer.is_palette_open() => {
                self.move_suggestion(-1);
                ConversationAction::None
            }
            KeyCode::Down if !self.composer.is_palette_open() => {
                self.move_suggestion(1);
                ConversationAction::None
            }
            KeyCode::Tab if !self.composer.is_palette_open() => {
                self.accept_suggestion();
                ConversationAction::None
            }
            _ => {
                let result = self.composer.handle_key(key);
                self.handle_composer_result(result)
            }
        };

        self.sync_lock();
        action
    }

    fn handle_composer_result(&mut self, result: ComposerResult) -> ConversationAction {
        match result {
            ComposerResult::Submitted(prompt) => {
                self.submit(&prompt);
                ConversationAction::None
            }
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::Edited(text) => {
                self.selected_suggestion = None;
                // Commands are not medical queries.
                let query = if text.starts_with('/') { "" } else { text.as_str() };
                self.engine.on_prompt_changed(query);
                ConversationAction::None
            }
            ComposerResult::None => ConversationAction::None,
        }
    }

    fn submit(&mut self, prompt: &str) {
        match self.engine.submit(prompt) {
            Ok(_) => {
                self.status = None;
                self.show_help = false;
                self.selected_suggestion = None;
                self.history.scroll_to_bottom();
            }
            Err(EngineError::Busy) => {
                // The composer is cleared already; put the prompt back.
                self.composer.set_content(prompt);
                self.status = Some(EngineError::Busy.to_string());
            }
            Err(err) => {
                tracing::warn!("Prompt rejected: {}", err);
            }
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        self.run_command(command.command)
    }

    fn run_command(&mut self, command: SlashCommand) -> ConversationAction {
        if !command.available_while_busy() && self.engine.is_busy() {
            self.status = Some(format!("/{} is available once the answer has finished", command.command()));
            return ConversationAction::None;
        }

        match command {
            SlashCommand::New => self.new_chat(),
            SlashCommand::Delete => {
                if self.engine.delete_current_conversation() {
                    self.status = Some("Conversation deleted".to_string());
                    self.history.scroll_to_bottom();
                }
            }
            SlashCommand::Clear => {
                self.engine.delete_all();
                self.status = Some("All conversations deleted".to_string());
                self.history.scroll_to_bottom();
            }
            SlashCommand::Help => self.show_help = true,
            SlashCommand::Quit => return ConversationAction::Exit,
        }

        ConversationAction::None
    }

    fn new_chat(&mut self) {
        self.engine.new_chat();
        self.status = None;
        self.history.scroll_to_bottom();
    }

    fn switch_conversation(&mut self, offset: isize) {
        self.engine.cycle_conversation(offset);
        self.history.scroll_to_bottom();
    }

    fn move_suggestion(&mut self, delta: isize) {
        let count = self.engine.suggestions().len().min(MAX_SUGGESTIONS);
        if count == 0 {
            self.selected_suggestion = None;
            return;
        }

        let next = match self.selected_suggestion {
            Some(current) => (current as isize + delta).rem_euclid(count as isize) as usize,
            None if delta < 0 => count - 1,
            None => 0,
        };
        self.selected_suggestion = Some(next);
    }

    fn accept_suggestion(&mut self) {
        let index = self.selected_suggestion.unwrap_or(0);
        let Some(suggestion) = self.engine.suggestions().get(index).cloned() else {
            return;
        };

        self.composer.set_content(&suggestion);
        self.selected_suggestion = None;
        self.engine.on_prompt_changed(&suggestion);
    }

    /// Apply a fetch result from the engine channel.
    pub fn handle_event(&mut self, event: AppEvent) {
        self.engine.handle_event(event);

        let count = self.engine.suggestions().len().min(MAX_SUGGESTIONS);
        if self.selected_suggestion.is_some_and(|index| index >= count) {
            self.selected_suggestion = None;
        }
        self.sync_lock();
    }

    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.engine.tick();
        if matches!(outcome, TickOutcome::Finished { .. }) {
            self.sync_lock();
        }
        outcome
    }

    pub fn should_tick(&self) -> bool {
        self.engine.should_tick()
    }

    /// Terminal focus changed.
    pub fn set_visible(&mut self, visible: bool) {
        self.engine.set_visible(visible);
        self.composer.set_focus(visible);
    }

    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }

    fn sync_lock(&mut self) {
        self.composer.set_locked(self.engine.is_busy());
    }

    /// Render the whole chat screen
    pub fn render(&mut self, area: Rect, buf: &mut Buffer) {
        let main_area = if area.width >= SIDEBAR_WIDTH * 3 {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
                .split(area);
            ConversationSidebar::new(
                self.engine.conversations(),
                self.engine.store().current_conversation_id(),
            )
            .render(columns[0], buf);
            columns[1]
        } else {
            area
        };

        let suggestion_count = self.engine.suggestions().len().min(MAX_SUGGESTIONS);
        let suggestion_height = if suggestion_count > 0 { suggestion_count as u16 + 2 } else { 0 };
        let notice_height = if self.engine.notice().is_some() || self.status.is_some() { 1 } else { 0 };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),                    // History
                Constraint::Length(suggestion_height), // Suggestions
                Constraint::Length(notice_height),     // Notice
                Constraint::Length(3),                 // Composer
            ])
            .split(main_area);

        let frame = self.started.elapsed().as_millis() as u64 / 300;
        let engine = &self.engine;
        let conversation = engine.current_conversation();
        let conversation_id = conversation.map(|c| c.id.as_str()).unwrap_or_default();
        let status = |index: usize| {
            if engine
                .in_flight()
                .is_some_and(|p| p.conversation_id == conversation_id && p.message_index == index)
            {
                MessageStatus::Waiting
            } else if engine.animator().is_revealing(conversation_id, index) {
                MessageStatus::Revealing
            } else {
                MessageStatus::Settled
            }
        };
        self.history.render(conversation, &status, frame, chunks[0], buf);

        if suggestion_count > 0 && chunks[1].height > 0 {
            self.render_suggestions(chunks[1], buf);
        }
        if chunks[2].height > 0 {
            self.render_notice(chunks[2], buf);
        }
        if chunks[3].height > 0 {
            self.composer.render(chunks[3], buf);
        }

        if self.show_help && chunks[0].height > 0 {
            render_help(chunks[0], buf);
        }
    }

    fn render_suggestions(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Suggestions (↑↓ to pick, Tab to use)")
            .style(Style::default().fg(Color::Blue));
        let inner = block.inner(area);
        block.render(area, buf);

        for (index, suggestion) in self
            .engine
            .suggestions()
            .iter()
            .take(MAX_SUGGESTIONS.min(inner.height as usize))
            .enumerate()
        {
            let style = if self.selected_suggestion == Some(index) {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let line = Line::from(vec![Span::raw("🔍 "), Span::styled(suggestion.clone(), style)]);
            buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
        }
    }

    fn render_notice(&self, area: Rect, buf: &mut Buffer) {
        let line = match (self.engine.notice(), self.status.as_deref()) {
            (Some(notice), _) => Line::from(vec![
                Span::styled(format!("❌ {}", notice), Style::default().fg(Color::Red)),
                Span::styled("  (Esc to dismiss)", Style::default().fg(Color::DarkGray)),
            ]),
            (None, Some(status)) => Line::from(Span::styled(
                format!("ℹ {}", status),
                Style::default().fg(Color::Yellow),
            )),
            (None, None) => return,
        };
        buf.set_line(area.x, area.y, &line, area.width);
    }
}

fn render_help(area: Rect, buf: &mut Buffer) {
    let help = get_help_text();
    let lines: Vec<&str> = help.lines().collect();

    let width = lines
        .iter()
        .map(|l| l.chars().count() as u16 + 4)
        .max()
        .unwrap_or(20)
        .min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    Clear.render(popup, buf);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help (Esc to close)")
        .style(Style::default().fg(Color::Cyan));
    let inner = block.inner(popup);
    block.render(popup, buf);

    for (i, text) in lines.iter().enumerate().take(inner.height as usize) {
        let line = Line::from(Span::styled(format!(" {}", text), Style::default().fg(Color::White)));
        buf.set_line(inner.x, inner.y + i as u16, &line, inner.width);
    }
}
