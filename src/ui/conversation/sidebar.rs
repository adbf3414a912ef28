use crate::events::Conversation;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Conversation list, most recent first, with the selection highlighted
pub struct ConversationSidebar<'a> {
    conversations: &'a [Conversation],
    current: Option<&'a str>,
}

impl<'a> ConversationSidebar<'a> {
    pub fn new(conversations: &'a [Conversation], current: Option<&'a str>) -> Self {
        Self { conversations, current }
    }
}

impl Widget for ConversationSidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("History ({})", self.conversations.len()))
            .style(Style::default().fg(Color::Gray));
        let inner = block.inner(area);
        block.render(area, buf);

        if self.conversations.is_empty() {
            let line = Line::from(Span::styled("No chats yet", Style::default().fg(Color::DarkGray)));
            if inner.height > 0 {
                buf.set_line(inner.x, inner.y, &line, inner.width);
            }
            return;
        }

        let selected = self
            .current
            .and_then(|id| self.conversations.iter().position(|c| c.id == id));

        // Keep the selection on screen.
        let height = inner.height as usize;
        let first = match selected {
            Some(index) if index >= height => index + 1 - height,
            _ => 0,
        };

        for (row, (index, conversation)) in self
            .conversations
            .iter()
            .enumerate()
            .skip(first)
            .take(height)
            .enumerate()
        {
            let style = if selected == Some(index) {
                Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let line = Line::from(Span::styled(conversation.title.clone(), style));
            buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
        }
    }
}
