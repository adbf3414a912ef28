//! Conversation history display component

use crate::events::{Conversation, Message, Role};
use crate::markdown::{self, Block as MarkupBlock, Inline};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use std::str::FromStr;

/// Per-message reveal status supplied by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Settled,
    /// Placeholder still waiting for the answer fetch
    Waiting,
    /// Answer being typed out
    Revealing,
}

/// Scrollable view over one conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    /// Lines scrolled up from the bottom
    scroll_offset: usize,
    /// Lines rendered on the last draw, used to bound scrolling
    last_total: usize,
    last_height: usize,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.last_total.saturating_sub(self.last_height);
        self.scroll_offset = (self.scroll_offset + lines).min(max);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    /// Draw `conversation`, or a welcome screen when there is none.
    pub fn render(
        &mut self,
        conversation: Option<&Conversation>,
        status: &dyn Fn(usize) -> MessageStatus,
        frame: u64,
        area: Rect,
        buf: &mut Buffer,
    ) {
        let title = conversation
            .map(|c| format!("💬 {}", c.title))
            .unwrap_or_else(|| "💬 New conversation".to_string());
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner_area = block.inner(area);
        block.render(area, buf);

        let messages = conversation.map(|c| c.messages.as_slice()).unwrap_or_default();
        let all_lines = if messages.is_empty() {
            welcome_lines()
        } else {
            let width = inner_area.width as usize;
            let mut lines = Vec::new();
            for (index, message) in messages.iter().enumerate() {
                lines.extend(render_message(message, status(index), frame, width));
                lines.push(Line::from(""));
            }
            lines
        };

        let height = inner_area.height as usize;
        self.last_total = all_lines.len();
        self.last_height = height;
        self.scroll_offset = self.scroll_offset.min(all_lines.len().saturating_sub(height));

        let end = all_lines.len() - self.scroll_offset;
        let start = end.saturating_sub(height);
        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

fn welcome_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(vec![Span::styled(
            "Welcome to Medical Assistant 🩺",
            Style::default().fg(Color::Green),
        )]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Describe a symptom or ask about a condition below.",
            Style::default().fg(Color::Gray),
        )]),
        Line::from(vec![Span::styled(
            "Answers can contain mistakes. Check important information.",
            Style::default().fg(Color::DarkGray),
        )]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Type /help for commands and keys.",
            Style::default().fg(Color::DarkGray),
        )]),
    ]
}

/// Colour for a user bubble from its tag
pub fn tag_color(tag: Option<&str>) -> Color {
    tag.and_then(|t| Color::from_str(t).ok()).unwrap_or(Color::Cyan)
}

fn render_message(message: &Message, status: MessageStatus, frame: u64, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let timestamp = message.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");

    match message.role {
        Role::User => {
            let color = tag_color(message.color_tag.as_deref());
            lines.push(Line::from(vec![Span::styled(
                format!("👤 {} {} {}", message.role.display_name(), timestamp, "─".repeat(12)),
                Style::default().fg(Color::DarkGray),
            )]));
            let spans = vec![Span::styled(message.text.clone(), Style::default().fg(color))];
            for wrapped in wrap_spans(&spans, width.saturating_sub(2)) {
                lines.push(prefixed("  ", wrapped));
            }
        }
        Role::Assistant => {
            lines.push(Line::from(vec![Span::styled(
                format!("🩺 {} {} {}", message.role.display_name(), timestamp, "─".repeat(12)),
                Style::default().fg(Color::DarkGray),
            )]));

            if status == MessageStatus::Waiting && message.text.is_empty() {
                let dots = match frame % 4 {
                    0 => ".",
                    1 => "..",
                    2 => "...",
                    _ => "",
                };
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled("Thinking", Style::default().fg(Color::Green)),
                    Span::styled(dots, Style::default().fg(Color::Yellow)),
                ]));
                return lines;
            }

            let mut body = markup_lines(&message.text, width);
            if status == MessageStatus::Revealing {
                let cursor = Span::styled("▋", Style::default().fg(Color::Yellow));
                match body.last_mut() {
                    Some(line) => line.spans.push(cursor),
                    None => body.push(Line::from(vec![Span::raw("  "), cursor])),
                }
            }
            lines.extend(body);
        }
    }

    lines
}

fn inline_style(inline: &Inline) -> Style {
    let base = Style::default().fg(Color::Green);
    match inline {
        Inline::Text(_) => base,
        Inline::Bold(_) => base.add_modifier(Modifier::BOLD),
        Inline::Italic(_) => base.add_modifier(Modifier::ITALIC),
        Inline::Highlight(_) => Style::default().fg(Color::Black).bg(Color::Yellow),
    }
}

/// Map answer markup to indented, wrapped terminal lines.
pub fn markup_lines(text: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for (index, block) in markdown::render(text).iter().enumerate() {
        match block {
            MarkupBlock::Paragraph(paragraph) => {
                if index > 0 {
                    lines.push(Line::from(""));
                }
                for inlines in paragraph {
                    let spans = to_spans(inlines);
                    for wrapped in wrap_spans(&spans, width.saturating_sub(2)) {
                        lines.push(prefixed("  ", wrapped));
                    }
                }
            }
            MarkupBlock::ListItem(inlines) => {
                let spans = to_spans(inlines);
                for (i, wrapped) in wrap_spans(&spans, width.saturating_sub(4)).into_iter().enumerate() {
                    let prefix = if i == 0 { "  • " } else { "    " };
                    lines.push(prefixed(prefix, wrapped));
                }
            }
        }
    }

    lines
}

fn to_spans(inlines: &[Inline]) -> Vec<Span<'static>> {
    inlines
        .iter()
        .map(|inline| Span::styled(inline.content().to_string(), inline_style(inline)))
        .collect()
}

fn prefixed(prefix: &'static str, spans: Vec<Span<'static>>) -> Line<'static> {
    let mut all = Vec::with_capacity(spans.len() + 1);
    all.push(Span::raw(prefix));
    all.extend(spans);
    Line::from(all)
}

/// Word-wrap styled spans to `width` columns. Words longer than a line are
/// split hard.
pub fn wrap_spans(spans: &[Span<'static>], width: usize) -> Vec<Vec<Span<'static>>> {
    if width == 0 {
        return vec![spans.to_vec()];
    }

    let mut lines: Vec<Vec<Span<'static>>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;

    for span in spans {
        for piece in span.content.split_inclusive(' ') {
            let visible = piece.trim_end_matches(' ').chars().count();

            if current_width > 0 && current_width + visible > width {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }

            let mut rest = piece;
            while current_width == 0 && rest.trim_end_matches(' ').chars().count() > width {
                let split_at = rest
                    .char_indices()
                    .nth(width)
                    .map(|(index, _)| index)
                    .unwrap_or(rest.len());
                lines.push(vec![Span::styled(rest[..split_at].to_string(), span.style)]);
                rest = &rest[split_at..];
            }

            if !rest.is_empty() {
                current_width += rest.chars().count();
                current.push(Span::styled(rest.to_string(), span.style));
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[Vec<Span<'static>>]) -> Vec<String> {
        lines
            .iter()
            .map(|spans| spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect()
    }

    #[test]
    fn short_text_is_one_line() {
        let wrapped = wrap_spans(&[Span::raw("fever")], 20);
        assert_eq!(texts(&wrapped), vec!["fever"]);
    }

    #[test]
    fn wraps_at_word_boundaries_across_spans() {
        let spans = vec![
            Span::raw("rest and "),
            Span::styled("drink fluids", Style::default().add_modifier(Modifier::BOLD)),
        ];
        let wrapped = wrap_spans(&spans, 10);
        assert_eq!(texts(&wrapped), vec!["rest and ", "drink ", "fluids"]);
        assert_eq!(wrapped[1][0].style.add_modifier, Modifier::BOLD);
    }

    #[test]
    fn long_words_are_split() {
        let wrapped = wrap_spans(&[Span::raw("pneumonoultramicroscopic")], 10);
        assert_eq!(texts(&wrapped), vec!["pneumonoul", "tramicrosc", "opic"]);
    }

    #[test]
    fn empty_input_gives_one_empty_line() {
        let wrapped = wrap_spans(&[], 10);
        assert_eq!(wrapped.len(), 1);
        assert!(wrapped[0].is_empty());
    }

    #[test]
    fn list_items_get_bullets() {
        let lines = markup_lines("- **Dose**: 5mg", 40);
        let text: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "  • Dose: 5mg");
    }

    #[test]
    fn unknown_tags_fall_back_to_cyan() {
        assert_eq!(tag_color(None), Color::Cyan);
        assert_eq!(tag_color(Some("not-a-colour")), Color::Cyan);
        assert_eq!(tag_color(Some("magenta")), Color::Magenta);
    }

    #[test]
    fn render_shows_the_bottom_of_long_conversations() {
        let mut conversation = Conversation::new("c".into(), "fever".into());
        for i in 0..20 {
            conversation.messages.push(Message::user(format!("question {}", i), None));
        }

        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        let mut history = ConversationHistory::new();
        history.render(Some(&conversation), &|_| MessageStatus::Settled, 0, area, &mut buf);

        let row = |y: u16| -> String {
            (0..area.width).map(|x| buf.get(x, y).symbol().to_string()).collect()
        };
        let bottom: String = (1..area.height - 1).map(row).collect();
        assert!(bottom.contains("question 19"));
        assert!(!bottom.contains("question 0 "));

        history.scroll_up(1000);
        let mut buf2 = Buffer::empty(area);
        history.render(Some(&conversation), &|_| MessageStatus::Settled, 0, area, &mut buf2);
        let top: String = (0..area.width).map(|x| buf2.get(x, 1).symbol().to_string()).collect();
        assert!(top.contains("You"));
    }
}
