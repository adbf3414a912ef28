//! Answer formatting and the inline-markup renderer.
//!
//! [`format_answer`] rewrites plain answer text before it is revealed:
//! `Label: value` lines become `- **Label**: value` bullets and parenthetical
//! segments are wrapped in `==...==` highlight markers. [`render`] turns any
//! (possibly partially revealed) text into a typed block/span tree so the UI
//! never concatenates markup strings. No escaping happens here; answer text is
//! treated as trusted plain text.

use once_cell::sync::Lazy;
use regex::Regex;

static LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)([A-Za-z][A-Za-z0-9 /&'-]{0,48}?)\s*:\s+(\S.*)$").unwrap()
});

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^()\n]+)\)").unwrap());

static INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|==(.+?)==|\*([^*\s][^*]*?)\*").unwrap());

/// An inline run of text with a single style
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
    Highlight(String),
}

impl Inline {
    pub fn content(&self) -> &str {
        match self {
            Inline::Text(s) | Inline::Bold(s) | Inline::Italic(s) | Inline::Highlight(s) => s,
        }
    }
}

/// A renderable block of an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Lines separated by hard line breaks
    Paragraph(Vec<Vec<Inline>>),
    /// A `- ` bullet
    ListItem(Vec<Inline>),
}

/// Rewrite raw answer text into the markup that gets revealed.
///
/// Line endings (`\n` or `\r\n`) are kept as they came.
pub fn format_answer(text: &str) -> String {
    let mut formatted = String::with_capacity(text.len() + 16);
    for line in text.split_inclusive('\n') {
        let body = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);
        match LABEL_LINE.captures(body) {
            Some(caps) => {
                formatted.push_str(&format!("{}- **{}**: {}", &caps[1], caps[2].trim(), &caps[3]))
            }
            None => formatted.push_str(body),
        }
        formatted.push_str(&line[body.len()..]);
    }

    PARENTHETICAL
        .replace_all(&formatted, "==($1)==")
        .into_owned()
}

/// Parse markup into blocks. Blank lines separate paragraphs; `- ` and `* `
/// lines are list items.
pub fn render(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<Vec<Inline>> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();

        if trimmed.trim().is_empty() {
            if !paragraph.is_empty() {
                blocks.push(Block::Paragraph(std::mem::take(&mut paragraph)));
            }
            continue;
        }

        if let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            if !paragraph.is_empty() {
                blocks.push(Block::Paragraph(std::mem::take(&mut paragraph)));
            }
            blocks.push(Block::ListItem(render_inline(item)));
            continue;
        }

        paragraph.push(render_inline(line));
    }

    if !paragraph.is_empty() {
        blocks.push(Block::Paragraph(paragraph));
    }

    blocks
}

/// Split one line into styled runs. Unterminated markers stay plain text,
/// which is what a half-revealed answer looks like.
pub fn render_inline(line: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in INLINE.captures_iter(line) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        if whole.start() > last {
            spans.push(Inline::Text(line[last..whole.start()].to_string()));
        }

        let span = if let Some(bold) = caps.get(1) {
            Inline::Bold(bold.as_str().to_string())
        } else if let Some(mark) = caps.get(2) {
            Inline::Highlight(mark.as_str().to_string())
        } else if let Some(italic) = caps.get(3) {
            Inline::Italic(italic.as_str().to_string())
        } else {
            Inline::Text(whole.as_str().to_string())
        };
        spans.push(span);
        last = whole.end();
    }

    if last < line.len() {
        spans.push(Inline::Text(line[last..].to_string()));
    }

    spans
}
