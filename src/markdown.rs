use std::sync::OnceLock;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};
use regex::Regex;

pub trait MarkdownRenderer: Send + Sync {
    fn name(&self) -> &'static str;
    /// Chat answers
    fn render_message(&self, source: &str) -> Text<'static>;
    /// Knowledge documents shown in the source viewer
    fn render_document(&self, source: &str) -> Text<'static>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkdownPreference {
    #[default]
    Rich,
    Minimal,
}

impl MarkdownPreference {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rich" | "full" => Some(MarkdownPreference::Rich),
            "minimal" | "plain" => Some(MarkdownPreference::Minimal),
            _ => None,
        }
    }
}

/// Pick the renderer for this session. Rich rendering is used when it was
/// compiled in and not turned off.
pub fn select(preference: MarkdownPreference) -> Box<dyn MarkdownRenderer> {
    match preference {
        #[cfg(feature = "rich-markdown")]
        MarkdownPreference::Rich => Box::new(RichMarkdown),
        #[cfg(not(feature = "rich-markdown"))]
        MarkdownPreference::Rich => {
            tracing::info!("rich markdown not compiled in, using minimal renderer");
            Box::new(MinimalMarkdown)
        }
        MarkdownPreference::Minimal => Box::new(MinimalMarkdown),
    }
}

fn code_style() -> Style {
    Style::default().fg(Color::Yellow)
}

fn link_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::UNDERLINED)
}

/// Regex-driven fallback: `**bold**`, fenced blocks, `` `code` ``,
/// `[text](url)` and newlines. Documents are shown verbatim.
pub struct MinimalMarkdown;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("valid fence regex"))
}

fn inline_regex() -> &'static Regex {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    INLINE.get_or_init(|| {
        Regex::new(r"\*\*([^*]+)\*\*|`([^`]+)`|\[([^\]]+)\]\(([^)]+)\)")
            .expect("valid inline regex")
    })
}

/// Convert one line of prose into styled spans
fn parse_inline(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut last = 0;

    for caps in inline_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            spans.push(Span::raw(text[last..whole.start()].to_string()));
        }

        if let Some(bold) = caps.get(1) {
            spans.push(Span::styled(
                bold.as_str().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else if let Some(code) = caps.get(2) {
            spans.push(Span::styled(code.as_str().to_string(), code_style()));
        } else if let (Some(label), Some(url)) = (caps.get(3), caps.get(4)) {
            spans.push(Span::styled(format!("{} ↗", label.as_str()), link_style()));
            spans.push(Span::styled(
                format!(" ({})", url.as_str()),
                Style::default().fg(Color::DarkGray),
            ));
        }

        last = whole.end();
    }

    if last < text.len() {
        spans.push(Span::raw(text[last..].to_string()));
    }

    Line::from(spans)
}

impl MarkdownRenderer for MinimalMarkdown {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn render_message(&self, source: &str) -> Text<'static> {
        let mut lines: Vec<Line<'static>> = Vec::new();
        let mut last = 0;

        // Newlines around a fence belong to the fence, not the prose
        let push_prose = |lines: &mut Vec<Line<'static>>, prose: &str| {
            let prose = prose.trim_matches('\n');
            if prose.is_empty() {
                return;
            }
            for line in prose.split('\n') {
                lines.push(parse_inline(line));
            }
        };

        for caps in fence_regex().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                push_prose(&mut lines, &source[last..whole.start()]);
            }
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            for code_line in body.trim_end_matches('\n').split('\n') {
                lines.push(Line::from(Span::styled(format!("  {}", code_line), code_style())));
            }
            last = whole.end();
        }

        if last < source.len() {
            push_prose(&mut lines, &source[last..]);
        }

        Text::from(lines)
    }

    fn render_document(&self, source: &str) -> Text<'static> {
        Text::raw(source.to_string())
    }
}

#[cfg(feature = "rich-markdown")]
pub use rich::RichMarkdown;

#[cfg(feature = "rich-markdown")]
mod rich {
    use super::*;
    use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

    /// CommonMark + GitHub extensions, with soft breaks kept as line breaks
    pub struct RichMarkdown;

    impl MarkdownRenderer for RichMarkdown {
        fn name(&self) -> &'static str {
            "rich"
        }

        fn render_message(&self, source: &str) -> Text<'static> {
            Text::from(markdown_to_lines(source))
        }

        fn render_document(&self, source: &str) -> Text<'static> {
            Text::from(markdown_to_lines(source))
        }
    }

    struct LineBuilder {
        lines: Vec<Line<'static>>,
        spans: Vec<Span<'static>>,
        styles: Vec<Style>,
        lists: Vec<Option<u64>>,
        link_dest: Option<String>,
        in_code_block: bool,
    }

    impl LineBuilder {
        fn new() -> Self {
            Self {
                lines: Vec::new(),
                spans: Vec::new(),
                styles: vec![Style::default()],
                lists: Vec::new(),
                link_dest: None,
                in_code_block: false,
            }
        }

        fn style(&self) -> Style {
            self.styles.last().copied().unwrap_or_default()
        }

        fn push_style(&mut self, patch: Style) {
            let next = self.style().patch(patch);
            self.styles.push(next);
        }

        fn pop_style(&mut self) {
            if self.styles.len() > 1 {
                self.styles.pop();
            }
        }

        fn text(&mut self, text: &str) {
            let style = self.style();
            let mut parts = text.split('\n').peekable();
            while let Some(part) = parts.next() {
                if !part.is_empty() {
                    self.spans.push(Span::styled(part.to_string(), style));
                }
                if parts.peek().is_some() {
                    self.flush();
                }
            }
        }

        fn flush(&mut self) {
            let spans = std::mem::take(&mut self.spans);
            self.lines.push(Line::from(spans));
        }

        fn flush_nonempty(&mut self) {
            if !self.spans.is_empty() {
                self.flush();
            }
        }

        fn blank(&mut self) {
            self.flush_nonempty();
            if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
                self.lines.push(Line::default());
            }
        }

        fn finish(mut self) -> Vec<Line<'static>> {
            self.flush_nonempty();
            while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
                self.lines.pop();
            }
            self.lines
        }
    }

    fn heading_style(level: HeadingLevel) -> Style {
        let base = Style::default().add_modifier(Modifier::BOLD);
        match level {
            HeadingLevel::H1 => base.fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
            HeadingLevel::H2 => base.fg(Color::Cyan),
            _ => base.fg(Color::Blue),
        }
    }

    pub(super) fn markdown_to_lines(source: &str) -> Vec<Line<'static>> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut out = LineBuilder::new();

        for event in Parser::new_ext(source, options) {
            match event {
                Event::Start(Tag::Paragraph) => {}
                Event::End(TagEnd::Paragraph) => out.blank(),
                Event::Start(Tag::Heading { level, .. }) => {
                    out.blank();
                    out.push_style(heading_style(level));
                }
                Event::End(TagEnd::Heading(_)) => {
                    out.pop_style();
                    out.blank();
                }
                Event::Start(Tag::Strong) => {
                    out.push_style(Style::default().add_modifier(Modifier::BOLD))
                }
                Event::Start(Tag::Emphasis) => {
                    out.push_style(Style::default().add_modifier(Modifier::ITALIC))
                }
                Event::Start(Tag::Strikethrough) => {
                    out.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
                }
                Event::End(TagEnd::Strong | TagEnd::Emphasis | TagEnd::Strikethrough) => {
                    out.pop_style()
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    out.link_dest = Some(dest_url.to_string());
                    out.push_style(link_style());
                }
                Event::End(TagEnd::Link) => {
                    out.pop_style();
                    out.spans.push(Span::styled(" ↗", link_style()));
                    if let Some(dest) = out.link_dest.take() {
                        out.spans.push(Span::styled(
                            format!(" ({})", dest),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                }
                Event::Start(Tag::CodeBlock(_)) => {
                    out.blank();
                    out.in_code_block = true;
                }
                Event::End(TagEnd::CodeBlock) => {
                    out.in_code_block = false;
                    out.blank();
                }
                Event::Start(Tag::List(start)) => {
                    out.flush_nonempty();
                    out.lists.push(start);
                }
                Event::End(TagEnd::List(_)) => {
                    out.lists.pop();
                    if out.lists.is_empty() {
                        out.blank();
                    }
                }
                Event::Start(Tag::Item) => {
                    out.flush_nonempty();
                    let depth = out.lists.len().saturating_sub(1);
                    let marker = match out.lists.last_mut() {
                        Some(Some(n)) => {
                            let marker = format!("{}. ", n);
                            *n += 1;
                            marker
                        }
                        _ => "• ".to_string(),
                    };
                    out.spans.push(Span::raw(format!("{}{}", "  ".repeat(depth), marker)));
                }
                Event::End(TagEnd::Item) => out.flush_nonempty(),
                Event::End(TagEnd::TableCell) => out.spans.push(Span::raw(" │ ")),
                Event::End(TagEnd::TableHead | TagEnd::TableRow) => out.flush_nonempty(),
                Event::End(TagEnd::Table) => out.blank(),
                Event::Text(text) => {
                    if out.in_code_block {
                        for code_line in text.trim_end_matches('\n').split('\n') {
                            out.lines.push(Line::from(Span::styled(
                                format!("  {}", code_line),
                                code_style(),
                            )));
                        }
                    } else {
                        out.text(&text);
                    }
                }
                Event::Code(code) => {
                    let style = out.style().patch(code_style());
                    out.spans.push(Span::styled(code.to_string(), style));
                }
                Event::SoftBreak | Event::HardBreak => out.flush(),
                Event::Rule => {
                    out.blank();
                    out.lines.push(Line::from(Span::styled(
                        "─".repeat(40),
                        Style::default().fg(Color::DarkGray),
                    )));
                    out.lines.push(Line::default());
                }
                Event::TaskListMarker(done) => {
                    out.spans.push(Span::raw(if done { "[x] " } else { "[ ] " }));
                }
                Event::Html(html) | Event::InlineHtml(html) => out.text(&html),
                _ => {}
            }
        }

        out.finish()
    }
}
