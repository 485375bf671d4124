use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use crate::app::{App, FocusPane};
use crate::chat::Entry;
use crate::execution::RunStatus;
use crate::modal::ModalBody;
use crate::state::{ChatRole, Connectivity};

pub const REFERENCES_HEADING: &str = "📚 Referenced Materials:";
pub const LOADING_BODY: &str = "📖 Loading content...";

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [execution_area, chat_area] = Layout::horizontal([
        Constraint::Percentage(50),
        Constraint::Percentage(50),
    ])
    .areas(body_area);

    render_execution(app, frame, execution_area);
    render_chat(app, frame, chat_area);
    render_footer(app, frame, footer_area);

    if app.modal.is_open() {
        render_modal(app, frame, body_area);
    } else {
        app.modal_area = None;
    }
}

fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (dot_color, label) = match app.connectivity {
        Connectivity::Unknown => (Color::Yellow, app.connectivity.label()),
        Connectivity::Connected => (Color::Green, app.connectivity.label()),
        Connectivity::Disconnected => (Color::Red, app.connectivity.label()),
    };

    let title = Line::from(vec![
        Span::styled(" Lab TA Console ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.api().server().to_string(), Style::default().fg(Color::Gray)),
        Span::raw("  "),
        Span::styled("● ", Style::default().fg(dot_color)),
        Span::styled(label, Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_execution(app: &mut App, frame: &mut Frame, area: Rect) {
    let [editor_area, output_area] = Layout::vertical([
        Constraint::Percentage(60),
        Constraint::Min(5),
    ])
    .areas(area);

    app.editor_area = Some(editor_area);
    app.output_area = Some(output_area);

    let editor_focused = app.focus == FocusPane::Editor && !blocking_modal(app);
    app.editor.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style(editor_focused))
            .title(format!(" Code ({}) ", app.execution.language.display_name())),
    );
    // Hide the cursor unless the editor has focus
    let cursor_style = if editor_focused {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    app.editor.set_cursor_style(cursor_style);
    frame.render_widget(&app.editor, editor_area);

    let status_style = match app.execution.status() {
        RunStatus::Idle => Style::default(),
        RunStatus::Running => Style::default().fg(Color::Yellow),
        RunStatus::Success => Style::default().fg(Color::Green).bold(),
        RunStatus::Error => Style::default().fg(Color::Red).bold(),
    };

    let mut title = vec![Span::raw(" Output ")];
    if !app.execution.status_label().is_empty() {
        title.push(Span::styled(
            format!("{} ", app.execution.status_label()),
            status_style,
        ));
    }

    let output_style = match app.execution.status() {
        RunStatus::Idle | RunStatus::Running => Style::default().fg(Color::Gray),
        RunStatus::Success | RunStatus::Error => Style::default(),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(false))
        .title(Line::from(title));

    let inner_width = block.inner(output_area).width;
    let inner_height = block.inner(output_area).height;
    let output = Paragraph::new(app.execution.output().to_string())
        .style(output_style)
        .wrap(Wrap { trim: false });

    let total = output.line_count(inner_width) as u16;
    app.output_scroll = app.output_scroll.min(total.saturating_sub(inner_height));

    frame.render_widget(
        output.block(block).scroll((app.output_scroll, 0)),
        output_area,
    );
}

/// A chip laid out on a transcript row
struct ChipSlot {
    row: u16,
    x: u16,
    width: u16,
    index: usize,
}

/// Transcript lines plus the wrapped row count and chip positions
struct Transcript {
    lines: Vec<Line<'static>>,
    rows: u16,
    chips: Vec<ChipSlot>,
    width: u16,
}

impl Transcript {
    fn new(width: u16) -> Self {
        Self {
            lines: Vec::new(),
            rows: 0,
            chips: Vec::new(),
            width,
        }
    }

    fn push(&mut self, line: Line<'static>) {
        let height = Paragraph::new(line.clone())
            .wrap(Wrap { trim: false })
            .line_count(self.width)
            .max(1);
        self.rows = self.rows.saturating_add(height as u16);
        self.lines.push(line);
    }

    fn push_text(&mut self, text: Text<'static>) {
        for line in text.lines {
            self.push(line);
        }
    }

    /// Flow chips left to right, starting a new row when one would not fit
    fn push_chips(&mut self, chips: Vec<(Span<'static>, usize)>) {
        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut x: u16 = 0;

        for (chip, index) in chips {
            let width = chip.width() as u16;
            if x > 0 && x + 1 + width > self.width {
                self.push(Line::from(std::mem::take(&mut spans)));
                x = 0;
            }
            if x > 0 {
                spans.push(Span::raw(" "));
                x += 1;
            }
            self.chips.push(ChipSlot {
                row: self.rows,
                x,
                width,
                index,
            });
            spans.push(chip);
            x = x.saturating_add(width);
        }

        if !spans.is_empty() {
            self.push(Line::from(spans));
        }
    }
}

fn build_transcript(app: &App, width: u16) -> Transcript {
    let mut transcript = Transcript::new(width);
    let selected = app.chat.selected_chip();
    let transcript_focused = app.focus == FocusPane::Transcript;
    let mut chip_index = 0;

    for entry in app.chat.entries() {
        match entry {
            Entry::Turn(turn) => match turn.role() {
                ChatRole::User => {
                    transcript.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    for line in turn.text().lines() {
                        transcript.push(Line::from(line.to_string()));
                    }
                    transcript.push(Line::default());
                }
                ChatRole::Assistant => {
                    transcript.push(Line::from(Span::styled(
                        "TA:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    transcript.push_text(app.renderer.render_message(turn.text()));

                    if !turn.sources().is_empty() {
                        transcript.push(Line::from(Span::styled(
                            REFERENCES_HEADING,
                            Style::default().fg(Color::Magenta),
                        )));
                        let chips = turn
                            .sources()
                            .iter()
                            .map(|source| {
                                let is_selected = selected == Some(chip_index);
                                let style = if is_selected && transcript_focused {
                                    Style::default()
                                        .bg(Color::Magenta)
                                        .fg(Color::White)
                                        .add_modifier(Modifier::BOLD)
                                } else if is_selected {
                                    Style::default().fg(Color::Magenta).bold()
                                } else {
                                    Style::default().fg(Color::Cyan)
                                };
                                let chip = (
                                    Span::styled(format!("📄 {}", source.name), style),
                                    chip_index,
                                );
                                chip_index += 1;
                                chip
                            })
                            .collect();
                        transcript.push_chips(chips);
                    }
                    transcript.push(Line::default());
                }
            },
            Entry::Thinking(_) => {
                transcript.push(Line::from(Span::styled(
                    "TA:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                transcript.push(Line::from(Span::styled(
                    format!("Thinking{}", dots),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
        }
    }

    transcript
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    app.chat_area = Some(transcript_area);
    app.input_area = Some(input_area);
    app.chip_areas.clear();

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app.focus == FocusPane::Transcript))
        .title(" Teaching Assistant ");
    let inner = chat_block.inner(transcript_area);

    if app.chat.entries().is_empty() {
        let placeholder = Paragraph::new("Ask the TA about your code...")
            .style(Style::default().fg(Color::DarkGray))
            .block(chat_block);
        frame.render_widget(placeholder, transcript_area);
    } else {
        let transcript = build_transcript(app, inner.width);

        let max_scroll = transcript.rows.saturating_sub(inner.height);
        if app.follow_chat || app.chat_scroll >= max_scroll {
            app.chat_scroll = max_scroll;
            app.follow_chat = true;
        }
        let scroll = app.chat_scroll;

        for slot in &transcript.chips {
            if slot.row < scroll || slot.row >= scroll + inner.height || slot.x >= inner.width {
                continue;
            }
            let rect = Rect::new(
                inner.x + slot.x,
                inner.y + (slot.row - scroll),
                slot.width.min(inner.width - slot.x),
                1,
            );
            app.chip_areas.push((rect, slot.index));
        }

        let rows = transcript.rows;
        let chat = Paragraph::new(transcript.lines)
            .block(chat_block)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0));
        frame.render_widget(chat, transcript_area);

        if rows > inner.height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("^"))
                .end_symbol(Some("v"));
            let mut scrollbar_state = ScrollbarState::new(max_scroll as usize)
                .position(scroll as usize);
            frame.render_stateful_widget(
                scrollbar,
                transcript_area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    render_chat_input(app, frame, input_area);
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::ChatInput && !blocking_modal(app);
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(Color::Yellow)
        } else {
            border_style(false)
        })
        .title(" Ask (Enter to send) ");

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;

    // Keep the cursor visible by scrolling horizontally
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .chat_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, area);

    if focused {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn blocking_modal(app: &App) -> bool {
    app.modal.is_open() && !app.modal.is_minimized()
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let (mode_text, mode_style, hints): (&str, Style, Vec<(&str, &str)>) = if blocking_modal(app) {
        (
            " VIEW ",
            Style::default().bg(Color::Magenta).fg(Color::White),
            vec![
                ("j/k", "scroll"),
                ("m", "minimize"),
                ("f", "maximize"),
                ("Esc", "close"),
            ],
        )
    } else {
        match app.focus {
            FocusPane::Editor => (
                " CODE ",
                Style::default().bg(Color::Blue).fg(Color::White),
                vec![
                    ("^R", "run"),
                    ("^S", "submit"),
                    ("^L", "clear"),
                    ("^T", "language"),
                    ("Tab", "focus"),
                    ("^Q", "quit"),
                ],
            ),
            FocusPane::ChatInput => (
                " ASK ",
                Style::default().bg(Color::Yellow).fg(Color::Black),
                vec![
                    ("Enter", "send"),
                    ("↑/↓", "scroll"),
                    ("Tab", "focus"),
                    ("^Q", "quit"),
                ],
            ),
            FocusPane::Transcript => (
                " CHAT ",
                Style::default().bg(Color::Green).fg(Color::Black),
                vec![
                    ("j/k", "scroll"),
                    ("[ ]", "source"),
                    ("Enter", "open"),
                    ("Tab", "focus"),
                ],
            ),
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
        spans.push(Span::raw(" "));
    }

    if app.focus == FocusPane::Transcript && !blocking_modal(app) {
        if let Some(source) = app.chat.selected_source() {
            spans.push(Span::styled(
                format!(" 📄 {} ", source.hint()),
                Style::default().fg(Color::Magenta),
            ));
        }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_modal(app: &mut App, frame: &mut Frame, area: Rect) {
    if app.modal.is_minimized() {
        let label = format!(" 📖 {}  (click to restore) ", app.modal.title());
        let width = (Line::from(label.as_str()).width() as u16).min(area.width);
        let bar = Rect::new(
            area.x + area.width - width,
            area.y + area.height.saturating_sub(1),
            width,
            1,
        );
        app.modal_area = Some(bar);
        frame.render_widget(Clear, bar);
        frame.render_widget(
            Paragraph::new(label).style(Style::default().bg(Color::Blue).fg(Color::White)),
            bar,
        );
        return;
    }

    let popup_area = if app.modal.is_maximized() {
        area
    } else {
        // Centered, 70% of the body
        let popup_width = (area.width * 7 / 10).max(20).min(area.width);
        let popup_height = (area.height * 7 / 10).max(6).min(area.height);
        Rect::new(
            area.x + (area.width.saturating_sub(popup_width)) / 2,
            area.y + (area.height.saturating_sub(popup_height)) / 2,
            popup_width,
            popup_height,
        )
    };
    app.modal_area = Some(popup_area);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let category_style = match app.modal.body() {
        ModalBody::Failed(_) => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Gray),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(format!(" {} ", app.modal.title()), Style::default().bold()),
            Span::styled(format!("[{}] ", app.modal.category()), category_style),
        ]))
        .title_bottom(" m minimize · f maximize · Esc close ");

    let body = match app.modal.body() {
        ModalBody::Loading => Text::from(Span::styled(
            LOADING_BODY,
            Style::default().fg(Color::DarkGray),
        )),
        ModalBody::Document(text) => text.clone(),
        ModalBody::Failed(message) => Text::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )),
    };

    let inner = block.inner(popup_area);
    let paragraph = Paragraph::new(body).wrap(Wrap { trim: false });
    let total = paragraph.line_count(inner.width) as u16;
    let max_scroll = total.saturating_sub(inner.height);
    app.modal.scroll = app.modal.scroll.min(max_scroll);

    frame.render_widget(
        paragraph.block(block).scroll((app.modal.scroll, 0)),
        popup_area,
    );

    if total > inner.height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));
        let mut scrollbar_state = ScrollbarState::new(max_scroll as usize)
            .position(app.modal.scroll as usize);
        frame.render_stateful_widget(
            scrollbar,
            popup_area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::config::Settings;
    use crate::state::{ChatReply, KnowledgeDocument, SourceRef};
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn app() -> App<'static> {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(&Settings::default(), Arc::new(FakeApi::default()), tx)
    }

    fn draw(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| render(app, f)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn first_frame_shows_placeholders() {
        let mut app = app();
        let screen = draw(&mut app);
        assert!(screen.contains("Lab TA Console"));
        assert!(screen.contains("Checking..."));
        assert!(screen.contains("Output will appear here..."));
        assert!(screen.contains("Code (Python)"));
        assert!(app.chip_areas.is_empty());
        assert!(app.modal_area.is_none());
    }

    #[tokio::test]
    async fn answer_with_sources_records_clickable_chips() {
        let mut app = app();
        let pending = app.chat.begin_send("what is a loop?", "").unwrap();
        app.chat.finish_send(
            pending.id,
            Ok(ChatReply {
                response: "A **loop** repeats.".to_string(),
                sources: vec![SourceRef::named("loops.md")],
            }),
        );

        let screen = draw(&mut app);
        assert!(screen.contains("Referenced Materials"));
        assert!(screen.contains("loops.md"));
        assert_eq!(app.chip_areas.len(), 1);
        assert_eq!(app.chip_areas[0].1, 0);

        let (rect, _) = app.chip_areas[0];
        let chat_area = app.chat_area.unwrap();
        assert!(rect.y > chat_area.y && rect.y < chat_area.y + chat_area.height);
    }

    #[tokio::test]
    async fn modal_popup_is_centered_and_maximizes() {
        let mut app = app();
        app.modal.open("loops.md");
        app.modal.finish(
            Ok(KnowledgeDocument {
                name: "loops.md".to_string(),
                category: "basics".to_string(),
                content: "Loops repeat.".to_string(),
            }),
            app.renderer.as_ref(),
        );

        let screen = draw(&mut app);
        assert!(screen.contains("Loops"));
        assert!(screen.contains("[basics]"));
        let normal = app.modal_area.unwrap();

        app.modal.toggle_maximize();
        draw(&mut app);
        let maximized = app.modal_area.unwrap();
        assert!(maximized.width > normal.width);
        assert!(maximized.height > normal.height);

        app.modal.toggle_minimize();
        draw(&mut app);
        assert_eq!(app.modal_area.unwrap().height, 1);
    }
}
