use std::sync::Arc;

use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders};
use tokio::sync::mpsc;
use tui_textarea::TextArea;

use crate::api::LabApi;
use crate::chat::ChatPanel;
use crate::config::Settings;
use crate::execution::{ExecutionPanel, SAMPLE_CODE};
use crate::markdown::{self, MarkdownRenderer};
use crate::modal::SourceModal;
use crate::state::Connectivity;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Editor,
    ChatInput,
    Transcript,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Editor => FocusPane::ChatInput,
            FocusPane::ChatInput => FocusPane::Transcript,
            FocusPane::Transcript => FocusPane::Editor,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            FocusPane::Editor => FocusPane::Transcript,
            FocusPane::ChatInput => FocusPane::Editor,
            FocusPane::Transcript => FocusPane::ChatInput,
        }
    }
}

pub struct App<'a> {
    // Core state
    pub should_quit: bool,
    pub focus: FocusPane,
    pub connectivity: Connectivity,

    // Execution panel
    pub editor: TextArea<'a>,
    pub execution: ExecutionPanel,
    pub output_scroll: u16,

    // Chat panel
    pub chat: ChatPanel,
    pub chat_input: String,
    pub chat_cursor: usize, // cursor position in chat_input (chars)
    pub chat_scroll: u16,
    pub follow_chat: bool, // keep the newest turn in view

    // Source viewer
    pub modal: SourceModal,

    // Animation state
    pub animation_frame: u8, // 0-2 for the thinking ellipsis

    // Panel areas for mouse hit-testing (updated during render)
    pub editor_area: Option<Rect>,
    pub output_area: Option<Rect>,
    pub chat_area: Option<Rect>,
    pub input_area: Option<Rect>,
    pub modal_area: Option<Rect>,
    pub chip_areas: Vec<(Rect, usize)>,

    pub renderer: Box<dyn MarkdownRenderer>,
    api: Arc<dyn LabApi>,
    events: mpsc::UnboundedSender<AppEvent>,
}

fn new_editor<'a>(content: &str) -> TextArea<'a> {
    let mut editor = TextArea::new(content.lines().map(str::to_string).collect());
    editor.set_cursor_line_style(Style::default());
    editor.set_line_number_style(Style::default().fg(Color::DarkGray));
    editor.set_tab_length(4);
    editor.set_block(Block::default().borders(Borders::ALL));
    editor
}

impl<'a> App<'a> {
    pub fn new(
        settings: &Settings,
        api: Arc<dyn LabApi>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let renderer = markdown::select(settings.markdown);
        tracing::info!(
            server = api.server(),
            markdown = renderer.name(),
            language = %settings.language,
            "console starting"
        );

        Self {
            should_quit: false,
            focus: FocusPane::Editor,
            connectivity: Connectivity::Unknown,

            editor: new_editor(SAMPLE_CODE),
            execution: ExecutionPanel::new(
                settings.language,
                settings.lab_id.clone(),
                settings.endpoints.server(),
            ),
            output_scroll: 0,

            chat: ChatPanel::new(settings.lab_id.clone()),
            chat_input: String::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            follow_chat: true,

            modal: SourceModal::new(),

            animation_frame: 0,

            editor_area: None,
            output_area: None,
            chat_area: None,
            input_area: None,
            modal_area: None,
            chip_areas: Vec::new(),

            renderer,
            api,
            events,
        }
    }

    pub fn api(&self) -> Arc<dyn LabApi> {
        Arc::clone(&self.api)
    }

    /// Current editor content
    pub fn code(&self) -> String {
        self.editor.lines().join("\n")
    }

    pub fn run_code(&mut self) {
        let Some(request) = self.execution.begin_run(&self.code()) else {
            return;
        };
        self.output_scroll = 0;

        let api = self.api();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcome = api.run_code(&request).await;
            let _ = tx.send(AppEvent::RunFinished(outcome));
        });
    }

    pub fn submit_code(&mut self) {
        let Some(request) = self.execution.begin_submit(&self.code()) else {
            return;
        };
        self.output_scroll = 0;

        let api = self.api();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcome = api.submit_code(&request).await;
            let _ = tx.send(AppEvent::SubmitFinished(outcome));
        });
    }

    pub fn clear_editor(&mut self) {
        self.editor = new_editor("");
        self.execution.clear();
        self.output_scroll = 0;
    }

    pub fn send_chat(&mut self) {
        let code = self.code();
        let Some(pending) = self.chat.begin_send(&self.chat_input, &code) else {
            return;
        };
        self.chat_input.clear();
        self.chat_cursor = 0;
        self.follow_chat = true;

        let api = self.api();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcome = api.ask_chat(&pending.request).await;
            let _ = tx.send(AppEvent::ChatFinished {
                id: pending.id,
                outcome,
            });
        });
    }

    pub fn open_source(&mut self, name: &str) {
        let name = self.modal.open(name);
        tracing::debug!(name = %name, "opening source");

        let api = self.api();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcome = api.fetch_knowledge(&name).await;
            let _ = tx.send(AppEvent::KnowledgeFinished(outcome));
        });
    }

    pub fn open_selected_chip(&mut self) {
        if let Some(name) = self.chat.selected_source().map(|s| s.name.clone()) {
            self.open_source(&name);
        }
    }

    pub fn open_chip(&mut self, index: usize) {
        self.chat.select_chip(index);
        self.open_selected_chip();
    }

    /// Feed background results back into the controllers
    pub fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::Health(status) => self.connectivity = status,
            AppEvent::RunFinished(outcome) => self.execution.finish_run(outcome),
            AppEvent::SubmitFinished(outcome) => self.execution.finish_submit(outcome),
            AppEvent::ChatFinished { id, outcome } => {
                self.chat.finish_send(id, outcome);
                self.follow_chat = true;
            }
            AppEvent::KnowledgeFinished(outcome) => {
                self.modal.finish(outcome, self.renderer.as_ref())
            }
            AppEvent::Tick => self.tick_animation(),
            AppEvent::Key(_) | AppEvent::Mouse(_) | AppEvent::Resize(_, _) => {}
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.is_thinking() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.follow_chat = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }
}
