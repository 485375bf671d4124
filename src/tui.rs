use std::io::{self, Stderr};
use std::time::Duration;
use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEvent, KeyEventKind, MouseEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::state::{ChatReply, Connectivity, ExecutionResult, KnowledgeDocument, SubmissionReport};

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

/// Drives the "Thinking..." ellipsis
pub const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
    Health(Connectivity),
    RunFinished(Result<ExecutionResult, ApiError>),
    SubmitFinished(Result<SubmissionReport, ApiError>),
    ChatFinished { id: u64, outcome: Result<ChatReply, ApiError> },
    KnowledgeFinished(Result<KnowledgeDocument, ApiError>),
}

impl From<Connectivity> for AppEvent {
    fn from(status: Connectivity) -> Self {
        AppEvent::Health(status)
    }
}

/// Map a raw terminal event; key releases and focus/paste events are ignored
fn from_terminal(event: Event) -> Option<AppEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
        Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
        Event::Resize(w, h) => Some(AppEvent::Resize(w, h)),
        _ => None,
    }
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_terminal(tx.clone()));
        tokio::spawn(tick(tx.clone()));
        Self { rx, tx }
    }

    /// Sender for background tasks reporting back to the UI loop
    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_terminal(tx: mpsc::UnboundedSender<AppEvent>) {
    let mut reader = EventStream::new();
    while let Some(evt) = reader.next().await {
        match evt {
            Ok(evt) => {
                if let Some(event) = from_terminal(evt) {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "terminal event stream error"),
        }
    }
}

async fn tick(tx: mpsc::UnboundedSender<AppEvent>) {
    let mut interval = tokio::time::interval(TICK_RATE);
    loop {
        interval.tick().await;
        if tx.send(AppEvent::Tick).is_err() {
            break;
        }
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    // Mouse capture for chip clicks and dismissing the source viewer
    execute!(io::stderr(), EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(io::stderr()))?)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), DisableMouseCapture, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Install panic hook to restore terminal on panic
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        original_hook(panic_info);
    }));
}
