use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use ratatui::text::Text;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use labta::api::{HttpLabApi, LabApi};
use labta::app::App;
use labta::chat::ChatPanel;
use labta::config::{Config, Overrides, Settings};
use labta::execution::{ExecutionPanel, RunStatus};
use labta::markdown;
use labta::modal::{ModalBody, SourceModal};
use labta::state::{Connectivity, Language};
use labta::tui::{self, EventHandler, Tui};
use labta::{handler, poller, ui};

#[derive(Parser)]
#[command(name = "labta")]
#[command(version, about = "Terminal console for the Autonomous Lab TA: run code and ask the TA")]
struct Cli {
    /// Backend server URL
    #[arg(long, global = true, env = "LABTA_SERVER")]
    server: Option<String>,

    /// Path prefix of the API routes
    #[arg(long, global = true)]
    api_prefix: Option<String>,

    /// Lab the requests belong to
    #[arg(long, global = true)]
    lab_id: Option<String>,

    /// Use the minimal Markdown renderer
    #[arg(long, global = true)]
    plain: bool,

    /// Config file to read instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console (default)
    Tui {
        /// Initial editor language
        #[arg(short, long, value_parser = parse_language)]
        language: Option<Language>,
    },
    /// Check whether the backend is reachable
    Health,
    /// Run a program and print its output
    Run {
        /// Source file, or `-` for stdin
        file: String,
        #[arg(short, long, value_parser = parse_language)]
        language: Option<Language>,
    },
    /// Submit a program for grading
    Submit {
        /// Source file, or `-` for stdin
        file: String,
        #[arg(short, long, value_parser = parse_language)]
        language: Option<Language>,
    },
    /// Ask the teaching assistant a question
    Ask {
        question: String,
        /// Code to send along with the question
        #[arg(short, long)]
        code: Option<PathBuf>,
    },
    /// Print a knowledge document
    Knowledge {
        /// Document name, e.g. `loops.md`
        name: String,
    },
}

fn parse_language(s: &str) -> std::result::Result<Language, String> {
    Language::from_str(s).ok_or_else(|| {
        let known: Vec<&str> = Language::all().iter().map(|l| l.as_str()).collect();
        format!("unknown language '{}' (expected one of: {})", s, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tui { language: None });

    // The TUI owns the terminal, so its logs go to a file
    let _guard = match command {
        Commands::Tui { .. } => init_file_tracing(),
        _ => {
            init_stderr_tracing();
            None
        }
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let language = match &command {
        Commands::Tui { language }
        | Commands::Run { language, .. }
        | Commands::Submit { language, .. } => *language,
        _ => None,
    };
    let overrides = Overrides {
        server_url: cli.server,
        api_prefix: cli.api_prefix,
        lab_id: cli.lab_id,
        language,
        plain_markdown: cli.plain,
    };
    let settings = Settings::resolve(&config, &overrides);
    let api: Arc<dyn LabApi> = Arc::new(
        HttpLabApi::new(settings.endpoints.clone(), settings.request_timeout)
            .context("Failed to build HTTP client")?,
    );

    match command {
        Commands::Tui { .. } => run_tui(&settings, api).await,
        Commands::Health => check_health(api.as_ref()).await,
        Commands::Run { file, .. } => run_file(&settings, api.as_ref(), &file, false).await,
        Commands::Submit { file, .. } => run_file(&settings, api.as_ref(), &file, true).await,
        Commands::Ask { question, code } => ask(&settings, api.as_ref(), &question, code.as_deref()).await,
        Commands::Knowledge { name } => show_knowledge(&settings, api.as_ref(), &name).await,
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_stderr_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn init_file_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = match Config::log_dir() {
        Ok(dir) => dir,
        Err(_) => {
            // No log directory available; run without logging rather than
            // writing over the TUI
            tracing_subscriber::registry().with(env_filter()).init();
            return None;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "Failed to create log directory {:?}: {}. Logging to file disabled.",
            log_dir, e
        );
        tracing_subscriber::registry().with(env_filter()).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "labta.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(false)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}

async fn run_tui(settings: &Settings, api: Arc<dyn LabApi>) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let health = poller::spawn(Arc::clone(&api), poller::HEALTH_POLL_INTERVAL, events.sender());
    let mut app = App::new(settings, api, events.sender());

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    health.abort();
    tui::restore()?;
    tracing::info!("console closed");
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App<'_>, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

fn read_source(file: &str) -> Result<String> {
    if file == "-" {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        Ok(code)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))
    }
}

/// Plain text of rendered Markdown, for printing outside the TUI
fn plain_text(text: &Text) -> String {
    text.lines
        .iter()
        .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn check_health(api: &dyn LabApi) -> Result<()> {
    let status = api.check_health().await;
    let label = match status {
        Connectivity::Connected => status.label().green().bold(),
        _ => status.label().red().bold(),
    };
    println!("{} {}", label, api.server().dimmed());

    if status != Connectivity::Connected {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_file(settings: &Settings, api: &dyn LabApi, file: &str, grade: bool) -> Result<()> {
    let code = read_source(file)?;
    let mut panel = ExecutionPanel::new(
        settings.language,
        settings.lab_id.clone(),
        settings.endpoints.server(),
    );

    println!(
        "{} {} code...",
        if grade { "📝" } else { "▶" },
        panel.language.display_name().bold()
    );

    if grade {
        panel.submit(api, &code).await;
    } else {
        panel.run(api, &code).await;
    }

    let label = match panel.status() {
        RunStatus::Success => panel.status_label().green().bold(),
        RunStatus::Error => panel.status_label().red().bold(),
        RunStatus::Idle | RunStatus::Running => panel.status_label().normal(),
    };
    if !panel.status_label().is_empty() {
        println!("{}", label);
    }
    println!("{}", "=".repeat(40).dimmed());
    println!("{}", panel.output());

    if panel.status() != RunStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}

async fn ask(settings: &Settings, api: &dyn LabApi, question: &str, code: Option<&Path>) -> Result<()> {
    let code = match code {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let mut chat = ChatPanel::new(settings.lab_id.clone());
    println!("🤖 Asking the TA...\n");
    chat.send(api, question, &code).await;

    let Some(answer) = chat.turns().last() else {
        println!("{}", "Nothing to ask.".yellow());
        return Ok(());
    };

    let renderer = markdown::select(settings.markdown);
    println!("{}", "TA:".bold().yellow());
    println!("{}", plain_text(&renderer.render_message(answer.text())));

    if !answer.sources().is_empty() {
        println!("\n{}", "📚 Referenced Materials:".bold().blue());
        for source in answer.sources() {
            println!("  • {} {}", source.name.green(), source.hint().dimmed());
        }
    }
    Ok(())
}

async fn show_knowledge(settings: &Settings, api: &dyn LabApi, name: &str) -> Result<()> {
    let renderer = markdown::select(settings.markdown);
    let mut modal = SourceModal::new();
    modal.show(api, name, renderer.as_ref()).await;

    println!(
        "\n{} {}",
        format!("📖 {}", modal.title()).bold().green(),
        format!("[{}]", modal.category()).dimmed()
    );
    println!("{}", "=".repeat(50).dimmed());

    match modal.body() {
        ModalBody::Document(text) => println!("{}", plain_text(text)),
        ModalBody::Failed(message) => {
            eprintln!("{}", message.red());
            std::process::exit(1);
        }
        ModalBody::Loading => {}
    }
    Ok(())
}
