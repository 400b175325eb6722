//! Design-on-Graph CLI
//!
//! - `serve`: browser chat front end with an inline graph panel
//! - `ask` / `chat`: answer questions from the terminal
//! - `render` / `sweep`: artifact tooling without any model or database

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dograph_assistant::{Assistant, AssistantConfig, ConversationHistory, TurnResponse};
use dograph_viz::{ArtifactRef, GraphRenderer, RenderOptions};

mod server;

#[derive(Parser)]
#[command(name = "dograph")]
#[command(
    author,
    version,
    about = "Design-on-Graph: knowledge-graph assistant for assembly system design"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Artifact directory (defaults to DOGRAPH_STATIC_DIR or `static`).
    #[arg(long, global = true)]
    static_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the chat page and JSON API.
    Serve(ServeArgs),

    /// Answer a single question and exit.
    Ask {
        /// The question, quoted.
        question: String,
    },

    /// Interactive session with line editing; history is kept across turns.
    Chat,

    /// Render a JSON array of result records to an HTML graph.
    Render {
        /// Input JSON file (an array of objects)
        #[arg(short, long)]
        input: PathBuf,

        /// Page title
        #[arg(long)]
        title: Option<String>,
    },

    /// Delete artifacts older than the retention window.
    Sweep {
        /// Maximum age in seconds (defaults to DOGRAPH_RETENTION_SECS or 3600)
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Listen address.
    #[arg(long, default_value = "127.0.0.1:7860")]
    pub listen: std::net::SocketAddr,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(static_dir: Option<PathBuf>) -> Result<AssistantConfig> {
    let mut config = AssistantConfig::from_env()?;
    if let Some(dir) = static_dir {
        config.static_dir = dir;
    }
    Ok(config)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.static_dir)?;

    match cli.command {
        Commands::Serve(args) => server::cmd_serve(args, config),
        Commands::Ask { question } => cmd_ask(&config, &question),
        Commands::Chat => cmd_chat(&config),
        Commands::Render { input, title } => cmd_render(&config, &input, title),
        Commands::Sweep { max_age_secs } => {
            let max_age = max_age_secs
                .map(Duration::from_secs)
                .unwrap_or(config.retention);
            cmd_sweep(&config, max_age)
        }
    }
}

fn print_turn(turn: &TurnResponse) {
    println!("{}", turn.answer);
    if let Some(cypher) = &turn.cypher {
        eprintln!("{} {}", "cypher:".dimmed(), cypher);
    }
    if let Some(artifact) = &turn.artifact {
        eprintln!("{} {}", "graph:".green(), artifact.path.display());
    }
}

fn cmd_ask(config: &AssistantConfig, question: &str) -> Result<()> {
    let assistant = Assistant::from_config(config)?;
    let mut history = ConversationHistory::new(config.history_window);
    let turn = assistant.handle_turn(&mut history, question);
    print_turn(&turn);
    Ok(())
}

/// One line of input to the interactive session.
#[derive(Debug, PartialEq, Eq)]
enum ChatLine<'a> {
    Skip,
    Exit,
    Clear,
    Ask(&'a str),
}

fn parse_chat_line(line: &str) -> ChatLine<'_> {
    match line.trim() {
        "" => ChatLine::Skip,
        "exit" | "quit" => ChatLine::Exit,
        "clear" => ChatLine::Clear,
        q => ChatLine::Ask(q),
    }
}

fn cmd_chat(config: &AssistantConfig) -> Result<()> {
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    let assistant = Assistant::from_config(config)?;
    let mut history = ConversationHistory::new(config.history_window);

    println!("{}", "Design-on-Graph".green().bold());
    println!("Type `clear` to reset history, `exit` or Ctrl-D to quit.\n");

    let mut rl = DefaultEditor::new().map_err(|e| anyhow!("failed to init rustyline: {e}"))?;

    loop {
        let line = match rl.readline("> ") {
            Ok(l) => l,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => return Err(anyhow!("readline error: {e}")),
        };

        let question = match parse_chat_line(&line) {
            ChatLine::Skip => continue,
            ChatLine::Exit => break,
            ChatLine::Clear => {
                history.clear();
                eprintln!("{}", "history cleared".dimmed());
                continue;
            }
            ChatLine::Ask(q) => q,
        };

        rl.add_history_entry(question)
            .map_err(|e| anyhow!("failed to record history: {e}"))?;

        dograph_viz::sweep(&config.static_dir, config.retention);
        let turn = assistant.handle_turn(&mut history, question);
        eprintln!("{} {}", "route:".dimmed(), turn.route);
        print_turn(&turn);
    }
    Ok(())
}

fn cmd_render(config: &AssistantConfig, input: &Path, title: Option<String>) -> Result<()> {
    let artifact = render_records_file(&config.static_dir, input, title)?;
    println!("{}", artifact.path.display());
    Ok(())
}

fn render_records_file(out_dir: &Path, input: &Path, title: Option<String>) -> Result<ArtifactRef> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", input.display()))?;
    let serde_json::Value::Array(records) = value else {
        return Err(anyhow!("{} must contain a JSON array of records", input.display()));
    };

    let mut options = RenderOptions::default();
    if let Some(title) = title {
        options.title = title;
    }
    let renderer = GraphRenderer::new(out_dir).with_options(options);
    Ok(renderer.render(&records)?)
}

fn cmd_sweep(config: &AssistantConfig, max_age: Duration) -> Result<()> {
    let report = dograph_viz::sweep(&config.static_dir, max_age);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failed > 0 {
        eprintln!("{} {} file(s) could not be removed", "warning:".yellow(), report.failed);
    }
    Ok(())
}
