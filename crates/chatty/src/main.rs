//! chatty CLI entry point.
//!
//! `connect` attaches to a running LLM kernel and reads queries from stdin.
//! `replay` routes a recorded message transcript into a notebook offline.
//! `config` shows or changes the stored settings.

use std::path::{Path, PathBuf};

use chatty::console::{parse_line, ConsoleCommand};
use chatty::dump::{self, DumpWriter};
use chatty::kernel::{self, ConnectOptions};
use chatty::settings::{load_settings, settings_path, update_settings, ChattySettings, SettingsUpdate};
use chatty::{
    ContextForm, DispatchOutcome, InputEvent, NotebookState, PreviewPane, QueryBox, RouteOutcome,
    SessionContext,
};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "chatty")]
#[command(about = "LLM side panel for a live Jupyter notebook")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Session name for outbound requests (default: from settings)
    #[arg(long, global = true)]
    session: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attach to a running kernel and send queries typed on stdin
    Connect {
        /// Jupyter connection file of the LLM kernel
        connection_file: PathBuf,

        /// Notebook that replies are appended to; saved on exit
        #[arg(long)]
        notebook: Option<PathBuf>,

        /// Write every message sent and received to this JSON-lines file
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Route recorded kernel messages into a notebook
    Replay {
        /// JSON-lines file of inbound messages or dump entries
        messages: PathBuf,

        /// Notebook to start from
        #[arg(long)]
        notebook: Option<PathBuf>,

        /// Where to save the result (default: the --notebook path)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the stored settings, or change them (with --session and the flags below)
    Config {
        /// Context name used by `:context` when none is given
        #[arg(long)]
        default_context: Option<String>,

        /// Buffer size of the kernel bridge channels
        #[arg(long)]
        channel_capacity: Option<usize>,

        /// Seconds to wait for the kernel heartbeat
        #[arg(long)]
        heartbeat_timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if let Commands::Config {
        default_context,
        channel_capacity,
        heartbeat_timeout_secs,
    } = cli.command
    {
        return config(SettingsUpdate {
            session_name: cli.session,
            default_context,
            channel_capacity,
            heartbeat_timeout_secs,
        });
    }

    let mut settings = load_settings();
    if let Some(session) = cli.session {
        settings.session_name = session;
    }

    match cli.command {
        Commands::Connect {
            connection_file,
            notebook,
            dump,
        } => connect(&settings, &connection_file, notebook, dump).await,
        Commands::Replay {
            messages,
            notebook,
            output,
        } => replay(&settings, &messages, notebook, output),
        Commands::Config { .. } => Ok(()),
    }
}

fn config(update: SettingsUpdate) -> anyhow::Result<()> {
    let settings = if update.is_empty() {
        load_settings()
    } else {
        let settings = update_settings(&update)?;
        info!("Saved settings to {}", settings_path().display());
        settings
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn open_notebook(path: Option<&Path>) -> anyhow::Result<NotebookState> {
    match path {
        Some(path) => NotebookState::open_or_create(path),
        None => Ok(NotebookState::new_empty()),
    }
}

fn save_notebook(session: &SessionContext, path: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let notebook = session.notebook();
    let mut notebook = notebook
        .lock()
        .map_err(|_| anyhow::anyhow!("notebook lock poisoned"))?;
    notebook.save_to(path)?;
    info!("Saved {} cells to {}", notebook.len(), path.display());
    Ok(())
}

fn print_preview(session: &SessionContext) {
    match session.preview().lock() {
        Ok(preview) => println!("{}", preview.text()),
        Err(_) => warn!("Preview lock poisoned"),
    }
}

fn print_cells(session: &SessionContext) {
    let notebook = session.notebook();
    let Ok(notebook) = notebook.lock() else {
        warn!("Notebook lock poisoned");
        return;
    };
    for cell in notebook.cells_for_frontend() {
        let first_line = cell.source().lines().next().unwrap_or("");
        println!("{:<24} {}", cell.id(), first_line);
    }
}

async fn connect(
    settings: &ChattySettings,
    connection_file: &Path,
    notebook_path: Option<PathBuf>,
    dump_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let notebook = open_notebook(notebook_path.as_deref())?;
    let mut session = SessionContext::new(
        settings.session_name.clone(),
        notebook,
        PreviewPane::default(),
    );

    let dump = dump_path.as_deref().map(DumpWriter::create).transpose()?;
    let ready = kernel::spawn_connect(
        connection_file,
        ConnectOptions {
            session_name: settings.session_name.clone(),
            channel_capacity: settings.channel_capacity,
            heartbeat_timeout: settings.heartbeat_timeout(),
            dump,
        },
    );
    session.wait_ready(ready).await?;

    let mut query = QueryBox::new();
    let mut context_form = ContextForm::new(settings.default_context.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let result = match parse_line(&line, &settings.default_context) {
            ConsoleCommand::Query(text) => {
                query.set_value(text);
                query.handle(InputEvent::SubmitClicked, &session)
            }
            ConsoleCommand::Context { name, info } => {
                context_form.set_context(name);
                context_form.set_info_text(info);
                context_form.handle(InputEvent::SubmitClicked, &session)
            }
            ConsoleCommand::Preview => {
                print_preview(&session);
                continue;
            }
            ConsoleCommand::Cells => {
                print_cells(&session);
                continue;
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::Unknown(verb) => {
                eprintln!("unknown command :{}", verb);
                continue;
            }
        };

        match result {
            Ok(DispatchOutcome::Sent { msg_id }) => info!("Sent {}", msg_id),
            Ok(DispatchOutcome::NoKernel) => eprintln!("no kernel attached"),
            Ok(DispatchOutcome::Ignored) => {}
            Err(e) => eprintln!("error: {}", e),
        }
    }

    session.teardown();
    save_notebook(&session, notebook_path.as_deref())
}

fn replay(
    settings: &ChattySettings,
    messages_path: &Path,
    notebook_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let messages = dump::read_replay(messages_path)?;
    let notebook = open_notebook(notebook_path.as_deref())?;
    let session = SessionContext::new(
        settings.session_name.clone(),
        notebook,
        PreviewPane::default(),
    );

    let router = session.router();
    let mut inserted = 0;
    let mut dropped = 0;
    for message in &messages {
        match router.route(message) {
            RouteOutcome::CellInserted { .. } => inserted += 1,
            RouteOutcome::Dropped { .. } => dropped += 1,
            _ => {}
        }
    }
    info!(
        "Replayed {} messages: {} cells inserted, {} dropped",
        messages.len(),
        inserted,
        dropped
    );

    print_preview(&session);
    save_notebook(&session, output.or(notebook_path).as_deref())
}
