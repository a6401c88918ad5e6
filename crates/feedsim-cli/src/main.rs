#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "feedsim: deterministic event-sourced social-feed simulator",
    long_about = None
)]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true, default_value = "feedsim.db")]
    db_path: PathBuf,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        name = "init-db",
        about = "Initialize the database schema",
        after_help = "EXAMPLES:\n    # Create a fresh database\n    feedsim init-db\n\n    # Drop and recreate an existing one\n    feedsim init-db --force"
    )]
    InitDb(cmd::init_db::InitDbArgs),

    #[command(
        about = "Run a simulation",
        after_help = "EXAMPLES:\n    # Five agents for ten ticks under hot ranking\n    feedsim simulate --ticks 10 --agents 5 --ranking hot --seed 42"
    )]
    Simulate(cmd::simulate::SimulateArgs),

    #[command(
        about = "Rebuild all projections from the event log",
        after_help = "EXAMPLES:\n    # Drop projections and replay every event\n    feedsim replay"
    )]
    Replay,

    #[command(
        about = "Compute and display KPIs",
        after_help = "EXAMPLES:\n    # Human-readable report\n    feedsim kpis\n\n    # Machine-readable report\n    feedsim kpis --json-output"
    )]
    Kpis(cmd::kpis::KpisArgs),

    #[command(
        about = "Show recent events from the log",
        after_help = "EXAMPLES:\n    # Last 20 events\n    feedsim events\n\n    # Only action events\n    feedsim events --event-type action --limit 50"
    )]
    Events(cmd::events::EventsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FEEDSIM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("feedsim=info,warn"));

    let format = env::var("FEEDSIM_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr so --json output on stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();

    match cli.command {
        Commands::InitDb(ref args) => cmd::init_db::run_init_db(args, &cli.db_path, output),
        Commands::Simulate(ref args) => cmd::simulate::run_simulate(args, &cli.db_path, output),
        Commands::Replay => cmd::replay::run_replay(&cli.db_path, output),
        Commands::Kpis(ref args) => cmd::kpis::run_kpis(args, &cli.db_path, output),
        Commands::Events(ref args) => cmd::events::run_events(args, &cli.db_path, output),
    }
}
