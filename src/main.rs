//! Claude Watch - live monitor for Claude Code hook and telemetry logs.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_watch::config::{ConfigLoader, MonitorConfig};
use claude_watch::display::{self, RenderOptions};
use claude_watch::hooks::HookRecorder;
use claude_watch::monitor::{CommandSender, Monitor, MonitorCommand};
use claude_watch::session::SessionRegistry;

#[derive(Parser)]
#[command(
    name = "claude-watch",
    about = "Live monitor for Claude Code hook and telemetry logs",
    disable_version_flag = true
)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long)]
    version: bool,

    /// Increase log verbosity (--verbose, --verbose --verbose, ...)
    #[arg(long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to load instead of the default search paths
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log directory, overriding the config file and CLAUDE_WATCH_DIR
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a session's events live (default).
    Run(RunArgs),
    /// List active sessions, newest first.
    Sessions,
    /// Record a hook invocation read from stdin.
    Hook {
        /// Hook command to run first; its exit code is mirrored.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Session to attach to instead of the most recent one.
    session_id: Option<String>,
    /// Attach even if the session's process has exited.
    #[arg(long)]
    skip_check: bool,
    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,
    /// Do not truncate long values.
    #[arg(long)]
    raw: bool,
    /// Only tail hook logs.
    #[arg(long)]
    no_telemetry: bool,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<MonitorConfig, claude_watch::config::ConfigError> {
    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    Ok(loader.load()?.with_base_dir_override(cli.dir.clone()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("claude-watch {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    init_tracing(cli.verbose);

    let config = load_config(&cli);
    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Hook { command } => {
            // A broken config must never block the producer.
            let config = config.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Using default configuration");
                MonitorConfig::default()
                    .with_env_overrides()
                    .with_base_dir_override(cli.dir.clone())
            });
            record_hook(&config, &command).await
        }
        Commands::Run(args) => match config {
            Ok(config) => run_monitor(config, args).await,
            Err(err) => {
                display::print_error(&err.to_string());
                ExitCode::FAILURE
            }
        },
        Commands::Sessions => match config {
            Ok(config) => {
                let mut registry = SessionRegistry::new(config.layout())
                    .with_cleanup(config.cleanup_dead_sessions);
                display::print_sessions(&registry.discover(None));
                ExitCode::SUCCESS
            }
            Err(err) => {
                display::print_error(&err.to_string());
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_monitor(mut config: MonitorConfig, args: RunArgs) -> ExitCode {
    if args.no_telemetry {
        config.telemetry = false;
    }
    let options = RenderOptions {
        raw: args.raw,
        json: args.json,
    };
    tracing::info!(
        base_dir = %config.base_dir.display(),
        session_id = ?args.session_id,
        telemetry = config.telemetry,
        "Starting monitor"
    );

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            display::render(&update, options);
        }
    });

    let registry =
        SessionRegistry::new(config.layout()).with_cleanup(config.cleanup_dead_sessions);
    let mut monitor = Monitor::new(&config, registry, updates_tx);
    monitor.start(args.session_id, args.skip_check);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted");
            ctrl_c.cancel();
        }
    });

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    spawn_command_reader(commands_tx);

    monitor.run(commands_rx, cancel).await;
    if let Err(err) = renderer.await {
        tracing::warn!(error = %err, "Renderer task failed");
    }
    ExitCode::SUCCESS
}

/// Read interactive commands from stdin on a plain thread.
///
/// A blocked terminal read must not hold up runtime shutdown, so this
/// stays off the tokio blocking pool.
fn spawn_command_reader(commands: CommandSender) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match MonitorCommand::parse(&line) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => display::print_error(&format!(
                    "Unknown command {:?} (s switch, i ignore, r retry, q quit)",
                    line.trim()
                )),
            }
        }
    });
}

async fn record_hook(config: &MonitorConfig, command: &[String]) -> ExitCode {
    let mut input = String::new();
    if let Err(err) = tokio::io::stdin().read_to_string(&mut input).await {
        display::print_error(&format!("Failed to read hook input: {err}"));
        return ExitCode::FAILURE;
    }

    let recorder = HookRecorder::from_config(config);
    match recorder.record(&input, command).await {
        Ok(report) => {
            if let Some(outcome) = &report.outcome {
                print!("{}", outcome.stdout);
                eprint!("{}", outcome.stderr);
            }
            ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
        }
        Err(err) => {
            display::print_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
