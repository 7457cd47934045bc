use std::path::PathBuf;
use std::process::ExitCode;

use argus_core::{ConfigError, default_config_path, load_config, sample_config, save_config, validate};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;

mod replay;

#[derive(Parser)]
#[command(version, about = "argus: pixel probes in, scheduled inputs out")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a daily-rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the configuration
    Validate,
    /// Run every enabled client against a directory of PNG frames
    Replay {
        /// Directory of .png frames, replayed in file name order
        #[arg(short, long)]
        frames: PathBuf,

        #[arg(short, long, default_value_t = 10)]
        duration_secs: u64,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let path = match cli.config {
        Some(path) => path,
        None => default_config_path().ok_or("no platform config directory, pass --config")?,
    };

    match cli.command {
        Commands::Init { force } => init(path, force),
        Commands::Validate => validate_file(path),
        Commands::Replay {
            frames,
            duration_secs,
            json,
        } => replay::run(&path, &frames, duration_secs, json).await,
    }
}

fn init(path: PathBuf, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()));
    }
    save_config(&path, &sample_config()).map_err(|e| error_chain(&e))?;
    println!("wrote sample configuration to {}", path.display());
    Ok(())
}

fn validate_file(path: PathBuf) -> Result<(), String> {
    let config = load_config(&path).map_err(|e| error_chain(&e))?;

    match validate(&config) {
        Ok(()) => {}
        Err(ConfigError::Invalid(issues)) => {
            for issue in &issues {
                println!("  {issue}");
            }
            return Err(format!("{} issue(s) in {}", issues.len(), path.display()));
        }
        Err(e) => return Err(error_chain(&e)),
    }

    println!("{}: ok", path.display());
    println!(
        "  queue: {} slots, {} workers",
        config.queue.max_queue_size, config.queue.max_concurrency
    );
    for client in &config.clients {
        println!(
            "  client {}{}: {} Hz, {} probe(s), {} periodic, {} member(s)",
            client.name,
            if client.enabled { "" } else { " (disabled)" },
            client.tick_hz,
            client.probes.len(),
            client.periodic.len(),
            client.members.len(),
        );
    }
    Ok(())
}

/// Render an error with its sources, outermost first.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Initialize logging to a daily-rolling file in `log_dir`, otherwise stderr.
/// The returned guard flushes the file writer when dropped.
fn init_logging(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::daily(dir, "argus.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Some(guard);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    None
}
