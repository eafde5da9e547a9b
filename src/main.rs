//! accessfeed CLI - subscribes to access-control events and prints them.
//!
//! This is the main binary entry point. See the `accessfeed` library for
//! the core functionality.

use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use accessfeed::cli::{self, Invocation};
use accessfeed::config::OutputMode;
use accessfeed::{runner, Config, ConsoleHandler, EventHandler, LogHandler};
use anyhow::{Context, Result};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let stop = watch_ctrl_c();
    let (code, pause) = run_cli(stop).await;
    if pause {
        pause_for_enter();
    }
    code
}

/// Runs one invocation. Returns the exit code and whether to wait for
/// acknowledgment before exiting.
async fn run_cli(stop: CancellationToken) -> (ExitCode, bool) {
    let default_pause = Config::default().pause_on_exit;

    let mode = match cli::parse(std::env::args_os()) {
        Ok(Invocation::Help) => {
            println!("{}", cli::usage());
            return (ExitCode::SUCCESS, default_pause);
        }
        Ok(Invocation::Run(mode)) => mode,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("{}", cli::usage());
            return (ExitCode::from(EXIT_USAGE), default_pause);
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return (ExitCode::from(EXIT_FAILURE), default_pause);
        }
    };

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("Warning: {e:#}");
    }
    log::debug!("Loaded configuration: {:?}", config);

    let handler: Arc<dyn EventHandler> = match config.output {
        OutputMode::Console => Arc::new(ConsoleHandler::new()),
        OutputMode::Log => Arc::new(LogHandler::new()),
    };

    let code = match runner::run(&config, mode, handler, stop).await {
        Ok(outcome) => {
            log::info!(
                "Run finished for subscription {} (listened: {})",
                outcome.subscription.id,
                outcome.listened
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Run failed: {:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    };
    (code, config.pause_on_exit)
}

/// Initializes `env_logger`, honoring `RUST_LOG` over the configured level.
///
/// Logs go to stderr, or to `ACCESSFEED_LOG_FILE` when set. Falls back to
/// stderr if that file cannot be created.
fn init_logging(default_level: &str) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_secs();

    let mut outcome = Ok(());
    if let Ok(path) = std::env::var("ACCESSFEED_LOG_FILE") {
        match std::fs::File::create(&path).with_context(|| format!("cannot create log file {path}")) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => outcome = Err(e),
        }
    }

    builder.try_init().context("logger already initialized")?;
    outcome
}

/// Cancels the returned token on Ctrl+C. Must run before any network call.
fn watch_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Stop requested");
                stop.cancel();
            }
            Err(e) => log::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });
    token
}

fn pause_for_enter() {
    if !atty::is(atty::Stream::Stdin) {
        return;
    }
    print!("Press Enter to exit...");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}
