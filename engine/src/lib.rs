pub mod audio;
pub mod channel;
pub mod cli;
pub mod config;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod models;
pub mod progress;
pub mod redirect;
pub mod transcribe;
pub mod vad;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use scriptgrab_proto::Message;
use tokio::task::JoinError;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::channel::Emitter;
use crate::cli::Args;
use crate::config::{Config, LoggingConfig};
use crate::engine::Engine;
use crate::error::{EXIT_CANCELLED, EXIT_FAILURE, EXIT_SUCCESS};
use crate::models::ModelManager;
use crate::redirect::StdioSegregator;
use crate::transcribe::WhisperBackend;

/// Application-specific environment variable for log filtering (overrides config).
const LOG_ENV_VAR: &str = "SCRIPTGRAB_LOG";

/// Entry point of the engine binary. Returns the process exit code.
pub async fn run() -> i32 {
    // Claim the protocol channel before any library can write to stdout.
    let out = match redirect::claim_protocol_stdout() {
        Ok(out) => out,
        Err(e) => {
            eprintln!("engine: cannot open protocol channel: {e}");
            return EXIT_FAILURE;
        }
    };
    let emitter = Emitter::new(out);
    // Listen from the start so an interrupt during setup is not lost.
    let mut interrupts = Interrupts::listen();

    let args = match Args::try_parse() {
        Ok(args) => args,
        // --help and --version
        Err(err) if !err.use_stderr() => {
            eprint!("{err}");
            return EXIT_SUCCESS;
        }
        Err(err) => return setup_failure(&emitter, cli::usage_error(&err)),
    };

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return setup_failure(&emitter, format!("{e:#}")),
    };

    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => return setup_failure(&emitter, format!("Failed to initialize logging: {e:#}")),
    };

    // Route whisper.cpp and GGML logs through tracing
    whisper_rs::install_logging_hooks();

    let models_dir = match config.models_dir() {
        Ok(dir) => dir,
        Err(e) => return setup_failure(&emitter, format!("{e:#}")),
    };

    let request = args.into_request(&config);
    let backend = WhisperBackend::new(
        ModelManager::with_dir(models_dir),
        tokio::runtime::Handle::current(),
    );
    let engine = Engine::new(backend, StdioSegregator, emitter.clone());

    let mut task = tokio::task::spawn_blocking(move || engine.run(&request).exit_code());

    tokio::select! {
        joined = &mut task => finish(joined, &emitter),
        () = interrupts.recv() => {
            info!("Interrupt received");
            match crate::engine::report_cancellation(&emitter) {
                Ok(true) => EXIT_CANCELLED,
                // The run already ended; its outcome stands.
                Ok(false) => finish(task.await, &emitter),
                Err(e) => {
                    error!(error = %e, "Failed to report cancellation");
                    EXIT_CANCELLED
                }
            }
        }
    }
}

/// SIGINT listener installed before setup; resolves on the first interrupt.
struct Interrupts {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Interrupts {
    #[cfg(unix)]
    fn listen() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        let signal = signal(SignalKind::interrupt())
            // Logging is not up yet.
            .inspect_err(|e| eprintln!("engine: cannot listen for interrupts: {e}"))
            .ok();
        Self { signal }
    }

    #[cfg(not(unix))]
    fn listen() -> Self {
        Self {}
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        match self.signal.as_mut() {
            Some(signal) => {
                if signal.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
    }
}

fn finish(joined: Result<i32, JoinError>, emitter: &Emitter) -> i32 {
    match joined {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Transcription task failed");
            if let Err(e) = emitter.emit(&Message::error(format!("Internal error: {e}"))) {
                error!(error = %e, "Failed to report internal error");
            }
            EXIT_FAILURE
        }
    }
}

fn setup_failure(emitter: &Emitter, message: String) -> i32 {
    if let Err(e) = emitter.emit(&Message::error(message)) {
        eprintln!("engine: {e}");
    }
    EXIT_FAILURE
}

/// Log to stderr, and to a file when configured.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // SCRIPTGRAB_LOG env var overrides config file level
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(logging.level.as_directive().parse()?)
        .from_env()?;

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(file_layer)
        .with(filter)
        .try_init()?;

    Ok(guard)
}
