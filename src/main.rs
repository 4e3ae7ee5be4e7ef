use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tempod::{config::DaemonConfig, ipc, storage::Storage, AppContext};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "tempod",
    about = "Task & time tracking daemon — JSON-RPC over WebSocket",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "TEMPOD_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "TEMPOD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TEMPOD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TEMPOD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TEMPOD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs tempod in the foreground.
    ///
    /// Examples:
    ///   tempod serve
    ///   tempod
    Serve,
    /// Run one deadline sweep against the database and exit.
    ///
    /// Creates deadline notifications for tasks due within the next 24 hours,
    /// skipping tasks already notified in the last 24 hours. Useful from cron
    /// when the daemon is not running continuously.
    ///
    /// Examples:
    ///   tempod scan
    Scan,
    /// Reclaim disk space from the SQLite database (VACUUM) and exit.
    ///
    /// Examples:
    ///   tempod vacuum
    Vacuum,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(DaemonConfig::new(
        args.port,
        args.data_dir,
        args.log.clone(),
        args.bind_address,
    ));

    // Init once — must happen before any tracing calls.
    let _file_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    match args.command {
        Some(Command::Scan) => {
            let storage = Storage::new(&config.data_dir).await?;
            let ctx = AppContext::new(config, Arc::new(storage));
            let created = ctx.notifier.scan_deadlines().await?;
            info!(created, "deadline sweep complete");
        }
        Some(Command::Vacuum) => {
            let storage = Storage::new(&config.data_dir).await?;
            storage.vacuum().await?;
            info!("vacuum complete");
        }
        None | Some(Command::Serve) => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: Arc<DaemonConfig>) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        port = config.port,
        "starting tempod"
    );

    let storage = Arc::new(Storage::new_with_slow_query(&config.data_dir, config.slow_query_ms).await?);
    let ctx = Arc::new(AppContext::new(config.clone(), storage));

    spawn_deadline_loop(ctx.clone());

    ipc::run(ctx).await
}

/// Periodic deadline sweep.  Interval comes from config; 0 disables the loop
/// entirely (a one-off sweep is still available via `tempod scan`).
fn spawn_deadline_loop(ctx: Arc<AppContext>) {
    let interval_secs = ctx.config.deadline_scan_interval_secs;
    if interval_secs == 0 {
        info!("deadline scan loop disabled (interval = 0)");
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match ctx.notifier.scan_deadlines().await {
                Ok(created) if created > 0 => {
                    info!(created, "deadline sweep created notifications");
                }
                Ok(_) => {}
                Err(e) => warn!(err = %e, "deadline sweep failed"),
            }
        }
    });
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("tempod.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
