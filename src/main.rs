// ABOUTME: Main entry point for the anonymous chat relay bot
// ABOUTME: Initializes logging, config, metrics, the Telegram poller, dispatcher, and liveness server

use anonchat::{
    config::Config,
    dispatcher::Dispatcher,
    metrics, paths,
    platform::TelegramPlatform,
    server::{self, BotStatus, ServerState},
    RelayOrchestrator,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "anonchat", version, about = "Anonymous 1:1 chat relay bot")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Also write logs to a daily rolling file in the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot and the liveness server (default)
    Run,
    /// Print the loaded configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log panics before the process goes down
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(panic = %panic_info, "Panic");
        eprintln!("{}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();
    let _log_guard = init_logging(cli.json_logs, cli.log_file)?;

    dotenvy::dotenv().ok();
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Config => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

fn init_logging(json: bool, log_file: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let (file_layer, guard) = if log_file {
        let dir = paths::log_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, "anonchat.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        oversight = ?config.oversight.spectator_group_id,
        admin_ids = config.telegram.admin_ids.len(),
        health_port = config.health.port,
        "Configuration loaded"
    );
    if !config.telegram.admin_ids.is_empty() {
        tracing::debug!("ADMIN_IDS is set but no operation consults it");
    }

    let metrics_handle = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let platform = TelegramPlatform::new(&config.telegram).await?;
    let transport = Arc::new(platform.transport());
    let orchestrator = Arc::new(RelayOrchestrator::new(
        transport,
        config.oversight.destination(),
    ));

    // Liveness server runs beside the bot; losing it never stops relaying
    let status = BotStatus::new(Arc::clone(&orchestrator), platform.connection_state_handle());
    let server_state = ServerState::new(Arc::new(status), metrics_handle);
    let health_config = config.health.clone();
    tokio::spawn(async move {
        if let Err(e) = server::start_server(&health_config, server_state).await {
            tracing::error!(error = %e, "Liveness server stopped");
        }
    });

    let events = platform.event_stream().await?;
    let dispatcher = Dispatcher::new(orchestrator);

    tracing::info!("Bot started");
    tokio::select! {
        _ = dispatcher.run(events) => {
            tracing::warn!("Event stream closed");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received Ctrl-C, shutting down");
        }
    }

    platform.shutdown().await
}
