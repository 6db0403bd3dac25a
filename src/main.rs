//! Discord bot entry point.
//!
//! Sets up logging, loads configuration, and runs the bot until SIGINT /
//! SIGTERM, at which point the gateway is closed cleanly.

use std::process::ExitCode;

use tracing::{error, info};

use tchola_bot::bot::{Bot, BotError};
use tchola_bot::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise tracing (respects RUST_LOG env, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bot = match startup().await {
        Ok(bot) => bot,
        Err(e) => {
            error!(error = %e, "failed to start bot");
            return ExitCode::FAILURE;
        }
    };

    info!("bot online, press Ctrl-C to stop");

    let interrupted = tokio::select! {
        _ = bot.run() => false,
        _ = shutdown_signal() => true,
    };

    let result = if interrupted {
        bot.shutdown().await
    } else {
        bot.finish().await
    };

    match result {
        Ok(()) => {
            info!("bot stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "bot stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn startup() -> Result<Bot, BotError> {
    let config = Config::from_env()?;
    Bot::start(config).await
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
