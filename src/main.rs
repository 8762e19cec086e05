//! botpair - Sign in to a web application through a Telegram bot
//!
//! The web app asks for a pairing token, the user sends it to the bot, and the
//! confirmed token is exchanged for a session.

use anyhow::Result;
use botpair_auth::{Reconciler, ReconcilerConfig, RequestStore, TelegramGateway};
use botpair_core::config::{DEFAULT_ERROR_MSG, DEFAULT_SUCCESS_MSG};
use botpair_core::Config;
use botpair_server::{
    create_router, AppState, Handshake, MemorySessionIssuer, PassthroughAvatars,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// botpair - Telegram bot login for web applications
#[derive(Parser, Debug)]
#[command(name = "botpair")]
#[command(version, about, long_about = None)]
struct Args {
    /// Telegram bot token
    #[arg(long, env = "BOTPAIR_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Provider name used in routes and account ids
    #[arg(long, default_value = "telegram")]
    provider: String,

    /// Pairing token lifetime in seconds
    #[arg(long, default_value = "600")]
    token_ttl: u64,

    /// Interval between polls of the bot API in milliseconds
    #[arg(long, default_value = "1000")]
    poll_interval: u64,

    /// Timeout for bot API and session calls in seconds
    #[arg(long, default_value = "5")]
    request_timeout: u64,

    /// Session lifetime in seconds
    #[arg(long, default_value = "86400")]
    session_ttl: u64,

    /// Custom Bot API endpoint (e.g. a local telegram-bot-api server)
    #[arg(long)]
    api_endpoint: Option<String>,

    /// Bot command carrying the pairing token, including the trailing space
    #[arg(long, default_value = "/start ")]
    command_prefix: String,

    /// Reply to unrecognized messages and unknown tokens
    #[arg(long, default_value = DEFAULT_ERROR_MSG)]
    error_msg: String,

    /// Reply once a login request is confirmed
    #[arg(long, default_value = DEFAULT_SUCCESS_MSG)]
    success_msg: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Build the service configuration from the command line
    fn config(&self) -> Config {
        Config::new()
            .with_provider_name(self.provider.clone())
            .with_port(self.port)
            .with_token_ttl(Duration::from_secs(self.token_ttl))
            .with_poll_interval(Duration::from_millis(self.poll_interval))
            .with_request_timeout(Duration::from_secs(self.request_timeout))
            .with_session_ttl(Duration::from_secs(self.session_ttl))
            .with_command_prefix(self.command_prefix.clone())
            .with_error_msg(self.error_msg.clone())
            .with_success_msg(self.success_msg.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("botpair v{}", env!("CARGO_PKG_VERSION"));

    let config = args.config();
    config.validate()?;

    let gateway = match &args.api_endpoint {
        Some(endpoint) => {
            info!("Using Bot API endpoint {}", endpoint);
            TelegramGateway::with_endpoint(endpoint, &args.bot_token, config.request_timeout)
        }
        None => TelegramGateway::new(&args.bot_token, config.request_timeout),
    }
    .map_err(|e| anyhow::anyhow!("Failed to create Telegram client: {}", e))?;

    // Pending requests live only in memory; a restart drops them
    let store = Arc::new(RequestStore::new());

    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(gateway),
        ReconcilerConfig::from(&config),
    );
    let cancel = CancellationToken::new();
    let reconciler_handle = tokio::spawn(reconciler.run(cancel.clone()));

    let handshake = Handshake::new(
        store,
        &config,
        Arc::new(PassthroughAvatars),
        Arc::new(MemorySessionIssuer::new(config.session_ttl)),
    );
    let router = create_router(Arc::new(AppState::new(handshake)));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on port {}...", config.port);
    info!("  Login endpoint: /auth/{}/login", config.provider_name);
    info!("Press Ctrl+C to stop.");

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            cancel.cancel();
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await;

    // Stop polling even if the server failed on its own
    cancel.cancel();
    if let Err(e) = reconciler_handle.await {
        warn!("Reconciler task failed: {}", e);
    }

    served?;
    info!("Goodbye!");
    Ok(())
}
