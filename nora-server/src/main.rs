//! nora-server – entry point.
//!
//! Startup order:
//! 1. Parse the command line; `env` subcommands run and exit.
//! 2. Load `.env`, then read configuration from environment variables.
//! 3. Initialise structured tracing (console, JSON, optional daily log file).
//! 4. Open SQLite and run migrations, falling back to an in-memory database.
//! 5. Upsert the admin account and load the company profile.
//! 6. Build the provider registry and shared state.
//! 7. Serve the Axum router with graceful shutdown.

mod auth;
mod cli;
mod config;
mod entities;
mod error;
mod middleware;
mod routes;
mod schemas;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Command};
use crate::config::{Config, DEFAULT_ADMIN_PASSWORD};
use crate::entities::SqliteStore;
use crate::services::company::CompanyInfo;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(Command::Env { action }) = cli.command {
        cli::run_env(action);
        return Ok(());
    }

    // ── 1. Configuration ───────────────────────────────────────────────────────
    // Variables already present in the environment win over `.env`.
    let env_file = dotenv::dotenv().ok();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "nora-server starting");
    if let Some(path) = &env_file {
        info!(path = %path.display(), "loaded .env");
    }

    if cfg.secret_key_generated {
        warn!("SECRET_KEY is not set; using a random key, tokens will not survive a restart");
    }
    if cfg.admin_password == DEFAULT_ADMIN_PASSWORD {
        warn!(username = %cfg.admin_username, "ADMIN_PASSWORD is the default; change it before exposing the gateway");
    }
    if let Some(redis) = &cfg.redis_url {
        info!(redis_url = %redis, "REDIS_URL is set; the context cache stays in-process");
    }

    // ── 3. Storage ─────────────────────────────────────────────────────────────
    let (store, persistent) = SqliteStore::connect_or_in_memory(&cfg.database_url).await?;
    if persistent {
        info!(database_url = %cfg.database_url, "database ready");
    } else {
        warn!("conversations and saved chats will not survive a restart");
    }

    auth::ensure_admin(&store, &cfg.admin_username, &cfg.admin_password).await?;

    // ── 4. Company profile + shared state ──────────────────────────────────────
    let company = CompanyInfo::load(&cfg.company_info_dir);
    info!(
        company = %company.config.company_name,
        assistant = %company.config.assistant_name,
        "company profile loaded"
    );
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let state = Arc::new(AppState::new(cfg, store, company)?);
    state.files.ensure_dirs().await?;

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, provider = %state.providers.default_kind(), "HTTP server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("nora-server stopped");
    Ok(())
}

/// Console output (plain or JSON) plus an optional daily-rolling file.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: NORA_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let console = if cfg.log_json {
        fmt::layer().json().with_target(true).with_thread_ids(true).boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    let (file, guard) = match &cfg.log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "nora-server.log"));
            (Some(fmt::layer().with_ansi(false).with_writer(writer).boxed()), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(env_filter).with(console).with(file).init();
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
