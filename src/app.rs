/*
 * Responsibility
 * - Config読み込み → 依存生成 (VerificationPipeline) → Router 組み立て
 * - Middleware の適用 (HTTP 横断 / セッション検証)
 * - axum::serve() で起動, Ctrl-C で graceful shutdown
 */
use std::{panic, process};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::services::auth::build_pipeline;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,session_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get lost.
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    let state = build_state(&config)?;
    let plan: Vec<&str> = state.pipeline.plan().iter().map(|s| s.name()).collect();
    tracing::info!(
        env = ?config.app_env,
        addr = %config.addr,
        stages = %plan.join(" -> "),
        "starting gateway"
    );
    tracing::debug!(session = ?config.session, "session configuration");

    let app = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C. In-flight requests finish before `serve` returns.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, draining connections");
}

pub fn build_state(config: &Config) -> Result<AppState> {
    let pipeline = build_pipeline(config)?;
    Ok(AppState::new(pipeline))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .merge(api::public_routes())
        .merge(api::protected_routes(state.clone()))
        .with_state(state);

    middleware::http::apply(router, config.request_timeout)
}
