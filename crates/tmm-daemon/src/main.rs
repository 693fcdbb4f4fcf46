//! tmm-daemon entry point.
//!
//! Sets up tracing, loads configuration and secrets once, picks the store
//! backend and starts the HTTP server. Handlers live in `routes.rs`, shared
//! state in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tmm_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, resolve_secrets,
    split_config_paths, CorsConfig, LoadedConfig, StoreBackend, UnusedKeyPolicy,
};
use tmm_daemon::{auth::StaticTokenResolver, routes, state};
use tmm_db::{CounterLedger, LedgerStore, MemStore, PgStore};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG: &str = "TMM_CONFIG";
const ENV_DAEMON_ADDR: &str = "TMM_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }

    let mut config = loaded.app_config()?;
    if let Ok(addr) = std::env::var(ENV_DAEMON_ADDR) {
        config.service.bind_addr = addr;
    }
    let addr = config.bind_addr()?;

    // Fail closed: no tokens, no server.
    let secrets = resolve_secrets(&config)?;

    let store: Arc<dyn LedgerStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("in-memory store selected; ledger data is lost on exit");
            Arc::new(MemStore::new())
        }
        StoreBackend::Postgres => {
            let url = secrets
                .database_url
                .as_deref()
                .context("postgres backend selected but no database url resolved")?;
            let pool = tmm_db::connect(url, config.store.max_connections).await?;
            if config.store.run_migrations {
                tmm_db::migrate(&pool).await?;
            }
            Arc::new(PgStore::new(pool))
        }
    };

    let identity = Arc::new(StaticTokenResolver::new(secrets.api_tokens.clone()));
    let cors = cors_from_config(&config.cors);
    let service = config.service.name.clone();
    let shared = Arc::new(state::AppState::new(
        CounterLedger::new(store),
        Arc::new(config),
        identity,
    ));
    let backend = shared.ledger.backend();

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    info!(
        %addr,
        service = %service,
        backend,
        config_hash = %loaded.config_hash,
        "tmm-daemon listening"
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("tmm-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Layers named in TMM_CONFIG (comma separated); built-in defaults otherwise.
fn load_config() -> anyhow::Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG) {
        Ok(raw) if !raw.trim().is_empty() => {
            let paths = split_config_paths(&raw);
            let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            load_layered_yaml(&refs).with_context(|| format!("loading {ENV_CONFIG}={raw}"))
        }
        _ => {
            info!("{ENV_CONFIG} not set; using built-in defaults");
            load_layered_yaml_from_strings(&[])
        }
    }
}

/// CORS from config. A single "*" entry allows any origin.
fn cors_from_config(cfg: &CorsConfig) -> CorsLayer {
    let origin = if cfg.origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = cfg
            .origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
