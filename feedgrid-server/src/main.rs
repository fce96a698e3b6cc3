use axum::{
    middleware,
    routing::get,
    Router,
};
use feedgrid_core::{
    broadcast::BroadcastMode,
    config::Config,
    persistence::Storage,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use storage::InMemoryStorage;
use tracing::info;

mod actor;
mod frames;
mod http;
mod logging;
mod policy;
mod ratelimit;
mod shutdown;
mod state;
mod storage;

use actor::{CoreConfig, CoreHandle};
use policy::{BannedIps, OriginPolicy};
use ratelimit::RateLimiter;
use shutdown::AsyncShutdown;
use state::AppState;

/// Reasonable process defaults. CLI argument parsing and config-file/env loading are excluded
/// from this crate's scope - whatever loader a deployment wires up is expected to produce a
/// [`Config`] of this shape before calling [`run`].
fn default_config() -> Config {
    Config {
        collect: true,
        storage: vec!["memory".to_string()],
        backup_interval_ms: 10_000,
        broadcast: true,
        broadcast_aggr: true,
        broadcast_debounce_ms: None,
        port: Some(8080),
        api: true,
        enable_rate_limit: true,
        rate_limit_time_window_ms: Some(60_000),
        rate_limit_max: Some(120),
        origin: None,
        max_fetch_length: 10_000,
        monitor_interval_ms: 1_000,
        reconnection_threshold_ms: 60_000.0,
        pairs: vec![],
    }
}

fn broadcast_mode(config: &Config) -> BroadcastMode {
    if !config.broadcast {
        BroadcastMode::Disabled
    } else if config.broadcast_aggr {
        BroadcastMode::Aggregated
    } else if let Some(tick_ms) = config.broadcast_debounce_ms {
        BroadcastMode::Debounced {
            tick: Duration::from_millis(tick_ms.max(1) as u64),
        }
    } else {
        BroadcastMode::Immediate
    }
}

/// Storage drivers are opaque, externally-supplied sinks/fetchers (§6); this workspace ships only
/// the in-memory default so the server is runnable standalone. A deployment wiring in a real
/// driver (a database, an object store) would replace this lookup with its own registry.
fn build_storages(names: &[String]) -> Vec<Box<dyn Storage>> {
    names
        .iter()
        .map(|_name| Box::new(InMemoryStorage::new()) as Box<dyn Storage>)
        .collect()
}

#[tokio::main]
async fn main() {
    if std::env::var("FEEDGRID_LOG_JSON").is_ok() {
        logging::init_json_logging();
    } else {
        logging::init_logging();
    }

    let config = default_config();
    if let Err(error) = config.validate() {
        panic!("misconfiguration: {error}");
    }

    run(config).await;
}

async fn run(config: Config) {
    let Some(port) = config.port else {
        info!("api disabled, nothing to serve");
        return;
    };

    let storages = if config.collect {
        build_storages(&config.storage)
    } else {
        vec![]
    };

    let core = actor::spawn(
        CoreConfig {
            broadcast_mode: broadcast_mode(&config),
            persistence_enabled: config.collect,
            backup_interval_ms: config.backup_interval_ms,
            monitor_interval_ms: config.monitor_interval_ms,
            reconnection_threshold_ms: config.reconnection_threshold_ms,
            max_fetch_length: config.max_fetch_length,
            exchanges: vec![],
        },
        storages,
    );

    let banned = BannedIps::new();
    banned.clone().watch(
        PathBuf::from("banned.txt"),
        Duration::from_secs(5),
    );

    let origin = OriginPolicy::new(config.origin.as_deref());

    let rate_limit = config.enable_rate_limit.then(|| {
        RateLimiter::new(
            config.rate_limit_max.unwrap_or(120),
            Duration::from_millis(config.rate_limit_time_window_ms.unwrap_or(60_000).max(1) as u64),
        )
    });

    if let Some(limiter) = rate_limit.clone() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });
    }

    let state = AppState::new(core.clone(), banned, origin, rate_limit);

    if !config.api {
        info!("api disabled, core runs headless");
        shutdown_on_signal(core).await;
        return;
    }

    let app = Router::new()
        .route("/", get(http::root))
        .route("/historical/:from/:to", get(http::historical_basic))
        .route(
            "/historical/:from/:to/:timeframe",
            get(http::historical_with_timeframe),
        )
        .route(
            "/historical/:from/:to/:timeframe/:markets",
            get(http::historical_with_markets),
        )
        .fallback(get(http::websocket_or_disabled))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http::policy_middleware,
        ))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|error| panic!("failed to bind {addr}: {error}"));

    info!(%addr, "feedgrid-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown_signal(core))
    .await
    .unwrap_or_else(|error| panic!("server error: {error}"));
}

async fn wait_for_shutdown_signal(core: CoreHandle) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    core.shutdown().await;
}

async fn shutdown_on_signal(core: CoreHandle) {
    let _ = tokio::signal::ctrl_c().await;
    core.shutdown().await;
}
