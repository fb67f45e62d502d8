//! Instant On site relay
//!
//! Single-binary service that:
//! 1. Acquires a bearer token through the Instant On SSO flow for each upstream call
//! 2. Serves a filtered view of problem sites and relays per-site resources
//! 3. Optionally writes periodic problem-alert snapshots to disk

mod config;
mod error;
mod metrics;
mod relay;
mod snapshot;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use instant_on_auth::TokenOrchestrator;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::error::RelayError;
use crate::relay::{RelayState, ServiceMetrics, SiteEndpoint};
use crate::snapshot::{SnapshotPaths, spawn_snapshot_task};

/// Upper bound on waiting for in-flight requests after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    relay: RelayState,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let mut router: Router<AppState> = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/sites", get(sites_handler))
        .route("/globalAlerts", get(global_alerts_handler));

    for endpoint in SiteEndpoint::ALL {
        router = router.route(
            &format!("/{}/{{site_id}}", endpoint.route_name()),
            get(
                move |State(state): State<AppState>, Path(site_id): Path<String>| async move {
                    site_handler(state, site_id, endpoint).await
                },
            ),
        );
    }

    router
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may come from a .env file next to the binary
    let dotenv_path = dotenvy::dotenv().ok();

    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting instant-on-relay");
    if let Some(path) = &dotenv_path {
        info!(path = %path.display(), "loaded environment file");
    }

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let location = Config::resolve_path(cli_config_path);
    if location.explicit || location.path.exists() {
        info!(path = %location.path.display(), "loading configuration");
    } else {
        info!(
            path = %location.path.display(),
            "no config file, using defaults and environment"
        );
    }

    let config = Config::load_from(&location)
        .with_context(|| format!("failed to load config from {}", location.path.display()))?;

    let credentials = config
        .auth
        .credentials()
        .context("Instant On account credentials are not configured")?;

    info!(
        listen_addr = %config.relay.listen_addr,
        api_url = %config.relay.api_url,
        sso_url = %config.auth.sso_url,
        username = %credentials.username,
        snapshot = config.snapshot.enabled,
        "configuration loaded"
    );

    let orchestrator = TokenOrchestrator::new(
        config.auth.endpoints(),
        credentials,
        config.auth.timeout(),
    )
    .context("failed to build SSO client")?;

    let relay_timeout = Duration::from_secs(config.relay.timeout_secs);
    let relay = RelayState {
        client: reqwest::Client::builder()
            .timeout(relay_timeout)
            .build()
            .context("failed to build upstream client")?,
        api_url: config.relay.api_url.clone(),
        timeout: relay_timeout,
        tokens: Arc::new(orchestrator),
    };

    if config.snapshot.enabled {
        let paths = SnapshotPaths {
            snapshot: config.snapshot.snapshot_path.clone(),
            error_log: config.snapshot.error_log_path.clone(),
        };
        info!(
            interval_secs = config.snapshot.interval_secs,
            snapshot_path = %paths.snapshot.display(),
            error_log_path = %paths.error_log.display(),
            "starting alert snapshot task"
        );
        spawn_snapshot_task(
            relay.clone(),
            paths,
            Duration::from_secs(config.snapshot.interval_secs),
        );
    }

    let app_state = AppState {
        relay,
        metrics: ServiceMetrics::new(),
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.relay.max_connections);

    let listen_addr = config.relay.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts at signal receipt, not at server start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Count, time and render a relay outcome.
fn finish<T: Serialize>(
    state: &AppState,
    route: &'static str,
    started: Instant,
    outcome: Result<T, RelayError>,
) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let response = match outcome {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
            warn!(route, request_id = %request_id, error = %e, "relay request failed");
            e.into_response_with(&request_id)
        }
    };

    metrics::record_request(
        route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn sites_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let outcome = state.relay.problem_sites().await;
    finish(&state, "sites", started, outcome)
}

async fn site_handler(state: AppState, site_id: String, endpoint: SiteEndpoint) -> Response {
    let started = Instant::now();
    let outcome = state.relay.fetch_site_data(&site_id, endpoint).await;
    let route = match endpoint {
        SiteEndpoint::Details => "site_details",
        other => other.segment(),
    };
    finish(&state, route, started, outcome)
}

async fn global_alerts_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let outcome = state.relay.global_alerts().await;
    finish(&state, "globalAlerts", started, outcome)
}

/// Liveness plus request counters. Does not touch the SSO or upstream API.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
    }))
}

/// Prometheus metrics endpoint; returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
