use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    handlers::{self, metadata},
    middleware as app_middleware,
    state::{AppState, StartupError},
};

/// Upper bound on the interval between expired-session sweeps.
const MAX_PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct IdpProxyServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        // Metadata generation service
        .route("/metadata", get(metadata::index))
        .route(
            metadata::SAVE_PATH,
            get(metadata::save).post(metadata::save),
        )
        .route(metadata::VERIFY_PATH, get(metadata::verify))
        .route(metadata::VERIFY_JSON_PATH, post(metadata::verify_json))
        // Social login
        .route("/social/{service}/login", get(handlers::social::login))
        .route("/social/{service}/callback", get(handlers::social::callback))
        .fallback(handlers::fallback)
        .with_state(state)
        // Middleware stack (order: request id -> trace -> cors -> panic guard -> body limit)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Loads keys and metadata and wires the routes.
    pub fn build(self) -> Result<IdpProxyServer, StartupError> {
        self.config.validate().map_err(StartupError::Config)?;
        let state = AppState::from_config(&self.config)?;
        let app = build_app(state.clone());

        Ok(IdpProxyServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

impl IdpProxyServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let purge = spawn_session_purge(&self.state);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        purge.abort();
        served?;
        Ok(())
    }
}

/// Periodically drops sessions and pending states older than the session TTL.
pub fn spawn_session_purge(state: &AppState) -> JoinHandle<()> {
    let sessions = std::sync::Arc::clone(&state.sessions);
    let ttl = state.session_ttl();
    let period = ttl.min(MAX_PURGE_INTERVAL);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired(ttl);
            if purged > 0 {
                tracing::debug!(purged, remaining = sessions.len(), "expired sessions purged");
            }
        }
    })
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
