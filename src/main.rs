use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod analysis;
mod auth;
mod backend;
mod config;
mod dto;
mod error;
mod handlers;
mod models;
mod recommendations;
mod repository;
mod router;
mod session;

use auth::rate_limit::AttemptLimiter;
use backend::{AuthService, Backend};
use config::Config;
use repository::EntryRepository;
use router::ViewRouter;
use session::SessionMirror;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn AuthService>,
    pub entries: EntryRepository,
    pub session: Arc<SessionMirror>,
    pub view_router: Arc<Mutex<ViewRouter>>,
    pub limiter: AttemptLimiter,
}

impl AppState {
    /// Wire the backend into the app and start mirroring its session.
    pub fn new(config: Config, backend: Backend) -> Self {
        let config = Arc::new(config);
        let session = SessionMirror::spawn(backend.auth.clone(), config.backend_timeout);
        Self {
            entries: EntryRepository::new(backend.store, config.backend_timeout),
            auth: backend.auth,
            session,
            view_router: Arc::new(Mutex::new(ViewRouter::new())),
            limiter: AttemptLimiter::new(),
            config,
        }
    }
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = vec![config
        .frontend_url
        .parse::<HeaderValue>()
        .context("FRONTEND_URL is not a valid origin")?];
    for origin in &config.cors_extra_origins {
        match origin.parse::<HeaderValue>() {
            Ok(hv) => origins.push(hv),
            Err(_) => tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"),
        }
    }

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true))
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/api/view", get(handlers::view::current_view))
        .route("/api/view/navigate", post(handlers::view::navigate))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/resend", post(handlers::auth::resend_confirmation));

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))
        // Entries
        .route(
            "/api/entries",
            post(handlers::entries::create_entry).get(handlers::entries::list_entries),
        )
        .route("/api/entries/latest", get(handlers::entries::latest_entry))
        // Screens
        .route("/api/dashboard", get(handlers::dashboard::get_dashboard))
        .route("/api/results", get(handlers::results::get_results))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_session,
        ));

    let cors = cors_layer(&state.config)?;

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodlog_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Config::from_env()?;
    tracing::info!(backend = ?config.backend, "Configuration loaded");

    let backend = Backend::from_config(&config)?;
    let addr = config.listen_addr();
    let state = AppState::new(config, backend);

    auth::rate_limit::spawn_limiter_pruner(state.limiter.clone());

    let session = state.session.clone();
    let app = build_app(state)?;

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    session.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
