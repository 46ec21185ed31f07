//! License server - main application entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with protocol, admin, and health routes
//! 5. Start server on configured port

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use license_guard::{AppState, config::ServerConfig, db, handlers, token::TokenCodec};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState {
        pool,
        codec: TokenCodec::new(config.jwt_secret.as_bytes()),
    };

    let app = Router::new()
        // Public routes
        .route("/health", get(handlers::health::health_check))
        // Protocol routes: the license key / bearer token is the credential
        .route("/api/activate", post(handlers::protocol::activate))
        .route("/api/heartbeat", post(handlers::protocol::heartbeat))
        // Admin license management routes
        .route("/api/admin/licenses", post(handlers::admin::create_license))
        .route("/api/admin/licenses", get(handlers::admin::list_licenses))
        .route(
            "/api/admin/licenses/batch",
            post(handlers::admin::batch_generate),
        )
        .route(
            "/api/admin/licenses/{key}",
            get(handlers::admin::get_license),
        )
        .route(
            "/api/admin/licenses/{key}",
            put(handlers::admin::update_license),
        )
        .route(
            "/api/admin/licenses/{key}",
            delete(handlers::admin::delete_license),
        )
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        // Allow back-office dashboards hosted elsewhere to call the admin API
        .layer(CorsLayer::permissive())
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // ConnectInfo gives handlers the peer address for the audit log
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
