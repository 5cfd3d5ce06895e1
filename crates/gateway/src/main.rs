//! Civica Portal Gateway
//!
//! The boundary that exposes the portal services to browser clients.
//! Handles:
//! - Paper submission and the approval workflow endpoints
//! - Access requests, PIN verification, and admin login
//! - The chat WebSocket channel
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use civica_common::{
    access::AccessService,
    auth::AuthVerifier,
    chat::ChatRoom,
    config::AppConfig,
    mail::Mailer,
    metrics,
    papers::PaperService,
    store::{ChatHistoryStore, FlatFileStore},
    uploads::{self, UploadStore},
    AppError,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<FlatFileStore>,
    pub papers: PaperService,
    pub access: AccessService,
    pub chat: ChatRoom,
    pub uploads: Arc<dyn UploadStore>,
    pub verifier: AuthVerifier,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config);
    info!("Starting Civica Portal gateway v{}", civica_common::VERSION);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .with_http_listener(SocketAddr::from((
                [0, 0, 0, 0],
                config.observability.metrics_port,
            )))
            .install()?;
        info!(port = config.observability.metrics_port, "Metrics exporter started");
    }

    // Wire up stores and services
    let state = build_state(Arc::new(config.clone()))?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Construct the shared application state from configuration
fn build_state(config: Arc<AppConfig>) -> Result<AppState, AppError> {
    let store = Arc::new(FlatFileStore::new(config.store.data_path.clone()));
    let history = Arc::new(ChatHistoryStore::new(config.store.chat_path.clone()));
    let uploads = uploads::from_config(&config.uploads)?;
    let verifier = AuthVerifier::from_config(&config.auth)?;
    let mailer = Arc::new(Mailer::from_config(&config.mail));

    let papers = PaperService::new(store.clone(), uploads.clone());
    let access = AccessService::new(store.clone(), mailer, verifier.bootstrap().clone());
    let chat = ChatRoom::new(history);

    Ok(AppState {
        config,
        store,
        papers,
        access,
        chat,
        uploads,
        verifier,
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut router = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Paper workflow endpoints
        .route("/upload", post(handlers::papers::upload_paper))
        .route("/papers", get(handlers::papers::list_papers))
        .route(
            "/papers/{id}",
            get(handlers::papers::get_paper).patch(handlers::papers::update_status),
        )

        // Auth endpoints
        .route("/login", post(handlers::auth::login))
        .route("/auth/request-access", post(handlers::auth::request_access))
        .route("/auth/verify-pin", post(handlers::auth::verify_pin))

        // Profile endpoints
        .route(
            "/profiles/{email}",
            get(handlers::profiles::get_profile).put(handlers::profiles::update_profile),
        )

        // Admin endpoints
        .route(
            "/admin/access-requests",
            get(handlers::admin::list_access_requests),
        )
        .route(
            "/admin/approve-request/{id}",
            post(handlers::admin::approve_request),
        )
        .route("/admin/papers", get(handlers::admin::list_all_papers))
        .route(
            "/admin/papers/truncate",
            post(handlers::admin::truncate_papers),
        )

        // Uploaded blobs (disk backend)
        .route("/files/{name}", get(handlers::files::serve_file))

        // Chat channel
        .route("/ws", get(handlers::chat::ws_upgrade));

    if state.config.rate_limit.enabled {
        let limit = state.config.rate_limit.requests_per_second;
        let limiter = middleware::rate_limit::create_rate_limiter(
            limit,
            state.config.rate_limit.burst,
        );
        router = router.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let limiter = limiter.clone();
                async move {
                    middleware::rate_limit::rate_limit_middleware(request, next, limiter, limit)
                        .await
                }
            },
        ));
    }

    // Compose the app
    router
        .layer(axum::middleware::from_fn(middleware::track_requests))
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use civica_common::config::BootstrapConfig;
    use tower::ServiceExt;

    fn test_router(dir: &tempfile::TempDir) -> Router {
        let mut config = AppConfig::default();
        config.store.data_path = dir.path().join("portal.json");
        config.store.chat_path = dir.path().join("chat.json");
        config.uploads.dir = dir.path().join("uploads");
        config.auth.bootstrap = BootstrapConfig {
            enabled: true,
            bearer_token: Some("test-token".into()),
            master_pin: None,
            admin_password: Some("test-password".into()),
        };

        create_router(build_state(Arc::new(config)).unwrap())
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_paper_list_needs_no_auth() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .oneshot(Request::get("/papers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_list_requires_bearer() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .clone()
            .oneshot(Request::get("/admin/papers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/admin/papers")
                    .header(header::AUTHORIZATION, "Bearer test-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_with_bootstrap_password() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .clone()
            .oneshot(json_post(
                "/login",
                r#"{"email":"admin@civica.org","password":"test-password"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_post(
                "/login",
                r#"{"email":"admin@civica.org","password":"wrong"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verify_pin_rejects_unknown_pin() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .oneshot(json_post("/auth/verify-pin", r#"{"pin":"000000"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_patch_status_missing_paper_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/papers/nope")
                    .header(header::AUTHORIZATION, "Bearer test-token")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"status":"approved"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_file_serves_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir);

        let response = app
            .oneshot(Request::get("/files/nope.pdf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
